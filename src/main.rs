mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
mod utils;

use std::sync::Arc;

use axum::http::{header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE}, HeaderValue, Method};
use config::Config;
use dotenv::dotenv;
use redis::aio::ConnectionManager;
use routes::create_router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;

use crate::{
    db::{db::DBClient, memory::MemoryStore, LoyaltyStore},
    utils::clock::{Clock, SystemClock},
};
use service::{
    coupon_service::CouponService,
    loyalty_service::LoyaltyService,
    notification_service::{LogNotifier, NotificationService, Notifier},
    order_event_service::OrderEventService,
    referral_service::ReferralService,
};

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub loyalty_service: Arc<LoyaltyService>,
    pub referral_service: Arc<ReferralService>,
    pub coupon_service: Arc<CouponService>,
    pub order_event_service: Arc<OrderEventService>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn LoyaltyStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        cache: Option<Arc<ConnectionManager>>,
    ) -> Self {
        let loyalty_service = Arc::new(
            LoyaltyService::new(store.clone(), notifier, clock.clone(), config.rules.clone())
                .with_cache(cache),
        );

        let referral_service = Arc::new(ReferralService::new(
            store.clone(),
            loyalty_service.clone(),
            config.app_url.clone(),
        ));

        let coupon_service = Arc::new(CouponService::new(store, clock));

        let order_event_service = Arc::new(OrderEventService::new(
            loyalty_service.clone(),
            referral_service.clone(),
        ));

        Self {
            env: config,
            loyalty_service,
            referral_service,
            coupon_service,
            order_event_service,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    dotenv().ok();

    let config = Config::init();

    let store: Arc<dyn LoyaltyStore>;
    let notifier: Arc<dyn Notifier>;
    let mut cache = None;

    match &config.database_url {
        Some(database_url) => {
            let db_client = match DBClient::connect(database_url, 20).await {
                Ok(db_client) => {
                    tracing::info!("Connection to the database is successful");
                    db_client
                }
                Err(err) => {
                    tracing::error!("Failed to connect to the database: {:?}", err);
                    std::process::exit(1);
                }
            };

            let db_client = match &config.redis_url {
                Some(redis_url) => db_client.with_redis(redis_url).await,
                None => {
                    tracing::info!("Redis not configured, running without summary cache");
                    db_client
                }
            };
            tracing::info!("Cache status: {}", db_client.cache_status());

            cache = db_client.redis_client.clone();
            let db_client = Arc::new(db_client);
            store = db_client.clone();
            notifier = Arc::new(NotificationService::new(db_client));
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on restart");
            store = Arc::new(MemoryStore::new());
            notifier = Arc::new(LogNotifier);
        }
    }

    let allowed_origins: Vec<HeaderValue> = [config.app_url.as_str(), "http://localhost:5173"]
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST]);

    let app_state = Arc::new(AppState::new(
        config.clone(),
        store,
        notifier,
        Arc::new(SystemClock),
        cache,
    ));

    let app = create_router(app_state).layer(cors);

    tracing::info!("Server is running on http://localhost:{}", config.port);

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", &config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("Failed to bind port {}: {}", config.port, err);
            std::process::exit(1);
        }
    };

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", err);
    }
}
