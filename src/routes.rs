// routes.rs
use std::sync::Arc;

use axum::{middleware, response::IntoResponse, routing::get, Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    handler::{
        coupons::coupons_handler,
        internal::internal_handler,
        loyalty::loyalty_handler,
        referrals::referrals_handler,
    },
    middleware::{auth, internal_only},
    AppState,
};

async fn health_checker_handler() -> impl IntoResponse {
    Json(json!({
        "status": "success",
        "message": "Loyalty service is running"
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_route = Router::new()
        .route("/healthchecker", get(health_checker_handler))
        .nest(
            "/loyalty",
            loyalty_handler()
                .layer(middleware::from_fn(auth))
        )
        .nest(
            "/referrals",
            referrals_handler()
                .layer(middleware::from_fn(auth))
        )
        .nest(
            "/coupons",
            coupons_handler()
                .layer(middleware::from_fn(auth))
        )
        .nest(
            "/internal",
            internal_handler()
                .layer(middleware::from_fn(internal_only))
        )
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new().nest("/api", api_route)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::{
        config::{Config, LoyaltyRules},
        db::memory::MemoryStore,
        middleware::INTERNAL_KEY_HEADER,
        service::notification_service::LogNotifier,
        utils::{clock::SystemClock, token::create_token},
    };

    const SECRET: &str = "test-secret";
    const INTERNAL_KEY: &str = "internal-test-key";

    fn app() -> Router {
        let config = Config {
            database_url: None,
            redis_url: None,
            app_url: "http://localhost:5173".to_string(),
            jwt_secret: SECRET.to_string(),
            internal_api_key: INTERNAL_KEY.to_string(),
            port: 8000,
            rules: LoyaltyRules::default(),
        };
        let state = AppState::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(LogNotifier),
            Arc::new(SystemClock),
            None,
        );
        create_router(Arc::new(state))
    }

    fn bearer(account_id: Uuid) -> String {
        let token = create_token(&account_id.to_string(), SECRET.as_bytes(), 60).unwrap();
        format!("Bearer {}", token)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn internal_post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(INTERNAL_KEY_HEADER, INTERNAL_KEY)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_healthchecker() {
        let response = app()
            .oneshot(Request::builder().uri("/api/healthchecker").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_loyalty_requires_token() {
        let response = app()
            .oneshot(Request::builder().uri("/api/loyalty/balance").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["status"], "fail");
    }

    #[tokio::test]
    async fn test_balance_includes_welcome_bonus() {
        let account = Uuid::new_v4();
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/loyalty/balance")
                    .header(header::AUTHORIZATION, bearer(account))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["balance"], 100);
    }

    #[tokio::test]
    async fn test_internal_routes_reject_bad_key() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/internal/coupons")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(INTERNAL_KEY_HEADER, "wrong")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_delivered_order_then_overdraw_is_payment_required() {
        let app = app();
        let account = Uuid::new_v4();

        let response = app
            .clone()
            .oneshot(internal_post(
                "/api/internal/orders/delivered",
                serde_json::json!({
                    "order_id": "ORD-1",
                    "account_id": account,
                    "order_total": 235,
                    "restaurant_id": "r1"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"]["points_earned"], 23);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/loyalty/redeem")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, bearer(account))
                    .body(Body::from(r#"{"points": 200}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Insufficient points: requested 200, available 123");
    }

    #[tokio::test]
    async fn test_coupon_minimum_message() {
        let app = app();
        let response = app
            .clone()
            .oneshot(internal_post(
                "/api/internal/coupons",
                serde_json::json!({
                    "code": "SAVE10",
                    "coupon_type": "percentage",
                    "value": 10,
                    "min_order_amount": 50000
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/coupons/validate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, bearer(Uuid::new_v4()))
                    .body(Body::from(r#"{"code": "save10", "subtotal": 40000}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(
            body["message"],
            "Minimum order amount is 50000, current subtotal is 40000"
        );
    }
}
