// handler/loyalty.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::loyaltydtos::*,
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

const DEFAULT_TRANSACTIONS_LIMIT: usize = 20;

pub fn loyalty_handler() -> Router {
    Router::new()
        .route("/", get(get_summary))
        .route("/balance", get(get_balance))
        .route("/tier", get(get_tier))
        .route("/transactions", get(get_transactions))
        .route("/redeem", post(redeem_points))
        .route("/rewards", get(get_available_rewards))
        .route("/rewards/:reward_id/consume", post(consume_reward))
        .route("/challenges", get(get_challenges))
}

pub async fn get_summary(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let summary = app_state
        .loyalty_service
        .get_summary(auth.account_id)
        .await?;

    Ok(Json(ApiResponse::success("Loyalty summary retrieved successfully", summary)))
}

pub async fn get_balance(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let balance = app_state.loyalty_service.get_balance(auth.account_id).await?;

    Ok(Json(ApiResponse::success("Balance retrieved successfully", BalanceDto { balance })))
}

pub async fn get_tier(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let ledger = app_state.loyalty_service.get_ledger(auth.account_id).await?;

    let response = TierDto {
        tier: ledger.tier(),
        next_tier: ledger.tier().next(),
        points_to_next_tier: ledger.points_to_next_tier(),
    };
    Ok(Json(ApiResponse::success("Tier retrieved successfully", response)))
}

pub async fn get_transactions(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(query): Query<TransactionsQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let transactions = app_state
        .loyalty_service
        .list_transactions(
            auth.account_id,
            query.limit.unwrap_or(DEFAULT_TRANSACTIONS_LIMIT),
            query.offset.unwrap_or(0),
        )
        .await?;

    Ok(Json(ApiResponse::success("Transactions retrieved successfully", transactions)))
}

pub async fn redeem_points(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<RedeemRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let reward = app_state
        .loyalty_service
        .redeem(auth.account_id, body.points)
        .await?;

    Ok(Json(ApiResponse::success("Points redeemed successfully", reward)))
}

pub async fn get_available_rewards(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let rewards = app_state
        .loyalty_service
        .list_available_rewards(auth.account_id)
        .await?;

    Ok(Json(ApiResponse::success("Rewards retrieved successfully", rewards)))
}

pub async fn consume_reward(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(reward_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let reward = app_state
        .loyalty_service
        .consume_reward(auth.account_id, reward_id)
        .await?;

    Ok(Json(ApiResponse::success("Reward applied successfully", reward)))
}

pub async fn get_challenges(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let challenges = app_state
        .loyalty_service
        .list_challenges(auth.account_id)
        .await?;

    Ok(Json(ApiResponse::success("Challenges retrieved successfully", challenges)))
}
