// handler/internal.rs
use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        coupondtos::{ApplyCouponDto, CreateCouponDto},
        loyaltydtos::*,
    },
    error::HttpError,
    service::{loyalty_service::current_period_end, order_event_service::OrderDelivered},
    AppState,
};

/// Hooks for the order lifecycle, schedulers, back office and checkout.
pub fn internal_handler() -> Router {
    Router::new()
        .route("/orders/delivered", post(order_delivered))
        .route("/loyalty/:account_id/bonus", post(grant_bonus))
        .route("/loyalty/:account_id/rewards", post(issue_reward))
        .route("/challenges/:account_id/assign", post(assign_challenges))
        .route("/challenges/:account_id/reset", post(reset_challenges))
        .route("/challenges/:account_id/:challenge_id/progress", post(record_progress))
        .route("/coupons", post(create_coupon))
        .route("/coupons/apply", post(apply_coupon))
}

pub async fn order_delivered(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<OrderDeliveredDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = app_state
        .order_event_service
        .on_order_delivered(OrderDelivered {
            order_id: body.order_id,
            account_id: body.account_id,
            order_total: body.order_total,
            restaurant_id: body.restaurant_id,
        })
        .await?;

    Ok(Json(ApiResponse::success("Order processed successfully", outcome)))
}

pub async fn grant_bonus(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(account_id): Path<Uuid>,
    Json(body): Json<BonusRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let granted = app_state
        .loyalty_service
        .grant_bonus_once(account_id, body.amount, &body.reason, body.idempotency_key.as_deref())
        .await?;

    let message = if granted.applied {
        "Bonus granted successfully"
    } else {
        "Bonus was already granted"
    };
    Ok(Json(ApiResponse::success(message, granted.entry)))
}

pub async fn issue_reward(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(account_id): Path<Uuid>,
    Json(body): Json<IssueRewardRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let reward = app_state
        .loyalty_service
        .issue_reward(account_id, body.into())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Reward issued successfully", reward)),
    ))
}

pub async fn assign_challenges(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(account_id): Path<Uuid>,
    body: Option<Json<PeriodRequestDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let loyalty = &app_state.loyalty_service;
    let period_end = body
        .and_then(|Json(body)| body.period_end)
        .unwrap_or_else(|| current_period_end(loyalty.now()));

    let assigned = loyalty.assign_period_challenges(account_id, period_end).await?;

    Ok(Json(ApiResponse::success("Challenges assigned successfully", assigned)))
}

pub async fn reset_challenges(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(account_id): Path<Uuid>,
    body: Option<Json<PeriodRequestDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let loyalty = &app_state.loyalty_service;
    let period_end = body
        .and_then(|Json(body)| body.period_end)
        .unwrap_or_else(|| current_period_end(loyalty.now()));

    let assigned = loyalty.reset_period(account_id, period_end).await?;

    Ok(Json(ApiResponse::success("Challenges reset successfully", assigned)))
}

pub async fn record_progress(
    Extension(app_state): Extension<Arc<AppState>>,
    Path((account_id, challenge_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<ProgressRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let challenge = app_state
        .loyalty_service
        .record_progress(account_id, challenge_id, body.delta)
        .await?;

    Ok(Json(ApiResponse::success("Progress recorded successfully", challenge)))
}

pub async fn create_coupon(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<CreateCouponDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let coupon = app_state.coupon_service.create_coupon(body.into()).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Coupon created successfully", coupon)),
    ))
}

pub async fn apply_coupon(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<ApplyCouponDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let quote = app_state
        .coupon_service
        .apply(&body.code, body.subtotal, body.account_id)
        .await?;

    Ok(Json(ApiResponse::success("Coupon applied successfully", quote)))
}
