// handler/referrals.rs
use std::sync::Arc;

use axum::{
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use validator::Validate;

use crate::{
    dtos::{loyaltydtos::ApiResponse, referraldtos::ApplyReferralCodeDto},
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

pub fn referrals_handler() -> Router {
    Router::new()
        .route("/code", get(get_referral_code))
        .route("/apply", post(apply_referral_code))
        .route("/stats", get(get_referral_stats))
        .route("/status", get(get_referral_status))
}

pub async fn get_referral_code(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let link = app_state
        .referral_service
        .referral_code(auth.account_id)
        .await?;

    Ok(Json(ApiResponse::success("Referral code retrieved successfully", link)))
}

pub async fn apply_referral_code(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<ApplyReferralCodeDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let referrer = app_state
        .referral_service
        .apply_code(auth.account_id, &body.code)
        .await?;

    Ok(Json(ApiResponse::success("Referral code applied successfully", referrer)))
}

pub async fn get_referral_stats(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let stats = app_state
        .referral_service
        .referral_stats(auth.account_id)
        .await?;

    Ok(Json(ApiResponse::success("Referral stats retrieved successfully", stats)))
}

pub async fn get_referral_status(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let status = app_state
        .referral_service
        .referral_status(auth.account_id)
        .await?;

    Ok(Json(ApiResponse::success("Referral status retrieved successfully", status)))
}
