// handler/coupons.rs
use std::sync::Arc;

use axum::{response::IntoResponse, routing::post, Extension, Json, Router};
use validator::Validate;

use crate::{
    dtos::{coupondtos::ValidateCouponDto, loyaltydtos::ApiResponse},
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

pub fn coupons_handler() -> Router {
    Router::new().route("/validate", post(validate_coupon))
}

pub async fn validate_coupon(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<ValidateCouponDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let quote = app_state
        .coupon_service
        .validate(&body.code, body.subtotal)
        .await?;

    tracing::debug!("Account {} validated coupon {}", auth.account_id, quote.code);
    Ok(Json(ApiResponse::success("Coupon is valid", quote)))
}
