use thiserror::Error;
use uuid::Uuid;
use axum::http::StatusCode;

use crate::error::{ErrorMessage, HttpError};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Insufficient points: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },

    #[error("Points must be redeemed in positive multiples of {unit}, got {points}")]
    InvalidRedemptionUnit { points: i64, unit: i64 },

    #[error("Reward {0} not found")]
    RewardNotFound(Uuid),

    #[error("Reward {0} has already been used")]
    RewardAlreadyUsed(Uuid),

    #[error("Reward {0} has expired")]
    RewardExpired(Uuid),

    #[error("Challenge {0} not found")]
    ChallengeNotFound(Uuid),

    #[error("Challenge {0} has expired")]
    ChallengeExpired(Uuid),

    #[error("This account has already used a referral code")]
    AlreadyReferred,

    #[error("Referral code {0} is not valid")]
    InvalidCode(String),

    #[error("You cannot use your own referral code")]
    SelfReferral,

    #[error("Coupon {0} does not exist or is no longer active")]
    CouponNotFound(String),

    #[error("Coupon {0} has expired")]
    CouponExpired(String),

    #[error("Coupon {0} has reached its usage limit")]
    CouponUsageLimitReached(String),

    #[error("Minimum order amount is {minimum}, current subtotal is {subtotal}")]
    CouponMinimumNotMet { minimum: i64, subtotal: i64 },

    #[error("Concurrent update detected, please retry")]
    ConcurrencyConflict,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::RewardNotFound(_)
            | ServiceError::ChallengeNotFound(_)
            | ServiceError::CouponNotFound(_) => StatusCode::NOT_FOUND,

            ServiceError::InvalidRedemptionUnit { .. }
            | ServiceError::RewardAlreadyUsed(_)
            | ServiceError::AlreadyReferred
            | ServiceError::InvalidCode(_)
            | ServiceError::SelfReferral
            | ServiceError::CouponUsageLimitReached(_)
            | ServiceError::CouponMinimumNotMet { .. }
            | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,

            ServiceError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,

            ServiceError::RewardExpired(_)
            | ServiceError::ChallengeExpired(_)
            | ServiceError::CouponExpired(_) => StatusCode::GONE,

            ServiceError::ConcurrencyConflict => StatusCode::CONFLICT,

            ServiceError::Database(_) | ServiceError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        match &error {
            ServiceError::Database(e) => {
                tracing::error!("Database error: {}", e);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            }
            _ => HttpError::new(error.to_string(), error.status_code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_message_is_actionable() {
        let err = ServiceError::CouponMinimumNotMet { minimum: 50_000, subtotal: 40_000 };
        let http: HttpError = err.into();
        assert_eq!(http.status, StatusCode::BAD_REQUEST);
        assert!(http.message.contains("Minimum order amount is 50000"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ServiceError::ConcurrencyConflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ServiceError::CouponExpired("FLASH".to_string()).status_code(),
            StatusCode::GONE
        );
        assert_eq!(
            ServiceError::InsufficientBalance { requested: 100, available: 23 }.status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
    }

    #[test]
    fn test_database_details_are_not_leaked() {
        let http: HttpError = ServiceError::Database(sqlx::Error::RowNotFound).into();
        assert_eq!(http.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!http.message.contains("RowNotFound"));
    }
}
