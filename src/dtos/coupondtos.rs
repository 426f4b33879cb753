// dtos/coupondtos.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::couponmodel::{CouponType, NewCoupon};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ValidateCouponDto {
    #[validate(length(min = 1, message = "Coupon code is required"))]
    pub code: String,

    #[validate(range(min = 0, max = 1000000000000, message = "Subtotal must be between 0 and 1000000000000"))]
    pub subtotal: i64,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ApplyCouponDto {
    #[validate(length(min = 1, message = "Coupon code is required"))]
    pub code: String,

    #[validate(range(min = 0, max = 1000000000000, message = "Subtotal must be between 0 and 1000000000000"))]
    pub subtotal: i64,

    pub account_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateCouponDto {
    #[validate(length(min = 3, max = 32, message = "Coupon code must be between 3 and 32 characters"))]
    pub code: String,

    pub coupon_type: CouponType,

    #[validate(range(min = 0, message = "Coupon value cannot be negative"))]
    pub value: i64,

    #[serde(default)]
    #[validate(range(min = 0, message = "Minimum order amount cannot be negative"))]
    pub min_order_amount: i64,

    #[validate(range(min = 1, message = "max_uses must be positive"))]
    pub max_uses: Option<i64>,

    pub expires_at: Option<DateTime<Utc>>,
}

impl From<CreateCouponDto> for NewCoupon {
    fn from(dto: CreateCouponDto) -> Self {
        NewCoupon {
            code: dto.code,
            coupon_type: dto.coupon_type,
            value: dto.value,
            min_order_amount: dto.min_order_amount,
            max_uses: dto.max_uses,
            expires_at: dto.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtotal_is_bounded() {
        let dto = ValidateCouponDto {
            code: "SAVE10".to_string(),
            subtotal: i64::MAX / 10,
        };
        assert!(dto.validate().is_err());

        let dto = ApplyCouponDto {
            code: "SAVE10".to_string(),
            subtotal: 60_000,
            account_id: None,
        };
        assert!(dto.validate().is_ok());
    }
}
