// models/couponmodel.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::service::error::ServiceError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "coupon_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CouponType {
    Percentage,
    FixedAmount,
    FreeProduct,
    #[serde(rename = "2x1", alias = "two_for_one")]
    TwoForOne,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Coupon {
    pub code: String,
    pub coupon_type: CouponType,
    pub value: i64,
    pub min_order_amount: i64,
    pub max_uses: Option<i64>,
    pub current_uses: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCoupon {
    pub code: String,
    pub coupon_type: CouponType,
    pub value: i64,
    pub min_order_amount: i64,
    pub max_uses: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// What checkout gets back from a valid coupon. Line-level coupons
/// (free product, 2x1) carry no flat discount; order pricing applies them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CouponQuote {
    pub code: String,
    pub coupon_type: CouponType,
    pub discount: i64,
    pub requires_line_pricing: bool,
}

impl Coupon {
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }

    pub fn usage_exhausted(&self) -> bool {
        self.max_uses
            .map_or(false, |max_uses| self.current_uses >= max_uses)
    }

    /// Checks run in a fixed order and the first failure wins: active flag,
    /// expiry, usage cap, minimum order amount.
    pub fn quote(&self, subtotal: i64, now: DateTime<Utc>) -> Result<CouponQuote, ServiceError> {
        if !self.is_active {
            return Err(ServiceError::CouponNotFound(self.code.clone()));
        }
        if self.expires_at.map_or(false, |expires_at| now > expires_at) {
            return Err(ServiceError::CouponExpired(self.code.clone()));
        }
        if self.usage_exhausted() {
            return Err(ServiceError::CouponUsageLimitReached(self.code.clone()));
        }
        if subtotal < self.min_order_amount {
            return Err(ServiceError::CouponMinimumNotMet {
                minimum: self.min_order_amount,
                subtotal,
            });
        }

        let (discount, requires_line_pricing) = match self.coupon_type {
            CouponType::Percentage => {
                let discount = i128::from(subtotal) * i128::from(self.value) / 100;
                let discount = i64::try_from(discount).map_err(|_| {
                    ServiceError::Validation("Subtotal is too large for this coupon".to_string())
                })?;
                (discount, false)
            }
            CouponType::FixedAmount => (self.value.min(subtotal), false),
            CouponType::FreeProduct | CouponType::TwoForOne => (0, true),
        };

        Ok(CouponQuote {
            code: self.code.clone(),
            coupon_type: self.coupon_type,
            discount,
            requires_line_pricing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(coupon_type: CouponType, value: i64, min_order_amount: i64) -> Coupon {
        Coupon {
            code: "SAVE10".to_string(),
            coupon_type,
            value,
            min_order_amount,
            max_uses: None,
            current_uses: 0,
            expires_at: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_percentage_coupon_scenario() {
        let now = Utc::now();
        let save10 = coupon(CouponType::Percentage, 10, 50_000);

        let err = save10.quote(40_000, now).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::CouponMinimumNotMet { minimum: 50_000, subtotal: 40_000 }
        ));

        let quote = save10.quote(60_000, now).unwrap();
        assert_eq!(quote.discount, 6_000);
        assert!(!quote.requires_line_pricing);
    }

    #[test]
    fn test_percentage_of_huge_subtotal_does_not_overflow() {
        let now = Utc::now();
        let half = coupon(CouponType::Percentage, 50, 0);
        let quote = half.quote(i64::MAX / 10, now).unwrap();
        assert_eq!(quote.discount, i64::MAX / 20);

        let full = coupon(CouponType::Percentage, 100, 0);
        assert_eq!(full.quote(i64::MAX, now).unwrap().discount, i64::MAX);
    }

    #[test]
    fn test_fixed_amount_is_capped_by_subtotal() {
        let now = Utc::now();
        let fixed = coupon(CouponType::FixedAmount, 5_000, 0);
        assert_eq!(fixed.quote(3_000, now).unwrap().discount, 3_000);
        assert_eq!(fixed.quote(8_000, now).unwrap().discount, 5_000);
    }

    #[test]
    fn test_line_level_coupons_defer_to_order_pricing() {
        let now = Utc::now();
        let quote = coupon(CouponType::TwoForOne, 0, 0).quote(10_000, now).unwrap();
        assert_eq!(quote.discount, 0);
        assert!(quote.requires_line_pricing);
    }

    #[test]
    fn test_failure_order_is_fixed() {
        let now = Utc::now();
        let mut c = coupon(CouponType::Percentage, 10, 50_000);
        c.expires_at = Some(now - Duration::days(1));
        c.max_uses = Some(1);
        c.current_uses = 1;

        // expiry is reported before usage cap and minimum
        assert!(matches!(c.quote(10, now), Err(ServiceError::CouponExpired(_))));

        c.expires_at = None;
        assert!(matches!(
            c.quote(10, now),
            Err(ServiceError::CouponUsageLimitReached(_))
        ));

        c.is_active = false;
        assert!(matches!(c.quote(10, now), Err(ServiceError::CouponNotFound(_))));
    }

    #[test]
    fn test_two_for_one_serializes_as_2x1() {
        let json = serde_json::to_string(&CouponType::TwoForOne).unwrap();
        assert_eq!(json, "\"2x1\"");
        let parsed: CouponType = serde_json::from_str("\"fixed_amount\"").unwrap();
        assert_eq!(parsed, CouponType::FixedAmount);
    }
}
