// service/coupon_service.rs
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::LoyaltyStore,
    models::couponmodel::{Coupon, CouponQuote, CouponType, NewCoupon},
    service::error::ServiceError,
    utils::clock::Clock,
};

#[derive(Debug, Clone)]
pub struct CouponService {
    store: Arc<dyn LoyaltyStore>,
    clock: Arc<dyn Clock>,
}

impl CouponService {
    pub fn new(store: Arc<dyn LoyaltyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn find(&self, code: &str) -> Result<Coupon, ServiceError> {
        let code = Coupon::normalize_code(code);
        self.store
            .get_coupon(&code)
            .await?
            .ok_or(ServiceError::CouponNotFound(code))
    }

    /// Read-only check used by the cart. Does not count a use.
    pub async fn validate(&self, code: &str, subtotal: i64) -> Result<CouponQuote, ServiceError> {
        if subtotal < 0 {
            return Err(ServiceError::Validation("Subtotal cannot be negative".to_string()));
        }
        let coupon = self.find(code).await?;
        coupon.quote(subtotal, self.clock.now())
    }

    /// Validates and counts one use. The counter update is conditional, so
    /// a capped coupon is never used more than `max_uses` times no matter
    /// how many checkouts race for the last use.
    pub async fn apply(
        &self,
        code: &str,
        subtotal: i64,
        account_id: Option<Uuid>,
    ) -> Result<CouponQuote, ServiceError> {
        let quote = self.validate(code, subtotal).await?;
        let now = self.clock.now();

        if !self.store.increment_coupon_use(&quote.code, now).await? {
            // lost the race: report the state that made the guard fail
            let coupon = self.find(&quote.code).await?;
            return Err(match coupon.quote(subtotal, now) {
                Err(e) => e,
                Ok(_) => ServiceError::CouponUsageLimitReached(quote.code),
            });
        }

        tracing::info!(
            "Coupon {} applied (discount {}) for account {:?}",
            quote.code,
            quote.discount,
            account_id
        );
        Ok(quote)
    }

    pub async fn create_coupon(&self, mut coupon: NewCoupon) -> Result<Coupon, ServiceError> {
        coupon.code = Coupon::normalize_code(&coupon.code);

        if coupon.code.is_empty() {
            return Err(ServiceError::Validation("Coupon code is required".to_string()));
        }
        if coupon.value < 0 || coupon.min_order_amount < 0 {
            return Err(ServiceError::Validation(
                "Coupon value and minimum order amount cannot be negative".to_string(),
            ));
        }
        if coupon.coupon_type == CouponType::Percentage && coupon.value > 100 {
            return Err(ServiceError::Validation(
                "Percentage coupons cannot exceed 100".to_string(),
            ));
        }
        if coupon.max_uses.map_or(false, |max_uses| max_uses <= 0) {
            return Err(ServiceError::Validation("max_uses must be positive".to_string()));
        }
        if self.store.get_coupon(&coupon.code).await?.is_some() {
            return Err(ServiceError::Validation(format!(
                "Coupon {} already exists",
                coupon.code
            )));
        }

        let created = self.store.create_coupon(&coupon, self.clock.now()).await?;
        tracing::info!("Created coupon {} ({:?})", created.code, created.coupon_type);
        Ok(created)
    }
}
