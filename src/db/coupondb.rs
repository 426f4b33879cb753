// db/coupondb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;

use super::db::DBClient;
use crate::models::couponmodel::{Coupon, NewCoupon};

#[async_trait]
pub trait CouponExt {
    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>, Error>;

    async fn create_coupon(&self, coupon: &NewCoupon, created_at: DateTime<Utc>) -> Result<Coupon, Error>;

    /// Counts one use only if the coupon is still active, unexpired and
    /// under its cap. Returns false when the guard rejected the increment.
    async fn increment_coupon_use(&self, code: &str, now: DateTime<Utc>) -> Result<bool, Error>;
}

#[async_trait]
impl CouponExt for DBClient {
    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>, Error> {
        sqlx::query_as::<_, Coupon>(
            r#"
            SELECT code, coupon_type, value, min_order_amount, max_uses,
                   current_uses, expires_at, is_active, created_at
            FROM coupons
            WHERE code = $1
            "#
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_coupon(&self, coupon: &NewCoupon, created_at: DateTime<Utc>) -> Result<Coupon, Error> {
        sqlx::query_as::<_, Coupon>(
            r#"
            INSERT INTO coupons (code, coupon_type, value, min_order_amount, max_uses, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING code, coupon_type, value, min_order_amount, max_uses,
                      current_uses, expires_at, is_active, created_at
            "#
        )
        .bind(&coupon.code)
        .bind(coupon.coupon_type)
        .bind(coupon.value)
        .bind(coupon.min_order_amount)
        .bind(coupon.max_uses)
        .bind(coupon.expires_at)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
    }

    async fn increment_coupon_use(&self, code: &str, now: DateTime<Utc>) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            UPDATE coupons
            SET current_uses = current_uses + 1
            WHERE code = $1
            AND is_active = TRUE
            AND (expires_at IS NULL OR expires_at >= $2)
            AND (max_uses IS NULL OR current_uses < max_uses)
            "#
        )
        .bind(code)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
