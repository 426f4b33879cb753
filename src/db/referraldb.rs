// db/referraldb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::referralmodel::{Referral, ReferralCode};

#[async_trait]
pub trait ReferralExt {
    async fn get_referral_code(&self, account_id: Uuid) -> Result<Option<ReferralCode>, Error>;

    /// Returns false if the account already owns a code or the code is taken.
    async fn insert_referral_code(
        &self,
        account_id: Uuid,
        code: &str,
        created_at: DateTime<Utc>,
    ) -> Result<bool, Error>;

    async fn find_account_by_code(&self, code: &str) -> Result<Option<Uuid>, Error>;

    async fn get_referral_by_referee(&self, referee_id: Uuid) -> Result<Option<Referral>, Error>;

    /// Binds `referee_id` to `referrer_id`. Returns `None` when the referee
    /// already has a referrer, leaving the existing edge untouched.
    async fn create_referral(
        &self,
        referrer_id: Uuid,
        referee_id: Uuid,
        code: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Option<Referral>, Error>;

    /// Flips `completed_first_order` to true. Returns false if it already was.
    async fn mark_first_order_completed(
        &self,
        referee_id: Uuid,
        points_awarded: i64,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, Error>;

    async fn get_referrals_by_referrer(&self, referrer_id: Uuid) -> Result<Vec<Referral>, Error>;
}

#[async_trait]
impl ReferralExt for DBClient {
    async fn get_referral_code(&self, account_id: Uuid) -> Result<Option<ReferralCode>, Error> {
        sqlx::query_as::<_, ReferralCode>(
            r#"
            SELECT account_id, code, created_at
            FROM referral_codes
            WHERE account_id = $1
            "#
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn insert_referral_code(
        &self,
        account_id: Uuid,
        code: &str,
        created_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO referral_codes (account_id, code, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#
        )
        .bind(account_id)
        .bind(code)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_account_by_code(&self, code: &str) -> Result<Option<Uuid>, Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT account_id FROM referral_codes WHERE code = $1"
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_referral_by_referee(&self, referee_id: Uuid) -> Result<Option<Referral>, Error> {
        sqlx::query_as::<_, Referral>(
            r#"
            SELECT referrer_id, referee_id, code, completed_first_order,
                   points_awarded, created_at, completed_at
            FROM referrals
            WHERE referee_id = $1
            "#
        )
        .bind(referee_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_referral(
        &self,
        referrer_id: Uuid,
        referee_id: Uuid,
        code: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Option<Referral>, Error> {
        sqlx::query_as::<_, Referral>(
            r#"
            INSERT INTO referrals (referrer_id, referee_id, code, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (referee_id) DO NOTHING
            RETURNING referrer_id, referee_id, code, completed_first_order,
                      points_awarded, created_at, completed_at
            "#
        )
        .bind(referrer_id)
        .bind(referee_id)
        .bind(code)
        .bind(created_at)
        .fetch_optional(&self.pool)
        .await
    }

    async fn mark_first_order_completed(
        &self,
        referee_id: Uuid,
        points_awarded: i64,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            UPDATE referrals
            SET completed_first_order = TRUE,
                points_awarded = $2,
                completed_at = $3
            WHERE referee_id = $1
            AND completed_first_order = FALSE
            "#
        )
        .bind(referee_id)
        .bind(points_awarded)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_referrals_by_referrer(&self, referrer_id: Uuid) -> Result<Vec<Referral>, Error> {
        sqlx::query_as::<_, Referral>(
            r#"
            SELECT referrer_id, referee_id, code, completed_first_order,
                   points_awarded, created_at, completed_at
            FROM referrals
            WHERE referrer_id = $1
            ORDER BY created_at DESC
            "#
        )
        .bind(referrer_id)
        .fetch_all(&self.pool)
        .await
    }
}
