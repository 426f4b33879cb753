// db/loyaltydb.rs
use async_trait::async_trait;
use sqlx::{types::Json, Error, Row};
use uuid::Uuid;

use super::db::DBClient;
use crate::models::ledgermodel::AccountLedger;

/// Versioned storage for account ledgers. Every write is conditional so
/// two writers can never both commit against the same version.
#[async_trait]
pub trait LedgerExt {
    async fn get_ledger(&self, account_id: Uuid) -> Result<Option<AccountLedger>, Error>;

    /// Creates the ledger if the account has none yet. Returns false when
    /// another writer created it first.
    async fn insert_ledger(&self, ledger: &AccountLedger) -> Result<bool, Error>;

    /// Stores `ledger` only if the persisted version still equals
    /// `expected_version`. Returns false on a lost race.
    async fn save_ledger(&self, ledger: &AccountLedger, expected_version: i64) -> Result<bool, Error>;
}

#[async_trait]
impl LedgerExt for DBClient {
    async fn get_ledger(&self, account_id: Uuid) -> Result<Option<AccountLedger>, Error> {
        let row = sqlx::query(
            r#"
            SELECT version, document
            FROM loyalty_ledgers
            WHERE account_id = $1
            "#
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let Json(mut ledger): Json<AccountLedger> = row.try_get("document")?;
                ledger.version = row.try_get::<i64, _>("version")?;
                Ok(Some(ledger))
            }
            None => Ok(None),
        }
    }

    async fn insert_ledger(&self, ledger: &AccountLedger) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO loyalty_ledgers (account_id, version, balance, lifetime_earned, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (account_id) DO NOTHING
            "#
        )
        .bind(ledger.account_id)
        .bind(ledger.version)
        .bind(ledger.balance)
        .bind(ledger.lifetime_earned)
        .bind(Json(ledger))
        .bind(ledger.created_at)
        .bind(ledger.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn save_ledger(&self, ledger: &AccountLedger, expected_version: i64) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            UPDATE loyalty_ledgers
            SET version = $3,
                balance = $4,
                lifetime_earned = $5,
                document = $6,
                updated_at = $7
            WHERE account_id = $1
            AND version = $2
            AND $4 >= 0
            "#
        )
        .bind(ledger.account_id)
        .bind(expected_version)
        .bind(ledger.version)
        .bind(ledger.balance)
        .bind(ledger.lifetime_earned)
        .bind(Json(ledger))
        .bind(ledger.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
