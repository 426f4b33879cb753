// db/memory.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{coupondb::CouponExt, loyaltydb::LedgerExt, referraldb::ReferralExt};
use crate::models::{
    couponmodel::{Coupon, NewCoupon},
    ledgermodel::AccountLedger,
    referralmodel::{Referral, ReferralCode},
};

/// In-process store used when no DATABASE_URL is configured and by the
/// test suites. One mutex guards everything, so each conditional write is
/// trivially atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    ledgers: HashMap<Uuid, AccountLedger>,
    codes: HashMap<Uuid, ReferralCode>,
    referrals: HashMap<Uuid, Referral>,
    coupons: HashMap<String, Coupon>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerExt for MemoryStore {
    async fn get_ledger(&self, account_id: Uuid) -> Result<Option<AccountLedger>, Error> {
        Ok(self.state.lock().await.ledgers.get(&account_id).cloned())
    }

    async fn insert_ledger(&self, ledger: &AccountLedger) -> Result<bool, Error> {
        let mut state = self.state.lock().await;
        if state.ledgers.contains_key(&ledger.account_id) {
            return Ok(false);
        }
        state.ledgers.insert(ledger.account_id, ledger.clone());
        Ok(true)
    }

    async fn save_ledger(&self, ledger: &AccountLedger, expected_version: i64) -> Result<bool, Error> {
        let mut state = self.state.lock().await;
        match state.ledgers.get_mut(&ledger.account_id) {
            Some(stored) if stored.version == expected_version && ledger.balance >= 0 => {
                *stored = ledger.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ReferralExt for MemoryStore {
    async fn get_referral_code(&self, account_id: Uuid) -> Result<Option<ReferralCode>, Error> {
        Ok(self.state.lock().await.codes.get(&account_id).cloned())
    }

    async fn insert_referral_code(
        &self,
        account_id: Uuid,
        code: &str,
        created_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let mut state = self.state.lock().await;
        let taken = state.codes.values().any(|c| c.code == code);
        if taken || state.codes.contains_key(&account_id) {
            return Ok(false);
        }
        state.codes.insert(
            account_id,
            ReferralCode {
                account_id,
                code: code.to_string(),
                created_at,
            },
        );
        Ok(true)
    }

    async fn find_account_by_code(&self, code: &str) -> Result<Option<Uuid>, Error> {
        Ok(self
            .state
            .lock()
            .await
            .codes
            .values()
            .find(|c| c.code == code)
            .map(|c| c.account_id))
    }

    async fn get_referral_by_referee(&self, referee_id: Uuid) -> Result<Option<Referral>, Error> {
        Ok(self.state.lock().await.referrals.get(&referee_id).cloned())
    }

    async fn create_referral(
        &self,
        referrer_id: Uuid,
        referee_id: Uuid,
        code: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Option<Referral>, Error> {
        let mut state = self.state.lock().await;
        if state.referrals.contains_key(&referee_id) {
            return Ok(None);
        }
        let referral = Referral {
            referrer_id,
            referee_id,
            code: code.to_string(),
            completed_first_order: false,
            points_awarded: 0,
            created_at,
            completed_at: None,
        };
        state.referrals.insert(referee_id, referral.clone());
        Ok(Some(referral))
    }

    async fn mark_first_order_completed(
        &self,
        referee_id: Uuid,
        points_awarded: i64,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let mut state = self.state.lock().await;
        match state.referrals.get_mut(&referee_id) {
            Some(referral) if !referral.completed_first_order => {
                referral.completed_first_order = true;
                referral.points_awarded = points_awarded;
                referral.completed_at = Some(completed_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_referrals_by_referrer(&self, referrer_id: Uuid) -> Result<Vec<Referral>, Error> {
        let state = self.state.lock().await;
        let mut referrals: Vec<Referral> = state
            .referrals
            .values()
            .filter(|r| r.referrer_id == referrer_id)
            .cloned()
            .collect();
        referrals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(referrals)
    }
}

#[async_trait]
impl CouponExt for MemoryStore {
    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>, Error> {
        Ok(self.state.lock().await.coupons.get(code).cloned())
    }

    async fn create_coupon(&self, coupon: &NewCoupon, created_at: DateTime<Utc>) -> Result<Coupon, Error> {
        let mut state = self.state.lock().await;
        if state.coupons.contains_key(&coupon.code) {
            return Err(Error::Protocol(format!("coupon {} already exists", coupon.code)));
        }
        let stored = Coupon {
            code: coupon.code.clone(),
            coupon_type: coupon.coupon_type,
            value: coupon.value,
            min_order_amount: coupon.min_order_amount,
            max_uses: coupon.max_uses,
            current_uses: 0,
            expires_at: coupon.expires_at,
            is_active: true,
            created_at,
        };
        state.coupons.insert(stored.code.clone(), stored.clone());
        Ok(stored)
    }

    async fn increment_coupon_use(&self, code: &str, now: DateTime<Utc>) -> Result<bool, Error> {
        let mut state = self.state.lock().await;
        match state.coupons.get_mut(code) {
            Some(coupon)
                if coupon.is_active
                    && coupon.expires_at.map_or(true, |expires_at| expires_at >= now)
                    && !coupon.usage_exhausted() =>
            {
                coupon.current_uses += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_rejects_stale_version() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let ledger = AccountLedger::new(Uuid::new_v4(), 100, now);
        assert!(store.insert_ledger(&ledger).await.unwrap());
        assert!(!store.insert_ledger(&ledger).await.unwrap());

        let mut next = ledger.clone();
        next.version = 1;
        assert!(store.save_ledger(&next, 0).await.unwrap());
        // a second writer still holding version 0 loses
        assert!(!store.save_ledger(&next, 0).await.unwrap());

        let stored = store.get_ledger(ledger.account_id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_referral_edge_binds_once() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let (referrer, referee) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(store.create_referral(referrer, referee, "ABCD1234", now).await.unwrap().is_some());
        assert!(store.create_referral(Uuid::new_v4(), referee, "ZZZZ9999", now).await.unwrap().is_none());

        let edge = store.get_referral_by_referee(referee).await.unwrap().unwrap();
        assert_eq!(edge.referrer_id, referrer);
        assert!(store.mark_first_order_completed(referee, 50, now).await.unwrap());
        assert!(!store.mark_first_order_completed(referee, 50, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_referral_codes_are_unique() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(store.insert_referral_code(a, "CODE0001", now).await.unwrap());
        assert!(!store.insert_referral_code(b, "CODE0001", now).await.unwrap());
        assert!(!store.insert_referral_code(a, "CODE0002", now).await.unwrap());
        assert_eq!(store.find_account_by_code("CODE0001").await.unwrap(), Some(a));
    }
}
