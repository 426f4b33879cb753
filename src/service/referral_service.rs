// service/referral_service.rs
use std::sync::Arc;

use rand::{distr::Alphanumeric, Rng};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::LoyaltyStore,
    models::referralmodel::{ReferralStats, ReferralUser, Referral, ReferrerInfo},
    service::{error::ServiceError, loyalty_service::LoyaltyService},
};

const REFERRAL_CODE_LENGTH: usize = 8;
const CODE_GENERATION_ATTEMPTS: usize = 5;

pub fn generate_referral_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(REFERRAL_CODE_LENGTH)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

pub fn generate_referral_link(base_url: &str, code: &str) -> String {
    format!("{}/register?ref={}", base_url.trim_end_matches('/'), code)
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralLink {
    pub code: String,
    pub link: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralStatus {
    pub was_referred: bool,
    pub referral: Option<Referral>,
}

#[derive(Debug, Clone)]
pub struct ReferralService {
    store: Arc<dyn LoyaltyStore>,
    loyalty: Arc<LoyaltyService>,
    app_url: String,
}

impl ReferralService {
    pub fn new(store: Arc<dyn LoyaltyStore>, loyalty: Arc<LoyaltyService>, app_url: String) -> Self {
        Self {
            store,
            loyalty,
            app_url,
        }
    }

    /// Returns the account's code, generating one on first request.
    pub async fn referral_code(&self, account_id: Uuid) -> Result<ReferralLink, ServiceError> {
        if let Some(existing) = self.store.get_referral_code(account_id).await? {
            return Ok(self.link_for(existing.code));
        }

        for _ in 0..CODE_GENERATION_ATTEMPTS {
            let code = generate_referral_code();
            if self
                .store
                .insert_referral_code(account_id, &code, self.loyalty.now())
                .await?
            {
                tracing::info!("Generated referral code for account {}", account_id);
                return Ok(self.link_for(code));
            }

            // either a collision or a concurrent request already stored one
            if let Some(existing) = self.store.get_referral_code(account_id).await? {
                return Ok(self.link_for(existing.code));
            }
        }

        Err(ServiceError::Other(
            "Could not generate a unique referral code".to_string(),
        ))
    }

    fn link_for(&self, code: String) -> ReferralLink {
        ReferralLink {
            link: generate_referral_link(&self.app_url, &code),
            code,
        }
    }

    pub async fn apply_code(&self, referee_id: Uuid, code: &str) -> Result<ReferrerInfo, ServiceError> {
        if self.store.get_referral_by_referee(referee_id).await?.is_some() {
            return Err(ServiceError::AlreadyReferred);
        }

        let code = code.trim().to_uppercase();
        if code.is_empty() {
            return Err(ServiceError::InvalidCode(code));
        }

        let own_code = self.store.get_referral_code(referee_id).await?;
        if own_code.map_or(false, |own| own.code == code) {
            return Err(ServiceError::SelfReferral);
        }

        let referrer_id = self
            .store
            .find_account_by_code(&code)
            .await?
            .ok_or_else(|| ServiceError::InvalidCode(code.clone()))?;

        if referrer_id == referee_id {
            return Err(ServiceError::SelfReferral);
        }

        // unique referee insert, a concurrent bind loses here
        let referral = self
            .store
            .create_referral(referrer_id, referee_id, &code, self.loyalty.now())
            .await?
            .ok_or(ServiceError::AlreadyReferred)?;

        tracing::info!("Account {} referred by {}", referee_id, referrer_id);

        Ok(ReferrerInfo {
            referrer_id: referral.referrer_id,
            code: referral.code,
            referred_at: referral.created_at,
        })
    }

    /// Grants the first-order bonus to both parties. Safe to call any number
    /// of times: the bonuses carry idempotency keys and the completion flag
    /// is flipped with a conditional update. Returns true only on the call
    /// that completed the referral.
    pub async fn process_first_order_reward(
        &self,
        referee_id: Uuid,
        order_id: &str,
    ) -> Result<bool, ServiceError> {
        let referral = match self.store.get_referral_by_referee(referee_id).await? {
            Some(referral) => referral,
            None => return Ok(false),
        };

        if referral.completed_first_order {
            tracing::debug!("Referral for {} already completed", referee_id);
            return Ok(false);
        }

        let delivered_orders = self
            .loyalty
            .get_ledger(referee_id)
            .await?
            .stats
            .orders_completed;
        if delivered_orders != 1 {
            tracing::debug!(
                "Order {} is not the first delivered order of {} ({} delivered)",
                order_id,
                referee_id,
                delivered_orders
            );
            return Ok(false);
        }

        let bonus = self.loyalty.rules().referral_bonus;
        self.loyalty
            .grant_bonus_once(
                referee_id,
                bonus,
                "Referral bonus for your first order",
                Some(&format!("referral:referee:{}", referee_id)),
            )
            .await?;
        self.loyalty
            .grant_bonus_once(
                referral.referrer_id,
                bonus,
                "Referral bonus: your friend completed their first order",
                Some(&format!("referral:referrer:{}", referee_id)),
            )
            .await?;

        let completed = self
            .store
            .mark_first_order_completed(referee_id, bonus, self.loyalty.now())
            .await?;

        if completed {
            tracing::info!(
                "Referral completed: {} and {} each received {} points (order {})",
                referee_id,
                referral.referrer_id,
                bonus,
                order_id
            );
        }
        Ok(completed)
    }

    pub async fn referral_stats(&self, referrer_id: Uuid) -> Result<ReferralStats, ServiceError> {
        let referrals = self.store.get_referrals_by_referrer(referrer_id).await?;

        let completed: Vec<&Referral> = referrals
            .iter()
            .filter(|r| r.completed_first_order)
            .collect();

        Ok(ReferralStats {
            total_referrals: referrals.len() as i64,
            completed_referrals: completed.len() as i64,
            total_points_earned: completed.iter().map(|r| r.points_awarded).sum(),
            referrals: referrals
                .iter()
                .map(|r| ReferralUser {
                    account_id: r.referee_id,
                    completed_first_order: r.completed_first_order,
                    joined_at: r.created_at,
                })
                .collect(),
        })
    }

    pub async fn referral_status(&self, referee_id: Uuid) -> Result<ReferralStatus, ServiceError> {
        let referral = self.store.get_referral_by_referee(referee_id).await?;
        Ok(ReferralStatus {
            was_referred: referral.is_some(),
            referral,
        })
    }
}
