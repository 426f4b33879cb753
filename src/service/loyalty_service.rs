// service/loyalty_service.rs
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::LoyaltyRules,
    db::{
        cache::{CacheHelper, SUMMARY_CACHE_TTL},
        LoyaltyStore,
    },
    models::ledgermodel::*,
    service::{
        error::ServiceError,
        notification_service::{dispatch, LoyaltyEvent, Notifier},
    },
    utils::clock::Clock,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoyaltySummary {
    pub account_id: Uuid,
    pub balance: i64,
    pub lifetime_earned: i64,
    pub tier: Tier,
    pub next_tier: Option<Tier>,
    pub points_to_next_tier: Option<i64>,
    pub available_rewards: usize,
    pub orders_completed: i64,
}

impl LoyaltySummary {
    fn from_ledger(ledger: &AccountLedger, now: DateTime<Utc>) -> Self {
        LoyaltySummary {
            account_id: ledger.account_id,
            balance: ledger.balance,
            lifetime_earned: ledger.lifetime_earned,
            tier: ledger.tier(),
            next_tier: ledger.tier().next(),
            points_to_next_tier: ledger.points_to_next_tier(),
            available_rewards: ledger.available_rewards(now).len(),
            orders_completed: ledger.stats.orders_completed,
        }
    }
}

/// A committed mutation: what the operation produced and the ledger as stored.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub value: T,
    pub ledger: AccountLedger,
}

#[derive(Debug, Clone)]
pub struct DeliveredOrderOutcome {
    pub accrual: Appended,
    pub completed_challenges: Vec<Challenge>,
}

/// Last second of the calendar month containing `now` (UTC).
pub fn current_period_end(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };

    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .map(|next_month| next_month - Duration::seconds(1))
        .unwrap_or(now)
}

#[derive(Clone)]
pub struct LoyaltyService {
    store: Arc<dyn LoyaltyStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    rules: LoyaltyRules,
    cache: Option<Arc<ConnectionManager>>,
}

impl std::fmt::Debug for LoyaltyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoyaltyService")
            .field("store", &self.store)
            .field("rules", &self.rules)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

impl LoyaltyService {
    pub fn new(
        store: Arc<dyn LoyaltyStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        rules: LoyaltyRules,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            rules,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<Arc<ConnectionManager>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn rules(&self) -> &LoyaltyRules {
        &self.rules
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Loads the ledger, creating it with the welcome bonus on first access.
    pub async fn get_ledger(&self, account_id: Uuid) -> Result<AccountLedger, ServiceError> {
        if let Some(ledger) = self.store.get_ledger(account_id).await? {
            return Ok(ledger);
        }

        let ledger = AccountLedger::new(account_id, self.rules.welcome_bonus, self.clock.now());
        if self.store.insert_ledger(&ledger).await? {
            tracing::info!("Created loyalty ledger for account {}", account_id);
            let events = ledger
                .find_entry_by_key(WELCOME_BONUS_KEY)
                .map(|entry| LoyaltyEvent::BonusGranted { entry: entry.clone() })
                .into_iter()
                .collect();
            dispatch(self.notifier.clone(), account_id, events);
            return Ok(ledger);
        }

        // another request created it between our read and insert
        self.store
            .get_ledger(account_id)
            .await?
            .ok_or(ServiceError::ConcurrencyConflict)
    }

    /// Single entry point for every ledger change. `op` runs against a copy
    /// of the latest ledger; the copy is committed only if nobody else
    /// committed in between, otherwise the whole cycle is retried.
    pub async fn mutate<T, F>(&self, account_id: Uuid, op: F) -> Result<Committed<T>, ServiceError>
    where
        F: Fn(&mut AccountLedger, DateTime<Utc>) -> Result<T, ServiceError> + Send,
        T: Send,
    {
        for attempt in 1..=self.rules.max_commit_attempts {
            let current = self.get_ledger(account_id).await?;
            let now = self.clock.now();

            let mut next = current.clone();
            let value = op(&mut next, now)?;

            if next == current {
                return Ok(Committed { value, ledger: next });
            }

            let tier_before = current.tier();
            let promotions = next.issue_promotion_rewards(tier_before, now);
            next.version = current.version + 1;

            if self.store.save_ledger(&next, current.version).await? {
                self.invalidate_summary(account_id).await;

                let mut events = Vec::new();
                if next.tier() != tier_before {
                    tracing::info!(
                        "Account {} moved from {} to {} tier",
                        account_id,
                        tier_before.to_str(),
                        next.tier().to_str()
                    );
                    events.push(LoyaltyEvent::TierChanged { from: tier_before, to: next.tier() });
                }
                events.extend(promotions.into_iter().map(|reward| LoyaltyEvent::RewardIssued { reward }));
                dispatch(self.notifier.clone(), account_id, events);

                return Ok(Committed { value, ledger: next });
            }

            tracing::warn!(
                "Ledger write conflict for account {} (attempt {}/{})",
                account_id,
                attempt,
                self.rules.max_commit_attempts
            );
        }

        Err(ServiceError::ConcurrencyConflict)
    }

    async fn invalidate_summary(&self, account_id: Uuid) {
        if let Some(redis) = &self.cache {
            if let Err(e) = CacheHelper::delete(redis, &CacheHelper::summary_key(account_id)).await {
                tracing::warn!("Failed to invalidate loyalty summary for {}: {}", account_id, e);
            }
        }
    }

    // Points ledger

    pub async fn accrue_for_order(
        &self,
        account_id: Uuid,
        order_total: i64,
        order_id: &str,
    ) -> Result<Appended, ServiceError> {
        let rules = self.rules.clone();
        let committed = self
            .mutate(account_id, |ledger, now| {
                ledger.accrue_for_order(order_total, order_id, &rules, now)
            })
            .await?;

        if committed.value.applied {
            tracing::info!(
                "Accrued {} points for order {} to account {}",
                committed.value.entry.amount,
                order_id,
                account_id
            );
        } else {
            tracing::debug!("Order {} already accrued for account {}", order_id, account_id);
        }

        Ok(committed.value)
    }

    /// Accrual and challenge progress for one delivered order, committed together.
    pub async fn record_delivered_order(
        &self,
        account_id: Uuid,
        order_total: i64,
        order_id: &str,
        restaurant_id: Option<&str>,
    ) -> Result<DeliveredOrderOutcome, ServiceError> {
        let rules = self.rules.clone();
        let committed = self
            .mutate(account_id, |ledger, now| {
                let accrual = ledger.accrue_for_order(order_total, order_id, &rules, now)?;
                let completed = if accrual.applied {
                    ledger.record_order_progress(restaurant_id, now)?
                } else {
                    Vec::new()
                };
                Ok(DeliveredOrderOutcome {
                    accrual,
                    completed_challenges: completed.into_iter().map(|p| p.challenge).collect(),
                })
            })
            .await?;

        let outcome = committed.value;
        let events = outcome
            .completed_challenges
            .iter()
            .map(|challenge| LoyaltyEvent::ChallengeCompleted { challenge: challenge.clone() })
            .collect();
        dispatch(self.notifier.clone(), account_id, events);

        Ok(outcome)
    }

    pub async fn grant_bonus(
        &self,
        account_id: Uuid,
        amount: i64,
        reason: &str,
    ) -> Result<LedgerEntry, ServiceError> {
        self.grant_bonus_once(account_id, amount, reason, None)
            .await
            .map(|granted| granted.entry)
    }

    /// Bonus guarded by an idempotency key: a second call with the same key
    /// returns the original entry without granting again.
    pub async fn grant_bonus_once(
        &self,
        account_id: Uuid,
        amount: i64,
        reason: &str,
        idempotency_key: Option<&str>,
    ) -> Result<Appended, ServiceError> {
        let committed = self
            .mutate(account_id, |ledger, now| {
                ledger.grant_bonus(amount, reason, idempotency_key, now)
            })
            .await?;

        if committed.value.applied {
            tracing::info!("Granted {} bonus points to {}: {}", amount, account_id, reason);
            dispatch(
                self.notifier.clone(),
                account_id,
                vec![LoyaltyEvent::BonusGranted { entry: committed.value.entry.clone() }],
            );
        }

        Ok(committed.value)
    }

    pub async fn redeem(&self, account_id: Uuid, points: i64) -> Result<Reward, ServiceError> {
        let rules = self.rules.clone();
        let committed = self
            .mutate(account_id, |ledger, now| ledger.redeem(points, &rules, now))
            .await?;

        tracing::info!(
            "Account {} redeemed {} points for reward {}",
            account_id,
            points,
            committed.value.id
        );
        Ok(committed.value)
    }

    pub async fn get_balance(&self, account_id: Uuid) -> Result<i64, ServiceError> {
        Ok(self.get_ledger(account_id).await?.balance)
    }

    pub async fn get_tier(&self, account_id: Uuid) -> Result<Tier, ServiceError> {
        Ok(self.get_ledger(account_id).await?.tier())
    }

    pub async fn get_summary(&self, account_id: Uuid) -> Result<LoyaltySummary, ServiceError> {
        let key = CacheHelper::summary_key(account_id);
        if let Some(redis) = &self.cache {
            match CacheHelper::get::<LoyaltySummary>(redis, &key).await {
                Ok(Some(summary)) => return Ok(summary),
                Ok(None) => {}
                Err(e) => tracing::warn!("Summary cache read failed: {}", e),
            }
        }

        let ledger = self.get_ledger(account_id).await?;
        let summary = LoyaltySummary::from_ledger(&ledger, self.clock.now());

        if let Some(redis) = &self.cache {
            if let Err(e) = CacheHelper::set(redis, &key, &summary, SUMMARY_CACHE_TTL).await {
                tracing::warn!("Summary cache write failed: {}", e);
            }
        }

        Ok(summary)
    }

    /// Newest entries first.
    pub async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>, ServiceError> {
        let ledger = self.get_ledger(account_id).await?;
        Ok(ledger
            .transactions
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    // Rewards

    pub async fn issue_reward(&self, account_id: Uuid, spec: RewardSpec) -> Result<Reward, ServiceError> {
        if spec.value < 0 {
            return Err(ServiceError::Validation("Reward value cannot be negative".to_string()));
        }

        let committed = self
            .mutate(account_id, |ledger, now| Ok(ledger.issue_reward(spec.clone(), now)))
            .await?;

        dispatch(
            self.notifier.clone(),
            account_id,
            vec![LoyaltyEvent::RewardIssued { reward: committed.value.clone() }],
        );
        Ok(committed.value)
    }

    pub async fn consume_reward(&self, account_id: Uuid, reward_id: Uuid) -> Result<Reward, ServiceError> {
        let committed = self
            .mutate(account_id, |ledger, now| ledger.consume_reward(reward_id, now))
            .await?;

        tracing::info!("Account {} used reward {}", account_id, reward_id);
        Ok(committed.value)
    }

    pub async fn list_available_rewards(&self, account_id: Uuid) -> Result<Vec<Reward>, ServiceError> {
        let ledger = self.get_ledger(account_id).await?;
        Ok(ledger.available_rewards(self.clock.now()))
    }

    // Challenges

    pub async fn list_challenges(&self, account_id: Uuid) -> Result<Vec<Challenge>, ServiceError> {
        Ok(self.get_ledger(account_id).await?.challenges)
    }

    pub async fn assign_period_challenges(
        &self,
        account_id: Uuid,
        period_end: DateTime<Utc>,
    ) -> Result<Vec<Challenge>, ServiceError> {
        let committed = self
            .mutate(account_id, |ledger, now| {
                if period_end <= now {
                    return Err(ServiceError::Validation(
                        "Period end must be in the future".to_string(),
                    ));
                }
                Ok(ledger.assign_challenges(period_end, now))
            })
            .await?;

        if !committed.value.is_empty() {
            tracing::info!(
                "Assigned {} challenges to account {}",
                committed.value.len(),
                account_id
            );
        }
        Ok(committed.value)
    }

    pub async fn record_progress(
        &self,
        account_id: Uuid,
        challenge_id: Uuid,
        delta: i64,
    ) -> Result<Challenge, ServiceError> {
        let committed = self
            .mutate(account_id, |ledger, now| ledger.record_progress(challenge_id, delta, now))
            .await?;

        let progress = committed.value;
        if let Some(bonus) = &progress.bonus {
            tracing::info!(
                "Account {} completed challenge {} (+{} points)",
                account_id,
                progress.challenge.code,
                bonus.amount
            );
            dispatch(
                self.notifier.clone(),
                account_id,
                vec![LoyaltyEvent::ChallengeCompleted { challenge: progress.challenge.clone() }],
            );
        }
        Ok(progress.challenge)
    }

    /// Scheduler hook: drop finished challenges and hand out the next period.
    pub async fn reset_period(
        &self,
        account_id: Uuid,
        next_period_end: DateTime<Utc>,
    ) -> Result<Vec<Challenge>, ServiceError> {
        let committed = self
            .mutate(account_id, |ledger, now| {
                if next_period_end <= now {
                    return Err(ServiceError::Validation(
                        "Period end must be in the future".to_string(),
                    ));
                }
                let purged = ledger.purge_finished_challenges(now);
                Ok((purged, ledger.assign_challenges(next_period_end, now)))
            })
            .await?;

        let (purged, assigned) = committed.value;
        tracing::info!(
            "Reset challenges for account {}: {} purged, {} assigned",
            account_id,
            purged,
            assigned.len()
        );
        Ok(assigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::Harness;
    use futures::future::join_all;

    #[test]
    fn test_period_end_is_last_second_of_month() {
        let now = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
        assert_eq!(
            current_period_end(now),
            Utc.with_ymd_and_hms(2026, 2, 28, 23, 59, 59).unwrap()
        );

        let december = Utc.with_ymd_and_hms(2026, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(
            current_period_end(december),
            Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap()
        );
    }

    #[tokio::test]
    async fn test_oversized_bonus_is_a_validation_error() {
        let harness = Harness::without_welcome_bonus();
        let account = Uuid::new_v4();
        harness.loyalty.grant_bonus(account, i64::MAX - 200, "big").await.unwrap();

        let err = harness
            .loyalty
            .grant_bonus(account, i64::MAX - 200, "bigger")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(harness.loyalty.get_balance(account).await.unwrap(), i64::MAX - 200);
    }

    #[tokio::test]
    async fn test_ledger_is_created_lazily_with_welcome_bonus() {
        let harness = Harness::new();
        let account = Uuid::new_v4();

        assert_eq!(harness.loyalty.get_balance(account).await.unwrap(), 100);
        // a second read does not grant the welcome bonus again
        assert_eq!(harness.loyalty.get_balance(account).await.unwrap(), 100);
        let ledger = harness.loyalty.get_ledger(account).await.unwrap();
        assert_eq!(ledger.transactions.len(), 1);
    }

    #[tokio::test]
    async fn test_example_redemption_scenario() {
        let harness = Harness::without_welcome_bonus();
        let loyalty = &harness.loyalty;
        let account = Uuid::new_v4();

        assert_eq!(loyalty.get_balance(account).await.unwrap(), 0);
        let entry = loyalty.accrue_for_order(account, 235, "ORD1").await.unwrap();
        assert_eq!(entry.entry.amount, 23);
        assert_eq!(loyalty.get_balance(account).await.unwrap(), 23);

        let err = loyalty.redeem(account, 100).await.unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientBalance { .. }));

        loyalty.accrue_for_order(account, 500, "ORD2").await.unwrap();
        loyalty.accrue_for_order(account, 400, "ORD3").await.unwrap();
        loyalty.accrue_for_order(account, 370, "ORD4").await.unwrap();
        assert_eq!(loyalty.get_balance(account).await.unwrap(), 150);

        let reward = loyalty.redeem(account, 100).await.unwrap();
        assert_eq!(reward.value, 10);
        assert_eq!(loyalty.get_balance(account).await.unwrap(), 50);

        let available = loyalty.list_available_rewards(account).await.unwrap();
        assert_eq!(available.len(), 1);
        let consumed = loyalty.consume_reward(account, reward.id).await.unwrap();
        assert!(consumed.used);
        assert!(loyalty.list_available_rewards(account).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_accruals_apply_once() {
        let harness = Harness::without_welcome_bonus();
        let account = Uuid::new_v4();
        harness.loyalty.get_ledger(account).await.unwrap();

        let calls = (0..8).map(|_| {
            let loyalty = harness.loyalty.clone();
            tokio::spawn(async move { loyalty.accrue_for_order(account, 1_000, "ORD-DUP").await })
        });
        let results = join_all(calls).await;

        let applied = results
            .into_iter()
            .map(|joined| joined.unwrap())
            .filter(|r| matches!(r, Ok(a) if a.applied))
            .count();
        assert_eq!(applied, 1);

        let ledger = harness.loyalty.get_ledger(account).await.unwrap();
        assert_eq!(ledger.balance, 100);
        assert_eq!(ledger.transactions.len(), 1);
        assert!(ledger.verify_totals());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_redemptions_never_overdraw() {
        let harness = Harness::without_welcome_bonus();
        let account = Uuid::new_v4();
        harness.loyalty.accrue_for_order(account, 3_000, "ORD-A").await.unwrap();

        let calls = (0..6).map(|_| {
            let loyalty = harness.loyalty.clone();
            tokio::spawn(async move { loyalty.redeem(account, 100).await })
        });
        let results: Vec<_> = join_all(calls)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(succeeded, 3);
        for result in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(
                result,
                ServiceError::InsufficientBalance { .. } | ServiceError::ConcurrencyConflict
            ));
        }

        let ledger = harness.loyalty.get_ledger(account).await.unwrap();
        assert_eq!(ledger.balance, 0);
        assert!(ledger.verify_totals());
    }

    #[tokio::test]
    async fn test_tier_promotion_issues_reward() {
        let harness = Harness::without_welcome_bonus();
        let account = Uuid::new_v4();

        harness.loyalty.accrue_for_order(account, 10_000, "BIG").await.unwrap();
        assert_eq!(harness.loyalty.get_tier(account).await.unwrap(), Tier::Silver);

        let rewards = harness.loyalty.list_available_rewards(account).await.unwrap();
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].source, RewardSource::TierPromotion);
        assert_eq!(rewards[0].value, 20);

        harness.settle().await;
        let kinds = harness.notified_kinds().await;
        assert!(kinds.contains(&"tier_changed".to_string()));
        assert!(kinds.contains(&"reward_issued".to_string()));
    }

    #[tokio::test]
    async fn test_reward_expires_with_clock() {
        let harness = Harness::without_welcome_bonus();
        let account = Uuid::new_v4();
        harness.loyalty.grant_bonus(account, 200, "Goodwill").await.unwrap();
        let reward = harness.loyalty.redeem(account, 200).await.unwrap();

        harness.clock.advance(Duration::days(31));
        assert!(harness.loyalty.list_available_rewards(account).await.unwrap().is_empty());
        let err = harness.loyalty.consume_reward(account, reward.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::RewardExpired(_)));
    }

    #[tokio::test]
    async fn test_bonus_requires_positive_amount() {
        let harness = Harness::new();
        let err = harness.loyalty.grant_bonus(Uuid::new_v4(), 0, "Nothing").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_challenge_period_lifecycle() {
        let harness = Harness::without_welcome_bonus();
        let loyalty = &harness.loyalty;
        let account = Uuid::new_v4();
        let period_end = current_period_end(loyalty.now());

        let assigned = loyalty.assign_period_challenges(account, period_end).await.unwrap();
        assert_eq!(assigned.len(), CHALLENGE_CATALOG.len());
        assert!(loyalty.assign_period_challenges(account, period_end).await.unwrap().is_empty());

        let five = assigned.iter().find(|c| c.code == "orders_5").unwrap();
        let challenge = loyalty.record_progress(account, five.id, 5).await.unwrap();
        assert!(challenge.completed);
        loyalty.record_progress(account, five.id, 1).await.unwrap();
        assert_eq!(loyalty.get_balance(account).await.unwrap(), 100);

        let next_end = period_end + Duration::days(30);
        let reassigned = loyalty.reset_period(account, next_end).await.unwrap();
        assert_eq!(reassigned.len(), 1);
        assert_eq!(reassigned[0].code, "orders_5");
        assert_eq!(loyalty.list_challenges(account).await.unwrap().len(), CHALLENGE_CATALOG.len());
    }

    #[tokio::test]
    async fn test_delivered_order_advances_challenges_once() {
        let harness = Harness::without_welcome_bonus();
        let loyalty = &harness.loyalty;
        let account = Uuid::new_v4();
        loyalty
            .assign_period_challenges(account, current_period_end(loyalty.now()))
            .await
            .unwrap();

        loyalty.record_delivered_order(account, 100, "O1", Some("r1")).await.unwrap();
        // a replayed delivery event must not count twice
        loyalty.record_delivered_order(account, 100, "O1", Some("r1")).await.unwrap();

        let challenges = loyalty.list_challenges(account).await.unwrap();
        let orders = challenges.iter().find(|c| c.code == "orders_5").unwrap();
        assert_eq!(orders.progress, 1);
    }

    #[tokio::test]
    async fn test_transactions_are_listed_newest_first() {
        let harness = Harness::new();
        let account = Uuid::new_v4();
        harness.loyalty.accrue_for_order(account, 100, "O1").await.unwrap();
        harness.loyalty.accrue_for_order(account, 200, "O2").await.unwrap();

        let page = harness.loyalty.list_transactions(account, 2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].related_order_id.as_deref(), Some("O2"));
        let rest = harness.loyalty.list_transactions(account, 10, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].entry_type, EntryType::Bonus);
    }
}
