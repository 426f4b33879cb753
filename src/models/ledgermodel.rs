// models/ledgermodel.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::LoyaltyRules, service::error::ServiceError};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Bronze, Tier::Silver, Tier::Gold, Tier::Platinum];

    /// Lifetime points needed to hold this tier.
    pub fn threshold(self) -> i64 {
        match self {
            Tier::Bronze => 0,
            Tier::Silver => 1000,
            Tier::Gold => 3000,
            Tier::Platinum => 6000,
        }
    }

    /// The only place tiers are derived from points.
    pub fn for_points(lifetime_earned: i64) -> Tier {
        Tier::ALL
            .iter()
            .rev()
            .copied()
            .find(|tier| lifetime_earned >= tier.threshold())
            .unwrap_or(Tier::Bronze)
    }

    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Bronze => Some(Tier::Silver),
            Tier::Silver => Some(Tier::Gold),
            Tier::Gold => Some(Tier::Platinum),
            Tier::Platinum => None,
        }
    }

    /// Discount value handed out once when an account first reaches the tier.
    pub fn promotion_reward_value(self) -> Option<i64> {
        match self {
            Tier::Bronze => None,
            Tier::Silver => Some(20),
            Tier::Gold => Some(50),
            Tier::Platinum => Some(100),
        }
    }

    pub fn to_str(&self) -> &str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
            Tier::Platinum => "platinum",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Earn,
    Bonus,
    Redeem,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub entry_type: EntryType,
    pub amount: i64,
    pub reason: String,
    pub related_order_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    Discount,
    FreeProduct,
    FreeDelivery,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RewardSource {
    Redemption,
    TierPromotion,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reward {
    pub id: Uuid,
    pub name: String,
    pub reward_type: RewardType,
    pub value: i64,
    pub source: RewardSource,
    pub expires_at: Option<DateTime<Utc>>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Reward {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expires_at| now > expires_at)
    }

    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        !self.used && self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardSpec {
    pub name: String,
    pub reward_type: RewardType,
    pub value: i64,
    pub source: RewardSource,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    OrderCount,
    DistinctRestaurants,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Active,
    Completed,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Challenge {
    pub id: Uuid,
    pub code: String,
    pub title: String,
    pub kind: ChallengeKind,
    pub target: i64,
    pub progress: i64,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub reward_points: i64,
    // distinct restaurant ids seen, only used by DistinctRestaurants
    #[serde(default)]
    pub restaurants: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Challenge {
    pub fn status(&self, now: DateTime<Utc>) -> ChallengeStatus {
        if self.completed {
            ChallengeStatus::Completed
        } else if self.expired_by(now) {
            ChallengeStatus::Expired
        } else {
            ChallengeStatus::Active
        }
    }

    /// The period is still open at exactly `expires_at`.
    pub fn expired_by(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    fn bonus_key(&self) -> String {
        format!("challenge:{}", self.id)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChallengeTemplate {
    pub code: &'static str,
    pub title: &'static str,
    pub kind: ChallengeKind,
    pub target: i64,
    pub reward_points: i64,
}

pub const CHALLENGE_CATALOG: [ChallengeTemplate; 3] = [
    ChallengeTemplate {
        code: "orders_5",
        title: "Complete 5 orders this month",
        kind: ChallengeKind::OrderCount,
        target: 5,
        reward_points: 100,
    },
    ChallengeTemplate {
        code: "orders_10",
        title: "Complete 10 orders this month",
        kind: ChallengeKind::OrderCount,
        target: 10,
        reward_points: 250,
    },
    ChallengeTemplate {
        code: "new_restaurants_3",
        title: "Try 3 different restaurants this month",
        kind: ChallengeKind::DistinctRestaurants,
        target: 3,
        reward_points: 150,
    },
];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AccountStats {
    pub orders_completed: i64,
    pub total_spent: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountLedger {
    pub account_id: Uuid,
    pub balance: i64,
    pub lifetime_earned: i64,
    pub transactions: Vec<LedgerEntry>,
    pub rewards: Vec<Reward>,
    pub challenges: Vec<Challenge>,
    #[serde(default)]
    pub stats: AccountStats,
    #[serde(default)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of an idempotent append: `applied` is false when the key had
/// already been used and `entry` is the original entry.
#[derive(Debug, Clone)]
pub struct Appended {
    pub entry: LedgerEntry,
    pub applied: bool,
}

#[derive(Debug, Clone)]
pub struct ChallengeProgress {
    pub challenge: Challenge,
    pub bonus: Option<LedgerEntry>,
}

pub const WELCOME_BONUS_KEY: &str = "welcome";

fn points_overflow() -> ServiceError {
    ServiceError::Validation("Amount is too large for this account".to_string())
}

impl AccountLedger {
    pub fn new(account_id: Uuid, welcome_bonus: i64, now: DateTime<Utc>) -> Self {
        let mut ledger = AccountLedger {
            account_id,
            balance: 0,
            lifetime_earned: 0,
            transactions: Vec::new(),
            rewards: Vec::new(),
            challenges: Vec::new(),
            stats: AccountStats::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        };

        if welcome_bonus > 0 {
            // fresh ledger, totals start from the welcome credit
            ledger.balance = welcome_bonus;
            ledger.lifetime_earned = welcome_bonus;
            ledger.transactions.push(LedgerEntry {
                id: Uuid::new_v4(),
                entry_type: EntryType::Bonus,
                amount: welcome_bonus,
                reason: "Welcome bonus".to_string(),
                related_order_id: None,
                idempotency_key: Some(WELCOME_BONUS_KEY.to_string()),
                created_at: now,
            });
        }

        ledger
    }

    pub fn tier(&self) -> Tier {
        Tier::for_points(self.lifetime_earned)
    }

    /// Points still needed to reach the next tier, `None` at the top tier.
    pub fn points_to_next_tier(&self) -> Option<i64> {
        self.tier()
            .next()
            .map(|next| next.threshold() - self.lifetime_earned)
    }

    /// Recomputes both totals from the entry log.
    pub fn verify_totals(&self) -> bool {
        let balance: i64 = self.transactions.iter().map(|e| e.amount).sum();
        let lifetime: i64 = self
            .transactions
            .iter()
            .filter(|e| e.amount > 0)
            .map(|e| e.amount)
            .sum();
        balance == self.balance && lifetime == self.lifetime_earned
    }

    pub fn find_entry_by_key(&self, key: &str) -> Option<&LedgerEntry> {
        self.transactions
            .iter()
            .find(|e| e.idempotency_key.as_deref() == Some(key))
    }

    fn append(
        &mut self,
        entry_type: EntryType,
        amount: i64,
        reason: String,
        related_order_id: Option<String>,
        idempotency_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, ServiceError> {
        let balance = self.balance.checked_add(amount).ok_or_else(points_overflow)?;
        let lifetime_earned = if amount > 0 {
            self.lifetime_earned
                .checked_add(amount)
                .ok_or_else(points_overflow)?
        } else {
            self.lifetime_earned
        };

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            entry_type,
            amount,
            reason,
            related_order_id,
            idempotency_key,
            created_at: now,
        };

        self.balance = balance;
        self.lifetime_earned = lifetime_earned;
        self.updated_at = now;
        self.transactions.push(entry.clone());
        Ok(entry)
    }

    /// Appends a 0-point earn entry for orders below the points divisor, so
    /// the order still counts toward `orders_completed` and replays stay no-ops.
    pub fn accrue_for_order(
        &mut self,
        order_total: i64,
        order_id: &str,
        rules: &LoyaltyRules,
        now: DateTime<Utc>,
    ) -> Result<Appended, ServiceError> {
        if order_total < 0 {
            return Err(ServiceError::Validation(
                "Order total cannot be negative".to_string(),
            ));
        }
        if order_id.trim().is_empty() {
            return Err(ServiceError::Validation("Order id is required".to_string()));
        }

        let key = format!("earn:{}", order_id);
        if let Some(existing) = self.find_entry_by_key(&key) {
            return Ok(Appended {
                entry: existing.clone(),
                applied: false,
            });
        }

        let total_spent = self
            .stats
            .total_spent
            .checked_add(order_total)
            .ok_or_else(points_overflow)?;

        let points = order_total / rules.points_divisor;
        let entry = self.append(
            EntryType::Earn,
            points,
            format!("Points earned for order {}", order_id),
            Some(order_id.to_string()),
            Some(key),
            now,
        )?;

        self.stats.orders_completed += 1;
        self.stats.total_spent = total_spent;

        Ok(Appended {
            entry,
            applied: true,
        })
    }

    pub fn grant_bonus(
        &mut self,
        amount: i64,
        reason: &str,
        idempotency_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Appended, ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::Validation(
                "Bonus amount must be positive".to_string(),
            ));
        }

        if let Some(key) = idempotency_key {
            if let Some(existing) = self.find_entry_by_key(key) {
                return Ok(Appended {
                    entry: existing.clone(),
                    applied: false,
                });
            }
        }

        let entry = self.append(
            EntryType::Bonus,
            amount,
            reason.to_string(),
            None,
            idempotency_key.map(str::to_string),
            now,
        )?;

        Ok(Appended {
            entry,
            applied: true,
        })
    }

    pub fn redeem(
        &mut self,
        points: i64,
        rules: &LoyaltyRules,
        now: DateTime<Utc>,
    ) -> Result<Reward, ServiceError> {
        if points <= 0 || points % rules.redemption_unit != 0 {
            return Err(ServiceError::InvalidRedemptionUnit {
                points,
                unit: rules.redemption_unit,
            });
        }
        if points > self.balance {
            return Err(ServiceError::InsufficientBalance {
                requested: points,
                available: self.balance,
            });
        }

        let discount_amount = points / rules.redemption_value_divisor;
        self.append(
            EntryType::Redeem,
            -points,
            format!("Redeemed {} points for a discount of {}", points, discount_amount),
            None,
            None,
            now,
        )?;

        Ok(self.issue_reward(
            RewardSpec {
                name: format!("Discount of {}", discount_amount),
                reward_type: RewardType::Discount,
                value: discount_amount,
                source: RewardSource::Redemption,
                expires_at: Some(now + Duration::days(rules.reward_expiry_days)),
            },
            now,
        ))
    }

    pub fn issue_reward(&mut self, spec: RewardSpec, now: DateTime<Utc>) -> Reward {
        let reward = Reward {
            id: Uuid::new_v4(),
            name: spec.name,
            reward_type: spec.reward_type,
            value: spec.value,
            source: spec.source,
            expires_at: spec.expires_at,
            used: false,
            used_at: None,
            created_at: now,
        };
        self.updated_at = now;
        self.rewards.push(reward.clone());
        reward
    }

    /// Issues the promotion reward of every tier crossed since `previous`.
    pub fn issue_promotion_rewards(&mut self, previous: Tier, now: DateTime<Utc>) -> Vec<Reward> {
        let current = self.tier();
        Tier::ALL
            .iter()
            .copied()
            .filter(|tier| *tier > previous && *tier <= current)
            .filter_map(|tier| tier.promotion_reward_value().map(|value| (tier, value)))
            .map(|(tier, value)| {
                self.issue_reward(
                    RewardSpec {
                        name: format!("{} tier reward", tier.to_str()),
                        reward_type: RewardType::Discount,
                        value,
                        source: RewardSource::TierPromotion,
                        expires_at: Some(now + Duration::days(60)),
                    },
                    now,
                )
            })
            .collect()
    }

    pub fn consume_reward(
        &mut self,
        reward_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Reward, ServiceError> {
        let reward = self
            .rewards
            .iter_mut()
            .find(|r| r.id == reward_id)
            .ok_or(ServiceError::RewardNotFound(reward_id))?;

        if reward.used {
            return Err(ServiceError::RewardAlreadyUsed(reward_id));
        }
        if reward.is_expired(now) {
            return Err(ServiceError::RewardExpired(reward_id));
        }

        reward.used = true;
        reward.used_at = Some(now);
        let consumed = reward.clone();
        self.updated_at = now;
        Ok(consumed)
    }

    pub fn available_rewards(&self, now: DateTime<Utc>) -> Vec<Reward> {
        self.rewards
            .iter()
            .filter(|r| r.is_available(now))
            .cloned()
            .collect()
    }

    /// Adds every catalog challenge the account does not already hold for a
    /// live period. Returns the challenges that were added.
    pub fn assign_challenges(
        &mut self,
        period_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Vec<Challenge> {
        let mut assigned = Vec::new();

        for template in CHALLENGE_CATALOG.iter() {
            let held = self
                .challenges
                .iter()
                .any(|c| c.code == template.code && !c.expired_by(now));
            if held {
                continue;
            }

            let challenge = Challenge {
                id: Uuid::new_v4(),
                code: template.code.to_string(),
                title: template.title.to_string(),
                kind: template.kind,
                target: template.target,
                progress: 0,
                completed: false,
                completed_at: None,
                expires_at: period_end,
                reward_points: template.reward_points,
                restaurants: Vec::new(),
                created_at: now,
            };
            self.challenges.push(challenge.clone());
            assigned.push(challenge);
        }

        if !assigned.is_empty() {
            self.updated_at = now;
        }
        assigned
    }

    pub fn record_progress(
        &mut self,
        challenge_id: Uuid,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<ChallengeProgress, ServiceError> {
        if delta <= 0 {
            return Err(ServiceError::Validation(
                "Progress delta must be positive".to_string(),
            ));
        }

        let index = self
            .challenges
            .iter()
            .position(|c| c.id == challenge_id)
            .ok_or(ServiceError::ChallengeNotFound(challenge_id))?;

        match self.challenges[index].status(now) {
            ChallengeStatus::Completed => {
                return Ok(ChallengeProgress {
                    challenge: self.challenges[index].clone(),
                    bonus: None,
                })
            }
            ChallengeStatus::Expired => return Err(ServiceError::ChallengeExpired(challenge_id)),
            ChallengeStatus::Active => {}
        }

        let challenge = &mut self.challenges[index];
        challenge.progress = challenge.progress.saturating_add(delta);
        self.settle_challenge(index, now)
    }

    /// Advances challenges for one delivered order. Returns only the
    /// challenges this order completed.
    pub fn record_order_progress(
        &mut self,
        restaurant_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ChallengeProgress>, ServiceError> {
        let mut completed = Vec::new();

        for index in 0..self.challenges.len() {
            if self.challenges[index].status(now) != ChallengeStatus::Active {
                continue;
            }

            let advanced = {
                let challenge = &mut self.challenges[index];
                match (challenge.kind, restaurant_id) {
                    (ChallengeKind::OrderCount, _) => {
                        challenge.progress += 1;
                        true
                    }
                    (ChallengeKind::DistinctRestaurants, Some(restaurant)) => {
                        if challenge.restaurants.iter().any(|r| r == restaurant) {
                            false
                        } else {
                            challenge.restaurants.push(restaurant.to_string());
                            challenge.progress = challenge.restaurants.len() as i64;
                            true
                        }
                    }
                    (ChallengeKind::DistinctRestaurants, None) => false,
                }
            };

            if advanced {
                let progress = self.settle_challenge(index, now)?;
                if progress.bonus.is_some() {
                    completed.push(progress);
                }
            }
        }

        Ok(completed)
    }

    fn settle_challenge(
        &mut self,
        index: usize,
        now: DateTime<Utc>,
    ) -> Result<ChallengeProgress, ServiceError> {
        self.updated_at = now;
        let challenge = &mut self.challenges[index];
        if challenge.completed || challenge.progress < challenge.target {
            return Ok(ChallengeProgress {
                challenge: challenge.clone(),
                bonus: None,
            });
        }

        challenge.progress = challenge.target;
        challenge.completed = true;
        challenge.completed_at = Some(now);
        let snapshot = challenge.clone();

        let granted = self.grant_bonus(
            snapshot.reward_points,
            &format!("Challenge completed: {}", snapshot.title),
            Some(&snapshot.bonus_key()),
            now,
        )?;

        Ok(ChallengeProgress {
            challenge: snapshot,
            bonus: granted.applied.then_some(granted.entry),
        })
    }

    /// Drops completed and expired challenges. Returns how many were removed.
    pub fn purge_finished_challenges(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.challenges.len();
        self.challenges
            .retain(|c| c.status(now) == ChallengeStatus::Active);
        let removed = before - self.challenges.len();
        if removed > 0 {
            self.updated_at = now;
        }
        removed
    }
}
