// service/notification_service.rs
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::db::DBClient,
    models::ledgermodel::{Challenge, LedgerEntry, Reward, Tier},
    service::error::ServiceError,
};

/// Things worth telling the account holder about.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoyaltyEvent {
    BonusGranted { entry: LedgerEntry },
    TierChanged { from: Tier, to: Tier },
    RewardIssued { reward: Reward },
    ChallengeCompleted { challenge: Challenge },
}

impl LoyaltyEvent {
    pub fn kind(&self) -> &str {
        match self {
            LoyaltyEvent::BonusGranted { .. } => "bonus_granted",
            LoyaltyEvent::TierChanged { .. } => "tier_changed",
            LoyaltyEvent::RewardIssued { .. } => "reward_issued",
            LoyaltyEvent::ChallengeCompleted { .. } => "challenge_completed",
        }
    }

    pub fn message(&self) -> String {
        match self {
            LoyaltyEvent::BonusGranted { entry } => {
                format!("You received {} bonus points: {}", entry.amount, entry.reason)
            }
            LoyaltyEvent::TierChanged { to, .. } => {
                format!("Congratulations! You reached the {} tier", to.to_str())
            }
            LoyaltyEvent::RewardIssued { reward } => format!("New reward available: {}", reward.name),
            LoyaltyEvent::ChallengeCompleted { challenge } => {
                format!("Challenge completed: {}", challenge.title)
            }
        }
    }
}

/// Delivery side of loyalty messaging. The ledger never waits on it.
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    async fn notify(&self, account_id: Uuid, event: &LoyaltyEvent) -> Result<(), ServiceError>;
}

/// Persists notifications for the messaging workers to pick up.
#[derive(Debug, Clone)]
pub struct NotificationService {
    db_client: Arc<DBClient>,
}

impl NotificationService {
    pub fn new(db_client: Arc<DBClient>) -> Self {
        Self { db_client }
    }

    async fn store_notification(
        &self,
        account_id: Uuid,
        notification_type: &str,
        data: serde_json::Value,
        message: String,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (account_id, notification_type, data, message)
            VALUES ($1, $2, $3, $4)
            "#
        )
        .bind(account_id)
        .bind(notification_type)
        .bind(data)
        .bind(message)
        .execute(&self.db_client.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Notifier for NotificationService {
    async fn notify(&self, account_id: Uuid, event: &LoyaltyEvent) -> Result<(), ServiceError> {
        tracing::info!("Loyalty notification for {}: {}", account_id, event.kind());

        let data = serde_json::to_value(event)
            .map_err(|e| ServiceError::Other(e.to_string()))?;
        self.store_notification(account_id, event.kind(), data, event.message())
            .await
    }
}

/// Used when no database is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, account_id: Uuid, event: &LoyaltyEvent) -> Result<(), ServiceError> {
        tracing::info!("Loyalty notification for {}: {}", account_id, event.message());
        Ok(())
    }
}

/// Fire-and-forget delivery. Failures are logged and never reach the caller.
pub fn dispatch(notifier: Arc<dyn Notifier>, account_id: Uuid, events: Vec<LoyaltyEvent>) {
    if events.is_empty() {
        return;
    }

    tokio::spawn(async move {
        for event in events {
            if let Err(e) = notifier.notify(account_id, &event).await {
                tracing::error!(
                    "Failed to deliver {} notification to {}: {}",
                    event.kind(),
                    account_id,
                    e
                );
            }
        }
    });
}
