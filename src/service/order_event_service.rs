// service/order_event_service.rs
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::service::{
    error::ServiceError,
    loyalty_service::LoyaltyService,
    referral_service::ReferralService,
};

/// Emitted by the order service once an order reaches `delivered`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDelivered {
    pub order_id: String,
    pub account_id: Uuid,
    pub order_total: i64,
    pub restaurant_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDeliveredOutcome {
    pub points_earned: i64,
    pub already_processed: bool,
    pub challenges_completed: Vec<String>,
    pub referral_completed: bool,
}

/// Fans a delivered order out to accrual, challenge progress and referral
/// completion. Replaying the same event is harmless.
#[derive(Debug, Clone)]
pub struct OrderEventService {
    loyalty: Arc<LoyaltyService>,
    referrals: Arc<ReferralService>,
}

impl OrderEventService {
    pub fn new(loyalty: Arc<LoyaltyService>, referrals: Arc<ReferralService>) -> Self {
        Self { loyalty, referrals }
    }

    pub async fn on_order_delivered(
        &self,
        event: OrderDelivered,
    ) -> Result<OrderDeliveredOutcome, ServiceError> {
        if event.order_id.trim().is_empty() {
            return Err(ServiceError::Validation("order_id is required".to_string()));
        }

        let outcome = self
            .loyalty
            .record_delivered_order(
                event.account_id,
                event.order_total,
                &event.order_id,
                event.restaurant_id.as_deref(),
            )
            .await?;

        // Points are already committed; a referral failure must not undo them.
        // A replay of the event retries the referral step.
        let referral_completed = match self
            .referrals
            .process_first_order_reward(event.account_id, &event.order_id)
            .await
        {
            Ok(completed) => completed,
            Err(e) => {
                tracing::error!(
                    "Referral processing failed for order {} of {}: {}",
                    event.order_id,
                    event.account_id,
                    e
                );
                false
            }
        };

        Ok(OrderDeliveredOutcome {
            points_earned: if outcome.accrual.applied { outcome.accrual.entry.amount } else { 0 },
            already_processed: !outcome.accrual.applied,
            challenges_completed: outcome
                .completed_challenges
                .into_iter()
                .map(|challenge| challenge.code)
                .collect(),
            referral_completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{loyalty_service::current_period_end, test_support::Harness};

    fn delivered(account_id: Uuid, order_id: &str, total: i64, restaurant: &str) -> OrderDelivered {
        OrderDelivered {
            order_id: order_id.to_string(),
            account_id,
            order_total: total,
            restaurant_id: Some(restaurant.to_string()),
        }
    }

    #[tokio::test]
    async fn test_first_delivery_completes_referral() {
        let harness = Harness::without_welcome_bonus();
        let (referrer, referee) = (Uuid::new_v4(), Uuid::new_v4());
        let code = harness.referrals.referral_code(referrer).await.unwrap().code;
        harness.referrals.apply_code(referee, &code).await.unwrap();

        let outcome = harness
            .orders
            .on_order_delivered(delivered(referee, "O1", 250, "r1"))
            .await
            .unwrap();
        assert_eq!(outcome.points_earned, 25);
        assert!(outcome.referral_completed);

        let replay = harness
            .orders
            .on_order_delivered(delivered(referee, "O1", 250, "r1"))
            .await
            .unwrap();
        assert!(replay.already_processed);
        assert_eq!(replay.points_earned, 0);
        assert!(!replay.referral_completed);

        assert_eq!(harness.loyalty.get_balance(referee).await.unwrap(), 75);
        assert_eq!(harness.loyalty.get_balance(referrer).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_deliveries_complete_restaurant_challenge() {
        let harness = Harness::without_welcome_bonus();
        let account = Uuid::new_v4();
        harness
            .loyalty
            .assign_period_challenges(account, current_period_end(harness.loyalty.now()))
            .await
            .unwrap();

        for (order, restaurant) in [("O1", "r1"), ("O2", "r1"), ("O3", "r2")] {
            let outcome = harness
                .orders
                .on_order_delivered(delivered(account, order, 100, restaurant))
                .await
                .unwrap();
            assert!(outcome.challenges_completed.is_empty());
        }

        let outcome = harness
            .orders
            .on_order_delivered(delivered(account, "O4", 100, "r3"))
            .await
            .unwrap();
        assert_eq!(outcome.challenges_completed, vec!["new_restaurants_3".to_string()]);
        assert_eq!(harness.loyalty.get_balance(account).await.unwrap(), 40 + 150);
    }

    #[tokio::test]
    async fn test_blank_order_id_is_rejected() {
        let harness = Harness::new();
        let err = harness
            .orders
            .on_order_delivered(delivered(Uuid::new_v4(), " ", 100, "r1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}
