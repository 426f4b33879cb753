pub mod coupon_service;
pub mod error;
pub mod loyalty_service;
pub mod notification_service;
pub mod order_event_service;
pub mod referral_service;

#[cfg(test)]
pub mod test_support {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::{
        coupon_service::CouponService,
        loyalty_service::LoyaltyService,
        notification_service::tests::RecordingNotifier,
        order_event_service::OrderEventService,
        referral_service::ReferralService,
    };
    use crate::{config::LoyaltyRules, db::memory::MemoryStore, utils::clock::ManualClock};

    /// Services wired to an in-memory store, a recording notifier and a
    /// clock pinned to 2026-03-10 12:00 UTC.
    pub struct Harness {
        pub store: Arc<MemoryStore>,
        pub notifier: Arc<RecordingNotifier>,
        pub clock: Arc<ManualClock>,
        pub loyalty: Arc<LoyaltyService>,
        pub referrals: Arc<ReferralService>,
        pub coupons: Arc<CouponService>,
        pub orders: Arc<OrderEventService>,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_rules(LoyaltyRules::default())
        }

        pub fn without_welcome_bonus() -> Self {
            Self::with_rules(LoyaltyRules {
                welcome_bonus: 0,
                ..LoyaltyRules::default()
            })
        }

        pub fn with_rules(rules: LoyaltyRules) -> Self {
            let store = Arc::new(MemoryStore::new());
            let notifier = Arc::new(RecordingNotifier::default());
            let clock = Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap(),
            ));

            let loyalty = Arc::new(LoyaltyService::new(
                store.clone(),
                notifier.clone(),
                clock.clone(),
                rules,
            ));
            let referrals = Arc::new(ReferralService::new(
                store.clone(),
                loyalty.clone(),
                "http://localhost:5173".to_string(),
            ));
            let coupons = Arc::new(CouponService::new(store.clone(), clock.clone()));
            let orders = Arc::new(OrderEventService::new(loyalty.clone(), referrals.clone()));

            Harness {
                store,
                notifier,
                clock,
                loyalty,
                referrals,
                coupons,
                orders,
            }
        }

        /// Lets spawned notification tasks run to completion.
        pub async fn settle(&self) {
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
        }

        pub async fn notified_kinds(&self) -> Vec<String> {
            self.notifier
                .events
                .lock()
                .await
                .iter()
                .map(|(_, kind)| kind.clone())
                .collect()
        }
    }
}
