pub mod cache;
pub mod coupondb;
pub mod db;
pub mod loyaltydb;
pub mod memory;
pub mod referraldb;

use coupondb::CouponExt;
use loyaltydb::LedgerExt;
use referraldb::ReferralExt;

/// Everything the loyalty services need from storage. Implemented by the
/// Postgres `DBClient` and by `MemoryStore`.
pub trait LoyaltyStore: LedgerExt + ReferralExt + CouponExt + Send + Sync + std::fmt::Debug {}

impl<T> LoyaltyStore for T where T: LedgerExt + ReferralExt + CouponExt + Send + Sync + std::fmt::Debug {}
