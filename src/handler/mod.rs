pub mod coupons;
pub mod internal;
pub mod loyalty;
pub mod referrals;
