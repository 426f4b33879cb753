pub mod couponmodel;
pub mod ledgermodel;
pub mod referralmodel;
