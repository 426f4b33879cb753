use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize, Serialize, sqlx::FromRow, PartialEq)]
pub struct Referral {
    pub referrer_id: Uuid,
    pub referee_id: Uuid,
    pub code: String,
    pub completed_first_order: bool,
    pub points_awarded: i64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, sqlx::FromRow, PartialEq)]
pub struct ReferralCode {
    pub account_id: Uuid,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ReferrerInfo {
    pub referrer_id: Uuid,
    pub code: String,
    pub referred_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReferralStats {
    pub total_referrals: i64,
    pub completed_referrals: i64,
    pub total_points_earned: i64,
    pub referrals: Vec<ReferralUser>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReferralUser {
    pub account_id: Uuid,
    pub completed_first_order: bool,
    pub joined_at: DateTime<Utc>,
}
