// dtos/referraldtos.rs
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ApplyReferralCodeDto {
    #[validate(length(min = 1, max = 32, message = "Referral code is required"))]
    pub code: String,
}
