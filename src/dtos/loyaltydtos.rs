// dtos/loyaltydtos.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::ledgermodel::{RewardSource, RewardSpec, RewardType, Tier};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceDto {
    pub balance: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TierDto {
    pub tier: Tier,
    pub next_tier: Option<Tier>,
    pub points_to_next_tier: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct TransactionsQueryDto {
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RedeemRequestDto {
    #[validate(range(min = 1, max = 1000000000000, message = "Points must be between 1 and 1000000000000"))]
    pub points: i64,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct BonusRequestDto {
    #[validate(range(min = 1, max = 1000000000000, message = "Bonus amount must be between 1 and 1000000000000"))]
    pub amount: i64,

    #[validate(length(min = 1, max = 200, message = "Reason must be between 1 and 200 characters"))]
    pub reason: String,

    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct IssueRewardRequestDto {
    #[validate(length(min = 1, max = 120, message = "Reward name is required"))]
    pub name: String,

    pub reward_type: RewardType,

    #[validate(range(min = 0, message = "Reward value cannot be negative"))]
    pub value: i64,

    pub expires_at: Option<DateTime<Utc>>,
}

impl From<IssueRewardRequestDto> for RewardSpec {
    fn from(dto: IssueRewardRequestDto) -> Self {
        RewardSpec {
            name: dto.name,
            reward_type: dto.reward_type,
            value: dto.value,
            source: RewardSource::Manual,
            expires_at: dto.expires_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ProgressRequestDto {
    #[validate(range(min = 1, max = 1000, message = "Progress delta must be between 1 and 1000"))]
    pub delta: i64,
}

/// Scheduler hooks. Without `period_end` the current calendar month is used.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PeriodRequestDto {
    pub period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct OrderDeliveredDto {
    #[validate(length(min = 1, message = "Order id is required"))]
    pub order_id: String,

    pub account_id: Uuid,

    #[validate(range(min = 0, max = 1000000000000, message = "Order total must be between 0 and 1000000000000"))]
    pub order_total: i64,

    pub restaurant_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amounts_are_bounded() {
        let bonus = BonusRequestDto {
            amount: i64::MAX - 200,
            reason: "goodwill".to_string(),
            idempotency_key: None,
        };
        assert!(bonus.validate().is_err());

        let order = OrderDeliveredDto {
            order_id: "ORD-1".to_string(),
            account_id: Uuid::new_v4(),
            order_total: i64::MAX,
            restaurant_id: None,
        };
        assert!(order.validate().is_err());

        let order = OrderDeliveredDto {
            order_total: 235,
            ..order
        };
        assert!(order.validate().is_ok());
    }
}
