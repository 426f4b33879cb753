// config.rs
use std::str::FromStr;

/// Business constants of the loyalty program. All of them can be
/// overridden from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct LoyaltyRules {
    pub welcome_bonus: i64,
    pub referral_bonus: i64,
    pub redemption_unit: i64,
    // order currency units per earned point
    pub points_divisor: i64,
    // points per unit of discount when redeeming
    pub redemption_value_divisor: i64,
    pub reward_expiry_days: i64,
    pub max_commit_attempts: u32,
}

impl Default for LoyaltyRules {
    fn default() -> Self {
        LoyaltyRules {
            welcome_bonus: 100,
            referral_bonus: 50,
            redemption_unit: 100,
            points_divisor: 10,
            redemption_value_divisor: 10,
            reward_expiry_days: 30,
            max_commit_attempts: 5,
        }
    }
}

impl LoyaltyRules {
    pub fn from_env() -> LoyaltyRules {
        let defaults = LoyaltyRules::default();

        let rules = LoyaltyRules {
            welcome_bonus: env_or("LOYALTY_WELCOME_BONUS", defaults.welcome_bonus),
            referral_bonus: env_or("LOYALTY_REFERRAL_BONUS", defaults.referral_bonus),
            redemption_unit: env_or("LOYALTY_REDEMPTION_UNIT", defaults.redemption_unit),
            points_divisor: env_or("LOYALTY_POINTS_DIVISOR", defaults.points_divisor),
            redemption_value_divisor: env_or(
                "LOYALTY_REDEMPTION_VALUE_DIVISOR",
                defaults.redemption_value_divisor,
            ),
            reward_expiry_days: env_or("LOYALTY_REWARD_EXPIRY_DAYS", defaults.reward_expiry_days),
            max_commit_attempts: env_or(
                "LOYALTY_MAX_COMMIT_ATTEMPTS",
                defaults.max_commit_attempts,
            ),
        };

        // divisors and units must stay positive or the arithmetic breaks
        if rules.redemption_unit <= 0
            || rules.points_divisor <= 0
            || rules.redemption_value_divisor <= 0
            || rules.max_commit_attempts == 0
        {
            tracing::warn!("Invalid loyalty rule overrides, falling back to defaults");
            return defaults;
        }

        rules
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub app_url: String,
    pub jwt_secret: String,
    pub internal_api_key: String,
    pub port: u16,
    pub rules: LoyaltyRules,
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").ok();
        let redis_url = std::env::var("REDIS_URL").ok();
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");
        let internal_api_key =
            std::env::var("INTERNAL_API_KEY").expect("INTERNAL_API_KEY must be set");
        let app_url = std::env::var("APP_URL")
            .unwrap_or_else(|_| "http://localhost:5173".to_string());

        Config {
            database_url,
            redis_url,
            app_url,
            jwt_secret,
            internal_api_key,
            port: env_or("PORT", 8000),
            rules: LoyaltyRules::from_env(),
        }
    }
}
