//! Ledger configuration.
//!
//! Fee-split rates, rakeback defaults and affiliate rules, loaded from
//! environment variables with validated defaults.

use super::models::BPS_DENOMINATOR;
use std::time::Duration;

/// How the staking share of a fee is spread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakingScope {
    /// Every staked duel bot on the platform, regardless of who wagered
    PlatformWide,
    /// Only positions staked by the wagering user
    WagerUserOnly,
}

/// Fee distribution rates, all in basis points
#[derive(Debug, Clone)]
pub struct FeePolicy {
    /// Upper bound on any user's effective rakeback rate
    pub rakeback_max_rate_bps: i64,
    pub staking_share_bps: i64,
    /// Affiliate rate for codes without a custom rate
    pub affiliate_share_bps: i64,
    pub staking_scope: StakingScope,
}

/// Rakeback defaults
#[derive(Debug, Clone)]
pub struct RakebackConfig {
    /// Base rate given to newly created rakeback accounts
    pub base_rate_bps: i64,
}

/// Affiliate program rules
#[derive(Debug, Clone)]
pub struct AffiliateConfig {
    /// Highest custom rate a code may carry
    pub max_custom_rate_bps: i64,
    /// How long after signup a user may attach a referral code
    pub activation_window: chrono::Duration,
    /// How long an affiliation pays commission; `None` is forever
    pub lifetime: Option<chrono::Duration>,
    pub first_deposit_bonus_bps: i64,
    pub first_deposit_bonus_max: i64,
}

/// Complete ledger configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub fees: FeePolicy,
    pub rakeback: RakebackConfig,
    pub affiliate: AffiliateConfig,
    /// Bound on waiting for a storage transaction
    pub session_acquire_timeout: Duration,
}

impl LedgerConfig {
    /// Load configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `RAKEBACK_BASE_RATE_BPS` (default: 1000)
    /// - `RAKEBACK_MAX_RATE_BPS` (default: 2000)
    /// - `STAKING_SHARE_BPS` (default: 8000)
    /// - `AFFILIATE_SHARE_BPS` (default: 200)
    /// - `AFFILIATE_MAX_CUSTOM_RATE_BPS` (default: 1000)
    /// - `STAKING_SHARE_SCOPE`: `platform` or `wager_user` (default: platform)
    /// - `AFFILIATE_ACTIVATION_WINDOW_HOURS` (default: 24)
    /// - `AFFILIATE_LIFETIME_DAYS`: 0 disables expiry (default: 0)
    /// - `FIRST_DEPOSIT_BONUS_BPS` (default: 1000)
    /// - `FIRST_DEPOSIT_BONUS_MAX` (default: 10000)
    /// - `SESSION_ACQUIRE_TIMEOUT_SECS` (default: 10)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for unparseable scope values or rates
    /// outside their bounds.
    pub fn from_env() -> Result<Self, ConfigError> {
        let staking_scope = match std::env::var("STAKING_SHARE_SCOPE") {
            Ok(value) => parse_scope(&value)?,
            Err(_) => StakingScope::PlatformWide,
        };

        let lifetime_days: i64 = parse_env_or("AFFILIATE_LIFETIME_DAYS", 0);

        let config = Self {
            fees: FeePolicy {
                rakeback_max_rate_bps: parse_env_or("RAKEBACK_MAX_RATE_BPS", 2000),
                staking_share_bps: parse_env_or("STAKING_SHARE_BPS", 8000),
                affiliate_share_bps: parse_env_or("AFFILIATE_SHARE_BPS", 200),
                staking_scope,
            },
            rakeback: RakebackConfig {
                base_rate_bps: parse_env_or("RAKEBACK_BASE_RATE_BPS", 1000),
            },
            affiliate: AffiliateConfig {
                max_custom_rate_bps: parse_env_or("AFFILIATE_MAX_CUSTOM_RATE_BPS", 1000),
                activation_window: chrono::Duration::hours(parse_env_or(
                    "AFFILIATE_ACTIVATION_WINDOW_HOURS",
                    24,
                )),
                lifetime: (lifetime_days > 0).then(|| chrono::Duration::days(lifetime_days)),
                first_deposit_bonus_bps: parse_env_or("FIRST_DEPOSIT_BONUS_BPS", 1000),
                first_deposit_bonus_max: parse_env_or("FIRST_DEPOSIT_BONUS_MAX", 10_000),
            },
            session_acquire_timeout: Duration::from_secs(parse_env_or(
                "SESSION_ACQUIRE_TIMEOUT_SECS",
                10,
            )),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate rates and windows
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_bps("RAKEBACK_MAX_RATE_BPS", self.fees.rakeback_max_rate_bps)?;
        check_bps("STAKING_SHARE_BPS", self.fees.staking_share_bps)?;
        check_bps("AFFILIATE_SHARE_BPS", self.fees.affiliate_share_bps)?;
        check_bps("RAKEBACK_BASE_RATE_BPS", self.rakeback.base_rate_bps)?;
        check_bps(
            "AFFILIATE_MAX_CUSTOM_RATE_BPS",
            self.affiliate.max_custom_rate_bps,
        )?;
        check_bps("FIRST_DEPOSIT_BONUS_BPS", self.affiliate.first_deposit_bonus_bps)?;

        if self.rakeback.base_rate_bps > self.fees.rakeback_max_rate_bps {
            return Err(ConfigError::Invalid {
                var: "RAKEBACK_BASE_RATE_BPS".to_string(),
                reason: format!(
                    "Must not exceed RAKEBACK_MAX_RATE_BPS ({})",
                    self.fees.rakeback_max_rate_bps
                ),
            });
        }

        if self.affiliate.activation_window <= chrono::Duration::zero() {
            return Err(ConfigError::Invalid {
                var: "AFFILIATE_ACTIVATION_WINDOW_HOURS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.affiliate.first_deposit_bonus_max < 0 {
            return Err(ConfigError::Invalid {
                var: "FIRST_DEPOSIT_BONUS_MAX".to_string(),
                reason: "Must not be negative".to_string(),
            });
        }

        if self.session_acquire_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "SESSION_ACQUIRE_TIMEOUT_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fees: FeePolicy {
                rakeback_max_rate_bps: 2000,
                staking_share_bps: 8000,
                affiliate_share_bps: 200,
                staking_scope: StakingScope::PlatformWide,
            },
            rakeback: RakebackConfig {
                base_rate_bps: 1000,
            },
            affiliate: AffiliateConfig {
                max_custom_rate_bps: 1000,
                activation_window: chrono::Duration::hours(24),
                lifetime: None,
                first_deposit_bonus_bps: 1000,
                first_deposit_bonus_max: 10_000,
            },
            session_acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

fn parse_scope(value: &str) -> Result<StakingScope, ConfigError> {
    match value.to_lowercase().as_str() {
        "platform" | "platform_wide" => Ok(StakingScope::PlatformWide),
        "wager_user" | "user" => Ok(StakingScope::WagerUserOnly),
        other => Err(ConfigError::Invalid {
            var: "STAKING_SHARE_SCOPE".to_string(),
            reason: format!("Expected 'platform' or 'wager_user', got '{other}'"),
        }),
    }
}

fn check_bps(var: &str, value: i64) -> Result<(), ConfigError> {
    if !(0..=BPS_DENOMINATOR).contains(&value) {
        return Err(ConfigError::Invalid {
            var: var.to_string(),
            reason: format!("Must be between 0 and {BPS_DENOMINATOR} basis points, got {value}"),
        });
    }
    Ok(())
}

/// Helper to parse environment variable with default fallback
pub fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
