//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use chip_ledger::ledger::config::parse_env_or;
use chip_ledger::{LedgerConfig, db::DatabaseConfig};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default bind address when neither CLI nor environment provide one
pub const DEFAULT_BIND: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(Ipv4Addr::LOCALHOST),
    7070,
);

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Fee rates and reward rules
    pub ledger: LedgerConfig,
    /// Shared service token; `None` leaves the API open
    pub api_token: Option<String>,
    /// Apply pending migrations on startup
    pub run_migrations: bool,
    /// How long a request waits for another request of the same user
    pub user_lock_timeout: Duration,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => match std::env::var("SERVER_BIND") {
                Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
                    var: "SERVER_BIND".to_string(),
                    reason: format!("'{value}' is not an IP:PORT address"),
                })?,
                Err(_) => DEFAULT_BIND,
            },
        };

        let database = match database_url_override {
            // Pool sizing still comes from the environment when it is set
            Some(database_url) => DatabaseConfig {
                database_url,
                ..DatabaseConfig::from_env().unwrap_or_default()
            },
            None => DatabaseConfig::from_env()?,
        };

        let api_token = std::env::var("LEDGER_API_TOKEN")
            .ok()
            .filter(|token| !token.is_empty());

        let config = ServerConfig {
            bind,
            database,
            ledger: LedgerConfig::from_env()?,
            api_token,
            run_migrations: parse_env_or("RUN_MIGRATIONS", true),
            user_lock_timeout: Duration::from_millis(parse_env_or("USER_LOCK_TIMEOUT_MS", 2_000)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ledger.validate()?;

        if self.database.database_url.is_empty() {
            return Err(ConfigError::Invalid {
                var: "DATABASE_URL".to_string(),
                reason: "Must not be empty".to_string(),
            });
        }

        if let Some(token) = &self.api_token {
            if token.len() < 16 {
                return Err(ConfigError::Invalid {
                    var: "LEDGER_API_TOKEN".to_string(),
                    reason: "Must be at least 16 characters".to_string(),
                });
            }
        }

        if self.user_lock_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "USER_LOCK_TIMEOUT_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },

    #[error(transparent)]
    Ledger(#[from] chip_ledger::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig {
            bind: DEFAULT_BIND,
            database: DatabaseConfig::development(),
            ledger: LedgerConfig::default(),
            api_token: None,
            run_migrations: false,
            user_lock_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_short_api_token_rejected() {
        let mut config = config();
        config.api_token = Some("short".to_string());
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "LEDGER_API_TOKEN"));
    }

    #[test]
    fn test_invalid_ledger_rates_rejected() {
        let mut config = config();
        config.ledger.fees.staking_share_bps = 20_000;
        assert!(matches!(config.validate(), Err(ConfigError::Ledger(_))));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Invalid {
            var: "SERVER_BIND".to_string(),
            reason: "bad".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("SERVER_BIND"));
        assert!(msg.contains("bad"));
    }
}
