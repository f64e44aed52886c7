//! PostgreSQL pool, schema migrations and the store built on top of them.

use crate::store::PgLedgerStore;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;

pub mod config;
pub mod timeouts;

pub use config::DatabaseConfig;
use timeouts::{DEFAULT_QUERY_TIMEOUT, TimeoutResult, with_timeout};

/// Owns the connection pool the ledger store runs on
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open a pool sized and bounded by `config`
    ///
    /// ```no_run
    /// use chip_ledger::db::{Database, DatabaseConfig};
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let db = Database::new(&DatabaseConfig::from_env()?).await?;
    ///     db.migrate().await?;
    ///     let _store = db.ledger_store(Duration::from_secs(10));
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let secs = Duration::from_secs;
        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(secs(config.connection_timeout_secs))
            .idle_timeout(secs(config.idle_timeout_secs))
            .max_lifetime(secs(config.max_lifetime_secs))
            .connect(&config.database_url)
            .await?;

        log::info!(
            "Ledger database pool ready ({}..{} connections)",
            config.min_connections,
            config.max_connections
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply `migrations/` to the connected database
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Store sharing this pool; `begin_timeout` bounds the wait for a
    /// connection whenever a session starts.
    pub fn ledger_store(&self, begin_timeout: Duration) -> PgLedgerStore {
        PgLedgerStore::new(Arc::new(self.pool.clone()), begin_timeout)
    }

    pub async fn health_check(&self) -> TimeoutResult<()> {
        with_timeout(
            DEFAULT_QUERY_TIMEOUT,
            sqlx::query("SELECT 1").execute(&self.pool),
        )
        .await
        .map(|_| ())
    }

    /// Wait for checked-out connections and close the pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}
