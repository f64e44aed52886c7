//! Deadlines for pool access.
//!
//! A saturated pool must surface as a `SessionFailure` the caller can report,
//! not as a request that hangs until the client gives up.

use crate::ledger::LedgerError;
use std::future::Future;
use std::time::Duration;

/// Deadline for one-off probes such as health checks
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum TimeoutError {
    #[error("Database operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type TimeoutResult<T> = Result<T, TimeoutError>;

/// Run `future`, giving up after `deadline`
///
/// ```no_run
/// use chip_ledger::db::timeouts::{DEFAULT_QUERY_TIMEOUT, with_timeout};
/// # use sqlx::PgPool;
/// # async fn example(pool: &PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let tx = with_timeout(DEFAULT_QUERY_TIMEOUT, pool.begin()).await?;
/// tx.rollback().await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_timeout<F, T>(deadline: Duration, future: F) -> TimeoutResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    tokio::time::timeout(deadline, future)
        .await
        .map_err(|_| TimeoutError::Timeout(deadline))?
        .map_err(TimeoutError::Database)
}

/// Pool exhaustion and connection errors both leave the ledger without a
/// working scope.
impl From<TimeoutError> for LedgerError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Timeout(deadline) => {
                LedgerError::SessionFailure(format!("no connection within {deadline:?}"))
            }
            TimeoutError::Database(e) => LedgerError::SessionFailure(e.to_string()),
        }
    }
}
