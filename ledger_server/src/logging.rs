//! Structured logging configuration.
//!
//! The ledger library logs through the `log` facade; records are bridged into
//! the tracing subscriber installed here.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging
///
/// Log levels are configurable via the `RUST_LOG` env var and default to
/// `info,sqlx=warn,hyper=warn`.
///
/// # Example
///
/// ```no_run
/// use ledger_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log a completed value movement with structured data
///
/// # Arguments
///
/// * `event` - Operation name (transfer, claim, stake, ...)
/// * `user_id` - User the operation acted for, if any
/// * `entry_id` - Ledger entry written, if any
/// * `amount` - Chips moved
pub fn log_ledger_event(event: &str, user_id: Option<i64>, entry_id: Option<i64>, amount: i64) {
    tracing::info!(
        event = event,
        user_id = user_id,
        entry_id = entry_id,
        amount = amount,
        "LEDGER: {}",
        event
    );
}

/// Log a rejected ledger request
///
/// Requests the caller could fix are logged at debug, the rest at warn.
pub fn log_ledger_rejection(event: &str, recoverable: bool, message: &str) {
    if recoverable {
        tracing::debug!(event = event, "Ledger request rejected: {}", message);
    } else {
        tracing::warn!(event = event, "Ledger request failed: {}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_ledger_event() {
        log_ledger_event("transfer", Some(1), Some(10), 500);
        log_ledger_event("stake", None, None, 0);
    }

    #[test]
    fn test_log_ledger_rejection() {
        log_ledger_rejection("claim", true, "Nothing to claim");
        log_ledger_rejection("transfer", false, "Database error");
    }
}
