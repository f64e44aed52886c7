//! Chip ledger HTTP server.
//!
//! Connects to PostgreSQL, applies migrations and serves the ledger API until
//! interrupted.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Error};
use chip_ledger::{LedgerManager, db::Database};
use ledger_server::{api, config::ServerConfig, logging};
use pico_args::Arguments;
use tokio::sync::watch;

const HELP: &str = "\
Run the chip ledger server

USAGE:
  ledger_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:7070]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  --no-migrate             Skip applying migrations on startup
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  LEDGER_API_TOKEN         Service token required on /api/v1 routes
  RAKEBACK_BASE_RATE_BPS   Default rakeback rate in basis points
  STAKING_SHARE_BPS        Staking share of each fee in basis points
  AFFILIATE_SHARE_BPS      Default affiliate share in basis points
  (See .env.example for all configuration options)
";

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    no_migrate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        no_migrate: pargs.contains("--no-migrate"),
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url)
        .context("Invalid configuration")?;

    // Catching signals for a graceful exit.
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(true);
    })?;

    tracing::info!("Starting chip ledger server at {}", config.bind);

    let db = Database::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected successfully");

    if config.run_migrations && !args.no_migrate {
        db.migrate().await.context("Failed to run migrations")?;
        tracing::info!("Migrations applied");
    }

    let store = db.ledger_store(config.ledger.session_acquire_timeout);
    let ledger = LedgerManager::new(Arc::new(store), config.ledger.clone());
    if config.api_token.is_none() {
        tracing::warn!("LEDGER_API_TOKEN not set, API is open to any caller");
    }

    let state = api::AppState::with_lock_timeout(
        ledger,
        config.api_token.clone(),
        config.user_lock_timeout,
    );
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    tracing::info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await
        .context("Server error")?;

    tracing::info!("Shutting down server...");
    db.close().await;

    Ok(())
}
