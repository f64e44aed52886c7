//! HTTP API for the chip ledger.
//!
//! Game services drive the ledger through these endpoints; each handler maps
//! onto one `LedgerManager` operation running in its own implicit session.
//!
//! # Endpoints
//!
//! ```text
//! GET  /health                              - Storage health (public)
//! POST /api/v1/transfers                    - Transfer, optionally pending or with fee
//! POST /api/v1/entries/{id}/confirm         - Confirm a pending entry
//! POST /api/v1/entries/{id}/decline         - Decline and reverse a pending entry
//! GET  /api/v1/wallets/{id}                 - Current balance
//! GET  /api/v1/wallets/{id}/entries?limit=N - Entry history, newest first
//! POST /api/v1/claims/rakeback              - Claim rakeback
//! POST /api/v1/claims/duel-bots             - Claim duel bot staking rewards
//! POST /api/v1/claims/affiliate             - Claim affiliate rewards
//! POST /api/v1/staking/stake                - Stake duel bots
//! POST /api/v1/staking/unstake              - Unstake duel bots
//! POST /api/v1/duel-bots                    - Register staking-eligible NFTs
//! GET  /api/v1/users/{id}/rakeback          - Rakeback account
//! POST /api/v1/users/{id}/rakeback/boost    - Temporary additional rakeback rate
//! GET  /api/v1/users/{id}/positions         - Staked positions
//! GET  /api/v1/users/{id}/affiliate-codes   - Codes owned by a user
//! POST /api/v1/affiliate-codes              - Create an affiliate code
//! POST /api/v1/affiliations                 - Activate a referral
//! POST /api/v1/deposits/first-bonus         - Apply the first-deposit bonus
//! ```
//!
//! # Concurrency
//!
//! Operations that act for a player take that player's [`UserLocks`] guard
//! first, so two requests for the same user never interleave. Ledger
//! correctness itself does not depend on the guard; it rests on row locks.
//!
//! # Example
//!
//! ```rust,no_run
//! use chip_ledger::{LedgerConfig, LedgerManager, MemoryStore};
//! use ledger_server::api::{AppState, create_router};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = LedgerManager::new(Arc::new(MemoryStore::new()), LedgerConfig::default());
//! let app = create_router(AppState::new(ledger, None));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:7070").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod ledger;
pub mod middleware;
pub mod request_id;
pub mod rewards;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use chip_ledger::{LedgerManager, LedgerStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

use crate::locks::UserLocks;

/// State shared by every handler
pub struct AppState<S: LedgerStore> {
    pub ledger: Arc<LedgerManager<S>>,
    pub user_locks: Arc<UserLocks>,
    /// Shared service token; `None` leaves the API open
    pub api_token: Option<Arc<str>>,
}

impl<S: LedgerStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            user_locks: Arc::clone(&self.user_locks),
            api_token: self.api_token.clone(),
        }
    }
}

impl<S: LedgerStore> AppState<S> {
    /// State with the default per-user lock timeout
    pub fn new(ledger: LedgerManager<S>, api_token: Option<String>) -> Self {
        Self::with_lock_timeout(ledger, api_token, Duration::from_secs(2))
    }

    pub fn with_lock_timeout(
        ledger: LedgerManager<S>,
        api_token: Option<String>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            ledger: Arc::new(ledger),
            user_locks: Arc::new(UserLocks::new(lock_timeout)),
            api_token: api_token.map(Arc::from),
        }
    }
}

/// Build the router with all endpoints and middleware
pub fn create_router<S: LedgerStore>(state: AppState<S>) -> Router {
    let v1_routes = create_v1_router(state.clone());

    Router::new()
        .route("/health", get(health_check::<S>))
        .nest("/api/v1", v1_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn create_v1_router<S: LedgerStore>(state: AppState<S>) -> Router<AppState<S>> {
    Router::new()
        .route("/transfers", post(ledger::transfer::<S>))
        .route("/entries/{entry_id}/confirm", post(ledger::confirm::<S>))
        .route("/entries/{entry_id}/decline", post(ledger::decline::<S>))
        .route("/wallets/{wallet_id}", get(ledger::wallet_balance::<S>))
        .route("/wallets/{wallet_id}/entries", get(ledger::wallet_entries::<S>))
        .route("/claims/rakeback", post(rewards::claim_rakeback::<S>))
        .route("/claims/duel-bots", post(rewards::claim_duel_bots::<S>))
        .route("/claims/affiliate", post(rewards::claim_affiliate::<S>))
        .route("/staking/stake", post(rewards::stake::<S>))
        .route("/staking/unstake", post(rewards::unstake::<S>))
        .route("/duel-bots", post(rewards::register_duel_bots::<S>))
        .route("/users/{user_id}/rakeback", get(rewards::rakeback_account::<S>))
        .route(
            "/users/{user_id}/rakeback/boost",
            post(rewards::set_rakeback_boost::<S>),
        )
        .route("/users/{user_id}/positions", get(rewards::staked_positions::<S>))
        .route(
            "/users/{user_id}/affiliate-codes",
            get(rewards::affiliate_codes::<S>),
        )
        .route("/affiliate-codes", post(rewards::create_affiliate_code::<S>))
        .route("/affiliations", post(rewards::activate_affiliation::<S>))
        .route(
            "/deposits/first-bonus",
            post(rewards::first_deposit_bonus::<S>),
        )
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::require_service_token::<S>,
        ))
}

/// Health check for monitoring and load balancers
///
/// Returns `200 OK` when storage answers, `503 Service Unavailable` otherwise.
///
/// ```bash
/// curl http://localhost:7070/health
/// # {"status":"healthy","storage":true,"version":"0.1.0","timestamp":"..."}
/// ```
async fn health_check<S: LedgerStore>(State(state): State<AppState<S>>) -> impl IntoResponse {
    let healthy = match state.ledger.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            false
        }
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "storage": healthy,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
