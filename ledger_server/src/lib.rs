//! HTTP service around the chip ledger.
//!
//! - [`api`]: axum router and handlers
//! - [`config`]: environment configuration
//! - [`locks`]: per-user request guard
//! - [`logging`]: tracing setup and ledger event helpers

pub mod api;
pub mod config;
pub mod locks;
pub mod logging;
