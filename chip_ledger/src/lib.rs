//! # Chip Ledger
//!
//! Internal value ledger for a casino platform. Every movement of chips or
//! NFTs between users, game pots and house wallets is recorded as a ledger
//! entry linked to immutable balance snapshots, so any wallet can be audited
//! back to zero.
//!
//! ## Architecture
//!
//! - **Sessions**: every operation runs inside a [`Session`]. Callers may pass
//!   their own to compose several operations atomically; otherwise one is
//!   opened and committed (or rolled back) around the single call.
//! - **Transfers**: debit, credit and a ledger entry, optionally `Pending`
//!   until confirmed or declined. A declined entry is undone by a reversal.
//! - **Fee cascade**: a transfer carrying fee metadata splits the collected
//!   fee into rakeback, duel bot staking and affiliate shares. Each share is a
//!   real chip movement into a pool wallet, so totals are conserved.
//! - **Rewards**: claims zero the accrued sub-ledger reward and pay the same
//!   amount out of the pool wallet.
//!
//! ## Core Modules
//!
//! - [`ledger`]: manager, sessions, balances, transfers and the fee cascade
//! - [`rewards`]: rakeback, duel bot staking and affiliate sub-ledgers
//! - [`store`]: storage trait with PostgreSQL and in-memory backends
//! - [`db`]: connection pool, configuration and migrations
//!
//! ## Example
//!
//! ```
//! use chip_ledger::{
//!     EntryType, LedgerConfig, LedgerManager, MemoryStore, OwnerKind, OwnerRef,
//!     TransferRequest,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), chip_ledger::LedgerError> {
//! let ledger = LedgerManager::new(Arc::new(MemoryStore::new()), LedgerConfig::default());
//! let deposit = TransferRequest::chips(
//!     None,
//!     Some(1),
//!     500,
//!     EntryType::Deposit,
//!     OwnerRef::new(OwnerKind::Payment, 1),
//! );
//! ledger.transfer(None, &deposit).await?;
//! assert_eq!(ledger.balance(None, 1).await?.chip, 500);
//! # Ok(())
//! # }
//! ```

/// Database connection pooling, configuration and migrations.
pub mod db;

/// Ledger core: sessions, balances, transfers and fee distribution.
pub mod ledger;
pub use ledger::{
    BalanceLoad, BalanceSnapshot, ClaimReceipt, ClaimRequest, ConfigError, DeclineReceipt,
    EntryId, EntryStatus, EntryType, FeeDistribution, FeeMeta, LedgerConfig, LedgerEntry,
    LedgerError, LedgerManager, LedgerResult, OwnerKind, OwnerRef, Session, SettleRequest,
    StakeRequest, StakingScope, SystemWallet, TransferReceipt, TransferRequest, UnstakeReceipt,
    UserId, share_of, split_evenly,
};

/// Reward sub-ledgers.
pub mod rewards;
pub use rewards::{
    ActiveAffiliation, AffiliateAccount, ClaimKind, ClaimRecord, DuelBotPosition, DuelBotStatus,
    RakebackAccount,
};

/// Storage backends.
pub mod store;
pub use store::{LedgerStore, MemoryStore, PgLedgerStore};
