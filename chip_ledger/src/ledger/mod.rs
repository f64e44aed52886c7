//! Ledger core: sessions, balances, transfers and the fee cascade.

pub mod balance;
pub mod config;
pub mod errors;
pub mod fees;
pub mod manager;
pub mod models;
pub mod session;

pub use config::{AffiliateConfig, ConfigError, FeePolicy, LedgerConfig, RakebackConfig, StakingScope};
pub use errors::{LedgerError, LedgerResult};
pub use fees::{share_of, split_evenly};
pub use manager::LedgerManager;
pub use models::{
    BalanceLoad, BalanceSnapshot, ClaimReceipt, ClaimRequest, DeclineReceipt, EntryId,
    EntryStatus, EntryType, FeeDistribution, FeeMeta, LedgerEntry, OwnerKind, OwnerRef,
    SettleRequest, StakeRequest, SystemWallet, TransferReceipt, TransferRequest, UnstakeReceipt,
    UserId,
};
pub use session::{Session, SessionManager, WorkingSet};
