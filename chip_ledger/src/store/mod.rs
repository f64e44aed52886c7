//! Storage abstraction for the ledger.
//!
//! Every read and write the ledger performs goes through [`LedgerStore`], scoped
//! to a store transaction (`Tx`). `lock_*` methods take an exclusive row lock
//! that is held until the transaction commits or rolls back; `find_*` methods
//! read without locking.
//!
//! Two backends are provided:
//! - [`PgLedgerStore`]: PostgreSQL via sqlx, row locks through `SELECT ... FOR UPDATE`
//! - [`MemoryStore`]: in-process tables with per-row async mutexes, for tests and embedding

use crate::ledger::{
    errors::LedgerResult,
    models::{
        BalanceLoad, BalanceSnapshot, EntryId, EntryStatus, LedgerEntry, NewLedgerEntry, UserId,
    },
};
use crate::rewards::models::{
    ActiveAffiliation, AffiliateAccount, ClaimKind, ClaimRecord, DuelBotPosition, RakebackAccount,
};
use async_trait::async_trait;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgLedgerStore;

/// Transactional storage for wallets, entries and sub-ledgers
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Store transaction holding row locks and uncommitted writes
    type Tx: Send + 'static;

    /// Begin a transaction
    async fn begin(&self) -> LedgerResult<Self::Tx>;

    /// Make all writes of the transaction visible and release its locks
    async fn commit(&self, tx: Self::Tx) -> LedgerResult<()>;

    /// Drop all writes of the transaction and release its locks
    async fn rollback(&self, tx: Self::Tx) -> LedgerResult<()>;

    /// Check the backend is reachable
    async fn health_check(&self) -> LedgerResult<()>;

    // --- balances ---

    /// Lock a wallet and return its current snapshot.
    ///
    /// A wallet seen for the first time is created with an empty snapshot.
    async fn lock_wallet(&self, tx: &mut Self::Tx, wallet: UserId)
    -> LedgerResult<BalanceSnapshot>;

    /// Current snapshot of a wallet without locking it
    async fn find_balance(
        &self,
        tx: &mut Self::Tx,
        wallet: UserId,
    ) -> LedgerResult<Option<BalanceSnapshot>>;

    /// Wallets whose current snapshot holds any of the NFTs, ascending
    async fn find_nft_holders(
        &self,
        tx: &mut Self::Tx,
        nft_ids: &[String],
    ) -> LedgerResult<Vec<UserId>>;

    /// Write `next` as the new current snapshot of a locked wallet.
    ///
    /// `prev` is demoted to history and the wallet is repointed.
    async fn replace_balance(
        &self,
        tx: &mut Self::Tx,
        wallet: UserId,
        prev: &BalanceSnapshot,
        next: &BalanceLoad,
    ) -> LedgerResult<BalanceSnapshot>;

    // --- ledger entries ---

    /// Record a ledger entry together with its moved-amount snapshot
    async fn insert_entry(
        &self,
        tx: &mut Self::Tx,
        entry: NewLedgerEntry,
    ) -> LedgerResult<LedgerEntry>;

    async fn find_entry(&self, tx: &mut Self::Tx, id: EntryId)
    -> LedgerResult<Option<LedgerEntry>>;

    async fn lock_entry(&self, tx: &mut Self::Tx, id: EntryId)
    -> LedgerResult<Option<LedgerEntry>>;

    async fn set_entry_status(
        &self,
        tx: &mut Self::Tx,
        id: EntryId,
        status: EntryStatus,
    ) -> LedgerResult<LedgerEntry>;

    /// Entries touching a wallet, newest first
    async fn wallet_entries(
        &self,
        tx: &mut Self::Tx,
        wallet: UserId,
        limit: Option<i64>,
    ) -> LedgerResult<Vec<LedgerEntry>>;

    // --- rakeback ---

    /// Lock a rakeback account, creating it with `base_rate_bps` if missing
    async fn lock_rakeback(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
        base_rate_bps: i64,
    ) -> LedgerResult<RakebackAccount>;

    async fn find_rakeback(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
    ) -> LedgerResult<Option<RakebackAccount>>;

    async fn save_rakeback(&self, tx: &mut Self::Tx, account: &RakebackAccount)
    -> LedgerResult<()>;

    // --- duel bot positions ---

    /// Create `Normal` positions for ids not yet registered; returns all of them
    async fn register_positions(
        &self,
        tx: &mut Self::Tx,
        nft_ids: &[String],
    ) -> LedgerResult<Vec<DuelBotPosition>>;

    /// Lock registered positions, in ascending nft id order; unknown ids are skipped
    async fn lock_positions(
        &self,
        tx: &mut Self::Tx,
        nft_ids: &[String],
    ) -> LedgerResult<Vec<DuelBotPosition>>;

    /// Lock every staked position, optionally only those of one staker
    async fn lock_staked_positions(
        &self,
        tx: &mut Self::Tx,
        staker: Option<UserId>,
    ) -> LedgerResult<Vec<DuelBotPosition>>;

    async fn find_staked_positions(
        &self,
        tx: &mut Self::Tx,
        staker: UserId,
    ) -> LedgerResult<Vec<DuelBotPosition>>;

    async fn save_position(&self, tx: &mut Self::Tx, position: &DuelBotPosition)
    -> LedgerResult<()>;

    // --- affiliates ---

    /// Insert a new code; `false` if the code already exists
    async fn insert_affiliate_code(
        &self,
        tx: &mut Self::Tx,
        account: &AffiliateAccount,
    ) -> LedgerResult<bool>;

    /// Lock codes in ascending order; unknown codes are skipped
    async fn lock_affiliate_codes(
        &self,
        tx: &mut Self::Tx,
        codes: &[String],
    ) -> LedgerResult<Vec<AffiliateAccount>>;

    async fn lock_owned_affiliate_codes(
        &self,
        tx: &mut Self::Tx,
        owner: UserId,
    ) -> LedgerResult<Vec<AffiliateAccount>>;

    async fn find_affiliate_codes(
        &self,
        tx: &mut Self::Tx,
        owner: UserId,
    ) -> LedgerResult<Vec<AffiliateAccount>>;

    async fn save_affiliate_code(
        &self,
        tx: &mut Self::Tx,
        account: &AffiliateAccount,
    ) -> LedgerResult<()>;

    async fn find_affiliation(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
    ) -> LedgerResult<Option<ActiveAffiliation>>;

    /// Lock the affiliation of a user, if any
    async fn lock_affiliation(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
    ) -> LedgerResult<Option<ActiveAffiliation>>;

    /// Insert an affiliation; `false` if the user already has one
    async fn insert_affiliation(
        &self,
        tx: &mut Self::Tx,
        affiliation: &ActiveAffiliation,
    ) -> LedgerResult<bool>;

    async fn save_affiliation(
        &self,
        tx: &mut Self::Tx,
        affiliation: &ActiveAffiliation,
    ) -> LedgerResult<()>;

    // --- claims ---

    async fn insert_claim(
        &self,
        tx: &mut Self::Tx,
        user: UserId,
        kind: ClaimKind,
        amount: i64,
    ) -> LedgerResult<ClaimRecord>;
}
