//! Ledger error types.

use super::models::{EntryId, EntryStatus, UserId};
use thiserror::Error;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Debit exceeds the chips or NFTs held by the wallet
    #[error(
        "Insufficient funds in wallet {wallet}: available {available}, required {required}, missing NFTs {missing_nfts:?}"
    )]
    InsufficientFunds {
        wallet: UserId,
        available: i64,
        required: i64,
        missing_nfts: Vec<String>,
    },

    /// Malformed request, rejected before any lock is taken
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Claim attempted on a zero-reward account
    #[error("Nothing to claim")]
    NothingToClaim,

    /// Confirm/decline on an entry that is no longer pending
    #[error("Ledger entry {entry} already finalized with status {status}")]
    AlreadyFinalized { entry: EntryId, status: EntryStatus },

    /// Could not acquire or use a working scope
    #[error("Session failure: {0}")]
    SessionFailure(String),

    /// Ledger entry not found
    #[error("Ledger entry {0} not found")]
    EntryNotFound(EntryId),

    /// Settlement request names a different owner than the entry
    #[error("Owner does not match ledger entry {0}")]
    OwnerMismatch(EntryId),

    /// NFT or affiliate code not owned by the caller
    #[error("Not owned by caller: {0}")]
    NotOwner(String),

    /// NFT is not registered as a staking position
    #[error("NFT {0} is not staking-eligible")]
    NotEligible(String),

    /// NFT already staked
    #[error("NFT {0} is already staked")]
    AlreadyStaked(String),

    /// NFT not staked by the caller
    #[error("NFT {0} is not staked by this user")]
    NotStaked(String),

    /// Affiliate code already exists
    #[error("Affiliate code already taken: {0}")]
    AffiliateCodeTaken(String),

    /// Affiliate code does not exist
    #[error("Affiliate code not found: {0}")]
    AffiliateCodeNotFound(String),

    /// User already has an active affiliation
    #[error("User {0} already has an affiliation")]
    AlreadyAffiliated(UserId),

    /// Affiliation attempted outside the activation window after signup
    #[error("Affiliate activation window has closed")]
    ActivationWindowClosed,

    /// Arithmetic overflow on a balance or counter
    #[error("Balance overflow")]
    BalanceOverflow,

    /// Stored row could not be decoded
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

impl LedgerError {
    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Storage failures and decoding problems collapse into a generic message,
    /// wallet ids are stripped from funding errors.
    pub fn client_message(&self) -> String {
        match self {
            LedgerError::Database(_)
            | LedgerError::SessionFailure(_)
            | LedgerError::CorruptRecord(_)
            | LedgerError::BalanceOverflow => "Internal server error".to_string(),
            LedgerError::InsufficientFunds { .. } => "Insufficient funds".to_string(),
            LedgerError::AlreadyAffiliated(_) => "User already has an affiliation".to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether the caller can recover by cancelling or refunding its own action
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            LedgerError::Database(_)
                | LedgerError::SessionFailure(_)
                | LedgerError::CorruptRecord(_)
        )
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
