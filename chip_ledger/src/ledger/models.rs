//! Ledger data models.

use super::errors::{LedgerError, LedgerResult};
use super::fees::FEE_POOLS;
use crate::rewards::models::{ClaimRecord, DuelBotPosition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// User / wallet ID type
pub type UserId = i64;

/// Ledger entry ID type
pub type EntryId = i64;

/// Balance snapshot ID type
pub type BalanceId = i64;

/// Denominator for rates expressed in basis points
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Fixed house wallets.
///
/// Real users have positive ids; system wallets live on reserved negative ids
/// so the two ranges never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemWallet {
    CoinflipPot,
    CoinflipFee,
    JackpotPot,
    JackpotFee,
    DreamTowerPot,
    DreamTowerFee,
    CrashPot,
    CrashFee,
    /// Accrued, unclaimed rakeback
    RakebackPool,
    /// Accrued, unclaimed duel bot staking rewards
    StakingPool,
    /// Accrued, unclaimed affiliate commission
    AffiliatePool,
    /// Funds first-deposit bonuses for referred users
    FirstDepositBonusPool,
    /// Custody of staked duel bot NFTs
    StakingVault,
}

impl SystemWallet {
    pub const ALL: [SystemWallet; 13] = [
        SystemWallet::CoinflipPot,
        SystemWallet::CoinflipFee,
        SystemWallet::JackpotPot,
        SystemWallet::JackpotFee,
        SystemWallet::DreamTowerPot,
        SystemWallet::DreamTowerFee,
        SystemWallet::CrashPot,
        SystemWallet::CrashFee,
        SystemWallet::RakebackPool,
        SystemWallet::StakingPool,
        SystemWallet::AffiliatePool,
        SystemWallet::FirstDepositBonusPool,
        SystemWallet::StakingVault,
    ];

    /// Wallet id of this system account
    pub const fn id(self) -> UserId {
        match self {
            SystemWallet::CoinflipPot => -1,
            SystemWallet::CoinflipFee => -2,
            SystemWallet::JackpotPot => -3,
            SystemWallet::JackpotFee => -4,
            SystemWallet::DreamTowerPot => -5,
            SystemWallet::DreamTowerFee => -6,
            SystemWallet::CrashPot => -7,
            SystemWallet::CrashFee => -8,
            SystemWallet::RakebackPool => -20,
            SystemWallet::StakingPool => -21,
            SystemWallet::AffiliatePool => -22,
            SystemWallet::FirstDepositBonusPool => -23,
            SystemWallet::StakingVault => -24,
        }
    }

    /// Look up the system wallet behind an id
    pub fn from_id(id: UserId) -> Option<Self> {
        Self::ALL.iter().copied().find(|wallet| wallet.id() == id)
    }

    /// Whether an id belongs to the reserved system range
    pub fn is_system(id: UserId) -> bool {
        id < 0
    }
}

/// A chip amount plus a set of NFT ids.
///
/// Used both for what a wallet holds and for what a ledger entry moves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceLoad {
    #[serde(default)]
    pub chip: i64,
    #[serde(default)]
    pub nft_ids: BTreeSet<String>,
}

impl BalanceLoad {
    /// Chips only
    pub fn chips(amount: i64) -> Self {
        Self {
            chip: amount,
            nft_ids: BTreeSet::new(),
        }
    }

    /// NFTs only
    pub fn nfts<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            chip: 0,
            nft_ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Add NFTs to a load
    pub fn with_nfts<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.nft_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.chip == 0 && self.nft_ids.is_empty()
    }

    /// Reject negative chip amounts and blank NFT ids
    pub fn validate(&self) -> LedgerResult<()> {
        if self.chip < 0 {
            return Err(LedgerError::InvalidParameter(format!(
                "chip amount must not be negative, got {}",
                self.chip
            )));
        }
        if self.nft_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(LedgerError::InvalidParameter(
                "NFT ids must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// NFT ids requested by `other` that this load does not hold
    pub fn missing_nfts(&self, other: &BalanceLoad) -> Vec<String> {
        other.nft_ids.difference(&self.nft_ids).cloned().collect()
    }

    /// NFT ids present in both loads
    pub fn overlapping_nfts(&self, other: &BalanceLoad) -> Vec<String> {
        self.nft_ids.intersection(&other.nft_ids).cloned().collect()
    }

    /// `self - other`, or `None` if `other` is not fully covered
    pub fn checked_sub(&self, other: &BalanceLoad) -> Option<BalanceLoad> {
        if !other.nft_ids.is_subset(&self.nft_ids) {
            return None;
        }
        let chip = self.chip.checked_sub(other.chip).filter(|c| *c >= 0)?;
        Some(BalanceLoad {
            chip,
            nft_ids: self.nft_ids.difference(&other.nft_ids).cloned().collect(),
        })
    }

    /// `self + other`, or `None` on chip overflow or an NFT held twice
    pub fn checked_add(&self, other: &BalanceLoad) -> Option<BalanceLoad> {
        if !self.nft_ids.is_disjoint(&other.nft_ids) {
            return None;
        }
        let chip = self.chip.checked_add(other.chip)?;
        Some(BalanceLoad {
            chip,
            nft_ids: self.nft_ids.union(&other.nft_ids).cloned().collect(),
        })
    }
}

/// What a balance snapshot belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceOwnerKind {
    /// The one live balance of a wallet
    WalletCurrent,
    /// A superseded wallet balance
    History,
    /// The amount moved by a ledger entry
    InTransaction,
}

impl BalanceOwnerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BalanceOwnerKind::WalletCurrent => "wallet_current",
            BalanceOwnerKind::History => "history",
            BalanceOwnerKind::InTransaction => "in_transaction",
        }
    }
}

impl fmt::Display for BalanceOwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BalanceOwnerKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wallet_current" => Ok(BalanceOwnerKind::WalletCurrent),
            "history" => Ok(BalanceOwnerKind::History),
            "in_transaction" => Ok(BalanceOwnerKind::InTransaction),
            other => Err(LedgerError::CorruptRecord(format!(
                "unknown balance owner kind '{other}'"
            ))),
        }
    }
}

/// Immutable balance snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub id: BalanceId,
    pub owner_kind: BalanceOwnerKind,
    pub owner_id: i64,
    pub chip_amount: i64,
    pub nft_ids: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    pub fn load(&self) -> BalanceLoad {
        BalanceLoad {
            chip: self.chip_amount,
            nft_ids: self.nft_ids.clone(),
        }
    }
}

/// Ledger entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Succeed,
    Failed,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Succeed => "succeed",
            EntryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "succeed" => Ok(EntryStatus::Succeed),
            "failed" => Ok(EntryStatus::Failed),
            other => Err(LedgerError::CorruptRecord(format!(
                "unknown entry status '{other}'"
            ))),
        }
    }
}

/// Entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Deposit,
    Withdraw,
    Tip,
    CoinflipBet,
    CoinflipPayout,
    JackpotBet,
    JackpotPayout,
    DreamTowerBet,
    DreamTowerPayout,
    CrashBet,
    CrashPayout,
    PrizePool,
    Fee,
    RakebackShare,
    StakingShare,
    AffiliateShare,
    RakebackClaim,
    DuelBotClaim,
    AffiliateClaim,
    FirstDepositBonus,
    Stake,
    Unstake,
}

impl EntryType {
    pub const ALL: [EntryType; 22] = [
        EntryType::Deposit,
        EntryType::Withdraw,
        EntryType::Tip,
        EntryType::CoinflipBet,
        EntryType::CoinflipPayout,
        EntryType::JackpotBet,
        EntryType::JackpotPayout,
        EntryType::DreamTowerBet,
        EntryType::DreamTowerPayout,
        EntryType::CrashBet,
        EntryType::CrashPayout,
        EntryType::PrizePool,
        EntryType::Fee,
        EntryType::RakebackShare,
        EntryType::StakingShare,
        EntryType::AffiliateShare,
        EntryType::RakebackClaim,
        EntryType::DuelBotClaim,
        EntryType::AffiliateClaim,
        EntryType::FirstDepositBonus,
        EntryType::Stake,
        EntryType::Unstake,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Deposit => "deposit",
            EntryType::Withdraw => "withdraw",
            EntryType::Tip => "tip",
            EntryType::CoinflipBet => "coinflip_bet",
            EntryType::CoinflipPayout => "coinflip_payout",
            EntryType::JackpotBet => "jackpot_bet",
            EntryType::JackpotPayout => "jackpot_payout",
            EntryType::DreamTowerBet => "dream_tower_bet",
            EntryType::DreamTowerPayout => "dream_tower_payout",
            EntryType::CrashBet => "crash_bet",
            EntryType::CrashPayout => "crash_payout",
            EntryType::PrizePool => "prize_pool",
            EntryType::Fee => "fee",
            EntryType::RakebackShare => "rakeback_share",
            EntryType::StakingShare => "staking_share",
            EntryType::AffiliateShare => "affiliate_share",
            EntryType::RakebackClaim => "rakeback_claim",
            EntryType::DuelBotClaim => "duel_bot_claim",
            EntryType::AffiliateClaim => "affiliate_claim",
            EntryType::FirstDepositBonus => "first_deposit_bonus",
            EntryType::Stake => "stake",
            EntryType::Unstake => "unstake",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|entry_type| entry_type.as_str() == s)
            .ok_or_else(|| LedgerError::CorruptRecord(format!("unknown entry type '{s}'")))
    }
}

/// Kind of business event that owns a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    CoinflipRound,
    JackpotRound,
    DreamTowerRound,
    CrashRound,
    Payment,
    Claim,
    Tip,
    Staking,
    AffiliateBonus,
    Admin,
}

impl OwnerKind {
    pub const ALL: [OwnerKind; 10] = [
        OwnerKind::CoinflipRound,
        OwnerKind::JackpotRound,
        OwnerKind::DreamTowerRound,
        OwnerKind::CrashRound,
        OwnerKind::Payment,
        OwnerKind::Claim,
        OwnerKind::Tip,
        OwnerKind::Staking,
        OwnerKind::AffiliateBonus,
        OwnerKind::Admin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OwnerKind::CoinflipRound => "coinflip_round",
            OwnerKind::JackpotRound => "jackpot_round",
            OwnerKind::DreamTowerRound => "dream_tower_round",
            OwnerKind::CrashRound => "crash_round",
            OwnerKind::Payment => "payment",
            OwnerKind::Claim => "claim",
            OwnerKind::Tip => "tip",
            OwnerKind::Staking => "staking",
            OwnerKind::AffiliateBonus => "affiliate_bonus",
            OwnerKind::Admin => "admin",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| LedgerError::CorruptRecord(format!("unknown owner kind '{s}'")))
    }
}

/// Back-reference from a ledger entry to the business event that caused it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: OwnerKind,
    pub id: i64,
}

impl OwnerRef {
    pub fn new(kind: OwnerKind, id: i64) -> Self {
        Self { kind, id }
    }
}

/// Ledger entry model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub from_wallet: Option<UserId>,
    pub to_wallet: Option<UserId>,
    pub amount_moved: BalanceLoad,
    pub moved_balance_id: BalanceId,
    pub entry_type: EntryType,
    pub status: EntryStatus,
    pub from_prev_id: Option<BalanceId>,
    pub from_next_id: Option<BalanceId>,
    pub to_prev_id: Option<BalanceId>,
    pub to_next_id: Option<BalanceId>,
    pub owner: OwnerRef,
    pub reversal_of: Option<EntryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a ledger entry
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub from_wallet: Option<UserId>,
    pub to_wallet: Option<UserId>,
    pub amount_moved: BalanceLoad,
    pub entry_type: EntryType,
    pub status: EntryStatus,
    pub from_prev_id: Option<BalanceId>,
    pub from_next_id: Option<BalanceId>,
    pub to_prev_id: Option<BalanceId>,
    pub to_next_id: Option<BalanceId>,
    pub owner: OwnerRef,
    pub reversal_of: Option<EntryId>,
}

/// Fee metadata turning a transfer into a house-fee collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeMeta {
    /// User whose wager produced the fee
    pub wager_user: UserId,
    /// Size of the wager, credited to the referrer's wagered total
    pub wager_amount: i64,
    /// Fee base for the shares; defaults to the transferred chips
    #[serde(default)]
    pub fee_amount: Option<i64>,
    /// Skip the affiliate share (house-vs-house or bot wagers)
    #[serde(default)]
    pub suppress_affiliate_share: bool,
}

/// Transfer request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Debited wallet; `None` mints from outside (deposit)
    pub from: Option<UserId>,
    /// Credited wallet; `None` burns to outside (withdrawal)
    pub to: Option<UserId>,
    pub load: BalanceLoad,
    pub entry_type: EntryType,
    #[serde(default)]
    pub to_be_confirmed: bool,
    #[serde(default)]
    pub fee: Option<FeeMeta>,
    pub owner: OwnerRef,
}

impl TransferRequest {
    /// Immediate chip transfer between two parties
    pub fn chips(
        from: Option<UserId>,
        to: Option<UserId>,
        amount: i64,
        entry_type: EntryType,
        owner: OwnerRef,
    ) -> Self {
        Self {
            from,
            to,
            load: BalanceLoad::chips(amount),
            entry_type,
            to_be_confirmed: false,
            fee: None,
            owner,
        }
    }

    /// Mark the transfer pending until confirmed or declined
    pub fn pending(mut self) -> Self {
        self.to_be_confirmed = true;
        self
    }

    /// Attach fee metadata
    pub fn with_fee(mut self, fee: FeeMeta) -> Self {
        self.fee = Some(fee);
        self
    }

    /// Validate the request shape; runs before any lock is taken
    pub fn validate(&self) -> LedgerResult<()> {
        if self.from.is_none() && self.to.is_none() {
            return Err(LedgerError::InvalidParameter(
                "transfer needs at least one wallet".to_string(),
            ));
        }
        if self.from.is_some() && self.from == self.to {
            return Err(LedgerError::InvalidParameter(
                "cannot transfer a wallet to itself".to_string(),
            ));
        }
        self.load.validate()?;
        if self.load.is_empty() {
            return Err(LedgerError::InvalidParameter(
                "transfer moves nothing".to_string(),
            ));
        }

        if let Some(fee) = &self.fee {
            if self.to.is_none() {
                return Err(LedgerError::InvalidParameter(
                    "fee transfer needs a fee-collection wallet".to_string(),
                ));
            }
            if self.to_be_confirmed {
                return Err(LedgerError::InvalidParameter(
                    "fee transfers cannot be pending".to_string(),
                ));
            }
            if let Some(pool) = FEE_POOLS.iter().find(|pool| Some(pool.id()) == self.to) {
                return Err(LedgerError::InvalidParameter(format!(
                    "fee pool {pool:?} cannot collect a fee"
                )));
            }
            if self.load.chip <= 0 || !self.load.nft_ids.is_empty() {
                return Err(LedgerError::InvalidParameter(
                    "fee transfer must move chips only".to_string(),
                ));
            }
            if SystemWallet::is_system(fee.wager_user) || fee.wager_user == 0 {
                return Err(LedgerError::InvalidParameter(format!(
                    "wager user {} is not a player",
                    fee.wager_user
                )));
            }
            if fee.wager_amount < 0 {
                return Err(LedgerError::InvalidParameter(
                    "wager amount must not be negative".to_string(),
                ));
            }
            if let Some(amount) = fee.fee_amount {
                if amount < 0 || amount > self.load.chip {
                    return Err(LedgerError::InvalidParameter(format!(
                        "fee amount {amount} outside 0..={}",
                        self.load.chip
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Fee distribution summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeDistribution {
    /// Fee base the shares were computed from
    pub fee_amount: i64,
    pub rakeback: i64,
    pub staking: i64,
    /// Number of staked positions that shared `staking`
    pub staking_positions: usize,
    /// Staking share left with the house (nobody staked, or split remainder)
    pub staking_unpaid: i64,
    pub affiliate: i64,
    pub affiliate_code: Option<String>,
    /// What stays in the fee-collection wallet
    pub residual: i64,
    /// Ledger entries of the individual share movements
    pub legs: Vec<EntryId>,
}

impl FeeDistribution {
    /// Sum of the shares actually paid out
    pub fn distributed(&self) -> i64 {
        self.rakeback + self.staking + self.affiliate
    }
}

/// Result of a transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub entry: LedgerEntry,
    pub distribution: Option<FeeDistribution>,
}

impl TransferReceipt {
    /// Opaque handle for later confirm/decline
    pub fn entry_id(&self) -> EntryId {
        self.entry.id
    }
}

/// Confirm/decline request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleRequest {
    pub entry_id: EntryId,
    pub owner: OwnerRef,
}

/// Result of a decline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclineReceipt {
    pub declined: LedgerEntry,
    pub reversal: LedgerEntry,
}

/// Claim request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub nft_ids: Option<Vec<String>>,
    #[serde(default)]
    pub codes: Option<Vec<String>>,
}

/// Result of a reward claim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub claim: ClaimRecord,
    pub entry: LedgerEntry,
}

impl ClaimReceipt {
    pub fn claimed_amount(&self) -> i64 {
        self.claim.amount
    }
}

/// Stake/unstake request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRequest {
    pub user_id: UserId,
    pub nft_ids: Vec<String>,
}

/// Result of unstaking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnstakeReceipt {
    pub claimed_amount: i64,
    pub claim: Option<ClaimReceipt>,
    pub positions: Vec<DuelBotPosition>,
}
