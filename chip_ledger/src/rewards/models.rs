//! Sub-ledger data models.

use crate::ledger::{
    errors::{LedgerError, LedgerResult},
    models::UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Claim record ID type
pub type ClaimId = i64;

/// Per-user rakeback account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RakebackAccount {
    pub user_id: UserId,
    pub total_earned: i64,
    /// Claimable rakeback
    pub reward: i64,
    pub base_rate_bps: i64,
    pub additional_rate_bps: i64,
    pub additional_rate_expiry: Option<DateTime<Utc>>,
}

impl RakebackAccount {
    pub fn new(user_id: UserId, base_rate_bps: i64) -> Self {
        Self {
            user_id,
            total_earned: 0,
            reward: 0,
            base_rate_bps,
            additional_rate_bps: 0,
            additional_rate_expiry: None,
        }
    }

    /// Base rate plus any unexpired boost, capped at `max_rate_bps`
    pub fn effective_rate_bps(&self, now: DateTime<Utc>, max_rate_bps: i64) -> i64 {
        let boost = match self.additional_rate_expiry {
            Some(expiry) if expiry > now => self.additional_rate_bps,
            Some(_) => 0,
            None => self.additional_rate_bps,
        };
        (self.base_rate_bps + boost).clamp(0, max_rate_bps)
    }

    pub fn accrue(&mut self, amount: i64) -> LedgerResult<()> {
        self.reward = self
            .reward
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        self.total_earned = self
            .total_earned
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        Ok(())
    }
}

/// Staking status of a duel bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuelBotStatus {
    Normal,
    Staked,
}

impl DuelBotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DuelBotStatus::Normal => "normal",
            DuelBotStatus::Staked => "staked",
        }
    }
}

impl fmt::Display for DuelBotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuelBotStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(DuelBotStatus::Normal),
            "staked" => Ok(DuelBotStatus::Staked),
            other => Err(LedgerError::CorruptRecord(format!(
                "unknown duel bot status '{other}'"
            ))),
        }
    }
}

/// Staking position of one duel bot NFT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuelBotPosition {
    pub nft_id: String,
    pub status: DuelBotStatus,
    pub staking_user_id: Option<UserId>,
    pub total_earned: i64,
    /// Claimable by `staking_user_id`
    pub staking_reward: i64,
    pub staked_at: Option<DateTime<Utc>>,
}

impl DuelBotPosition {
    pub fn new(nft_id: impl Into<String>) -> Self {
        Self {
            nft_id: nft_id.into(),
            status: DuelBotStatus::Normal,
            staking_user_id: None,
            total_earned: 0,
            staking_reward: 0,
            staked_at: None,
        }
    }

    pub fn is_staked_by(&self, user_id: UserId) -> bool {
        self.status == DuelBotStatus::Staked && self.staking_user_id == Some(user_id)
    }

    pub fn accrue(&mut self, amount: i64) -> LedgerResult<()> {
        self.staking_reward = self
            .staking_reward
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        self.total_earned = self
            .total_earned
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        Ok(())
    }
}

/// Affiliate code and its accrued commission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateAccount {
    pub code: String,
    pub owner_id: UserId,
    pub total_wagered: i64,
    pub total_earned: i64,
    /// Claimable commission
    pub reward: i64,
    /// Overrides the platform affiliate rate
    pub custom_rate_bps: Option<i64>,
    /// Referred users get a bonus on their first deposit
    pub first_deposit_bonus: bool,
    pub created_at: DateTime<Utc>,
}

impl AffiliateAccount {
    pub fn new(
        code: impl Into<String>,
        owner_id: UserId,
        custom_rate_bps: Option<i64>,
        first_deposit_bonus: bool,
    ) -> Self {
        Self {
            code: code.into(),
            owner_id,
            total_wagered: 0,
            total_earned: 0,
            reward: 0,
            custom_rate_bps,
            first_deposit_bonus,
            created_at: Utc::now(),
        }
    }

    /// Whether a string is a well-formed code: 3 to 32 of `[A-Za-z0-9_]`
    pub fn is_valid_code(code: &str) -> bool {
        (3..=32).contains(&code.len())
            && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    pub fn record_wager(&mut self, amount: i64) -> LedgerResult<()> {
        self.total_wagered = self
            .total_wagered
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        Ok(())
    }

    pub fn accrue(&mut self, amount: i64) -> LedgerResult<()> {
        self.reward = self
            .reward
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        self.total_earned = self
            .total_earned
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        Ok(())
    }
}

/// Link between a referred user and the code they signed up with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveAffiliation {
    pub user_id: UserId,
    pub code: String,
    pub activated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub first_deposit_done: bool,
}

impl ActiveAffiliation {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expiry| expiry > now)
    }
}

/// Which sub-ledger a claim drew from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    Rakeback,
    DuelBots,
    Affiliate,
}

impl ClaimKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimKind::Rakeback => "rakeback",
            ClaimKind::DuelBots => "duel_bots",
            ClaimKind::Affiliate => "affiliate",
        }
    }
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rakeback" => Ok(ClaimKind::Rakeback),
            "duel_bots" => Ok(ClaimKind::DuelBots),
            "affiliate" => Ok(ClaimKind::Affiliate),
            other => Err(LedgerError::CorruptRecord(format!(
                "unknown claim kind '{other}'"
            ))),
        }
    }
}

/// Claim record, the owner of a claim transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub id: ClaimId,
    pub user_id: UserId,
    pub kind: ClaimKind,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_rakeback_rate_includes_unexpired_boost() {
        let now = Utc::now();
        let mut account = RakebackAccount::new(1, 500);
        account.additional_rate_bps = 300;
        account.additional_rate_expiry = Some(now + Duration::hours(1));
        assert_eq!(account.effective_rate_bps(now, 2000), 800);

        account.additional_rate_expiry = Some(now - Duration::seconds(1));
        assert_eq!(account.effective_rate_bps(now, 2000), 500);
    }

    #[test]
    fn test_rakeback_rate_capped() {
        let mut account = RakebackAccount::new(1, 1500);
        account.additional_rate_bps = 1000;
        assert_eq!(account.effective_rate_bps(Utc::now(), 2000), 2000);
    }

    #[test]
    fn test_affiliation_expiry() {
        let now = Utc::now();
        let mut affiliation = ActiveAffiliation {
            user_id: 2,
            code: "ALPHA".to_string(),
            activated_at: now,
            expires_at: None,
            first_deposit_done: false,
        };
        assert!(affiliation.is_active(now));
        affiliation.expires_at = Some(now - Duration::minutes(1));
        assert!(!affiliation.is_active(now));
    }

    #[test]
    fn test_affiliate_code_format() {
        assert!(AffiliateAccount::is_valid_code("ALPHA_7"));
        assert!(AffiliateAccount::is_valid_code("abc"));
        assert!(!AffiliateAccount::is_valid_code("ab"));
        assert!(!AffiliateAccount::is_valid_code("has space"));
        assert!(!AffiliateAccount::is_valid_code("dash-code"));
        assert!(!AffiliateAccount::is_valid_code(&"x".repeat(33)));
    }

    #[test]
    fn test_position_accrue_tracks_totals() {
        let mut position = DuelBotPosition::new("bot-1");
        position.accrue(40).unwrap();
        position.accrue(2).unwrap();
        assert_eq!(position.staking_reward, 42);
        assert_eq!(position.total_earned, 42);
        position.staking_reward = i64::MAX;
        assert!(matches!(
            position.accrue(1),
            Err(LedgerError::BalanceOverflow)
        ));
    }
}
