//! Reward sub-ledgers: rakeback, duel bot staking and affiliates.
//!
//! Shares accrue here during the fee cascade while the matching chips sit in
//! a pool wallet. A claim zeroes the accrued reward, writes a [`ClaimRecord`]
//! and moves the same amount from the pool to the user.

pub mod affiliate;
pub mod models;
pub mod rakeback;
pub mod staking;

pub use models::{
    ActiveAffiliation, AffiliateAccount, ClaimId, ClaimKind, ClaimRecord, DuelBotPosition,
    DuelBotStatus, RakebackAccount,
};

use crate::ledger::{
    errors::{LedgerError, LedgerResult},
    manager::{LedgerManager, Movement},
    models::{
        BalanceLoad, ClaimReceipt, EntryType, OwnerKind, OwnerRef, SystemWallet, UserId,
    },
    session::Session,
};
use crate::store::LedgerStore;
use std::collections::BTreeSet;

impl<S: LedgerStore> LedgerManager<S> {
    /// Record a claim and pay it out of `pool`; wallets must already be locked
    pub(crate) async fn pay_claim(
        &self,
        session: &mut Session<S>,
        user: UserId,
        kind: ClaimKind,
        amount: i64,
        pool: SystemWallet,
        entry_type: EntryType,
    ) -> LedgerResult<ClaimReceipt> {
        let claim = self
            .store
            .insert_claim(session.tx()?, user, kind, amount)
            .await?;

        let entry = self
            .move_funds(
                session,
                Movement::settled(
                    Some(pool.id()),
                    Some(user),
                    BalanceLoad::chips(amount),
                    entry_type,
                    OwnerRef::new(OwnerKind::Claim, claim.id),
                ),
            )
            .await?;

        log::info!(
            "User {} claimed {} {} (claim {}, entry {})",
            user,
            amount,
            kind,
            claim.id,
            entry.id
        );
        Ok(ClaimReceipt { claim, entry })
    }
}

/// Reject system wallets and non-positive ids as reward holders
pub(crate) fn ensure_player(user: UserId) -> LedgerResult<()> {
    if user <= 0 {
        return Err(LedgerError::InvalidParameter(format!(
            "user {user} is not a player"
        )));
    }
    Ok(())
}

/// Sorted, deduplicated, non-empty list of non-blank ids
pub(crate) fn normalize_ids(ids: &[String], what: &str) -> LedgerResult<Vec<String>> {
    if ids.iter().any(|id| id.trim().is_empty()) {
        return Err(LedgerError::InvalidParameter(format!(
            "{what} must not be blank"
        )));
    }
    let unique: BTreeSet<&String> = ids.iter().collect();
    if unique.is_empty() {
        return Err(LedgerError::InvalidParameter(format!(
            "at least one {what} is required"
        )));
    }
    Ok(unique.into_iter().cloned().collect())
}

/// Sum of rewards, failing on overflow
pub(crate) fn total_reward(rewards: impl IntoIterator<Item = i64>) -> LedgerResult<i64> {
    rewards
        .into_iter()
        .try_fold(0i64, |sum, reward| sum.checked_add(reward))
        .ok_or(LedgerError::BalanceOverflow)
}
