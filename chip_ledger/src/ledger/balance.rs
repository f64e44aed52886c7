//! Balance store operations and audit reads.

use super::{
    errors::{LedgerError, LedgerResult},
    manager::LedgerManager,
    models::{BalanceLoad, BalanceSnapshot, LedgerEntry, UserId},
    session::Session,
};
use crate::store::LedgerStore;

impl<S: LedgerStore> LedgerManager<S> {
    /// Remove a load from a wallet
    ///
    /// Locks the wallet (creating it empty if unseen) and writes a new
    /// snapshot. Nothing is written when the wallet cannot cover the load.
    ///
    /// # Returns
    ///
    /// * `(prev, next)` - Snapshots before and after the debit
    ///
    /// # Errors
    ///
    /// * `LedgerError::InsufficientFunds` - Chip shortfall or NFT not held
    pub async fn debit(
        &self,
        session: &mut Session<S>,
        wallet: UserId,
        load: &BalanceLoad,
    ) -> LedgerResult<(BalanceSnapshot, BalanceSnapshot)> {
        load.validate()?;

        let tx = session.tx()?;
        let prev = self.store.lock_wallet(tx, wallet).await?;
        let held = prev.load();
        let remaining = held
            .checked_sub(load)
            .ok_or_else(|| LedgerError::InsufficientFunds {
                wallet,
                available: held.chip,
                required: load.chip,
                missing_nfts: held.missing_nfts(load),
            })?;

        let next = self.store.replace_balance(tx, wallet, &prev, &remaining).await?;
        log::debug!(
            "Debited wallet {}: {} -> {} chips",
            wallet,
            prev.chip_amount,
            next.chip_amount
        );
        Ok((prev, next))
    }

    /// Add a load to a wallet
    ///
    /// # Errors
    ///
    /// * `LedgerError::InvalidParameter` - Wallet already holds one of the NFTs
    /// * `LedgerError::BalanceOverflow` - Chip total would overflow
    pub async fn credit(
        &self,
        session: &mut Session<S>,
        wallet: UserId,
        load: &BalanceLoad,
    ) -> LedgerResult<(BalanceSnapshot, BalanceSnapshot)> {
        load.validate()?;

        let tx = session.tx()?;
        let prev = self.store.lock_wallet(tx, wallet).await?;
        let held = prev.load();
        let total = match held.checked_add(load) {
            Some(total) => total,
            None => {
                let duplicates = held.overlapping_nfts(load);
                if duplicates.is_empty() {
                    return Err(LedgerError::BalanceOverflow);
                }
                return Err(LedgerError::InvalidParameter(format!(
                    "wallet {wallet} already holds NFTs {duplicates:?}"
                )));
            }
        };

        let next = self.store.replace_balance(tx, wallet, &prev, &total).await?;
        log::debug!(
            "Credited wallet {}: {} -> {} chips",
            wallet,
            prev.chip_amount,
            next.chip_amount
        );
        Ok((prev, next))
    }

    /// Current holdings of a wallet; an unseen wallet holds nothing
    pub async fn balance(
        &self,
        session: Option<&mut Session<S>>,
        wallet: UserId,
    ) -> LedgerResult<BalanceLoad> {
        let mut ws = self.sessions.get(session).await?;
        let result = self.current_load(ws.session(), wallet).await;
        ws.finish(&self.sessions, result).await
    }

    /// Ledger entries touching a wallet, newest first
    pub async fn entries(
        &self,
        session: Option<&mut Session<S>>,
        wallet: UserId,
        limit: Option<i64>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        if limit.is_some_and(|l| l < 0) {
            return Err(LedgerError::InvalidParameter(
                "limit must not be negative".to_string(),
            ));
        }

        let mut ws = self.sessions.get(session).await?;
        let result = match ws.session().tx() {
            Ok(tx) => self.store.wallet_entries(tx, wallet, limit).await,
            Err(e) => Err(e),
        };
        ws.finish(&self.sessions, result).await
    }

    async fn current_load(&self, session: &mut Session<S>, wallet: UserId) -> LedgerResult<BalanceLoad> {
        let snapshot = self.store.find_balance(session.tx()?, wallet).await?;
        Ok(snapshot.map(|s| s.load()).unwrap_or_default())
    }

    /// Rebuild a wallet's holdings from its ledger entries
    ///
    /// Every entry moved funds when it was written, whatever its status:
    /// declined entries are undone by their own reversal entries. The result
    /// must equal [`balance`](Self::balance).
    pub async fn replay_wallet(
        &self,
        session: Option<&mut Session<S>>,
        wallet: UserId,
    ) -> LedgerResult<BalanceLoad> {
        let mut entries = self.entries(session, wallet, None).await?;
        entries.reverse();

        entries
            .iter()
            .try_fold(BalanceLoad::default(), |held, entry| {
                apply_entry(held, wallet, entry)
            })
    }
}

fn apply_entry(held: BalanceLoad, wallet: UserId, entry: &LedgerEntry) -> LedgerResult<BalanceLoad> {
    let corrupt = || {
        LedgerError::CorruptRecord(format!(
            "entry {} cannot be replayed on wallet {}",
            entry.id, wallet
        ))
    };

    let mut held = held;
    if entry.from_wallet == Some(wallet) {
        held = held.checked_sub(&entry.amount_moved).ok_or_else(corrupt)?;
    }
    if entry.to_wallet == Some(wallet) {
        held = held.checked_add(&entry.amount_moved).ok_or_else(corrupt)?;
    }
    Ok(held)
}
