//! Transfer engine: transfer, confirm and decline.

use super::{
    config::LedgerConfig,
    errors::{LedgerError, LedgerResult},
    fees::FEE_POOLS,
    models::{
        BalanceLoad, DeclineReceipt, EntryId, EntryStatus, EntryType, LedgerEntry, NewLedgerEntry,
        OwnerRef, SettleRequest, TransferReceipt, TransferRequest, UserId,
    },
    session::{Session, SessionManager},
};
use crate::store::LedgerStore;
use std::sync::Arc;

/// One value movement between two parties
pub(crate) struct Movement {
    pub from: Option<UserId>,
    pub to: Option<UserId>,
    pub load: BalanceLoad,
    pub entry_type: EntryType,
    pub status: EntryStatus,
    pub owner: OwnerRef,
    pub reversal_of: Option<EntryId>,
}

impl Movement {
    /// Immediate movement with no reversal link
    pub fn settled(
        from: Option<UserId>,
        to: Option<UserId>,
        load: BalanceLoad,
        entry_type: EntryType,
        owner: OwnerRef,
    ) -> Self {
        Self {
            from,
            to,
            load,
            entry_type,
            status: EntryStatus::Succeed,
            owner,
            reversal_of: None,
        }
    }
}

/// Ledger manager
///
/// Entry point for every value movement. Operations are spread over several
/// impl blocks: transfers here, balance access in `balance`, the fee cascade
/// in `fees`, and the sub-ledger operations under `rewards`.
pub struct LedgerManager<S: LedgerStore> {
    pub(crate) store: Arc<S>,
    pub(crate) sessions: SessionManager<S>,
    pub(crate) config: LedgerConfig,
}

impl<S: LedgerStore> Clone for LedgerManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            sessions: self.sessions.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: LedgerStore> LedgerManager<S> {
    /// Create a new ledger manager
    ///
    /// # Arguments
    ///
    /// * `store` - Storage backend
    /// * `config` - Fee rates and reward rules
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self {
            sessions: SessionManager::new(Arc::clone(&store)),
            store,
            config,
        }
    }

    pub fn sessions(&self) -> &SessionManager<S> {
        &self.sessions
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Check the storage backend is reachable
    pub async fn health_check(&self) -> LedgerResult<()> {
        self.store.health_check().await
    }

    /// Move chips and/or NFTs between two parties
    ///
    /// With `to_be_confirmed` the entry is recorded `Pending` and must later be
    /// confirmed or declined; funds move immediately either way. With fee
    /// metadata the credited amount is then split across the reward pools.
    ///
    /// # Arguments
    ///
    /// * `session` - Caller's session, or `None` for an implicit one
    /// * `request` - Transfer request
    ///
    /// # Returns
    ///
    /// * `LedgerResult<TransferReceipt>` - Recorded entry and fee distribution
    ///
    /// # Errors
    ///
    /// * `LedgerError::InvalidParameter` - Malformed request, nothing locked
    /// * `LedgerError::InsufficientFunds` - `from` does not hold the load
    pub async fn transfer(
        &self,
        session: Option<&mut Session<S>>,
        request: &TransferRequest,
    ) -> LedgerResult<TransferReceipt> {
        request.validate()?;

        let mut ws = self.sessions.get(session).await?;
        let result = self.transfer_in(ws.session(), request).await;
        ws.finish(&self.sessions, result).await
    }

    /// Mark a pending entry `Succeed`
    ///
    /// # Errors
    ///
    /// * `LedgerError::EntryNotFound` - Unknown entry
    /// * `LedgerError::OwnerMismatch` - Request names a different owner
    /// * `LedgerError::AlreadyFinalized` - Entry is not pending
    pub async fn confirm(
        &self,
        session: Option<&mut Session<S>>,
        request: &SettleRequest,
    ) -> LedgerResult<LedgerEntry> {
        let mut ws = self.sessions.get(session).await?;
        let result = self.confirm_in(ws.session(), request).await;
        ws.finish(&self.sessions, result).await
    }

    /// Mark a pending entry `Failed` and move its load back
    ///
    /// The reversal is a new `Succeed` entry with the wallets swapped and
    /// `reversal_of` pointing at the declined entry.
    ///
    /// # Errors
    ///
    /// Same as [`confirm`](Self::confirm), plus `LedgerError::InsufficientFunds`
    /// if the receiving wallet no longer holds the load.
    pub async fn decline(
        &self,
        session: Option<&mut Session<S>>,
        request: &SettleRequest,
    ) -> LedgerResult<DeclineReceipt> {
        let mut ws = self.sessions.get(session).await?;
        let result = self.decline_in(ws.session(), request).await;
        ws.finish(&self.sessions, result).await
    }

    /// Lock wallets in ascending id order
    ///
    /// Every operation locks all wallets it may touch through here before it
    /// touches any sub-ledger row.
    pub async fn lock_wallets(&self, session: &mut Session<S>, wallets: &[UserId]) -> LedgerResult<()> {
        let mut ordered = wallets.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let tx = session.tx()?;
        for wallet in ordered {
            self.store.lock_wallet(tx, wallet).await?;
        }
        Ok(())
    }

    async fn transfer_in(
        &self,
        session: &mut Session<S>,
        request: &TransferRequest,
    ) -> LedgerResult<TransferReceipt> {
        let mut wallets: Vec<UserId> = request.from.into_iter().chain(request.to).collect();
        if request.fee.is_some() {
            wallets.extend(FEE_POOLS.iter().map(|pool| pool.id()));
        }
        self.lock_wallets(session, &wallets).await?;

        let status = if request.to_be_confirmed {
            EntryStatus::Pending
        } else {
            EntryStatus::Succeed
        };

        let entry = self
            .move_funds(
                session,
                Movement {
                    from: request.from,
                    to: request.to,
                    load: request.load.clone(),
                    entry_type: request.entry_type,
                    status,
                    owner: request.owner,
                    reversal_of: None,
                },
            )
            .await?;

        log::info!(
            "Transfer {}: {:?} -> {:?}, {} chips, {} NFTs, {} ({})",
            entry.id,
            entry.from_wallet,
            entry.to_wallet,
            entry.amount_moved.chip,
            entry.amount_moved.nft_ids.len(),
            entry.entry_type,
            entry.status
        );

        let distribution = match (&request.fee, request.to) {
            (Some(fee), Some(fee_wallet)) => Some(
                self.distribute_fee(session, fee_wallet, fee, request.load.chip, request.owner)
                    .await?,
            ),
            _ => None,
        };

        Ok(TransferReceipt {
            entry,
            distribution,
        })
    }

    async fn confirm_in(
        &self,
        session: &mut Session<S>,
        request: &SettleRequest,
    ) -> LedgerResult<LedgerEntry> {
        self.lock_pending(session, request).await?;
        let entry = self
            .store
            .set_entry_status(session.tx()?, request.entry_id, EntryStatus::Succeed)
            .await?;

        log::info!("Entry {} confirmed", entry.id);
        Ok(entry)
    }

    async fn decline_in(
        &self,
        session: &mut Session<S>,
        request: &SettleRequest,
    ) -> LedgerResult<DeclineReceipt> {
        let pending = self.lock_pending(session, request).await?;

        let declined = self
            .store
            .set_entry_status(session.tx()?, pending.id, EntryStatus::Failed)
            .await?;

        let reversal = self
            .move_funds(
                session,
                Movement {
                    from: pending.to_wallet,
                    to: pending.from_wallet,
                    load: pending.amount_moved.clone(),
                    entry_type: pending.entry_type,
                    status: EntryStatus::Succeed,
                    owner: pending.owner,
                    reversal_of: Some(pending.id),
                },
            )
            .await?;

        log::info!("Entry {} declined, reversed by {}", declined.id, reversal.id);
        Ok(DeclineReceipt { declined, reversal })
    }

    /// Lock a pending entry and check it can still be settled by this owner
    ///
    /// Lock order is the entry's wallets in ascending id order, then the
    /// entry row, the same as a transfer followed by a settle in one session.
    /// The entry is read unlocked first to learn its wallets.
    async fn lock_pending(
        &self,
        session: &mut Session<S>,
        request: &SettleRequest,
    ) -> LedgerResult<LedgerEntry> {
        let seen = self
            .store
            .find_entry(session.tx()?, request.entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(request.entry_id))?;
        if seen.owner != request.owner {
            return Err(LedgerError::OwnerMismatch(seen.id));
        }

        let wallets: Vec<UserId> = seen.from_wallet.into_iter().chain(seen.to_wallet).collect();
        self.lock_wallets(session, &wallets).await?;

        let entry = self
            .store
            .lock_entry(session.tx()?, request.entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(request.entry_id))?;
        if (entry.from_wallet, entry.to_wallet) != (seen.from_wallet, seen.to_wallet) {
            return Err(LedgerError::CorruptRecord(format!(
                "entry {} changed parties while being settled",
                entry.id
            )));
        }

        if entry.owner != request.owner {
            return Err(LedgerError::OwnerMismatch(entry.id));
        }
        if entry.status != EntryStatus::Pending {
            return Err(LedgerError::AlreadyFinalized {
                entry: entry.id,
                status: entry.status,
            });
        }
        Ok(entry)
    }

    /// Debit, credit and record one movement; wallets must already be locked
    pub(crate) async fn move_funds(
        &self,
        session: &mut Session<S>,
        movement: Movement,
    ) -> LedgerResult<LedgerEntry> {
        if movement.from.is_none() && !movement.load.nft_ids.is_empty() {
            self.ensure_unheld(session, &movement.load).await?;
        }

        let (from_prev_id, from_next_id) = match movement.from {
            Some(wallet) => {
                let (prev, next) = self.debit(session, wallet, &movement.load).await?;
                (Some(prev.id), Some(next.id))
            }
            None => (None, None),
        };

        let (to_prev_id, to_next_id) = match movement.to {
            Some(wallet) => {
                let (prev, next) = self.credit(session, wallet, &movement.load).await?;
                (Some(prev.id), Some(next.id))
            }
            None => (None, None),
        };

        self.store
            .insert_entry(
                session.tx()?,
                NewLedgerEntry {
                    from_wallet: movement.from,
                    to_wallet: movement.to,
                    amount_moved: movement.load,
                    entry_type: movement.entry_type,
                    status: movement.status,
                    from_prev_id,
                    from_next_id,
                    to_prev_id,
                    to_next_id,
                    owner: movement.owner,
                    reversal_of: movement.reversal_of,
                },
            )
            .await
    }

    /// NFTs entering the ledger must not already sit in any wallet
    async fn ensure_unheld(
        &self,
        session: &mut Session<S>,
        load: &BalanceLoad,
    ) -> LedgerResult<()> {
        let nft_ids: Vec<String> = load.nft_ids.iter().cloned().collect();
        let holders = self.store.find_nft_holders(session.tx()?, &nft_ids).await?;
        if holders.is_empty() {
            return Ok(());
        }
        Err(LedgerError::InvalidParameter(format!(
            "NFTs {nft_ids:?} already held by wallets {holders:?}"
        )))
    }
}
