//! In-memory ledger store.
//!
//! Committed tables sit behind a plain mutex that is only held for the
//! duration of a copy or merge. Row locks are per-key `tokio` mutexes; a
//! transaction keeps the owned guards until commit or rollback, so a second
//! transaction touching the same row waits exactly as it would on a
//! `FOR UPDATE` lock. Writes go to the transaction's own tables and are merged
//! into the committed tables on commit.

use super::LedgerStore;
use crate::ledger::{
    errors::{LedgerError, LedgerResult},
    models::{
        BalanceLoad, BalanceOwnerKind, BalanceSnapshot, EntryId, EntryStatus, LedgerEntry,
        NewLedgerEntry, UserId,
    },
};
use crate::rewards::models::{
    ActiveAffiliation, AffiliateAccount, ClaimId, ClaimKind, ClaimRecord, DuelBotPosition,
    DuelBotStatus, RakebackAccount,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Wallet(UserId),
    Entry(EntryId),
    Rakeback(UserId),
    Position(String),
    AffiliateCode(String),
    Affiliation(UserId),
}

#[derive(Debug, Clone, Default)]
struct Tables {
    balances: HashMap<i64, BalanceSnapshot>,
    wallets: HashMap<UserId, i64>,
    entries: BTreeMap<EntryId, LedgerEntry>,
    rakeback: HashMap<UserId, RakebackAccount>,
    positions: BTreeMap<String, DuelBotPosition>,
    affiliate_codes: BTreeMap<String, AffiliateAccount>,
    affiliations: HashMap<UserId, ActiveAffiliation>,
    claims: BTreeMap<ClaimId, ClaimRecord>,
}

impl Tables {
    fn merge(&mut self, other: Tables) {
        self.balances.extend(other.balances);
        self.wallets.extend(other.wallets);
        self.entries.extend(other.entries);
        self.rakeback.extend(other.rakeback);
        self.positions.extend(other.positions);
        self.affiliate_codes.extend(other.affiliate_codes);
        self.affiliations.extend(other.affiliations);
        self.claims.extend(other.claims);
    }
}

#[derive(Default)]
struct Shared {
    committed: Mutex<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<RowMutex<()>>>>,
    next_id: AtomicI64,
}

/// In-memory implementation of [`LedgerStore`]
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

/// Transaction of a [`MemoryStore`]
#[derive(Default)]
pub struct MemoryTx {
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    pending: Tables,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of row locks currently tracked
    pub fn tracked_locks(&self) -> usize {
        self.row_locks().len()
    }

    /// Every snapshot ever written for a wallet, oldest first
    pub fn balance_history(&self, wallet: UserId) -> Vec<BalanceSnapshot> {
        let mut history: Vec<_> = self
            .committed()
            .balances
            .values()
            .filter(|snapshot| {
                snapshot.owner_id == wallet
                    && snapshot.owner_kind != BalanceOwnerKind::InTransaction
            })
            .cloned()
            .collect();
        history.sort_by_key(|snapshot| snapshot.id);
        history
    }

    fn committed(&self) -> MutexGuard<'_, Tables> {
        self.shared
            .committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn row_locks(&self) -> MutexGuard<'_, HashMap<RowKey, Arc<RowMutex<()>>>> {
        self.shared
            .row_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> i64 {
        self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn acquire(&self, tx: &mut MemoryTx, key: RowKey) {
        if tx.held.contains_key(&key) {
            return;
        }
        let lock = {
            let mut locks = self.row_locks();
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = lock.lock_owned().await;
        tx.held.insert(key, guard);
    }

    /// Release row locks and forget the ones nobody else is waiting on
    fn release(&self, held: HashMap<RowKey, OwnedMutexGuard<()>>) {
        let keys: Vec<RowKey> = held.keys().cloned().collect();
        drop(held);
        let mut locks = self.row_locks();
        for key in keys {
            if locks
                .get(&key)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(&key);
            }
        }
    }

    /// Read through the transaction's own writes to committed state
    fn read<T>(&self, tx: &MemoryTx, f: impl Fn(&Tables) -> Option<T>) -> Option<T> {
        f(&tx.pending).or_else(|| f(&self.committed()))
    }

    fn current_snapshot(&self, tx: &MemoryTx, wallet: UserId) -> Option<BalanceSnapshot> {
        let id = self.read(tx, |t| t.wallets.get(&wallet).copied())?;
        self.read(tx, |t| t.balances.get(&id).cloned())
    }

    fn positions_view(&self, tx: &MemoryTx) -> BTreeMap<String, DuelBotPosition> {
        let mut view = self.committed().positions.clone();
        view.extend(tx.pending.positions.clone());
        view
    }

    fn affiliate_codes_view(&self, tx: &MemoryTx) -> BTreeMap<String, AffiliateAccount> {
        let mut view = self.committed().affiliate_codes.clone();
        view.extend(tx.pending.affiliate_codes.clone());
        view
    }

    fn sorted_unique(ids: &[String]) -> Vec<String> {
        ids.iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> LedgerResult<MemoryTx> {
        Ok(MemoryTx::default())
    }

    async fn commit(&self, tx: MemoryTx) -> LedgerResult<()> {
        let MemoryTx { held, pending } = tx;
        self.committed().merge(pending);
        self.release(held);
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> LedgerResult<()> {
        self.release(tx.held);
        Ok(())
    }

    async fn health_check(&self) -> LedgerResult<()> {
        Ok(())
    }

    async fn lock_wallet(&self, tx: &mut MemoryTx, wallet: UserId) -> LedgerResult<BalanceSnapshot> {
        self.acquire(tx, RowKey::Wallet(wallet)).await;
        if let Some(snapshot) = self.current_snapshot(tx, wallet) {
            return Ok(snapshot);
        }

        let snapshot = BalanceSnapshot {
            id: self.next_id(),
            owner_kind: BalanceOwnerKind::WalletCurrent,
            owner_id: wallet,
            chip_amount: 0,
            nft_ids: BTreeSet::new(),
            created_at: Utc::now(),
        };
        tx.pending.balances.insert(snapshot.id, snapshot.clone());
        tx.pending.wallets.insert(wallet, snapshot.id);
        Ok(snapshot)
    }

    async fn find_balance(
        &self,
        tx: &mut MemoryTx,
        wallet: UserId,
    ) -> LedgerResult<Option<BalanceSnapshot>> {
        Ok(self.current_snapshot(tx, wallet))
    }

    async fn find_nft_holders(
        &self,
        tx: &mut MemoryTx,
        nft_ids: &[String],
    ) -> LedgerResult<Vec<UserId>> {
        let wallets: BTreeSet<UserId> = {
            let committed = self.committed();
            committed
                .wallets
                .keys()
                .chain(tx.pending.wallets.keys())
                .copied()
                .collect()
        };
        Ok(wallets
            .into_iter()
            .filter(|wallet| {
                self.current_snapshot(tx, *wallet).is_some_and(|snapshot| {
                    nft_ids.iter().any(|id| snapshot.nft_ids.contains(id))
                })
            })
            .collect())
    }

    async fn replace_balance(
        &self,
        tx: &mut MemoryTx,
        wallet: UserId,
        prev: &BalanceSnapshot,
        next: &BalanceLoad,
    ) -> LedgerResult<BalanceSnapshot> {
        self.acquire(tx, RowKey::Wallet(wallet)).await;

        let demoted = BalanceSnapshot {
            owner_kind: BalanceOwnerKind::History,
            ..prev.clone()
        };
        tx.pending.balances.insert(demoted.id, demoted);

        let snapshot = BalanceSnapshot {
            id: self.next_id(),
            owner_kind: BalanceOwnerKind::WalletCurrent,
            owner_id: wallet,
            chip_amount: next.chip,
            nft_ids: next.nft_ids.clone(),
            created_at: Utc::now(),
        };
        tx.pending.balances.insert(snapshot.id, snapshot.clone());
        tx.pending.wallets.insert(wallet, snapshot.id);
        Ok(snapshot)
    }

    async fn insert_entry(
        &self,
        tx: &mut MemoryTx,
        entry: NewLedgerEntry,
    ) -> LedgerResult<LedgerEntry> {
        let now = Utc::now();
        let id = self.next_id();
        let moved = BalanceSnapshot {
            id: self.next_id(),
            owner_kind: BalanceOwnerKind::InTransaction,
            owner_id: id,
            chip_amount: entry.amount_moved.chip,
            nft_ids: entry.amount_moved.nft_ids.clone(),
            created_at: now,
        };

        let record = LedgerEntry {
            id,
            from_wallet: entry.from_wallet,
            to_wallet: entry.to_wallet,
            amount_moved: entry.amount_moved,
            moved_balance_id: moved.id,
            entry_type: entry.entry_type,
            status: entry.status,
            from_prev_id: entry.from_prev_id,
            from_next_id: entry.from_next_id,
            to_prev_id: entry.to_prev_id,
            to_next_id: entry.to_next_id,
            owner: entry.owner,
            reversal_of: entry.reversal_of,
            created_at: now,
            updated_at: now,
        };

        tx.pending.balances.insert(moved.id, moved);
        tx.pending.entries.insert(id, record.clone());
        Ok(record)
    }

    async fn find_entry(&self, tx: &mut MemoryTx, id: EntryId) -> LedgerResult<Option<LedgerEntry>> {
        Ok(self.read(tx, |t| t.entries.get(&id).cloned()))
    }

    async fn lock_entry(&self, tx: &mut MemoryTx, id: EntryId) -> LedgerResult<Option<LedgerEntry>> {
        self.acquire(tx, RowKey::Entry(id)).await;
        Ok(self.read(tx, |t| t.entries.get(&id).cloned()))
    }

    async fn set_entry_status(
        &self,
        tx: &mut MemoryTx,
        id: EntryId,
        status: EntryStatus,
    ) -> LedgerResult<LedgerEntry> {
        self.acquire(tx, RowKey::Entry(id)).await;
        let mut entry = self
            .read(tx, |t| t.entries.get(&id).cloned())
            .ok_or(LedgerError::EntryNotFound(id))?;
        entry.status = status;
        entry.updated_at = Utc::now();
        tx.pending.entries.insert(id, entry.clone());
        Ok(entry)
    }

    async fn wallet_entries(
        &self,
        tx: &mut MemoryTx,
        wallet: UserId,
        limit: Option<i64>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let touches = |entry: &LedgerEntry| {
            entry.from_wallet == Some(wallet) || entry.to_wallet == Some(wallet)
        };

        let mut view: BTreeMap<EntryId, LedgerEntry> = self
            .committed()
            .entries
            .values()
            .filter(|entry| touches(entry))
            .map(|entry| (entry.id, entry.clone()))
            .collect();
        view.extend(
            tx.pending
                .entries
                .values()
                .filter(|entry| touches(entry))
                .map(|entry| (entry.id, entry.clone())),
        );

        let limit = limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(0));
        Ok(view.into_values().rev().take(limit).collect())
    }

    async fn lock_rakeback(
        &self,
        tx: &mut MemoryTx,
        user: UserId,
        base_rate_bps: i64,
    ) -> LedgerResult<RakebackAccount> {
        self.acquire(tx, RowKey::Rakeback(user)).await;
        if let Some(account) = self.read(tx, |t| t.rakeback.get(&user).cloned()) {
            return Ok(account);
        }
        let account = RakebackAccount::new(user, base_rate_bps);
        tx.pending.rakeback.insert(user, account.clone());
        Ok(account)
    }

    async fn find_rakeback(
        &self,
        tx: &mut MemoryTx,
        user: UserId,
    ) -> LedgerResult<Option<RakebackAccount>> {
        Ok(self.read(tx, |t| t.rakeback.get(&user).cloned()))
    }

    async fn save_rakeback(&self, tx: &mut MemoryTx, account: &RakebackAccount) -> LedgerResult<()> {
        self.acquire(tx, RowKey::Rakeback(account.user_id)).await;
        tx.pending.rakeback.insert(account.user_id, account.clone());
        Ok(())
    }

    async fn register_positions(
        &self,
        tx: &mut MemoryTx,
        nft_ids: &[String],
    ) -> LedgerResult<Vec<DuelBotPosition>> {
        let mut positions = Vec::new();
        for nft_id in Self::sorted_unique(nft_ids) {
            self.acquire(tx, RowKey::Position(nft_id.clone())).await;
            let position = match self.read(tx, |t| t.positions.get(&nft_id).cloned()) {
                Some(position) => position,
                None => {
                    let position = DuelBotPosition::new(nft_id.clone());
                    tx.pending.positions.insert(nft_id, position.clone());
                    position
                }
            };
            positions.push(position);
        }
        Ok(positions)
    }

    async fn lock_positions(
        &self,
        tx: &mut MemoryTx,
        nft_ids: &[String],
    ) -> LedgerResult<Vec<DuelBotPosition>> {
        let mut positions = Vec::new();
        for nft_id in Self::sorted_unique(nft_ids) {
            self.acquire(tx, RowKey::Position(nft_id.clone())).await;
            if let Some(position) = self.read(tx, |t| t.positions.get(&nft_id).cloned()) {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    async fn lock_staked_positions(
        &self,
        tx: &mut MemoryTx,
        staker: Option<UserId>,
    ) -> LedgerResult<Vec<DuelBotPosition>> {
        let matches = |position: &DuelBotPosition| match staker {
            Some(user) => position.is_staked_by(user),
            None => position.status == DuelBotStatus::Staked,
        };

        let candidates: Vec<String> = self
            .positions_view(tx)
            .into_values()
            .filter(|position| matches(position))
            .map(|position| position.nft_id)
            .collect();

        // Re-check after each lock: the position may have been unstaked while we waited.
        let mut positions = Vec::new();
        for nft_id in candidates {
            self.acquire(tx, RowKey::Position(nft_id.clone())).await;
            if let Some(position) = self.read(tx, |t| t.positions.get(&nft_id).cloned()) {
                if matches(&position) {
                    positions.push(position);
                }
            }
        }
        Ok(positions)
    }

    async fn find_staked_positions(
        &self,
        tx: &mut MemoryTx,
        staker: UserId,
    ) -> LedgerResult<Vec<DuelBotPosition>> {
        Ok(self
            .positions_view(tx)
            .into_values()
            .filter(|position| position.is_staked_by(staker))
            .collect())
    }

    async fn save_position(&self, tx: &mut MemoryTx, position: &DuelBotPosition) -> LedgerResult<()> {
        self.acquire(tx, RowKey::Position(position.nft_id.clone()))
            .await;
        tx.pending
            .positions
            .insert(position.nft_id.clone(), position.clone());
        Ok(())
    }

    async fn insert_affiliate_code(
        &self,
        tx: &mut MemoryTx,
        account: &AffiliateAccount,
    ) -> LedgerResult<bool> {
        self.acquire(tx, RowKey::AffiliateCode(account.code.clone()))
            .await;
        if self
            .read(tx, |t| t.affiliate_codes.get(&account.code).map(|_| ()))
            .is_some()
        {
            return Ok(false);
        }
        tx.pending
            .affiliate_codes
            .insert(account.code.clone(), account.clone());
        Ok(true)
    }

    async fn lock_affiliate_codes(
        &self,
        tx: &mut MemoryTx,
        codes: &[String],
    ) -> LedgerResult<Vec<AffiliateAccount>> {
        let mut accounts = Vec::new();
        for code in Self::sorted_unique(codes) {
            self.acquire(tx, RowKey::AffiliateCode(code.clone())).await;
            if let Some(account) = self.read(tx, |t| t.affiliate_codes.get(&code).cloned()) {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }

    async fn lock_owned_affiliate_codes(
        &self,
        tx: &mut MemoryTx,
        owner: UserId,
    ) -> LedgerResult<Vec<AffiliateAccount>> {
        let codes: Vec<String> = self
            .affiliate_codes_view(tx)
            .into_values()
            .filter(|account| account.owner_id == owner)
            .map(|account| account.code)
            .collect();
        let accounts = self.lock_affiliate_codes(tx, &codes).await?;
        Ok(accounts
            .into_iter()
            .filter(|account| account.owner_id == owner)
            .collect())
    }

    async fn find_affiliate_codes(
        &self,
        tx: &mut MemoryTx,
        owner: UserId,
    ) -> LedgerResult<Vec<AffiliateAccount>> {
        Ok(self
            .affiliate_codes_view(tx)
            .into_values()
            .filter(|account| account.owner_id == owner)
            .collect())
    }

    async fn save_affiliate_code(
        &self,
        tx: &mut MemoryTx,
        account: &AffiliateAccount,
    ) -> LedgerResult<()> {
        self.acquire(tx, RowKey::AffiliateCode(account.code.clone()))
            .await;
        tx.pending
            .affiliate_codes
            .insert(account.code.clone(), account.clone());
        Ok(())
    }

    async fn find_affiliation(
        &self,
        tx: &mut MemoryTx,
        user: UserId,
    ) -> LedgerResult<Option<ActiveAffiliation>> {
        Ok(self.read(tx, |t| t.affiliations.get(&user).cloned()))
    }

    async fn lock_affiliation(
        &self,
        tx: &mut MemoryTx,
        user: UserId,
    ) -> LedgerResult<Option<ActiveAffiliation>> {
        self.acquire(tx, RowKey::Affiliation(user)).await;
        Ok(self.read(tx, |t| t.affiliations.get(&user).cloned()))
    }

    async fn insert_affiliation(
        &self,
        tx: &mut MemoryTx,
        affiliation: &ActiveAffiliation,
    ) -> LedgerResult<bool> {
        self.acquire(tx, RowKey::Affiliation(affiliation.user_id))
            .await;
        if self
            .read(tx, |t| t.affiliations.get(&affiliation.user_id).map(|_| ()))
            .is_some()
        {
            return Ok(false);
        }
        tx.pending
            .affiliations
            .insert(affiliation.user_id, affiliation.clone());
        Ok(true)
    }

    async fn save_affiliation(
        &self,
        tx: &mut MemoryTx,
        affiliation: &ActiveAffiliation,
    ) -> LedgerResult<()> {
        self.acquire(tx, RowKey::Affiliation(affiliation.user_id))
            .await;
        tx.pending
            .affiliations
            .insert(affiliation.user_id, affiliation.clone());
        Ok(())
    }

    async fn insert_claim(
        &self,
        tx: &mut MemoryTx,
        user: UserId,
        kind: ClaimKind,
        amount: i64,
    ) -> LedgerResult<ClaimRecord> {
        let claim = ClaimRecord {
            id: self.next_id(),
            user_id: user,
            kind,
            amount,
            created_at: Utc::now(),
        };
        tx.pending.claims.insert(claim.id, claim.clone());
        Ok(claim)
    }
}
