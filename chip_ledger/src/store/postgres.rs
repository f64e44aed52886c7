//! PostgreSQL ledger store.
#![allow(clippy::needless_raw_string_hashes)]

use super::LedgerStore;
use crate::db::timeouts::{DEFAULT_QUERY_TIMEOUT, with_timeout};
use crate::ledger::{
    errors::{LedgerError, LedgerResult},
    models::{
        BalanceLoad, BalanceOwnerKind, BalanceSnapshot, EntryId, EntryStatus, LedgerEntry,
        NewLedgerEntry, OwnerRef, UserId,
    },
};
use crate::rewards::models::{
    ActiveAffiliation, AffiliateAccount, ClaimKind, ClaimRecord, DuelBotPosition, RakebackAccount,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

type PgTx = Transaction<'static, Postgres>;

const SNAPSHOT_COLUMNS: &str = "id, owner_kind, owner_id, chip_amount, nft_ids, created_at";

const ENTRY_SELECT: &str = r#"
    SELECT e.id, e.from_wallet, e.to_wallet, e.moved_balance_id, e.entry_type, e.status,
           e.from_prev_id, e.from_next_id, e.to_prev_id, e.to_next_id,
           e.owner_kind, e.owner_id, e.reversal_of, e.created_at, e.updated_at,
           b.chip_amount, b.nft_ids
    FROM ledger_entries e
    JOIN balances b ON b.id = e.moved_balance_id
"#;

const POSITION_COLUMNS: &str =
    "nft_id, status, staking_user_id, total_earned, staking_reward, staked_at";

const AFFILIATE_COLUMNS: &str = "code, owner_id, total_wagered, total_earned, reward, \
     custom_rate_bps, first_deposit_bonus, created_at";

const AFFILIATION_COLUMNS: &str = "user_id, code, activated_at, expires_at, first_deposit_done";

/// PostgreSQL implementation of [`LedgerStore`]
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: Arc<PgPool>,
    begin_timeout: Duration,
}

impl PgLedgerStore {
    /// Create a new store
    ///
    /// # Arguments
    ///
    /// * `pool` - Database connection pool
    /// * `begin_timeout` - Bound on acquiring a connection for a new transaction
    pub fn new(pool: Arc<PgPool>, begin_timeout: Duration) -> Self {
        Self {
            pool,
            begin_timeout,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn create_snapshot(
        tx: &mut PgTx,
        owner_kind: BalanceOwnerKind,
        owner_id: i64,
        load: &BalanceLoad,
    ) -> LedgerResult<BalanceSnapshot> {
        let row = sqlx::query(&format!(
            "INSERT INTO balances (owner_kind, owner_id, chip_amount, nft_ids)
             VALUES ($1, $2, $3, $4)
             RETURNING {SNAPSHOT_COLUMNS}"
        ))
        .bind(owner_kind.as_str())
        .bind(owner_id)
        .bind(load.chip)
        .bind(nft_vec(&load.nft_ids))
        .fetch_one(&mut **tx)
        .await?;

        snapshot_from_row(&row)
    }
}

fn nft_vec(ids: &BTreeSet<String>) -> Vec<String> {
    ids.iter().cloned().collect()
}

fn snapshot_from_row(row: &PgRow) -> LedgerResult<BalanceSnapshot> {
    Ok(BalanceSnapshot {
        id: row.get("id"),
        owner_kind: row.get::<String, _>("owner_kind").parse()?,
        owner_id: row.get("owner_id"),
        chip_amount: row.get("chip_amount"),
        nft_ids: row
            .get::<Vec<String>, _>("nft_ids")
            .into_iter()
            .collect(),
        created_at: row.get("created_at"),
    })
}

fn entry_from_row(row: &PgRow) -> LedgerResult<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.get("id"),
        from_wallet: row.get("from_wallet"),
        to_wallet: row.get("to_wallet"),
        amount_moved: BalanceLoad {
            chip: row.get("chip_amount"),
            nft_ids: row
                .get::<Vec<String>, _>("nft_ids")
                .into_iter()
                .collect(),
        },
        moved_balance_id: row.get("moved_balance_id"),
        entry_type: row.get::<String, _>("entry_type").parse()?,
        status: row.get::<String, _>("status").parse()?,
        from_prev_id: row.get("from_prev_id"),
        from_next_id: row.get("from_next_id"),
        to_prev_id: row.get("to_prev_id"),
        to_next_id: row.get("to_next_id"),
        owner: OwnerRef::new(
            row.get::<String, _>("owner_kind").parse()?,
            row.get("owner_id"),
        ),
        reversal_of: row.get("reversal_of"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn rakeback_from_row(row: &PgRow) -> RakebackAccount {
    RakebackAccount {
        user_id: row.get("user_id"),
        total_earned: row.get("total_earned"),
        reward: row.get("reward"),
        base_rate_bps: row.get("base_rate_bps"),
        additional_rate_bps: row.get("additional_rate_bps"),
        additional_rate_expiry: row.get("additional_rate_expiry"),
    }
}

fn position_from_row(row: &PgRow) -> LedgerResult<DuelBotPosition> {
    Ok(DuelBotPosition {
        nft_id: row.get("nft_id"),
        status: row.get::<String, _>("status").parse()?,
        staking_user_id: row.get("staking_user_id"),
        total_earned: row.get("total_earned"),
        staking_reward: row.get("staking_reward"),
        staked_at: row.get("staked_at"),
    })
}

fn affiliate_from_row(row: &PgRow) -> AffiliateAccount {
    AffiliateAccount {
        code: row.get("code"),
        owner_id: row.get("owner_id"),
        total_wagered: row.get("total_wagered"),
        total_earned: row.get("total_earned"),
        reward: row.get("reward"),
        custom_rate_bps: row.get("custom_rate_bps"),
        first_deposit_bonus: row.get("first_deposit_bonus"),
        created_at: row.get("created_at"),
    }
}

fn affiliation_from_row(row: &PgRow) -> ActiveAffiliation {
    ActiveAffiliation {
        user_id: row.get("user_id"),
        code: row.get("code"),
        activated_at: row.get("activated_at"),
        expires_at: row.get("expires_at"),
        first_deposit_done: row.get("first_deposit_done"),
    }
}

fn sorted_unique(ids: &[String]) -> Vec<String> {
    ids.iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgTx;

    async fn begin(&self) -> LedgerResult<PgTx> {
        Ok(with_timeout(self.begin_timeout, self.pool.begin()).await?)
    }

    async fn commit(&self, tx: PgTx) -> LedgerResult<()> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: PgTx) -> LedgerResult<()> {
        tx.rollback().await?;
        Ok(())
    }

    async fn health_check(&self) -> LedgerResult<()> {
        with_timeout(
            DEFAULT_QUERY_TIMEOUT,
            sqlx::query("SELECT 1").execute(self.pool.as_ref()),
        )
        .await?;
        Ok(())
    }

    async fn lock_wallet(&self, tx: &mut PgTx, wallet: UserId) -> LedgerResult<BalanceSnapshot> {
        sqlx::query("INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(wallet)
            .execute(&mut **tx)
            .await?;

        let balance_id: Option<i64> =
            sqlx::query_scalar("SELECT balance_id FROM wallets WHERE user_id = $1 FOR UPDATE")
                .bind(wallet)
                .fetch_one(&mut **tx)
                .await?;

        match balance_id {
            Some(id) => {
                let row = sqlx::query(&format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM balances WHERE id = $1"
                ))
                .bind(id)
                .fetch_one(&mut **tx)
                .await?;
                snapshot_from_row(&row)
            }
            None => {
                let snapshot = Self::create_snapshot(
                    tx,
                    BalanceOwnerKind::WalletCurrent,
                    wallet,
                    &BalanceLoad::default(),
                )
                .await?;
                sqlx::query("UPDATE wallets SET balance_id = $2, updated_at = NOW() WHERE user_id = $1")
                    .bind(wallet)
                    .bind(snapshot.id)
                    .execute(&mut **tx)
                    .await?;
                Ok(snapshot)
            }
        }
    }

    async fn find_balance(
        &self,
        tx: &mut PgTx,
        wallet: UserId,
    ) -> LedgerResult<Option<BalanceSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT b.id, b.owner_kind, b.owner_id, b.chip_amount, b.nft_ids, b.created_at
            FROM wallets w
            JOIN balances b ON b.id = w.balance_id
            WHERE w.user_id = $1
            "#,
        )
        .bind(wallet)
        .fetch_optional(&mut **tx)
        .await?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn find_nft_holders(
        &self,
        tx: &mut PgTx,
        nft_ids: &[String],
    ) -> LedgerResult<Vec<UserId>> {
        let holders = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT w.user_id
            FROM wallets w
            JOIN balances b ON b.id = w.balance_id
            WHERE b.nft_ids && $1
            ORDER BY w.user_id
            "#,
        )
        .bind(nft_ids)
        .fetch_all(&mut **tx)
        .await?;

        Ok(holders)
    }

    async fn replace_balance(
        &self,
        tx: &mut PgTx,
        wallet: UserId,
        prev: &BalanceSnapshot,
        next: &BalanceLoad,
    ) -> LedgerResult<BalanceSnapshot> {
        sqlx::query("UPDATE balances SET owner_kind = $2 WHERE id = $1")
            .bind(prev.id)
            .bind(BalanceOwnerKind::History.as_str())
            .execute(&mut **tx)
            .await?;

        let snapshot =
            Self::create_snapshot(tx, BalanceOwnerKind::WalletCurrent, wallet, next).await?;

        sqlx::query("UPDATE wallets SET balance_id = $2, updated_at = NOW() WHERE user_id = $1")
            .bind(wallet)
            .bind(snapshot.id)
            .execute(&mut **tx)
            .await?;

        Ok(snapshot)
    }

    async fn insert_entry(&self, tx: &mut PgTx, entry: NewLedgerEntry) -> LedgerResult<LedgerEntry> {
        // The moved-amount snapshot is owned by the entry, so the id comes first.
        let id: EntryId =
            sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('ledger_entries', 'id'))")
                .fetch_one(&mut **tx)
                .await?;

        let moved = Self::create_snapshot(
            tx,
            BalanceOwnerKind::InTransaction,
            id,
            &entry.amount_moved,
        )
        .await?;

        let row = sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                id, from_wallet, to_wallet, moved_balance_id, entry_type, status,
                from_prev_id, from_next_id, to_prev_id, to_next_id,
                owner_kind, owner_id, reversal_of
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(entry.from_wallet)
        .bind(entry.to_wallet)
        .bind(moved.id)
        .bind(entry.entry_type.as_str())
        .bind(entry.status.as_str())
        .bind(entry.from_prev_id)
        .bind(entry.from_next_id)
        .bind(entry.to_prev_id)
        .bind(entry.to_next_id)
        .bind(entry.owner.kind.as_str())
        .bind(entry.owner.id)
        .bind(entry.reversal_of)
        .fetch_one(&mut **tx)
        .await?;

        Ok(LedgerEntry {
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
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
            updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        })
    }

    async fn find_entry(&self, tx: &mut PgTx, id: EntryId) -> LedgerResult<Option<LedgerEntry>> {
        let row = sqlx::query(&format!("{ENTRY_SELECT} WHERE e.id = $1"))
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn lock_entry(&self, tx: &mut PgTx, id: EntryId) -> LedgerResult<Option<LedgerEntry>> {
        let row = sqlx::query(&format!("{ENTRY_SELECT} WHERE e.id = $1 FOR UPDATE OF e"))
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn set_entry_status(
        &self,
        tx: &mut PgTx,
        id: EntryId,
        status: EntryStatus,
    ) -> LedgerResult<LedgerEntry> {
        let updated =
            sqlx::query("UPDATE ledger_entries SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(status.as_str())
                .execute(&mut **tx)
                .await?;

        if updated.rows_affected() == 0 {
            return Err(LedgerError::EntryNotFound(id));
        }

        self.lock_entry(tx, id)
            .await?
            .ok_or(LedgerError::EntryNotFound(id))
    }

    async fn wallet_entries(
        &self,
        tx: &mut PgTx,
        wallet: UserId,
        limit: Option<i64>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            "{ENTRY_SELECT} WHERE e.from_wallet = $1 OR e.to_wallet = $1 ORDER BY e.id DESC LIMIT $2"
        ))
        .bind(wallet)
        .bind(limit)
        .fetch_all(&mut **tx)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn lock_rakeback(
        &self,
        tx: &mut PgTx,
        user: UserId,
        base_rate_bps: i64,
    ) -> LedgerResult<RakebackAccount> {
        sqlx::query(
            "INSERT INTO rakeback_accounts (user_id, base_rate_bps) VALUES ($1, $2)
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user)
        .bind(base_rate_bps)
        .execute(&mut **tx)
        .await?;

        let row = sqlx::query("SELECT * FROM rakeback_accounts WHERE user_id = $1 FOR UPDATE")
            .bind(user)
            .fetch_one(&mut **tx)
            .await?;

        Ok(rakeback_from_row(&row))
    }

    async fn find_rakeback(
        &self,
        tx: &mut PgTx,
        user: UserId,
    ) -> LedgerResult<Option<RakebackAccount>> {
        let row = sqlx::query("SELECT * FROM rakeback_accounts WHERE user_id = $1")
            .bind(user)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(row.as_ref().map(rakeback_from_row))
    }

    async fn save_rakeback(&self, tx: &mut PgTx, account: &RakebackAccount) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE rakeback_accounts
            SET total_earned = $2, reward = $3, base_rate_bps = $4,
                additional_rate_bps = $5, additional_rate_expiry = $6
            WHERE user_id = $1
            "#,
        )
        .bind(account.user_id)
        .bind(account.total_earned)
        .bind(account.reward)
        .bind(account.base_rate_bps)
        .bind(account.additional_rate_bps)
        .bind(account.additional_rate_expiry)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn register_positions(
        &self,
        tx: &mut PgTx,
        nft_ids: &[String],
    ) -> LedgerResult<Vec<DuelBotPosition>> {
        let ids = sorted_unique(nft_ids);
        sqlx::query(
            "INSERT INTO duel_bots (nft_id) SELECT unnest($1::TEXT[])
             ON CONFLICT (nft_id) DO NOTHING",
        )
        .bind(&ids)
        .execute(&mut **tx)
        .await?;

        self.lock_positions(tx, &ids).await
    }

    async fn lock_positions(
        &self,
        tx: &mut PgTx,
        nft_ids: &[String],
    ) -> LedgerResult<Vec<DuelBotPosition>> {
        let rows = sqlx::query(&format!(
            "SELECT {POSITION_COLUMNS} FROM duel_bots
             WHERE nft_id = ANY($1) ORDER BY nft_id FOR UPDATE"
        ))
        .bind(sorted_unique(nft_ids))
        .fetch_all(&mut **tx)
        .await?;

        rows.iter().map(position_from_row).collect()
    }

    async fn lock_staked_positions(
        &self,
        tx: &mut PgTx,
        staker: Option<UserId>,
    ) -> LedgerResult<Vec<DuelBotPosition>> {
        let rows = sqlx::query(&format!(
            "SELECT {POSITION_COLUMNS} FROM duel_bots
             WHERE status = 'staked' AND ($1::BIGINT IS NULL OR staking_user_id = $1)
             ORDER BY nft_id FOR UPDATE"
        ))
        .bind(staker)
        .fetch_all(&mut **tx)
        .await?;

        rows.iter().map(position_from_row).collect()
    }

    async fn find_staked_positions(
        &self,
        tx: &mut PgTx,
        staker: UserId,
    ) -> LedgerResult<Vec<DuelBotPosition>> {
        let rows = sqlx::query(&format!(
            "SELECT {POSITION_COLUMNS} FROM duel_bots
             WHERE status = 'staked' AND staking_user_id = $1
             ORDER BY nft_id"
        ))
        .bind(staker)
        .fetch_all(&mut **tx)
        .await?;

        rows.iter().map(position_from_row).collect()
    }

    async fn save_position(&self, tx: &mut PgTx, position: &DuelBotPosition) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE duel_bots
            SET status = $2, staking_user_id = $3, total_earned = $4,
                staking_reward = $5, staked_at = $6
            WHERE nft_id = $1
            "#,
        )
        .bind(&position.nft_id)
        .bind(position.status.as_str())
        .bind(position.staking_user_id)
        .bind(position.total_earned)
        .bind(position.staking_reward)
        .bind(position.staked_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_affiliate_code(
        &self,
        tx: &mut PgTx,
        account: &AffiliateAccount,
    ) -> LedgerResult<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO affiliate_codes (code, owner_id, custom_rate_bps, first_deposit_bonus, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(&account.code)
        .bind(account.owner_id)
        .bind(account.custom_rate_bps)
        .bind(account.first_deposit_bonus)
        .bind(account.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(inserted.rows_affected() == 1)
    }

    async fn lock_affiliate_codes(
        &self,
        tx: &mut PgTx,
        codes: &[String],
    ) -> LedgerResult<Vec<AffiliateAccount>> {
        let rows = sqlx::query(&format!(
            "SELECT {AFFILIATE_COLUMNS} FROM affiliate_codes
             WHERE code = ANY($1) ORDER BY code FOR UPDATE"
        ))
        .bind(sorted_unique(codes))
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows.iter().map(affiliate_from_row).collect())
    }

    async fn lock_owned_affiliate_codes(
        &self,
        tx: &mut PgTx,
        owner: UserId,
    ) -> LedgerResult<Vec<AffiliateAccount>> {
        let rows = sqlx::query(&format!(
            "SELECT {AFFILIATE_COLUMNS} FROM affiliate_codes
             WHERE owner_id = $1 ORDER BY code FOR UPDATE"
        ))
        .bind(owner)
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows.iter().map(affiliate_from_row).collect())
    }

    async fn find_affiliate_codes(
        &self,
        tx: &mut PgTx,
        owner: UserId,
    ) -> LedgerResult<Vec<AffiliateAccount>> {
        let rows = sqlx::query(&format!(
            "SELECT {AFFILIATE_COLUMNS} FROM affiliate_codes WHERE owner_id = $1 ORDER BY code"
        ))
        .bind(owner)
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows.iter().map(affiliate_from_row).collect())
    }

    async fn save_affiliate_code(
        &self,
        tx: &mut PgTx,
        account: &AffiliateAccount,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            UPDATE affiliate_codes
            SET total_wagered = $2, total_earned = $3, reward = $4,
                custom_rate_bps = $5, first_deposit_bonus = $6
            WHERE code = $1
            "#,
        )
        .bind(&account.code)
        .bind(account.total_wagered)
        .bind(account.total_earned)
        .bind(account.reward)
        .bind(account.custom_rate_bps)
        .bind(account.first_deposit_bonus)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn find_affiliation(
        &self,
        tx: &mut PgTx,
        user: UserId,
    ) -> LedgerResult<Option<ActiveAffiliation>> {
        let row = sqlx::query(&format!(
            "SELECT {AFFILIATION_COLUMNS} FROM active_affiliations WHERE user_id = $1"
        ))
        .bind(user)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.as_ref().map(affiliation_from_row))
    }

    async fn lock_affiliation(
        &self,
        tx: &mut PgTx,
        user: UserId,
    ) -> LedgerResult<Option<ActiveAffiliation>> {
        let row = sqlx::query(&format!(
            "SELECT {AFFILIATION_COLUMNS} FROM active_affiliations WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.as_ref().map(affiliation_from_row))
    }

    async fn insert_affiliation(
        &self,
        tx: &mut PgTx,
        affiliation: &ActiveAffiliation,
    ) -> LedgerResult<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO active_affiliations (user_id, code, activated_at, expires_at, first_deposit_done)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(affiliation.user_id)
        .bind(&affiliation.code)
        .bind(affiliation.activated_at)
        .bind(affiliation.expires_at)
        .bind(affiliation.first_deposit_done)
        .execute(&mut **tx)
        .await?;

        Ok(inserted.rows_affected() == 1)
    }

    async fn save_affiliation(
        &self,
        tx: &mut PgTx,
        affiliation: &ActiveAffiliation,
    ) -> LedgerResult<()> {
        sqlx::query(
            "UPDATE active_affiliations SET expires_at = $2, first_deposit_done = $3
             WHERE user_id = $1",
        )
        .bind(affiliation.user_id)
        .bind(affiliation.expires_at)
        .bind(affiliation.first_deposit_done)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_claim(
        &self,
        tx: &mut PgTx,
        user: UserId,
        kind: ClaimKind,
        amount: i64,
    ) -> LedgerResult<ClaimRecord> {
        let row = sqlx::query(
            "INSERT INTO ledger_claims (user_id, kind, amount) VALUES ($1, $2, $3)
             RETURNING id, created_at",
        )
        .bind(user)
        .bind(kind.as_str())
        .bind(amount)
        .fetch_one(&mut **tx)
        .await?;

        Ok(ClaimRecord {
            id: row.get("id"),
            user_id: user,
            kind,
            amount,
            created_at: row.get("created_at"),
        })
    }
}
