//! Rakeback sub-ledger operations.

use super::{ClaimKind, RakebackAccount, ensure_player};
use crate::ledger::{
    errors::{LedgerError, LedgerResult},
    manager::LedgerManager,
    models::{BPS_DENOMINATOR, ClaimReceipt, EntryType, SystemWallet, UserId},
    session::Session,
};
use crate::store::LedgerStore;
use chrono::{DateTime, Utc};

impl<S: LedgerStore> LedgerManager<S> {
    /// Rakeback account of a user; an unseen user gets the default account
    pub async fn rakeback_account(
        &self,
        session: Option<&mut Session<S>>,
        user: UserId,
    ) -> LedgerResult<RakebackAccount> {
        let mut ws = self.sessions.get(session).await?;
        let result = self.find_rakeback_in(ws.session(), user).await;
        ws.finish(&self.sessions, result).await
    }

    /// Grant a temporary additional rakeback rate
    ///
    /// `expires_at = None` keeps the boost until replaced. The effective rate
    /// is still capped by the configured maximum.
    pub async fn set_rakeback_boost(
        &self,
        session: Option<&mut Session<S>>,
        user: UserId,
        additional_rate_bps: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> LedgerResult<RakebackAccount> {
        ensure_player(user)?;
        check_rate(additional_rate_bps)?;

        let mut ws = self.sessions.get(session).await?;
        let result = self
            .update_rakeback_in(ws.session(), user, |account| {
                account.additional_rate_bps = additional_rate_bps;
                account.additional_rate_expiry = expires_at;
            })
            .await;
        ws.finish(&self.sessions, result).await
    }

    /// Change a user's base rakeback rate
    pub async fn set_rakeback_base_rate(
        &self,
        session: Option<&mut Session<S>>,
        user: UserId,
        base_rate_bps: i64,
    ) -> LedgerResult<RakebackAccount> {
        ensure_player(user)?;
        check_rate(base_rate_bps)?;

        let mut ws = self.sessions.get(session).await?;
        let result = self
            .update_rakeback_in(ws.session(), user, |account| {
                account.base_rate_bps = base_rate_bps;
            })
            .await;
        ws.finish(&self.sessions, result).await
    }

    /// Pay out a user's accrued rakeback
    ///
    /// # Errors
    ///
    /// * `LedgerError::NothingToClaim` - No rakeback accrued since the last claim
    pub async fn claim_rakeback(
        &self,
        session: Option<&mut Session<S>>,
        user: UserId,
    ) -> LedgerResult<ClaimReceipt> {
        ensure_player(user)?;

        let mut ws = self.sessions.get(session).await?;
        let result = self.claim_rakeback_in(ws.session(), user).await;
        ws.finish(&self.sessions, result).await
    }

    async fn find_rakeback_in(
        &self,
        session: &mut Session<S>,
        user: UserId,
    ) -> LedgerResult<RakebackAccount> {
        let account = self.store.find_rakeback(session.tx()?, user).await?;
        Ok(account.unwrap_or_else(|| RakebackAccount::new(user, self.config.rakeback.base_rate_bps)))
    }

    async fn update_rakeback_in(
        &self,
        session: &mut Session<S>,
        user: UserId,
        update: impl FnOnce(&mut RakebackAccount) + Send,
    ) -> LedgerResult<RakebackAccount> {
        let tx = session.tx()?;
        let mut account = self
            .store
            .lock_rakeback(tx, user, self.config.rakeback.base_rate_bps)
            .await?;
        update(&mut account);
        self.store.save_rakeback(tx, &account).await?;
        Ok(account)
    }

    async fn claim_rakeback_in(
        &self,
        session: &mut Session<S>,
        user: UserId,
    ) -> LedgerResult<ClaimReceipt> {
        self.lock_wallets(session, &[user, SystemWallet::RakebackPool.id()])
            .await?;

        let tx = session.tx()?;
        let mut account = self
            .store
            .lock_rakeback(tx, user, self.config.rakeback.base_rate_bps)
            .await?;
        if account.reward <= 0 {
            return Err(LedgerError::NothingToClaim);
        }

        let amount = account.reward;
        account.reward = 0;
        self.store.save_rakeback(tx, &account).await?;

        self.pay_claim(
            session,
            user,
            ClaimKind::Rakeback,
            amount,
            SystemWallet::RakebackPool,
            EntryType::RakebackClaim,
        )
        .await
    }
}

fn check_rate(bps: i64) -> LedgerResult<()> {
    if !(0..=BPS_DENOMINATOR).contains(&bps) {
        return Err(LedgerError::InvalidParameter(format!(
            "rate {bps} bps outside 0..={BPS_DENOMINATOR}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::config::LedgerConfig;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use std::sync::Arc;

    fn ledger() -> LedgerManager<MemoryStore> {
        LedgerManager::new(Arc::new(MemoryStore::new()), LedgerConfig::default())
    }

    #[tokio::test]
    async fn test_unseen_user_has_default_account() {
        let ledger = ledger();
        let account = ledger.rakeback_account(None, 3).await.unwrap();
        assert_eq!(account.base_rate_bps, 1000);
        assert_eq!(account.reward, 0);
    }

    #[tokio::test]
    async fn test_claim_with_nothing_accrued() {
        let ledger = ledger();
        assert!(matches!(
            ledger.claim_rakeback(None, 3).await,
            Err(LedgerError::NothingToClaim)
        ));
        assert!(matches!(
            ledger.claim_rakeback(None, SystemWallet::RakebackPool.id()).await,
            Err(LedgerError::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn test_boost_is_stored_and_validated() {
        let ledger = ledger();
        let expiry = Utc::now() + Duration::hours(2);
        let account = ledger
            .set_rakeback_boost(None, 3, 500, Some(expiry))
            .await
            .unwrap();
        assert_eq!(account.additional_rate_bps, 500);
        assert_eq!(
            ledger.rakeback_account(None, 3).await.unwrap().additional_rate_expiry,
            Some(expiry)
        );
        assert!(ledger.set_rakeback_boost(None, 3, -1, None).await.is_err());
        assert!(ledger.set_rakeback_base_rate(None, 3, 20_000).await.is_err());
    }
}
