//! Affiliate program: referral codes, affiliations and commission claims.

use super::{
    ActiveAffiliation, AffiliateAccount, ClaimKind, ensure_player, normalize_ids, total_reward,
};
use crate::ledger::{
    errors::{LedgerError, LedgerResult},
    fees::share_of,
    manager::{LedgerManager, Movement},
    models::{
        BalanceLoad, ClaimReceipt, EntryType, LedgerEntry, OwnerRef, SystemWallet, UserId,
    },
    session::Session,
};
use crate::store::LedgerStore;
use chrono::{DateTime, Utc};

impl<S: LedgerStore> LedgerManager<S> {
    /// Create a referral code owned by `owner`
    ///
    /// # Errors
    ///
    /// * `LedgerError::InvalidParameter` - Malformed code or custom rate above the limit
    /// * `LedgerError::AffiliateCodeTaken` - Code already exists
    pub async fn create_affiliate_code(
        &self,
        session: Option<&mut Session<S>>,
        owner: UserId,
        code: &str,
        custom_rate_bps: Option<i64>,
        first_deposit_bonus: bool,
    ) -> LedgerResult<AffiliateAccount> {
        ensure_player(owner)?;
        if !AffiliateAccount::is_valid_code(code) {
            return Err(LedgerError::InvalidParameter(format!(
                "affiliate code '{code}' must be 3-32 letters, digits or underscores"
            )));
        }
        let max_rate = self.config.affiliate.max_custom_rate_bps;
        if custom_rate_bps.is_some_and(|rate| !(0..=max_rate).contains(&rate)) {
            return Err(LedgerError::InvalidParameter(format!(
                "custom affiliate rate must be within 0..={max_rate} bps"
            )));
        }

        let account = AffiliateAccount::new(code, owner, custom_rate_bps, first_deposit_bonus);
        let mut ws = self.sessions.get(session).await?;
        let result = match ws.session().tx() {
            Ok(tx) => match self.store.insert_affiliate_code(tx, &account).await {
                Ok(true) => Ok(account),
                Ok(false) => Err(LedgerError::AffiliateCodeTaken(code.to_string())),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        if result.is_ok() {
            log::info!("User {} created affiliate code {}", owner, code);
        }
        ws.finish(&self.sessions, result).await
    }

    /// Codes owned by a user
    pub async fn affiliate_codes(
        &self,
        session: Option<&mut Session<S>>,
        owner: UserId,
    ) -> LedgerResult<Vec<AffiliateAccount>> {
        let mut ws = self.sessions.get(session).await?;
        let result = match ws.session().tx() {
            Ok(tx) => self.store.find_affiliate_codes(tx, owner).await,
            Err(e) => Err(e),
        };
        ws.finish(&self.sessions, result).await
    }

    /// Affiliation of a referred user, if any
    pub async fn affiliation(
        &self,
        session: Option<&mut Session<S>>,
        user: UserId,
    ) -> LedgerResult<Option<ActiveAffiliation>> {
        let mut ws = self.sessions.get(session).await?;
        let result = match ws.session().tx() {
            Ok(tx) => self.store.find_affiliation(tx, user).await,
            Err(e) => Err(e),
        };
        ws.finish(&self.sessions, result).await
    }

    /// Attach a referral code to a user
    ///
    /// Only allowed within the activation window after the user signed up.
    ///
    /// # Errors
    ///
    /// * `LedgerError::ActivationWindowClosed` - Signed up too long ago
    /// * `LedgerError::AlreadyAffiliated` - User already has a referrer
    /// * `LedgerError::AffiliateCodeNotFound` - Unknown code
    /// * `LedgerError::InvalidParameter` - User owns the code
    pub async fn activate_affiliation(
        &self,
        session: Option<&mut Session<S>>,
        user: UserId,
        code: &str,
        user_created_at: DateTime<Utc>,
    ) -> LedgerResult<ActiveAffiliation> {
        ensure_player(user)?;
        let now = Utc::now();
        if now - user_created_at > self.config.affiliate.activation_window {
            return Err(LedgerError::ActivationWindowClosed);
        }

        let mut ws = self.sessions.get(session).await?;
        let result = self.activate_in(ws.session(), user, code, now).await;
        ws.finish(&self.sessions, result).await
    }

    /// Pay out commission, from the given codes or all codes the user owns
    ///
    /// # Errors
    ///
    /// * `LedgerError::AffiliateCodeNotFound` - A named code does not exist
    /// * `LedgerError::NotOwner` - A named code belongs to someone else
    /// * `LedgerError::NothingToClaim` - No commission accrued
    pub async fn claim_affiliate_rewards(
        &self,
        session: Option<&mut Session<S>>,
        owner: UserId,
        codes: Option<&[String]>,
    ) -> LedgerResult<ClaimReceipt> {
        ensure_player(owner)?;
        let codes = codes
            .map(|codes| normalize_ids(codes, "affiliate code"))
            .transpose()?;

        let mut ws = self.sessions.get(session).await?;
        let result = self.claim_affiliate_in(ws.session(), owner, codes).await;
        ws.finish(&self.sessions, result).await
    }

    /// Credit the one-time first deposit bonus of a referred user
    ///
    /// Call after the deposit itself. Pays `deposit_amount` times the bonus
    /// rate, capped, from the bonus pool when the user's referral code carries
    /// the bonus. Returns `None` when no bonus applies.
    pub async fn apply_first_deposit_bonus(
        &self,
        session: Option<&mut Session<S>>,
        user: UserId,
        deposit_amount: i64,
        owner: OwnerRef,
    ) -> LedgerResult<Option<LedgerEntry>> {
        ensure_player(user)?;
        if deposit_amount <= 0 {
            return Err(LedgerError::InvalidParameter(format!(
                "deposit amount must be positive, got {deposit_amount}"
            )));
        }

        let mut ws = self.sessions.get(session).await?;
        let result = self
            .first_deposit_bonus_in(ws.session(), user, deposit_amount, owner)
            .await;
        ws.finish(&self.sessions, result).await
    }

    async fn activate_in(
        &self,
        session: &mut Session<S>,
        user: UserId,
        code: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<ActiveAffiliation> {
        let tx = session.tx()?;
        if self.store.lock_affiliation(tx, user).await?.is_some() {
            return Err(LedgerError::AlreadyAffiliated(user));
        }

        let account = self
            .store
            .lock_affiliate_codes(tx, &[code.to_string()])
            .await?
            .pop()
            .ok_or_else(|| LedgerError::AffiliateCodeNotFound(code.to_string()))?;
        if account.owner_id == user {
            return Err(LedgerError::InvalidParameter(
                "cannot use your own affiliate code".to_string(),
            ));
        }

        let affiliation = ActiveAffiliation {
            user_id: user,
            code: account.code,
            activated_at: now,
            expires_at: self.config.affiliate.lifetime.map(|lifetime| now + lifetime),
            first_deposit_done: false,
        };
        if !self.store.insert_affiliation(tx, &affiliation).await? {
            return Err(LedgerError::AlreadyAffiliated(user));
        }

        log::info!("User {} joined affiliate code {}", user, affiliation.code);
        Ok(affiliation)
    }

    async fn claim_affiliate_in(
        &self,
        session: &mut Session<S>,
        owner: UserId,
        codes: Option<Vec<String>>,
    ) -> LedgerResult<ClaimReceipt> {
        self.lock_wallets(session, &[owner, SystemWallet::AffiliatePool.id()])
            .await?;

        let tx = session.tx()?;
        let accounts = match codes {
            Some(codes) => {
                let accounts = self.store.lock_affiliate_codes(tx, &codes).await?;
                if let Some(missing) = codes
                    .iter()
                    .find(|code| !accounts.iter().any(|a| &a.code == *code))
                {
                    return Err(LedgerError::AffiliateCodeNotFound(missing.clone()));
                }
                if let Some(foreign) = accounts.iter().find(|a| a.owner_id != owner) {
                    return Err(LedgerError::NotOwner(foreign.code.clone()));
                }
                accounts
            }
            None => self.store.lock_owned_affiliate_codes(tx, owner).await?,
        };

        let amount = total_reward(accounts.iter().map(|a| a.reward))?;
        if amount <= 0 {
            return Err(LedgerError::NothingToClaim);
        }

        for mut account in accounts {
            if account.reward > 0 {
                account.reward = 0;
                self.store.save_affiliate_code(tx, &account).await?;
            }
        }

        self.pay_claim(
            session,
            owner,
            ClaimKind::Affiliate,
            amount,
            SystemWallet::AffiliatePool,
            EntryType::AffiliateClaim,
        )
        .await
    }

    async fn first_deposit_bonus_in(
        &self,
        session: &mut Session<S>,
        user: UserId,
        deposit_amount: i64,
        owner: OwnerRef,
    ) -> LedgerResult<Option<LedgerEntry>> {
        let pool = SystemWallet::FirstDepositBonusPool.id();
        self.lock_wallets(session, &[user, pool]).await?;

        let tx = session.tx()?;
        let Some(mut affiliation) = self.store.lock_affiliation(tx, user).await? else {
            return Ok(None);
        };
        if affiliation.first_deposit_done || !affiliation.is_active(Utc::now()) {
            return Ok(None);
        }

        let carries_bonus = self
            .store
            .lock_affiliate_codes(tx, std::slice::from_ref(&affiliation.code))
            .await?
            .first()
            .is_some_and(|account| account.first_deposit_bonus);

        affiliation.first_deposit_done = true;
        self.store.save_affiliation(tx, &affiliation).await?;

        let bonus = share_of(deposit_amount, self.config.affiliate.first_deposit_bonus_bps)
            .min(self.config.affiliate.first_deposit_bonus_max);
        if !carries_bonus || bonus <= 0 {
            return Ok(None);
        }

        let entry = self
            .move_funds(
                session,
                Movement::settled(
                    Some(pool),
                    Some(user),
                    BalanceLoad::chips(bonus),
                    EntryType::FirstDepositBonus,
                    owner,
                ),
            )
            .await?;

        log::info!(
            "User {} received first deposit bonus {} via code {}",
            user,
            bonus,
            affiliation.code
        );
        Ok(Some(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::config::LedgerConfig;
    use crate::ledger::models::{OwnerKind, TransferRequest};
    use crate::store::MemoryStore;
    use chrono::Duration;
    use std::sync::Arc;

    fn ledger() -> LedgerManager<MemoryStore> {
        LedgerManager::new(Arc::new(MemoryStore::new()), LedgerConfig::default())
    }

    #[tokio::test]
    async fn test_create_code_validation() {
        let ledger = ledger();
        ledger
            .create_affiliate_code(None, 1, "ALPHA", None, false)
            .await
            .unwrap();
        assert!(matches!(
            ledger.create_affiliate_code(None, 2, "ALPHA", None, false).await,
            Err(LedgerError::AffiliateCodeTaken(_))
        ));
        assert!(matches!(
            ledger.create_affiliate_code(None, 2, "a!", None, false).await,
            Err(LedgerError::InvalidParameter(_))
        ));
        assert!(matches!(
            ledger
                .create_affiliate_code(None, 2, "BETA", Some(5_000), false)
                .await,
            Err(LedgerError::InvalidParameter(_))
        ));
        assert_eq!(ledger.affiliate_codes(None, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_activation_rules() {
        let ledger = ledger();
        ledger
            .create_affiliate_code(None, 1, "ALPHA", None, false)
            .await
            .unwrap();
        let now = Utc::now();

        assert!(matches!(
            ledger
                .activate_affiliation(None, 2, "ALPHA", now - Duration::hours(48))
                .await,
            Err(LedgerError::ActivationWindowClosed)
        ));
        assert!(matches!(
            ledger.activate_affiliation(None, 2, "NOPE", now).await,
            Err(LedgerError::AffiliateCodeNotFound(_))
        ));
        assert!(matches!(
            ledger.activate_affiliation(None, 1, "ALPHA", now).await,
            Err(LedgerError::InvalidParameter(_))
        ));

        let affiliation = ledger
            .activate_affiliation(None, 2, "ALPHA", now)
            .await
            .unwrap();
        assert_eq!(affiliation.code, "ALPHA");
        assert!(affiliation.expires_at.is_none());
        assert!(matches!(
            ledger.activate_affiliation(None, 2, "ALPHA", now).await,
            Err(LedgerError::AlreadyAffiliated(2))
        ));
        assert!(ledger.affiliation(None, 2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_first_deposit_bonus_paid_once() {
        let ledger = ledger();
        let admin = OwnerRef::new(OwnerKind::Admin, 0);
        let fund = TransferRequest::chips(
            None,
            Some(SystemWallet::FirstDepositBonusPool.id()),
            1_000,
            EntryType::Deposit,
            admin,
        );
        ledger.transfer(None, &fund).await.unwrap();
        ledger
            .create_affiliate_code(None, 1, "BONUS", None, true)
            .await
            .unwrap();
        ledger
            .activate_affiliation(None, 2, "BONUS", Utc::now())
            .await
            .unwrap();

        let payment = OwnerRef::new(OwnerKind::Payment, 77);
        let entry = ledger
            .apply_first_deposit_bonus(None, 2, 500, payment)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.amount_moved.chip, 50);
        assert_eq!(entry.entry_type, EntryType::FirstDepositBonus);
        assert_eq!(ledger.balance(None, 2).await.unwrap().chip, 50);

        assert!(
            ledger
                .apply_first_deposit_bonus(None, 2, 500, payment)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            ledger
                .apply_first_deposit_bonus(None, 3, 500, payment)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_claim_foreign_code_rejected() {
        let ledger = ledger();
        ledger
            .create_affiliate_code(None, 1, "ALPHA", None, false)
            .await
            .unwrap();
        let codes = vec!["ALPHA".to_string()];
        assert!(matches!(
            ledger.claim_affiliate_rewards(None, 2, Some(codes.as_slice())).await,
            Err(LedgerError::NotOwner(_))
        ));
        assert!(matches!(
            ledger.claim_affiliate_rewards(None, 1, Some(codes.as_slice())).await,
            Err(LedgerError::NothingToClaim)
        ));
        let unknown = vec!["GHOST".to_string()];
        assert!(matches!(
            ledger.claim_affiliate_rewards(None, 1, Some(unknown.as_slice())).await,
            Err(LedgerError::AffiliateCodeNotFound(_))
        ));
    }
}
