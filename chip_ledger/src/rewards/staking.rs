//! Duel bot staking.
//!
//! Staking moves the NFT from the user's wallet into the staking vault and
//! flags its position; from then on it earns a share of every house fee.
//! Unstaking claims what the positions earned and returns the NFTs.

use super::{
    ClaimKind, DuelBotPosition, DuelBotStatus, ensure_player, normalize_ids, total_reward,
};
use crate::ledger::{
    errors::{LedgerError, LedgerResult},
    manager::{LedgerManager, Movement},
    models::{
        BalanceLoad, ClaimReceipt, EntryType, OwnerKind, OwnerRef, SystemWallet, UnstakeReceipt,
        UserId,
    },
    session::Session,
};
use crate::store::LedgerStore;
use chrono::Utc;

impl<S: LedgerStore> LedgerManager<S> {
    /// Mark NFTs as staking-eligible duel bots; already registered ids are kept as is
    pub async fn register_duel_bots(
        &self,
        session: Option<&mut Session<S>>,
        nft_ids: &[String],
    ) -> LedgerResult<Vec<DuelBotPosition>> {
        let ids = normalize_ids(nft_ids, "NFT id")?;

        let mut ws = self.sessions.get(session).await?;
        let result = match ws.session().tx() {
            Ok(tx) => self.store.register_positions(tx, &ids).await,
            Err(e) => Err(e),
        };
        ws.finish(&self.sessions, result).await
    }

    /// Positions currently staked by a user
    pub async fn staked_positions(
        &self,
        session: Option<&mut Session<S>>,
        user: UserId,
    ) -> LedgerResult<Vec<DuelBotPosition>> {
        let mut ws = self.sessions.get(session).await?;
        let result = match ws.session().tx() {
            Ok(tx) => self.store.find_staked_positions(tx, user).await,
            Err(e) => Err(e),
        };
        ws.finish(&self.sessions, result).await
    }

    /// Stake duel bots held by a user
    ///
    /// # Errors
    ///
    /// * `LedgerError::NotEligible` - NFT is not a registered duel bot
    /// * `LedgerError::AlreadyStaked` - Position is already staked
    /// * `LedgerError::NotOwner` - NFT is not in the user's wallet
    pub async fn stake_duel_bots(
        &self,
        session: Option<&mut Session<S>>,
        user: UserId,
        nft_ids: &[String],
    ) -> LedgerResult<Vec<DuelBotPosition>> {
        ensure_player(user)?;
        let ids = normalize_ids(nft_ids, "NFT id")?;

        let mut ws = self.sessions.get(session).await?;
        let result = self.stake_in(ws.session(), user, ids).await;
        ws.finish(&self.sessions, result).await
    }

    /// Unstake duel bots, claiming their pending rewards
    ///
    /// # Errors
    ///
    /// * `LedgerError::NotStaked` - Position is not staked by this user
    pub async fn unstake_duel_bots(
        &self,
        session: Option<&mut Session<S>>,
        user: UserId,
        nft_ids: &[String],
    ) -> LedgerResult<UnstakeReceipt> {
        ensure_player(user)?;
        let ids = normalize_ids(nft_ids, "NFT id")?;

        let mut ws = self.sessions.get(session).await?;
        let result = self.unstake_in(ws.session(), user, ids).await;
        ws.finish(&self.sessions, result).await
    }

    /// Claim staking rewards, from the given positions or all of the user's
    ///
    /// # Errors
    ///
    /// * `LedgerError::NotStaked` - A named position is not staked by this user
    /// * `LedgerError::NothingToClaim` - Positions have no pending reward
    pub async fn claim_duel_bot_rewards(
        &self,
        session: Option<&mut Session<S>>,
        user: UserId,
        nft_ids: Option<&[String]>,
    ) -> LedgerResult<ClaimReceipt> {
        ensure_player(user)?;
        let ids = nft_ids.map(|ids| normalize_ids(ids, "NFT id")).transpose()?;

        let mut ws = self.sessions.get(session).await?;
        let result = self.claim_duel_bots_in(ws.session(), user, ids).await;
        ws.finish(&self.sessions, result).await
    }

    async fn stake_in(
        &self,
        session: &mut Session<S>,
        user: UserId,
        ids: Vec<String>,
    ) -> LedgerResult<Vec<DuelBotPosition>> {
        let vault = SystemWallet::StakingVault.id();
        self.lock_wallets(session, &[user, vault]).await?;

        let tx = session.tx()?;
        let held = self.store.lock_wallet(tx, user).await?.load();
        let positions = self.store.lock_positions(tx, &ids).await?;

        if let Some(missing) = ids
            .iter()
            .find(|id| !positions.iter().any(|p| &p.nft_id == *id))
        {
            return Err(LedgerError::NotEligible(missing.clone()));
        }
        if let Some(staked) = positions.iter().find(|p| p.status == DuelBotStatus::Staked) {
            return Err(LedgerError::AlreadyStaked(staked.nft_id.clone()));
        }

        let load = BalanceLoad::nfts(ids.iter().cloned());
        let not_held = held.missing_nfts(&load);
        if !not_held.is_empty() {
            return Err(LedgerError::NotOwner(not_held.join(", ")));
        }

        let now = Utc::now();
        let mut staked = Vec::with_capacity(positions.len());
        for mut position in positions {
            position.status = DuelBotStatus::Staked;
            position.staking_user_id = Some(user);
            position.staked_at = Some(now);
            self.store.save_position(tx, &position).await?;
            staked.push(position);
        }

        self.move_funds(
            session,
            Movement::settled(
                Some(user),
                Some(vault),
                load,
                EntryType::Stake,
                OwnerRef::new(OwnerKind::Staking, user),
            ),
        )
        .await?;

        log::info!("User {} staked duel bots {:?}", user, ids);
        Ok(staked)
    }

    async fn unstake_in(
        &self,
        session: &mut Session<S>,
        user: UserId,
        ids: Vec<String>,
    ) -> LedgerResult<UnstakeReceipt> {
        let vault = SystemWallet::StakingVault.id();
        self.lock_wallets(session, &[user, vault, SystemWallet::StakingPool.id()])
            .await?;

        let tx = session.tx()?;
        let positions = self.store.lock_positions(tx, &ids).await?;
        if let Some(id) = ids.iter().find(|id| {
            !positions
                .iter()
                .any(|p| &p.nft_id == *id && p.is_staked_by(user))
        }) {
            return Err(LedgerError::NotStaked(id.clone()));
        }

        let claimable = total_reward(positions.iter().map(|p| p.staking_reward))?;

        let mut released = Vec::with_capacity(positions.len());
        for mut position in positions {
            position.status = DuelBotStatus::Normal;
            position.staking_user_id = None;
            position.staked_at = None;
            position.staking_reward = 0;
            self.store.save_position(tx, &position).await?;
            released.push(position);
        }

        let claim = if claimable > 0 {
            Some(
                self.pay_claim(
                    session,
                    user,
                    ClaimKind::DuelBots,
                    claimable,
                    SystemWallet::StakingPool,
                    EntryType::DuelBotClaim,
                )
                .await?,
            )
        } else {
            None
        };

        self.move_funds(
            session,
            Movement::settled(
                Some(vault),
                Some(user),
                BalanceLoad::nfts(ids.iter().cloned()),
                EntryType::Unstake,
                OwnerRef::new(OwnerKind::Staking, user),
            ),
        )
        .await?;

        log::info!(
            "User {} unstaked duel bots {:?}, claimed {}",
            user,
            ids,
            claimable
        );
        Ok(UnstakeReceipt {
            claimed_amount: claimable,
            claim,
            positions: released,
        })
    }

    async fn claim_duel_bots_in(
        &self,
        session: &mut Session<S>,
        user: UserId,
        ids: Option<Vec<String>>,
    ) -> LedgerResult<ClaimReceipt> {
        self.lock_wallets(session, &[user, SystemWallet::StakingPool.id()])
            .await?;

        let tx = session.tx()?;
        let positions = match ids {
            Some(ids) => {
                let positions = self.store.lock_positions(tx, &ids).await?;
                if let Some(id) = ids.iter().find(|id| {
                    !positions
                        .iter()
                        .any(|p| &p.nft_id == *id && p.is_staked_by(user))
                }) {
                    return Err(LedgerError::NotStaked(id.clone()));
                }
                positions
            }
            None => self.store.lock_staked_positions(tx, Some(user)).await?,
        };

        let amount = total_reward(positions.iter().map(|p| p.staking_reward))?;
        if amount <= 0 {
            return Err(LedgerError::NothingToClaim);
        }

        for mut position in positions {
            if position.staking_reward > 0 {
                position.staking_reward = 0;
                self.store.save_position(tx, &position).await?;
            }
        }

        self.pay_claim(
            session,
            user,
            ClaimKind::DuelBots,
            amount,
            SystemWallet::StakingPool,
            EntryType::DuelBotClaim,
        )
        .await
    }
}
