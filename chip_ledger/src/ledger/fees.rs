//! House fee distribution cascade.
//!
//! A fee transfer credits the fee-collection wallet first; the cascade then
//! moves each share out of it, in this order, into the pool wallet that backs
//! the matching sub-ledger:
//!
//! 1. rakeback to the wagering user
//! 2. staking revenue share, split evenly over staked duel bots
//! 3. affiliate commission to the wagering user's referrer
//!
//! Whatever is not paid out stays in the fee wallet as the house residual.
//! Each share is clamped to the part of the fee still undistributed.

use super::{
    config::StakingScope,
    errors::{LedgerError, LedgerResult},
    manager::{LedgerManager, Movement},
    models::{
        BPS_DENOMINATOR, BalanceLoad, EntryId, EntryType, FeeDistribution, FeeMeta, OwnerRef,
        SystemWallet, UserId,
    },
    session::Session,
};
use crate::store::LedgerStore;
use chrono::{DateTime, Utc};

/// Pool wallets a fee transfer may credit
pub const FEE_POOLS: [SystemWallet; 3] = [
    SystemWallet::RakebackPool,
    SystemWallet::StakingPool,
    SystemWallet::AffiliatePool,
];

/// `amount * bps / 10_000`, floored
pub fn share_of(amount: i64, bps: i64) -> i64 {
    let share = i128::from(amount) * i128::from(bps) / i128::from(BPS_DENOMINATOR);
    i64::try_from(share).unwrap_or(if share < 0 { i64::MIN } else { i64::MAX })
}

/// Split `total` into `parts` equal integer shares; returns (per part, remainder)
pub fn split_evenly(total: i64, parts: usize) -> (i64, i64) {
    match i64::try_from(parts) {
        Ok(0) | Err(_) => (0, total),
        Ok(n) => (total / n, total % n),
    }
}

struct StakingPayout {
    paid: i64,
    positions: usize,
}

struct AffiliatePayout {
    code: String,
    paid: i64,
}

impl<S: LedgerStore> LedgerManager<S> {
    /// Split a collected fee across the reward pools
    ///
    /// Runs inside the fee transfer's session, after the fee wallet and all
    /// pool wallets have been locked.
    pub(crate) async fn distribute_fee(
        &self,
        session: &mut Session<S>,
        fee_wallet: UserId,
        fee: &FeeMeta,
        transferred: i64,
        owner: OwnerRef,
    ) -> LedgerResult<FeeDistribution> {
        let base = fee.fee_amount.unwrap_or(transferred);
        let now = Utc::now();
        let mut distribution = FeeDistribution {
            fee_amount: base,
            ..FeeDistribution::default()
        };
        let mut remaining = base;

        let rakeback = self
            .accrue_rakeback(session, fee.wager_user, base, remaining, now)
            .await?;
        if rakeback > 0 {
            let leg = self
                .pay_share(
                    session,
                    fee_wallet,
                    SystemWallet::RakebackPool,
                    rakeback,
                    EntryType::RakebackShare,
                    owner,
                )
                .await?;
            distribution.legs.push(leg);
            distribution.rakeback = rakeback;
            remaining -= rakeback;
        }

        let staking_share = share_of(base, self.config.fees.staking_share_bps).min(remaining);
        let staking = self
            .accrue_staking(session, fee.wager_user, staking_share)
            .await?;
        if staking.paid > 0 {
            let leg = self
                .pay_share(
                    session,
                    fee_wallet,
                    SystemWallet::StakingPool,
                    staking.paid,
                    EntryType::StakingShare,
                    owner,
                )
                .await?;
            distribution.legs.push(leg);
            remaining -= staking.paid;
        }
        distribution.staking = staking.paid;
        distribution.staking_positions = staking.positions;
        distribution.staking_unpaid = staking_share - staking.paid;

        if fee.suppress_affiliate_share {
            log::debug!("Affiliate share suppressed for wager by user {}", fee.wager_user);
        } else if let Some(affiliate) = self
            .accrue_affiliate(session, fee, base, remaining, now)
            .await?
        {
            if affiliate.paid > 0 {
                let leg = self
                    .pay_share(
                        session,
                        fee_wallet,
                        SystemWallet::AffiliatePool,
                        affiliate.paid,
                        EntryType::AffiliateShare,
                        owner,
                    )
                    .await?;
                distribution.legs.push(leg);
                remaining -= affiliate.paid;
            }
            distribution.affiliate = affiliate.paid;
            distribution.affiliate_code = Some(affiliate.code);
        }

        distribution.residual = remaining;

        log::info!(
            "Fee {} from wallet {}: rakeback {}, staking {} over {} positions ({} unpaid), affiliate {}, residual {}",
            base,
            fee_wallet,
            distribution.rakeback,
            distribution.staking,
            distribution.staking_positions,
            distribution.staking_unpaid,
            distribution.affiliate,
            distribution.residual
        );
        Ok(distribution)
    }

    async fn pay_share(
        &self,
        session: &mut Session<S>,
        fee_wallet: UserId,
        pool: SystemWallet,
        amount: i64,
        entry_type: EntryType,
        owner: OwnerRef,
    ) -> LedgerResult<EntryId> {
        let entry = self
            .move_funds(
                session,
                Movement::settled(
                    Some(fee_wallet),
                    Some(pool.id()),
                    BalanceLoad::chips(amount),
                    entry_type,
                    owner,
                ),
            )
            .await?;
        Ok(entry.id)
    }

    async fn accrue_rakeback(
        &self,
        session: &mut Session<S>,
        user: UserId,
        base: i64,
        remaining: i64,
        now: DateTime<Utc>,
    ) -> LedgerResult<i64> {
        let tx = session.tx()?;
        let mut account = self
            .store
            .lock_rakeback(tx, user, self.config.rakeback.base_rate_bps)
            .await?;
        let rate = account.effective_rate_bps(now, self.config.fees.rakeback_max_rate_bps);
        let share = share_of(base, rate).min(remaining);
        if share <= 0 {
            return Ok(0);
        }

        account.accrue(share)?;
        self.store.save_rakeback(tx, &account).await?;
        Ok(share)
    }

    async fn accrue_staking(
        &self,
        session: &mut Session<S>,
        wager_user: UserId,
        share: i64,
    ) -> LedgerResult<StakingPayout> {
        if share <= 0 {
            return Ok(StakingPayout {
                paid: 0,
                positions: 0,
            });
        }

        let staker = match self.config.fees.staking_scope {
            StakingScope::PlatformWide => None,
            StakingScope::WagerUserOnly => Some(wager_user),
        };

        let tx = session.tx()?;
        let positions = self.store.lock_staked_positions(tx, staker).await?;
        let count = positions.len();
        let (per_position, _) = split_evenly(share, count);
        if per_position == 0 {
            log::debug!("Staking share {share} left with the house, {count} staked positions");
            return Ok(StakingPayout {
                paid: 0,
                positions: count,
            });
        }

        for mut position in positions {
            position.accrue(per_position)?;
            self.store.save_position(tx, &position).await?;
        }

        let paid = per_position
            .checked_mul(i64::try_from(count).map_err(|_| LedgerError::BalanceOverflow)?)
            .ok_or(LedgerError::BalanceOverflow)?;
        Ok(StakingPayout {
            paid,
            positions: count,
        })
    }

    async fn accrue_affiliate(
        &self,
        session: &mut Session<S>,
        fee: &FeeMeta,
        base: i64,
        remaining: i64,
        now: DateTime<Utc>,
    ) -> LedgerResult<Option<AffiliatePayout>> {
        let tx = session.tx()?;
        let Some(affiliation) = self.store.find_affiliation(tx, fee.wager_user).await? else {
            return Ok(None);
        };
        if !affiliation.is_active(now) {
            log::debug!("Affiliation of user {} expired", fee.wager_user);
            return Ok(None);
        }

        let Some(mut account) = self
            .store
            .lock_affiliate_codes(tx, std::slice::from_ref(&affiliation.code))
            .await?
            .pop()
        else {
            return Ok(None);
        };
        if account.owner_id == fee.wager_user {
            return Ok(None);
        }

        let rate = account
            .custom_rate_bps
            .unwrap_or(self.config.fees.affiliate_share_bps);
        let share = share_of(base, rate).min(remaining).max(0);

        account.record_wager(fee.wager_amount)?;
        account.accrue(share)?;
        self.store.save_affiliate_code(tx, &account).await?;

        Ok(Some(AffiliatePayout {
            code: account.code,
            paid: share,
        }))
    }
}
