//! Integration tests for fee distribution.
//!
//! A fee transfer into a game's fee wallet splits the collected fee into
//! rakeback, duel bot staking and affiliate shares. Every share is a real chip
//! movement into a pool wallet, so the sum over all wallets never changes.

use chip_ledger::{
    BalanceLoad, EntryType, FeeMeta, LedgerConfig, LedgerError, LedgerManager, MemoryStore,
    OwnerKind, OwnerRef, StakingScope, SystemWallet, TransferRequest, UserId,
};
use chrono::Utc;
use std::sync::Arc;

const WAGER_USER: UserId = 7;
const STAKER: UserId = 8;
const REFERRER: UserId = 9;

fn ledger_with(config: LedgerConfig) -> LedgerManager<MemoryStore> {
    LedgerManager::new(Arc::new(MemoryStore::new()), config)
}

fn round(id: i64) -> OwnerRef {
    OwnerRef::new(OwnerKind::CoinflipRound, id)
}

async fn fund(ledger: &LedgerManager<MemoryStore>, wallet: UserId, chips: i64) {
    let request = TransferRequest::chips(
        None,
        Some(wallet),
        chips,
        EntryType::Deposit,
        OwnerRef::new(OwnerKind::Admin, 0),
    );
    ledger.transfer(None, &request).await.unwrap();
}

async fn chips(ledger: &LedgerManager<MemoryStore>, wallet: UserId) -> i64 {
    ledger.balance(None, wallet).await.unwrap().chip
}

/// Stake `names` for `user`, minting the NFTs first
async fn stake(ledger: &LedgerManager<MemoryStore>, user: UserId, names: &[&str]) {
    let ids: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    ledger.register_duel_bots(None, &ids).await.unwrap();

    let mut mint = TransferRequest::chips(
        None,
        Some(user),
        0,
        EntryType::Deposit,
        OwnerRef::new(OwnerKind::Admin, 0),
    );
    mint.load = BalanceLoad::nfts(ids.iter().cloned());
    ledger.transfer(None, &mint).await.unwrap();

    ledger.stake_duel_bots(None, user, &ids).await.unwrap();
}

fn fee_transfer(amount: i64, meta: FeeMeta) -> TransferRequest {
    TransferRequest::chips(
        Some(SystemWallet::CoinflipPot.id()),
        Some(SystemWallet::CoinflipFee.id()),
        amount,
        EntryType::Fee,
        round(1),
    )
    .with_fee(meta)
}

fn meta(wager_user: UserId) -> FeeMeta {
    FeeMeta {
        wager_user,
        wager_amount: 1_000,
        fee_amount: None,
        suppress_affiliate_share: false,
    }
}

/// Sum of every wallet the scenarios touch
async fn total_chips(ledger: &LedgerManager<MemoryStore>, users: &[UserId]) -> i64 {
    let mut total = 0;
    for wallet in SystemWallet::ALL {
        total += chips(ledger, wallet.id()).await;
    }
    for user in users {
        total += chips(ledger, *user).await;
    }
    total
}

#[tokio::test]
async fn test_full_cascade_scenario() {
    let ledger = ledger_with(LedgerConfig::default());
    fund(&ledger, SystemWallet::CoinflipPot.id(), 100).await;
    fund(&ledger, SystemWallet::CoinflipFee.id(), 50).await;

    stake(&ledger, STAKER, &["bot-a", "bot-b"]).await;
    ledger
        .create_affiliate_code(None, REFERRER, "REF_CODE", None, false)
        .await
        .unwrap();
    ledger
        .activate_affiliation(None, WAGER_USER, "REF_CODE", Utc::now())
        .await
        .unwrap();

    let before = total_chips(&ledger, &[WAGER_USER, STAKER, REFERRER]).await;
    let receipt = ledger
        .transfer(None, &fee_transfer(100, meta(WAGER_USER)))
        .await
        .unwrap();
    let distribution = receipt.distribution.expect("fee transfer is distributed");

    assert_eq!(distribution.fee_amount, 100);
    assert_eq!(distribution.rakeback, 10);
    assert_eq!(distribution.staking, 80);
    assert_eq!(distribution.staking_positions, 2);
    assert_eq!(distribution.staking_unpaid, 0);
    assert_eq!(distribution.affiliate, 2);
    assert_eq!(distribution.affiliate_code.as_deref(), Some("REF_CODE"));
    assert_eq!(distribution.residual, 8);
    assert_eq!(distribution.legs.len(), 3);

    assert_eq!(chips(&ledger, SystemWallet::CoinflipPot.id()).await, 0);
    assert_eq!(chips(&ledger, SystemWallet::CoinflipFee.id()).await, 58);
    assert_eq!(chips(&ledger, SystemWallet::RakebackPool.id()).await, 10);
    assert_eq!(chips(&ledger, SystemWallet::StakingPool.id()).await, 80);
    assert_eq!(chips(&ledger, SystemWallet::AffiliatePool.id()).await, 2);

    let rakeback = ledger.rakeback_account(None, WAGER_USER).await.unwrap();
    assert_eq!(rakeback.reward, 10);
    assert_eq!(rakeback.total_earned, 10);

    let positions = ledger.staked_positions(None, STAKER).await.unwrap();
    assert_eq!(positions.len(), 2);
    assert!(positions.iter().all(|p| p.staking_reward == 40));

    let codes = ledger.affiliate_codes(None, REFERRER).await.unwrap();
    assert_eq!(codes[0].reward, 2);
    assert_eq!(codes[0].total_wagered, 1_000);

    let after = total_chips(&ledger, &[WAGER_USER, STAKER, REFERRER]).await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_no_stakers_leaves_share_with_house() {
    let ledger = ledger_with(LedgerConfig::default());
    fund(&ledger, SystemWallet::JackpotPot.id(), 200).await;

    let request = TransferRequest::chips(
        Some(SystemWallet::JackpotPot.id()),
        Some(SystemWallet::JackpotFee.id()),
        200,
        EntryType::Fee,
        OwnerRef::new(OwnerKind::JackpotRound, 3),
    )
    .with_fee(meta(WAGER_USER));
    let distribution = ledger.transfer(None, &request).await.unwrap().distribution.unwrap();

    assert_eq!(distribution.rakeback, 20);
    assert_eq!(distribution.staking, 0);
    assert_eq!(distribution.staking_unpaid, 160);
    assert_eq!(distribution.affiliate, 0);
    assert!(distribution.affiliate_code.is_none());
    assert_eq!(distribution.residual, 180);
    assert_eq!(chips(&ledger, SystemWallet::JackpotFee.id()).await, 180);
    assert_eq!(chips(&ledger, SystemWallet::StakingPool.id()).await, 0);
}

#[tokio::test]
async fn test_uneven_staking_split_remainder_stays() {
    let ledger = ledger_with(LedgerConfig::default());
    fund(&ledger, SystemWallet::CrashPot.id(), 100).await;
    stake(&ledger, STAKER, &["bot-1", "bot-2", "bot-3"]).await;

    let request = TransferRequest::chips(
        Some(SystemWallet::CrashPot.id()),
        Some(SystemWallet::CrashFee.id()),
        100,
        EntryType::Fee,
        OwnerRef::new(OwnerKind::CrashRound, 1),
    )
    .with_fee(meta(WAGER_USER));
    let distribution = ledger.transfer(None, &request).await.unwrap().distribution.unwrap();

    // 80 over three positions
    assert_eq!(distribution.staking, 78);
    assert_eq!(distribution.staking_unpaid, 2);
    assert_eq!(distribution.residual, 100 - 10 - 78);
    let positions = ledger.staked_positions(None, STAKER).await.unwrap();
    assert!(positions.iter().all(|p| p.staking_reward == 26));
}

#[tokio::test]
async fn test_fee_amount_overrides_share_base() {
    let ledger = ledger_with(LedgerConfig::default());
    fund(&ledger, SystemWallet::CoinflipPot.id(), 1_000).await;

    let mut fee = meta(WAGER_USER);
    fee.fee_amount = Some(50);
    let distribution = ledger
        .transfer(None, &fee_transfer(1_000, fee))
        .await
        .unwrap()
        .distribution
        .unwrap();

    assert_eq!(distribution.fee_amount, 50);
    assert_eq!(distribution.rakeback, 5);
    // Payout part of the transfer stays in the fee wallet untouched
    assert_eq!(chips(&ledger, SystemWallet::CoinflipFee.id()).await, 995);
}

#[tokio::test]
async fn test_suppressed_affiliate_share() {
    let ledger = ledger_with(LedgerConfig::default());
    fund(&ledger, SystemWallet::CoinflipPot.id(), 100).await;
    ledger
        .create_affiliate_code(None, REFERRER, "QUIET", None, false)
        .await
        .unwrap();
    ledger
        .activate_affiliation(None, WAGER_USER, "QUIET", Utc::now())
        .await
        .unwrap();

    let mut fee = meta(WAGER_USER);
    fee.suppress_affiliate_share = true;
    let distribution = ledger
        .transfer(None, &fee_transfer(100, fee))
        .await
        .unwrap()
        .distribution
        .unwrap();

    assert_eq!(distribution.affiliate, 0);
    assert!(distribution.affiliate_code.is_none());
    let codes = ledger.affiliate_codes(None, REFERRER).await.unwrap();
    assert_eq!(codes[0].reward, 0);
    assert_eq!(codes[0].total_wagered, 0);
}

#[tokio::test]
async fn test_custom_affiliate_rate() {
    let ledger = ledger_with(LedgerConfig::default());
    fund(&ledger, SystemWallet::CoinflipPot.id(), 100).await;
    ledger
        .create_affiliate_code(None, REFERRER, "VIP", Some(500), false)
        .await
        .unwrap();
    ledger
        .activate_affiliation(None, WAGER_USER, "VIP", Utc::now())
        .await
        .unwrap();

    let distribution = ledger
        .transfer(None, &fee_transfer(100, meta(WAGER_USER)))
        .await
        .unwrap()
        .distribution
        .unwrap();
    assert_eq!(distribution.affiliate, 5);
}

#[tokio::test]
async fn test_shares_never_exceed_fee() {
    let mut config = LedgerConfig::default();
    config.rakeback.base_rate_bps = 2_000;
    config.fees.staking_share_bps = 9_000;
    config.fees.affiliate_share_bps = 1_000;
    let ledger = ledger_with(config);
    fund(&ledger, SystemWallet::CoinflipPot.id(), 100).await;
    stake(&ledger, STAKER, &["bot-x"]).await;
    ledger
        .create_affiliate_code(None, REFERRER, "GREEDY", None, false)
        .await
        .unwrap();
    ledger
        .activate_affiliation(None, WAGER_USER, "GREEDY", Utc::now())
        .await
        .unwrap();

    let distribution = ledger
        .transfer(None, &fee_transfer(100, meta(WAGER_USER)))
        .await
        .unwrap()
        .distribution
        .unwrap();

    assert_eq!(distribution.rakeback, 20);
    assert_eq!(distribution.staking, 80);
    assert_eq!(distribution.affiliate, 0);
    assert_eq!(distribution.residual, 0);
    assert_eq!(chips(&ledger, SystemWallet::CoinflipFee.id()).await, 0);
}

#[tokio::test]
async fn test_wager_user_scope_only_pays_own_bots() {
    let mut config = LedgerConfig::default();
    config.fees.staking_scope = StakingScope::WagerUserOnly;
    let ledger = ledger_with(config);
    fund(&ledger, SystemWallet::CoinflipPot.id(), 100).await;
    stake(&ledger, STAKER, &["other-bot"]).await;
    stake(&ledger, WAGER_USER, &["own-bot"]).await;

    let distribution = ledger
        .transfer(None, &fee_transfer(100, meta(WAGER_USER)))
        .await
        .unwrap()
        .distribution
        .unwrap();

    assert_eq!(distribution.staking_positions, 1);
    assert_eq!(distribution.staking, 80);
    let own = ledger.staked_positions(None, WAGER_USER).await.unwrap();
    assert_eq!(own[0].staking_reward, 80);
    let other = ledger.staked_positions(None, STAKER).await.unwrap();
    assert_eq!(other[0].staking_reward, 0);
}

#[tokio::test]
async fn test_fee_transfer_rejections() {
    let ledger = ledger_with(LedgerConfig::default());
    fund(&ledger, SystemWallet::CoinflipPot.id(), 100).await;

    let pending = fee_transfer(10, meta(WAGER_USER)).pending();
    assert!(matches!(
        ledger.transfer(None, &pending).await,
        Err(LedgerError::InvalidParameter(_))
    ));

    let house_wager = fee_transfer(10, meta(SystemWallet::CrashPot.id()));
    assert!(matches!(
        ledger.transfer(None, &house_wager).await,
        Err(LedgerError::InvalidParameter(_))
    ));

    let mut too_big = meta(WAGER_USER);
    too_big.fee_amount = Some(11);
    assert!(matches!(
        ledger.transfer(None, &fee_transfer(10, too_big)).await,
        Err(LedgerError::InvalidParameter(_))
    ));

    let short = fee_transfer(500, meta(WAGER_USER));
    assert!(matches!(
        ledger.transfer(None, &short).await,
        Err(LedgerError::InsufficientFunds { .. })
    ));

    // Nothing accrued by the failed attempts
    let rakeback = ledger.rakeback_account(None, WAGER_USER).await.unwrap();
    assert_eq!(rakeback.reward, 0);
    assert_eq!(chips(&ledger, SystemWallet::CoinflipPot.id()).await, 100);
}
