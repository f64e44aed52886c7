//! Integration tests for transfers and sessions.
//!
//! Tests chip and NFT movements, pending settlement, the balance snapshot
//! chain behind every entry, and composing several operations in one session.

use chip_ledger::{
    BalanceLoad, EntryStatus, EntryType, LedgerConfig, LedgerError, LedgerManager, MemoryStore,
    OwnerKind, OwnerRef, SettleRequest, SystemWallet, TransferRequest, UserId,
};
use std::sync::Arc;

fn ledger() -> LedgerManager<MemoryStore> {
    LedgerManager::new(Arc::new(MemoryStore::new()), LedgerConfig::default())
}

fn payment(id: i64) -> OwnerRef {
    OwnerRef::new(OwnerKind::Payment, id)
}

async fn deposit(ledger: &LedgerManager<MemoryStore>, wallet: UserId, chips: i64) {
    let request = TransferRequest::chips(None, Some(wallet), chips, EntryType::Deposit, payment(0));
    ledger.transfer(None, &request).await.unwrap();
}

#[tokio::test]
async fn test_snapshot_chain_links_entries() {
    let ledger = ledger();
    deposit(&ledger, 1, 100).await;
    let tip = TransferRequest::chips(
        Some(1),
        Some(2),
        30,
        EntryType::Tip,
        OwnerRef::new(OwnerKind::Tip, 1),
    );
    let entry = ledger.transfer(None, &tip).await.unwrap().entry;

    let history = ledger.store().balance_history(1);
    let amounts: Vec<i64> = history.iter().map(|s| s.chip_amount).collect();
    assert_eq!(amounts, vec![0, 100, 70]);
    assert_eq!(entry.from_prev_id, Some(history[1].id));
    assert_eq!(entry.from_next_id, Some(history[2].id));

    let receiver = ledger.store().balance_history(2);
    assert_eq!(entry.to_prev_id, Some(receiver[0].id));
    assert_eq!(entry.to_next_id, Some(receiver[1].id));
    assert_eq!(entry.amount_moved.chip, 30);
}

#[tokio::test]
async fn test_nft_and_chip_transfer() {
    let ledger = ledger();
    let mut mint = TransferRequest::chips(None, Some(1), 50, EntryType::Deposit, payment(1));
    mint.load = BalanceLoad::chips(50).with_nfts(["bot-1", "bot-2"]);
    ledger.transfer(None, &mint).await.unwrap();

    let mut bet = TransferRequest::chips(
        Some(1),
        Some(SystemWallet::JackpotPot.id()),
        20,
        EntryType::JackpotBet,
        OwnerRef::new(OwnerKind::JackpotRound, 4),
    );
    bet.load = BalanceLoad::chips(20).with_nfts(["bot-2"]);
    ledger.transfer(None, &bet).await.unwrap();

    let player = ledger.balance(None, 1).await.unwrap();
    assert_eq!(player, BalanceLoad::chips(30).with_nfts(["bot-1"]));
    let pot = ledger
        .balance(None, SystemWallet::JackpotPot.id())
        .await
        .unwrap();
    assert_eq!(pot, BalanceLoad::chips(20).with_nfts(["bot-2"]));

    let mut again = bet.clone();
    again.load = BalanceLoad::nfts(["bot-2"]);
    match ledger.transfer(None, &again).await {
        Err(LedgerError::InsufficientFunds { missing_nfts, .. }) => {
            assert_eq!(missing_nfts, vec!["bot-2".to_string()]);
        }
        other => panic!("expected insufficient funds, got {other:?}"),
    }
}

#[tokio::test]
async fn test_withdrawal_confirm_keeps_funds_out() {
    let ledger = ledger();
    deposit(&ledger, 5, 100).await;

    let withdraw =
        TransferRequest::chips(Some(5), None, 60, EntryType::Withdraw, payment(42)).pending();
    let receipt = ledger.transfer(None, &withdraw).await.unwrap();
    assert_eq!(receipt.entry.status, EntryStatus::Pending);
    assert_eq!(ledger.balance(None, 5).await.unwrap().chip, 40);

    let confirmed = ledger
        .confirm(
            None,
            &SettleRequest {
                entry_id: receipt.entry_id(),
                owner: payment(42),
            },
        )
        .await
        .unwrap();
    assert_eq!(confirmed.status, EntryStatus::Succeed);
    assert_eq!(ledger.balance(None, 5).await.unwrap().chip, 40);
}

#[tokio::test]
async fn test_decline_after_receiver_spent_fails_atomically() {
    let ledger = ledger();
    deposit(&ledger, 1, 100).await;

    let pending = TransferRequest::chips(Some(1), Some(2), 80, EntryType::Tip, payment(7)).pending();
    let receipt = ledger.transfer(None, &pending).await.unwrap();

    let spend = TransferRequest::chips(Some(2), Some(3), 50, EntryType::Tip, payment(8));
    ledger.transfer(None, &spend).await.unwrap();

    let settle = SettleRequest {
        entry_id: receipt.entry_id(),
        owner: payment(7),
    };
    assert!(matches!(
        ledger.decline(None, &settle).await,
        Err(LedgerError::InsufficientFunds { wallet: 2, .. })
    ));

    // The failed decline left the entry pending
    let entries = ledger.entries(None, 1, None).await.unwrap();
    let original = entries
        .iter()
        .find(|e| e.id == receipt.entry_id())
        .unwrap();
    assert_eq!(original.status, EntryStatus::Pending);
    assert_eq!(ledger.balance(None, 2).await.unwrap().chip, 30);

    ledger.confirm(None, &settle).await.unwrap();
}

#[tokio::test]
async fn test_entries_newest_first_with_limit() {
    let ledger = ledger();
    for amount in [10, 20, 30] {
        deposit(&ledger, 9, amount).await;
    }
    let withdraw = TransferRequest::chips(Some(9), None, 5, EntryType::Withdraw, payment(3));
    ledger.transfer(None, &withdraw).await.unwrap();

    let all = ledger.entries(None, 9, None).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].entry_type, EntryType::Withdraw);
    assert!(all.windows(2).all(|pair| pair[0].id > pair[1].id));

    let latest = ledger.entries(None, 9, Some(2)).await.unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[1].amount_moved.chip, 30);

    assert!(matches!(
        ledger.entries(None, 9, Some(-1)).await,
        Err(LedgerError::InvalidParameter(_))
    ));
    assert!(ledger.entries(None, 404, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_session_composes_bet_and_payout() {
    let ledger = ledger();
    deposit(&ledger, 1, 100).await;
    deposit(&ledger, SystemWallet::CoinflipPot.id(), 1_000).await;

    let mut session = ledger.sessions().start().await.unwrap();
    let round = OwnerRef::new(OwnerKind::CoinflipRound, 11);
    let bet = TransferRequest::chips(
        Some(1),
        Some(SystemWallet::CoinflipPot.id()),
        100,
        EntryType::CoinflipBet,
        round,
    );
    let payout = TransferRequest::chips(
        Some(SystemWallet::CoinflipPot.id()),
        Some(1),
        200,
        EntryType::CoinflipPayout,
        round,
    );
    ledger.transfer(Some(&mut session), &bet).await.unwrap();
    ledger.transfer(Some(&mut session), &payout).await.unwrap();

    // Reads through the session see its own writes
    assert_eq!(ledger.balance(Some(&mut session), 1).await.unwrap().chip, 200);
    ledger.sessions().commit(session).await.unwrap();

    assert_eq!(ledger.balance(None, 1).await.unwrap().chip, 200);
    assert_eq!(
        ledger
            .balance(None, SystemWallet::CoinflipPot.id())
            .await
            .unwrap()
            .chip,
        900
    );
}

#[tokio::test]
async fn test_discarded_session_leaves_no_trace() {
    let ledger = ledger();
    deposit(&ledger, 1, 100).await;

    let mut session = ledger.sessions().start().await.unwrap();
    let tip = TransferRequest::chips(Some(1), Some(2), 40, EntryType::Tip, payment(1));
    ledger.transfer(Some(&mut session), &tip).await.unwrap();
    ledger.sessions().discard(&mut session).await.unwrap();
    ledger.sessions().discard(&mut session).await.unwrap();

    assert_eq!(ledger.balance(None, 1).await.unwrap().chip, 100);
    assert!(ledger.entries(None, 2, None).await.unwrap().is_empty());
    assert_eq!(ledger.store().tracked_locks(), 0);

    assert!(matches!(
        ledger.transfer(Some(&mut session), &tip).await,
        Err(LedgerError::SessionFailure(_))
    ));
}

#[tokio::test]
async fn test_commit_refused_after_failed_operation_in_session() {
    let ledger = ledger();
    deposit(&ledger, 1, 10).await;
    deposit(&ledger, 2, i64::MAX).await;

    let mut session = ledger.sessions().start().await.unwrap();
    let tip = TransferRequest::chips(Some(1), Some(3), 4, EntryType::Tip, payment(1));
    ledger.transfer(Some(&mut session), &tip).await.unwrap();

    // Debit of wallet 1 is staged before the credit overflows wallet 2
    let overflow = TransferRequest::chips(Some(1), Some(2), 1, EntryType::Tip, payment(2));
    assert!(matches!(
        ledger.transfer(Some(&mut session), &overflow).await,
        Err(LedgerError::BalanceOverflow)
    ));
    assert!(session.is_poisoned());
    assert!(matches!(
        ledger.transfer(Some(&mut session), &tip).await,
        Err(LedgerError::SessionFailure(_))
    ));

    assert!(matches!(
        ledger.sessions().commit(session).await,
        Err(LedgerError::SessionFailure(_))
    ));

    assert_eq!(ledger.balance(None, 1).await.unwrap().chip, 10);
    assert_eq!(ledger.balance(None, 2).await.unwrap().chip, i64::MAX);
    assert_eq!(ledger.balance(None, 3).await.unwrap().chip, 0);
    assert_eq!(ledger.entries(None, 1, None).await.unwrap().len(), 1);
    assert_eq!(
        ledger.replay_wallet(None, 1).await.unwrap(),
        ledger.balance(None, 1).await.unwrap()
    );
    assert_eq!(ledger.store().tracked_locks(), 0);
}

#[tokio::test]
async fn test_nft_cannot_be_minted_twice() {
    let ledger = ledger();
    let mut mint = TransferRequest::chips(None, Some(1), 0, EntryType::Deposit, payment(1));
    mint.load = BalanceLoad::nfts(["x"]);
    ledger.transfer(None, &mint).await.unwrap();

    let mut again = mint.clone();
    again.to = Some(2);
    assert!(matches!(
        ledger.transfer(None, &again).await,
        Err(LedgerError::InvalidParameter(_))
    ));
    assert!(ledger.balance(None, 2).await.unwrap().nft_ids.is_empty());

    // Once withdrawn, the id may enter the ledger again
    let mut withdraw = TransferRequest::chips(Some(1), None, 0, EntryType::Withdraw, payment(2));
    withdraw.load = BalanceLoad::nfts(["x"]);
    ledger.transfer(None, &withdraw).await.unwrap();
    ledger.transfer(None, &again).await.unwrap();
    assert!(ledger.balance(None, 2).await.unwrap().nft_ids.contains("x"));
}

#[tokio::test]
async fn test_replay_matches_balance_after_mixed_history() {
    let ledger = ledger();
    deposit(&ledger, 1, 500).await;
    let pending = TransferRequest::chips(Some(1), Some(2), 200, EntryType::Tip, payment(5)).pending();
    let receipt = ledger.transfer(None, &pending).await.unwrap();
    ledger
        .decline(
            None,
            &SettleRequest {
                entry_id: receipt.entry_id(),
                owner: payment(5),
            },
        )
        .await
        .unwrap();
    let withdraw = TransferRequest::chips(Some(1), None, 120, EntryType::Withdraw, payment(6));
    ledger.transfer(None, &withdraw).await.unwrap();

    for wallet in [1, 2] {
        let replayed = ledger.replay_wallet(None, wallet).await.unwrap();
        assert_eq!(replayed, ledger.balance(None, wallet).await.unwrap());
    }
    assert_eq!(ledger.balance(None, 1).await.unwrap().chip, 380);
}
