/// Property-based tests for the ledger using proptest
///
/// Random sequences of deposits, transfers, withdrawals, pending settlements
/// and fee collections are applied to an in-memory ledger. Whatever the
/// sequence, chips are conserved and every wallet replays to its balance.
use chip_ledger::{
    EntryStatus, EntryType, FeeMeta, LedgerConfig, LedgerManager, MemoryStore, OwnerKind,
    OwnerRef, SettleRequest, SystemWallet, TransferRequest, UserId, share_of, split_evenly,
};
use proptest::prelude::*;
use std::sync::Arc;

const PLAYERS: [UserId; 3] = [1, 2, 3];

#[derive(Debug, Clone)]
enum Op {
    Deposit { to: usize, amount: i64 },
    Withdraw { from: usize, amount: i64 },
    Tip { from: usize, to: usize, amount: i64 },
    PendingTip { from: usize, to: usize, amount: i64, accept: bool },
    Bet { from: usize, amount: i64 },
    Fee { wager: usize, amount: i64 },
    ClaimRakeback { user: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 1..500i64).prop_map(|(to, amount)| Op::Deposit { to, amount }),
        (0..3usize, 1..300i64).prop_map(|(from, amount)| Op::Withdraw { from, amount }),
        (0..3usize, 0..3usize, 1..300i64).prop_map(|(from, to, amount)| Op::Tip {
            from,
            to,
            amount
        }),
        (0..3usize, 0..3usize, 1..300i64, any::<bool>()).prop_map(
            |(from, to, amount, accept)| Op::PendingTip {
                from,
                to,
                amount,
                accept
            }
        ),
        (0..3usize, 1..300i64).prop_map(|(from, amount)| Op::Bet { from, amount }),
        (0..3usize, 1..200i64).prop_map(|(wager, amount)| Op::Fee { wager, amount }),
        (0..3usize).prop_map(|user| Op::ClaimRakeback { user }),
    ]
}

fn owner(step: usize) -> OwnerRef {
    OwnerRef::new(OwnerKind::Admin, i64::try_from(step).unwrap_or(i64::MAX))
}

/// Apply one op; returns the change in chips held inside the ledger
async fn apply(ledger: &LedgerManager<MemoryStore>, step: usize, op: &Op) -> i64 {
    match *op {
        Op::Deposit { to, amount } => {
            let request =
                TransferRequest::chips(None, Some(PLAYERS[to]), amount, EntryType::Deposit, owner(step));
            ledger.transfer(None, &request).await.unwrap();
            amount
        }
        Op::Withdraw { from, amount } => {
            let request =
                TransferRequest::chips(Some(PLAYERS[from]), None, amount, EntryType::Withdraw, owner(step));
            match ledger.transfer(None, &request).await {
                Ok(_) => -amount,
                Err(_) => 0,
            }
        }
        Op::Tip { from, to, amount } => {
            if from != to {
                let request = TransferRequest::chips(
                    Some(PLAYERS[from]),
                    Some(PLAYERS[to]),
                    amount,
                    EntryType::Tip,
                    owner(step),
                );
                let _ = ledger.transfer(None, &request).await;
            }
            0
        }
        Op::PendingTip {
            from,
            to,
            amount,
            accept,
        } => {
            if from == to {
                return 0;
            }
            let request = TransferRequest::chips(
                Some(PLAYERS[from]),
                Some(PLAYERS[to]),
                amount,
                EntryType::Tip,
                owner(step),
            )
            .pending();
            let Ok(receipt) = ledger.transfer(None, &request).await else {
                return 0;
            };
            let settle = SettleRequest {
                entry_id: receipt.entry_id(),
                owner: owner(step),
            };
            if accept {
                ledger.confirm(None, &settle).await.unwrap();
            } else {
                let declined = ledger.decline(None, &settle).await.unwrap();
                assert_eq!(declined.declined.status, EntryStatus::Failed);
            }
            0
        }
        Op::Bet { from, amount } => {
            let request = TransferRequest::chips(
                Some(PLAYERS[from]),
                Some(SystemWallet::CoinflipPot.id()),
                amount,
                EntryType::CoinflipBet,
                owner(step),
            );
            let _ = ledger.transfer(None, &request).await;
            0
        }
        Op::Fee { wager, amount } => {
            let request = TransferRequest::chips(
                Some(SystemWallet::CoinflipPot.id()),
                Some(SystemWallet::CoinflipFee.id()),
                amount,
                EntryType::Fee,
                owner(step),
            )
            .with_fee(FeeMeta {
                wager_user: PLAYERS[wager],
                wager_amount: amount * 10,
                fee_amount: None,
                suppress_affiliate_share: false,
            });
            if let Ok(receipt) = ledger.transfer(None, &request).await {
                let distribution = receipt.distribution.unwrap();
                assert!(distribution.distributed() <= distribution.fee_amount);
                assert_eq!(
                    distribution.distributed() + distribution.residual,
                    distribution.fee_amount
                );
            }
            0
        }
        Op::ClaimRakeback { user } => {
            let _ = ledger.claim_rakeback(None, PLAYERS[user]).await;
            0
        }
    }
}

fn run<F: std::future::Future<Output = ()>>(future: F) {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_chips_conserved_and_replayable(ops in prop::collection::vec(op_strategy(), 1..40)) {
        run(async {
            let ledger = LedgerManager::new(Arc::new(MemoryStore::new()), LedgerConfig::default());
            let mut expected = 0i64;
            for (step, op) in ops.iter().enumerate() {
                expected += apply(&ledger, step, op).await;
            }

            let mut total = 0i64;
            let wallets = PLAYERS
                .iter()
                .copied()
                .chain(SystemWallet::ALL.iter().map(|w| w.id()));
            for wallet in wallets {
                let held = ledger.balance(None, wallet).await.unwrap();
                assert!(held.chip >= 0);
                assert_eq!(ledger.replay_wallet(None, wallet).await.unwrap(), held);
                total += held.chip;
            }
            assert_eq!(total, expected);

            let mut unclaimed = 0i64;
            for user in PLAYERS {
                unclaimed += ledger.rakeback_account(None, user).await.unwrap().reward;
            }
            let pool = ledger
                .balance(None, SystemWallet::RakebackPool.id())
                .await
                .unwrap()
                .chip;
            assert_eq!(unclaimed, pool);
            assert_eq!(ledger.store().tracked_locks(), 0);
        });
    }

    #[test]
    fn test_share_of_never_exceeds_amount(amount in 0..i64::MAX, bps in 0..=10_000i64) {
        let share = share_of(amount, bps);
        prop_assert!(share >= 0);
        prop_assert!(share <= amount);
    }

    #[test]
    fn test_split_evenly_reassembles(total in 0..1_000_000i64, parts in 0..64usize) {
        let (per, remainder) = split_evenly(total, parts);
        let parts_i64 = i64::try_from(parts).unwrap();
        prop_assert_eq!(per * parts_i64 + remainder, total);
        prop_assert!(remainder >= 0);
        if parts > 0 {
            prop_assert!(remainder < parts_i64);
        }
    }
}
