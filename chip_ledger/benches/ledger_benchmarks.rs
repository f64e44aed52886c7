use chip_ledger::{
    EntryType, FeeMeta, LedgerConfig, LedgerManager, MemoryStore, OwnerKind, OwnerRef,
    SystemWallet, TransferRequest, share_of,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Ledger with `players` funded wallets and a funded coinflip pot
fn setup_ledger(rt: &Runtime, players: i64) -> LedgerManager<MemoryStore> {
    let ledger = LedgerManager::new(Arc::new(MemoryStore::new()), LedgerConfig::default());
    rt.block_on(async {
        for wallet in (1..=players).chain([SystemWallet::CoinflipPot.id()]) {
            let request = TransferRequest::chips(
                None,
                Some(wallet),
                i64::MAX / 4,
                EntryType::Deposit,
                OwnerRef::new(OwnerKind::Admin, 0),
            );
            ledger.transfer(None, &request).await.unwrap();
        }
    });
    ledger
}

/// Benchmark a plain chip transfer between two players
fn bench_transfer(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let ledger = setup_ledger(&rt, 2);
    let request = TransferRequest::chips(
        Some(1),
        Some(2),
        1,
        EntryType::Tip,
        OwnerRef::new(OwnerKind::Tip, 1),
    );

    c.bench_function("transfer_chips", |b| {
        b.to_async(&rt)
            .iter(|| async { ledger.transfer(None, black_box(&request)).await.unwrap() });
    });
}

/// Benchmark the fee cascade with a growing number of staked duel bots
fn bench_fee_cascade(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("fee_cascade");

    for bots in [0usize, 10, 100] {
        let ledger = setup_ledger(&rt, 1);
        if bots > 0 {
            let ids: Vec<String> = (0..bots).map(|i| format!("bench-bot-{i}")).collect();
            rt.block_on(async {
                ledger.register_duel_bots(None, &ids).await.unwrap();
                let mut mint = TransferRequest::chips(
                    None,
                    Some(1),
                    0,
                    EntryType::Deposit,
                    OwnerRef::new(OwnerKind::Admin, 0),
                );
                mint.load = chip_ledger::BalanceLoad::nfts(ids.iter().cloned());
                ledger.transfer(None, &mint).await.unwrap();
                ledger.stake_duel_bots(None, 1, &ids).await.unwrap();
            });
        }

        let request = TransferRequest::chips(
            Some(SystemWallet::CoinflipPot.id()),
            Some(SystemWallet::CoinflipFee.id()),
            10_000,
            EntryType::Fee,
            OwnerRef::new(OwnerKind::CoinflipRound, 1),
        )
        .with_fee(FeeMeta {
            wager_user: 1,
            wager_amount: 200_000,
            fee_amount: None,
            suppress_affiliate_share: false,
        });

        group.bench_with_input(BenchmarkId::from_parameter(bots), &request, |b, request| {
            b.to_async(&rt)
                .iter(|| async { ledger.transfer(None, request).await.unwrap() });
        });
    }

    group.finish();
}

/// Benchmark share arithmetic
fn bench_share_of(c: &mut Criterion) {
    c.bench_function("share_of", |b| {
        b.iter(|| share_of(black_box(123_456_789), black_box(1_250)));
    });
}

criterion_group!(benches, bench_transfer, bench_fee_cascade, bench_share_of);
criterion_main!(benches);
