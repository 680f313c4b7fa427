//! AMM Benchmarks - Hot-Path Performance Validation
//!
//! Benchmarks the pricing functions every trade runs inside the store's
//! write lock, plus a full buy through the prediction service.
//!
//! Run with: cargo bench --bench amm_bench

use std::sync::Arc;

use chrono::{Duration, Utc};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rust_decimal_macros::dec;

use a2a_exchange::domain::amm::{AmmPricer, prices};
use a2a_exchange::domain::fees::FeeSchedule;
use a2a_exchange::domain::market::Outcome;
use a2a_exchange::domain::perp::{PerpSide, leveraged_pnl, liquidation_price};
use a2a_exchange::store::Store;
use a2a_exchange::usecases::ledger::LedgerService;
use a2a_exchange::usecases::prediction::PredictionService;

/// Benchmark the YES/NO price pair.
fn bench_prices(c: &mut Criterion) {
    c.bench_function("amm_prices", |b| {
        b.iter(|| prices(black_box(dec!(1234.5)), black_box(dec!(987.25))));
    });
}

/// Benchmark a fee-inclusive buy quote.
fn bench_buy_quote(c: &mut Criterion) {
    let pricer = AmmPricer::new(FeeSchedule::standard());
    c.bench_function("amm_buy_quote", |b| {
        b.iter(|| {
            pricer.calculate_buy_with_fees(
                black_box(dec!(1000)),
                black_box(dec!(1000)),
                Outcome::Yes,
                black_box(dec!(50)),
            )
        });
    });
}

/// Benchmark a sell quote (square root on the hot path).
fn bench_sell_quote(c: &mut Criterion) {
    let pricer = AmmPricer::new(FeeSchedule::standard());
    c.bench_function("amm_sell_quote", |b| {
        b.iter(|| {
            pricer.calculate_sell_with_fees(
                black_box(dec!(1049.5)),
                black_box(dec!(952.83)),
                Outcome::Yes,
                black_box(dec!(96.67)),
            )
        });
    });
}

/// Benchmark perp liquidation and PnL maths.
fn bench_perp_math(c: &mut Criterion) {
    c.bench_function("perp_liquidation_and_pnl", |b| {
        b.iter(|| {
            let liq = liquidation_price(PerpSide::Long, black_box(dec!(3000)), 10, dec!(0.9));
            let pnl = leveraged_pnl(PerpSide::Long, dec!(3000), black_box(dec!(2950)), dec!(100), 10);
            (liq, pnl)
        });
    });
}

/// Benchmark a full buy: transaction, ledger row and position upsert.
fn bench_service_buy(c: &mut Criterion) {
    let Ok(runtime) = tokio::runtime::Runtime::new() else {
        return;
    };
    let store = Arc::new(Store::new());
    let ledger = LedgerService::new(Arc::clone(&store), dec!(1000000000), 0);
    let prediction = PredictionService::new(
        Arc::clone(&store),
        AmmPricer::new(FeeSchedule::standard()),
        dec!(100000),
        5,
    );
    let Ok(market_id) = runtime.block_on(async {
        ledger.ensure_wallet("bench").await?;
        prediction
            .create_market("Bench?", Utc::now() + Duration::days(365), dec!(100000), dec!(100000))
            .await
            .map(|m| m.id)
    }) else {
        return;
    };

    c.bench_function("service_buy_shares", |b| {
        b.to_async(&runtime).iter(|| async {
            let _ = prediction
                .buy_shares("bench", &market_id, Outcome::No, black_box(dec!(1)))
                .await;
        });
    });
}

criterion_group!(
    benches,
    bench_prices,
    bench_buy_quote,
    bench_sell_quote,
    bench_perp_math,
    bench_service_buy,
);
criterion_main!(benches);
