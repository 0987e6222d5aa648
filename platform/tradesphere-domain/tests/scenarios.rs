use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::sync::Arc;
use tradesphere_domain::entities::ledger::Ledger;
use tradesphere_domain::services::engine::simulation::{
    NoopControl, SimulationPlan, SimulationRunner, SimulationState,
};
use tradesphere_domain::services::hedge::HedgeConfig;
use tradesphere_domain::services::price_resolver::{resolve, PriceBook};
use tradesphere_domain::value_objects::frequency::TradingFrequency;
use tradesphere_domain::value_objects::order_outcome::OrderOutcome;
use tradesphere_domain::value_objects::price_bar::PriceBar;
use tradesphere_domain::value_objects::price_series::PriceSeries;
use tradesphere_domain::value_objects::side::HedgeKind;

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 7, 21)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .expect("valid timestamp")
}

fn bar(timestamp: NaiveDateTime, low: f64, high: f64) -> PriceBar {
    PriceBar {
        timestamp,
        open: low,
        high,
        low,
        close: high,
        volume: 1_000.0,
    }
}

fn single_quote(symbol: &str, price: f64) -> Arc<PriceBook> {
    Arc::new(
        vec![PriceSeries::new(symbol, vec![bar(t0(), price, price)])]
            .into_iter()
            .collect(),
    )
}

#[test]
fn buy_below_limit_fills_at_market() {
    let mut ledger = Ledger::new(100_000.0, single_quote("AAPL", 220.0));
    let outcome = ledger.buy("AAPL", 225.0, 100.0, t0());
    assert_eq!(
        outcome,
        OrderOutcome::Filled {
            price: 220.0,
            shares: 100.0
        }
    );
    assert_eq!(ledger.cash(), 78_000.0);
    assert_eq!(ledger.long_shares("AAPL"), 100.0);
}

#[test]
fn sell_above_limit_fills_at_market() {
    let book: Arc<PriceBook> = Arc::new(
        vec![PriceSeries::new(
            "AAPL",
            vec![
                bar(t0(), 220.0, 220.0),
                bar(t0() + Duration::hours(1), 210.0, 210.0),
            ],
        )]
        .into_iter()
        .collect(),
    );
    let mut ledger = Ledger::new(100_000.0, book);
    assert!(ledger.buy("AAPL", 225.0, 100.0, t0()).is_filled());

    let outcome = ledger.sell("AAPL", 200.0, 50.0, t0() + Duration::hours(1));
    assert_eq!(
        outcome,
        OrderOutcome::Filled {
            price: 210.0,
            shares: 50.0
        }
    );
    assert_eq!(ledger.cash(), 88_500.0);
    assert_eq!(ledger.long_shares("AAPL"), 50.0);
}

#[test]
fn resolver_picks_nearest_bar_and_closes_outside_tolerance() {
    let intraday = PriceSeries::new(
        "AAPL",
        vec![
            bar(t0(), 10.0, 12.0),
            bar(t0() + Duration::hours(1), 11.0, 13.0),
        ],
    );
    assert_eq!(resolve(&intraday, t0() + Duration::minutes(25)), Some(11.0));
    assert_eq!(resolve(&intraday, t0() + Duration::hours(5)), None);

    // Bars three hours apart classify as daily; the midpoint tie goes to the earlier bar.
    let sparse = PriceSeries::new(
        "AAPL",
        vec![
            bar(t0(), 10.0, 12.0),
            bar(t0() + Duration::hours(3), 11.0, 13.0),
        ],
    );
    assert_eq!(resolve(&sparse, t0() + Duration::minutes(90)), Some(11.0));
    assert_eq!(resolve(&sparse, t0() + Duration::hours(5)), Some(12.0));
}

#[test]
fn short_hedge_reserves_half_notional() {
    let mut ledger = Ledger::new(50_000.0, single_quote("SPY", 400.0));
    assert_eq!(ledger.hedge_margin_available(), 25_000.0);
    let outcome = ledger.hedge_trade("SPY", 400.0, 100.0, t0(), HedgeKind::Short);
    assert!(outcome.is_filled());
    assert_eq!(ledger.hedge_margin_used(), 20_000.0);
    assert_eq!(ledger.cash(), 90_000.0);
    assert_eq!(ledger.short_shares("SPY"), 100.0);

    let refused = ledger.hedge_trade("SPY", 400.0, 26.0, t0(), HedgeKind::Short);
    assert!(!refused.is_filled());
    assert_eq!(ledger.hedge_margin_used(), 20_000.0);
}

fn daily_series(symbol: &str, start: NaiveDate, prices: &[f64]) -> PriceSeries {
    let origin = start.and_hms_opt(0, 0, 0).expect("valid timestamp");
    PriceSeries::new(
        symbol,
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| bar(origin + Duration::days(i as i64), *p, *p))
            .collect(),
    )
}

#[test]
fn hedged_simulation_shorts_benchmark_against_correlated_holding() {
    let start = NaiveDate::from_ymd_opt(2025, 7, 21).expect("valid date");
    let spy: Vec<f64> = (0..15)
        .map(|i| 400.0 + if i % 2 == 0 { 4.0 } else { -4.0 } * f64::from(i))
        .collect();
    let aapl: Vec<f64> = spy.iter().map(|p| p / 2.0).collect();
    let book: Arc<PriceBook> = Arc::new(
        vec![
            daily_series("SPY", start, &spy),
            daily_series("AAPL", start, &aapl),
        ]
        .into_iter()
        .collect(),
    );

    let mut plan = SimulationPlan::new("sim-hedge", 100_000.0, start, 10);
    plan.tickers.insert("AAPL".to_string(), 300.0);
    plan.hedge = Some(HedgeConfig::default());
    let results = SimulationRunner::new(plan, book)
        .expect("runner")
        .run(&NoopControl, &mut |_| {});

    assert_eq!(results.state, SimulationState::Completed);
    assert_eq!(results.snapshots.len(), 11);
    assert!(results.final_metrics.hedge_trades > 0);
    assert_eq!(results.hedge_trades[0].kind, HedgeKind::Short);
    assert!(results.final_metrics.hedge_margin_used <= results.final_metrics.hedge_margin_available);
    assert!(results
        .snapshots
        .iter()
        .flat_map(|s| s.trades_executed.iter())
        .any(|line| line.starts_with("Hedged: Shorted")));
    let rebalanced = results
        .audit_events
        .iter()
        .find(|e| e.stage == "hedge" && e.action == "rebalanced")
        .expect("rebalance event");
    assert_eq!(rebalanced.details["kinds"][0], "short");
}

#[test]
fn intraday_simulation_labels_sessions() {
    let start = NaiveDate::from_ymd_opt(2025, 7, 19).expect("valid date");
    let open = NaiveDate::from_ymd_opt(2025, 7, 21)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .expect("valid timestamp");
    let bars: Vec<PriceBar> = (0..48)
        .map(|h| bar(open + Duration::hours(h), 100.0, 101.0))
        .collect();
    let book: Arc<PriceBook> = Arc::new(
        vec![PriceSeries::new("AAPL", bars)].into_iter().collect(),
    );
    let mut plan = SimulationPlan::new("sim-intraday", 10_000.0, start, 2);
    plan.frequency = TradingFrequency::Intraday;
    plan.tickers.insert("AAPL".to_string(), 10.0);

    let results = SimulationRunner::new(plan, book)
        .expect("runner")
        .run(&NoopControl, &mut |_| {});
    let labels: Vec<&str> = results.snapshots.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels.len(), 13);
    assert_eq!(labels[0], "Day 0, Initial");
    assert_eq!(labels[1], "Day 1, 10:30");
    assert_eq!(labels[12], "Day 2, 15:30");
    assert_eq!(results.snapshots[0].timestamp, open);
}
