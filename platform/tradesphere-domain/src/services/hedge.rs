use crate::entities::ledger::Ledger;
use crate::entities::metrics;
use crate::services::rule_engine::format_shares;
use crate::value_objects::order_outcome::{OrderOutcome, RejectReason};
use crate::value_objects::side::HedgeKind;
use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct HedgeConfig {
    pub benchmark: String,
    /// Betas with magnitude at or below this are left unhedged.
    pub beta_threshold: f64,
    /// Cap on hedge notional as a fraction of long exposure.
    pub max_hedge_fraction: f64,
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            benchmark: "SPY".to_string(),
            beta_threshold: 0.05,
            max_hedge_fraction: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HedgeSkip {
    BetaUndefined,
    BelowThreshold { beta: f64 },
    BenchmarkUnavailable,
    NoExposure,
    BelowOneShare,
    /// Margin could not support even a single share after a refused short.
    MarginExhausted,
}

impl HedgeSkip {
    pub fn code(&self) -> &'static str {
        match self {
            HedgeSkip::BetaUndefined => "beta_undefined",
            HedgeSkip::BelowThreshold { .. } => "below_threshold",
            HedgeSkip::BenchmarkUnavailable => "benchmark_unavailable",
            HedgeSkip::NoExposure => "no_exposure",
            HedgeSkip::BelowOneShare => "below_one_share",
            HedgeSkip::MarginExhausted => "margin_exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HedgeFill {
    pub kind: HedgeKind,
    pub shares: f64,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HedgeAction {
    Skipped(HedgeSkip),
    Traded { fills: Vec<HedgeFill> },
    Rejected { reason: RejectReason },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HedgeOutcome {
    pub beta: Option<f64>,
    pub target_shares: f64,
    pub action: HedgeAction,
}

impl HedgeOutcome {
    fn skipped(beta: Option<f64>, skip: HedgeSkip) -> Self {
        Self {
            beta,
            target_shares: 0.0,
            action: HedgeAction::Skipped(skip),
        }
    }

    pub fn descriptions(&self, benchmark: &str) -> Vec<String> {
        let HedgeAction::Traded { fills } = &self.action else {
            return Vec::new();
        };
        fills
            .iter()
            .map(|fill| {
                let verb = match fill.kind {
                    HedgeKind::Short => "Shorted",
                    HedgeKind::Cover => "Covered",
                    HedgeKind::MarginBuy => "Bought",
                };
                format!(
                    "Hedged: {verb} {} {benchmark} @ ${:.2}",
                    format_shares(fill.shares),
                    fill.price
                )
            })
            .collect()
    }
}

/// Beta-neutralizing controller. Re-estimates beta from the ledger's
/// valuation history on every call, so its own trades feed back next tick.
#[derive(Debug, Clone)]
pub struct HedgeController {
    config: HedgeConfig,
}

impl HedgeController {
    pub fn new(config: HedgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HedgeConfig {
        &self.config
    }

    pub fn benchmark(&self) -> &str {
        &self.config.benchmark
    }

    pub fn rebalance(&self, ledger: &mut Ledger, at: NaiveDateTime) -> HedgeOutcome {
        let benchmark = self.config.benchmark.as_str();
        let Some(series) = ledger.prices().series(benchmark) else {
            return HedgeOutcome::skipped(None, HedgeSkip::BenchmarkUnavailable);
        };
        let points: Vec<(NaiveDateTime, f64)> = ledger
            .valuation_history()
            .iter()
            .map(|(ts, value)| (*ts, *value))
            .collect();
        let Some(estimate) = metrics::beta(&points, series) else {
            return HedgeOutcome::skipped(None, HedgeSkip::BetaUndefined);
        };
        let beta = estimate.beta;
        if beta.abs() <= self.config.beta_threshold {
            return HedgeOutcome::skipped(Some(beta), HedgeSkip::BelowThreshold { beta });
        }

        let Some(benchmark_price) = ledger.price_at(benchmark, at).filter(|p| *p > 0.0) else {
            return HedgeOutcome::skipped(Some(beta), HedgeSkip::BenchmarkUnavailable);
        };

        let exposure: f64 = ledger
            .long_positions()
            .iter()
            .filter(|(symbol, _)| symbol.as_str() != benchmark)
            .filter_map(|(symbol, shares)| ledger.price_at(symbol, at).map(|p| p * shares))
            .sum();
        if exposure <= 0.0 {
            return HedgeOutcome::skipped(Some(beta), HedgeSkip::NoExposure);
        }

        let wanted = (exposure * beta / benchmark_price).abs();
        let cap = self.config.max_hedge_fraction * exposure / benchmark_price;
        let shares = wanted.min(cap).floor();
        if shares < 1.0 {
            return HedgeOutcome::skipped(Some(beta), HedgeSkip::BelowOneShare);
        }

        let action = if beta > 0.0 {
            self.short(ledger, benchmark, benchmark_price, shares, at)
        } else {
            self.reduce_short(ledger, benchmark, benchmark_price, shares, at)
        };

        HedgeOutcome {
            beta: Some(beta),
            target_shares: shares,
            action,
        }
    }

    fn short(
        &self,
        ledger: &mut Ledger,
        benchmark: &str,
        price: f64,
        shares: f64,
        at: NaiveDateTime,
    ) -> HedgeAction {
        match ledger.hedge_trade(benchmark, price, shares, at, HedgeKind::Short) {
            OrderOutcome::Filled { price, shares } => HedgeAction::Traded {
                fills: vec![HedgeFill {
                    kind: HedgeKind::Short,
                    shares,
                    price,
                }],
            },
            OrderOutcome::Rejected {
                reason: RejectReason::InsufficientMargin { .. },
            } => {
                let supported = (2.0 * ledger.hedge_margin_balance() / price).floor();
                if supported < 1.0 {
                    return HedgeAction::Skipped(HedgeSkip::MarginExhausted);
                }
                match ledger.hedge_trade(benchmark, price, supported, at, HedgeKind::Short) {
                    OrderOutcome::Filled { price, shares } => HedgeAction::Traded {
                        fills: vec![HedgeFill {
                            kind: HedgeKind::Short,
                            shares,
                            price,
                        }],
                    },
                    OrderOutcome::Rejected { .. } => {
                        HedgeAction::Skipped(HedgeSkip::MarginExhausted)
                    }
                }
            }
            OrderOutcome::Rejected { reason } => HedgeAction::Rejected { reason },
        }
    }

    /// Negative beta: cover existing shorts first, then go long for the remainder.
    fn reduce_short(
        &self,
        ledger: &mut Ledger,
        benchmark: &str,
        price: f64,
        shares: f64,
        at: NaiveDateTime,
    ) -> HedgeAction {
        let mut fills = Vec::new();
        let cover = shares.min(ledger.short_shares(benchmark));
        if cover > 0.0 {
            match ledger.hedge_trade(benchmark, price, cover, at, HedgeKind::Cover) {
                OrderOutcome::Filled { price, shares } => fills.push(HedgeFill {
                    kind: HedgeKind::Cover,
                    shares,
                    price,
                }),
                OrderOutcome::Rejected { reason } => return HedgeAction::Rejected { reason },
            }
        }

        let remainder = shares - cover;
        if remainder >= 1.0 {
            match ledger.hedge_trade(benchmark, price, remainder, at, HedgeKind::MarginBuy) {
                OrderOutcome::Filled { price, shares } => fills.push(HedgeFill {
                    kind: HedgeKind::MarginBuy,
                    shares,
                    price,
                }),
                OrderOutcome::Rejected { reason } if fills.is_empty() => {
                    return HedgeAction::Rejected { reason }
                }
                OrderOutcome::Rejected { .. } => {}
            }
        }

        HedgeAction::Traded { fills }
    }
}

#[cfg(test)]
mod tests {
    use super::{HedgeAction, HedgeConfig, HedgeController, HedgeFill, HedgeSkip};
    use crate::entities::ledger::Ledger;
    use crate::services::price_resolver::PriceBook;
    use crate::value_objects::price_bar::PriceBar;
    use crate::value_objects::price_series::PriceSeries;
    use crate::value_objects::side::HedgeKind;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use std::sync::Arc;

    fn day(n: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 8, 4)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid timestamp")
            + Duration::days(n)
    }

    fn series(symbol: &str, prices: &[f64]) -> PriceSeries {
        PriceSeries::new(
            symbol,
            prices
                .iter()
                .enumerate()
                .map(|(i, p)| PriceBar {
                    timestamp: day(i as i64),
                    open: *p,
                    high: *p,
                    low: *p,
                    close: *p,
                    volume: 0.0,
                })
                .collect(),
        )
    }

    /// Ledger holding only AAPL whose prices mirror the benchmark.
    fn tracking_ledger(spy: &[f64], aapl: &[f64], cash: f64) -> Ledger {
        let book: PriceBook = vec![series("SPY", spy), series("AAPL", aapl)]
            .into_iter()
            .collect();
        let mut ledger = Ledger::new(cash, Arc::new(book));
        assert!(ledger.buy("AAPL", aapl[0], 100.0, day(0)).is_filled());
        for i in 0..spy.len() as i64 {
            ledger.value(day(i));
        }
        ledger
    }

    #[test]
    fn positive_beta_shorts_benchmark_capped_at_half_exposure() {
        let spy = [100.0, 102.0, 99.0, 101.0, 104.0];
        let aapl = [50.0, 52.0, 47.0, 50.0, 55.0];
        let mut ledger = tracking_ledger(&spy, &aapl, 5_000.0);
        let controller = HedgeController::new(HedgeConfig::default());

        let outcome = controller.rebalance(&mut ledger, day(4));
        let beta = outcome.beta.expect("beta");
        assert!(beta > 0.05);
        // exposure 100 * 55 = 5500; cap 0.5 * 5500 / 104 = 26.4
        assert_eq!(outcome.target_shares, 26.0);
        match &outcome.action {
            HedgeAction::Traded { fills } => {
                assert_eq!(fills.len(), 1);
                assert_eq!(fills[0].kind, HedgeKind::Short);
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(ledger.short_shares("SPY"), 26.0);
        assert_eq!(
            outcome.descriptions("SPY"),
            vec!["Hedged: Shorted 26 SPY @ $104.00".to_string()]
        );
    }

    #[test]
    fn refused_short_retries_at_supported_size() {
        let spy = [100.0, 102.0, 99.0, 101.0, 104.0];
        let aapl = [50.0, 52.0, 47.0, 50.0, 55.0];
        let mut ledger = tracking_ledger(&spy, &aapl, 5_000.0);
        // margin line 2500; consume most of it
        assert!(ledger
            .hedge_trade("SPY", 104.0, 46.0, day(4), HedgeKind::Short)
            .is_filled());
        assert!((ledger.hedge_margin_balance() - 108.0).abs() < 1e-9);
        let controller = HedgeController::new(HedgeConfig::default());
        let outcome = controller.rebalance(&mut ledger, day(4));
        // 26 shares need 1352 of margin; 108 supports floor(2 * 108 / 104) = 2
        assert_eq!(outcome.target_shares, 26.0);
        assert_eq!(
            outcome.action,
            HedgeAction::Traded {
                fills: vec![HedgeFill {
                    kind: HedgeKind::Short,
                    shares: 2.0,
                    price: 104.0,
                }],
            }
        );
        assert_eq!(ledger.short_shares("SPY"), 48.0);
        assert!((ledger.hedge_margin_used() - 2_496.0).abs() < 1e-9);
    }

    #[test]
    fn exhausted_margin_skips_the_short() {
        let spy = [100.0, 102.0, 99.0, 101.0, 104.0];
        let aapl = [50.0, 52.0, 47.0, 50.0, 55.0];
        let mut ledger = tracking_ledger(&spy, &aapl, 5_000.0);
        // 48 shares leave 4 of margin, short of one share at 104
        assert!(ledger
            .hedge_trade("SPY", 104.0, 48.0, day(4), HedgeKind::Short)
            .is_filled());
        let controller = HedgeController::new(HedgeConfig::default());
        let outcome = controller.rebalance(&mut ledger, day(4));
        assert_eq!(outcome.action, HedgeAction::Skipped(HedgeSkip::MarginExhausted));
        assert_eq!(ledger.short_shares("SPY"), 48.0);
    }

    #[test]
    fn flat_benchmark_leaves_portfolio_unhedged() {
        let spy = [100.0, 100.0, 100.0, 100.0];
        let aapl = [50.0, 52.0, 47.0, 50.0];
        let mut ledger = tracking_ledger(&spy, &aapl, 5_000.0);
        let controller = HedgeController::new(HedgeConfig::default());
        let outcome = controller.rebalance(&mut ledger, day(3));
        assert_eq!(outcome.action, HedgeAction::Skipped(HedgeSkip::BetaUndefined));
        assert!(ledger.hedge_trades().is_empty());
    }

    #[test]
    fn negative_beta_covers_before_buying() {
        let spy = [100.0, 102.0, 99.0, 101.0, 104.0];
        let aapl = [50.0, 48.0, 53.0, 50.0, 45.0];
        let mut ledger = tracking_ledger(&spy, &aapl, 20_000.0);
        assert!(ledger
            .hedge_trade("SPY", 104.0, 5.0, day(4), HedgeKind::Short)
            .is_filled());
        let controller = HedgeController::new(HedgeConfig::default());
        let outcome = controller.rebalance(&mut ledger, day(4));
        assert!(outcome.beta.expect("beta") < 0.0);
        match &outcome.action {
            HedgeAction::Traded { fills } => {
                assert_eq!(fills[0].kind, HedgeKind::Cover);
                assert_eq!(fills[0].shares, 5.0);
                if outcome.target_shares > 5.0 {
                    assert_eq!(fills[1].kind, HedgeKind::MarginBuy);
                    assert_eq!(fills[1].shares, outcome.target_shares - 5.0);
                }
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert!(ledger.short_positions().is_empty());
    }
}
