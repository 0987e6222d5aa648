use crate::entities::ledger::{Ledger, DEFAULT_HEDGE_MARGIN_FRACTION};
use crate::entities::metrics::{self, round_to, BetaEstimate, MetricsConfig, ReturnsSummary};
use crate::error::DomainError;
use crate::services::audit::AuditEvent;
use crate::services::engine::clock::SimulationClock;
use crate::services::hedge::{HedgeAction, HedgeConfig, HedgeController};
use crate::services::price_resolver::PriceBook;
use crate::services::rule_engine::RuleBook;
use crate::value_objects::frequency::TradingFrequency;
use crate::value_objects::order_outcome::OrderOutcome;
use crate::value_objects::snapshot::{FinalMetrics, SimulationSnapshot};
use crate::value_objects::trade::HedgeTrade;
use crate::value_objects::trading_rule::TradingRule;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub trait RunControl {
    fn should_cancel(&self) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopControl;

impl RunControl for NoopControl {
    fn should_cancel(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SimulationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SimulationState::Completed | SimulationState::Failed | SimulationState::Cancelled
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            SimulationState::Pending => "pending",
            SimulationState::Running => "running",
            SimulationState::Completed => "completed",
            SimulationState::Failed => "failed",
            SimulationState::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub run_id: String,
    pub initial_cash: f64,
    pub start_date: NaiveDate,
    pub duration_days: u32,
    pub frequency: TradingFrequency,
    /// Symbol -> shares bought at the first available bar.
    pub tickers: BTreeMap<String, f64>,
    pub rules: Vec<TradingRule>,
    pub hedge: Option<HedgeConfig>,
    pub margin_fraction: f64,
    pub metrics: MetricsConfig,
    pub metrics_benchmark: String,
}

impl SimulationPlan {
    pub fn new(run_id: impl Into<String>, initial_cash: f64, start_date: NaiveDate, duration_days: u32) -> Self {
        Self {
            run_id: run_id.into(),
            initial_cash,
            start_date,
            duration_days,
            frequency: TradingFrequency::Daily,
            tickers: BTreeMap::new(),
            rules: Vec::new(),
            hedge: None,
            margin_fraction: DEFAULT_HEDGE_MARGIN_FRACTION,
            metrics: MetricsConfig::default(),
            metrics_benchmark: "SPY".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.initial_cash.is_finite() || self.initial_cash <= 0.0 {
            return Err(DomainError::InvalidPlan(format!(
                "initial cash must be finite and > 0 (got {})",
                self.initial_cash
            )));
        }
        if self.duration_days == 0 {
            return Err(DomainError::InvalidPlan(
                "duration_days must be >= 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.margin_fraction) {
            return Err(DomainError::InvalidPlan(format!(
                "margin fraction must be within [0, 1] (got {})",
                self.margin_fraction
            )));
        }
        for (symbol, shares) in &self.tickers {
            if !shares.is_finite() || *shares < 0.0 {
                return Err(DomainError::InvalidPlan(format!(
                    "initial shares for {symbol} must be finite and >= 0 (got {shares})"
                )));
            }
        }
        Ok(())
    }

    pub fn planned_ticks(&self) -> u32 {
        self.frequency.planned_ticks(self.duration_days)
    }

    /// Symbols priced on every tick: holdings, rule symbols and the hedge benchmark.
    pub fn tracked_symbols(&self) -> BTreeSet<String> {
        let mut symbols: BTreeSet<String> = self.tickers.keys().cloned().collect();
        symbols.extend(self.rules.iter().map(|rule| rule.symbol.clone()));
        if let Some(hedge) = &self.hedge {
            symbols.insert(hedge.benchmark.clone());
        }
        symbols
    }
}

/// Progress notification emitted after each recorded snapshot.
#[derive(Debug, Clone, Copy)]
pub struct TickProgress<'a> {
    pub tick: u32,
    pub planned_ticks: u32,
    pub snapshot: &'a SimulationSnapshot,
}

#[derive(Debug, Clone)]
pub struct SimulationResults {
    pub state: SimulationState,
    pub snapshots: Vec<SimulationSnapshot>,
    pub final_metrics: FinalMetrics,
    pub beta: Option<BetaEstimate>,
    pub returns_summary: Option<ReturnsSummary>,
    pub hedge_trades: Vec<HedgeTrade>,
    pub audit_events: Vec<AuditEvent>,
}

#[derive(Debug)]
pub struct SimulationRunner {
    plan: SimulationPlan,
    clock: SimulationClock,
    tracked: BTreeSet<String>,
    ledger: Ledger,
    rules: RuleBook,
    hedge: Option<HedgeController>,
    audit_events: Vec<AuditEvent>,
}

impl SimulationRunner {
    pub fn new(plan: SimulationPlan, prices: Arc<PriceBook>) -> Result<Self, DomainError> {
        plan.validate()?;
        let clock = SimulationClock::new(plan.start_date, plan.frequency);
        let ledger = Ledger::with_margin_fraction(plan.initial_cash, plan.margin_fraction, prices);
        let rules = RuleBook::new(plan.rules.iter().cloned());
        let hedge = plan.hedge.clone().map(HedgeController::new);
        let tracked = plan.tracked_symbols();
        Ok(Self {
            plan,
            clock,
            tracked,
            ledger,
            rules,
            hedge,
            audit_events: Vec::new(),
        })
    }

    pub fn plan(&self) -> &SimulationPlan {
        &self.plan
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn run(
        mut self,
        control: &dyn RunControl,
        progress: &mut dyn FnMut(TickProgress<'_>),
    ) -> SimulationResults {
        let planned_ticks = self.plan.planned_ticks();
        self.audit(
            AuditEvent::new(&self.plan.run_id, Some(self.clock.origin()), "engine", "start").with_details(json!({
                "initial_cash": self.plan.initial_cash,
                "frequency": self.plan.frequency.label(),
                "planned_ticks": planned_ticks,
                "tickers": self.plan.tickers,
                "rules": self.rules.len(),
                "hedge_enabled": self.hedge.is_some(),
            })),
        );

        self.initial_purchases();

        let mut snapshots = Vec::with_capacity(planned_ticks as usize + 1);
        let origin = self.clock.origin();
        let initial = self.snapshot(0, origin, Vec::new());
        progress(TickProgress {
            tick: 0,
            planned_ticks,
            snapshot: &initial,
        });
        snapshots.push(initial);

        let mut state = SimulationState::Completed;
        for tick in 1..=planned_ticks {
            if control.should_cancel() {
                state = SimulationState::Cancelled;
                self.audit(
                    AuditEvent::new(&self.plan.run_id, Some(self.clock.tick_time(tick)), "engine", "cancelled")
                        .with_details(json!({ "ticks_completed": tick - 1 })),
                );
                break;
            }

            let at = self.clock.tick_time(tick);
            let prices = self.resolve_prices(at);
            let closed: Vec<String> = self
                .tracked
                .iter()
                .filter(|symbol| !prices.contains_key(symbol.as_str()))
                .cloned()
                .collect();
            if !closed.is_empty() {
                self.audit(
                    AuditEvent::new(&self.plan.run_id, Some(at), "price", "market_closed")
                        .with_details(json!({ "symbols": closed })),
                );
            }
            let mut trades = self.apply_rules(&prices, at);
            trades.extend(self.apply_hedge(at));

            let snapshot = self.snapshot_with_prices(tick, at, prices, trades);
            progress(TickProgress {
                tick,
                planned_ticks,
                snapshot: &snapshot,
            });
            snapshots.push(snapshot);
        }

        let (final_metrics, beta, returns_summary) = self.final_metrics(&snapshots);
        self.audit(
            AuditEvent::new(&self.plan.run_id, snapshots.last().map(|s| s.timestamp), "engine", "complete")
                .with_details(json!({
                    "state": state.label(),
                    "snapshots": snapshots.len(),
                    "final_value": final_metrics.final_value,
                    "total_return_pct": final_metrics.total_return_pct,
                    "trades": final_metrics.total_trades,
                    "hedge_trades": final_metrics.hedge_trades,
                })),
        );

        SimulationResults {
            state,
            snapshots,
            final_metrics,
            beta,
            returns_summary,
            hedge_trades: self.ledger.hedge_trades().to_vec(),
            audit_events: std::mem::take(&mut self.audit_events),
        }
    }

    fn audit(&mut self, event: AuditEvent) {
        self.audit_events.push(event);
    }

    fn initial_purchases(&mut self) {
        let tickers: Vec<(String, f64)> = self
            .plan
            .tickers
            .iter()
            .map(|(symbol, shares)| (symbol.clone(), *shares))
            .collect();

        for (symbol, shares) in tickers {
            if shares <= 0.0 {
                continue;
            }
            let first = self
                .ledger
                .prices()
                .series(&symbol)
                .and_then(|series| series.bars().first())
                .map(|bar| (bar.timestamp, bar.mid()));
            let Some((first_at, price)) = first else {
                self.audit(
                    AuditEvent::new(&self.plan.run_id, None, "order", "initial_buy_skipped")
                        .with_symbol(&symbol)
                        .with_error("no price data")
                        .with_details(json!({ "shares": shares })),
                );
                continue;
            };

            let outcome = self.ledger.buy(&symbol, price, shares, first_at);
            let event = AuditEvent::new(&self.plan.run_id, Some(first_at), "order", "initial_buy")
                .with_symbol(&symbol)
                .with_details(json!({ "shares": shares, "price": price, "outcome": outcome }));
            let event = match outcome.rejection() {
                Some(reason) => event.with_error(reason.to_string()),
                None => event,
            };
            self.audit(event);
        }
    }

    fn resolve_prices(&self, at: NaiveDateTime) -> BTreeMap<String, f64> {
        self.tracked
            .iter()
            .filter_map(|symbol| self.ledger.price_at(symbol, at).map(|p| (symbol.clone(), p)))
            .collect()
    }

    fn apply_rules(&mut self, prices: &BTreeMap<String, f64>, at: NaiveDateTime) -> Vec<String> {
        let executions = self.rules.evaluate(&mut self.ledger, prices, at);
        let mut trades = Vec::new();
        for execution in executions {
            let event = AuditEvent::new(&self.plan.run_id, Some(at), "rule", "")
                .with_symbol(&execution.symbol)
                .with_details(json!({
                    "action": execution.action,
                    "shares": execution.shares,
                    "observed_price": execution.observed_price,
                    "one_time": execution.one_time,
                }));
            match execution.outcome {
                OrderOutcome::Filled { .. } => {
                    if let Some(line) = execution.describe() {
                        trades.push(line);
                    }
                    self.audit(AuditEvent {
                        action: "fired".to_string(),
                        ..event
                    });
                }
                OrderOutcome::Rejected { reason } => {
                    self.audit(AuditEvent {
                        action: "refused".to_string(),
                        error: Some(reason.to_string()),
                        ..event
                    });
                }
            }
        }
        trades
    }

    fn apply_hedge(&mut self, at: NaiveDateTime) -> Vec<String> {
        let Some(controller) = self.hedge.as_ref() else {
            return Vec::new();
        };
        let outcome = controller.rebalance(&mut self.ledger, at);
        let benchmark = controller.benchmark().to_string();
        let lines = outcome.descriptions(&benchmark);
        let kinds: Vec<&str> = match &outcome.action {
            HedgeAction::Traded { fills } => fills.iter().map(|fill| fill.kind.label()).collect(),
            _ => Vec::new(),
        };

        let event = AuditEvent::new(&self.plan.run_id, Some(at), "hedge", "")
            .with_symbol(&benchmark)
            .with_details(json!({
                "beta": outcome.beta,
                "target_shares": outcome.target_shares,
                "action": outcome.action,
                "kinds": kinds,
                "margin_balance": self.ledger.hedge_margin_balance(),
            }));
        let event = match &outcome.action {
            HedgeAction::Traded { .. } => AuditEvent {
                action: "rebalanced".to_string(),
                ..event
            },
            HedgeAction::Skipped(skip) => AuditEvent {
                action: format!("skipped_{}", skip.code()),
                ..event
            },
            HedgeAction::Rejected { reason } => AuditEvent {
                action: "refused".to_string(),
                error: Some(reason.to_string()),
                ..event
            },
        };
        self.audit(event);
        lines
    }

    fn snapshot(&mut self, tick: u32, at: NaiveDateTime, trades: Vec<String>) -> SimulationSnapshot {
        let prices = self.resolve_prices(at);
        self.snapshot_with_prices(tick, at, prices, trades)
    }

    fn snapshot_with_prices(
        &mut self,
        tick: u32,
        at: NaiveDateTime,
        prices: BTreeMap<String, f64>,
        trades: Vec<String>,
    ) -> SimulationSnapshot {
        let value = self.ledger.value(at);
        SimulationSnapshot {
            label: self.clock.label(tick),
            timestamp: at,
            prices,
            portfolio_value: value,
            trades_executed: trades,
            positions: self.ledger.long_positions().clone(),
            short_positions: self.ledger.short_positions().clone(),
            cash: self.ledger.cash(),
            pnl: value - self.ledger.original_value(),
            hedge_margin_balance: self.ledger.hedge_margin_balance(),
        }
    }

    fn final_metrics(
        &self,
        snapshots: &[SimulationSnapshot],
    ) -> (FinalMetrics, Option<BetaEstimate>, Option<ReturnsSummary>) {
        let points: Vec<(NaiveDateTime, f64)> = self
            .ledger
            .valuation_history()
            .iter()
            .map(|(at, value)| (*at, *value))
            .collect();
        let values: Vec<f64> = points.iter().map(|(_, value)| *value).collect();

        let initial_value = snapshots
            .first()
            .map(|s| s.portfolio_value)
            .unwrap_or(self.plan.initial_cash);
        let final_value = snapshots
            .last()
            .map(|s| s.portfolio_value)
            .unwrap_or(initial_value);
        let total_return = if initial_value > 0.0 {
            (final_value - initial_value) / initial_value * 100.0
        } else {
            0.0
        };

        let beta = self
            .ledger
            .prices()
            .series(&self.plan.metrics_benchmark)
            .and_then(|series| metrics::beta(&points, series));
        let returns_summary = metrics::returns_summary(&points, &self.plan.metrics);

        let final_metrics = FinalMetrics {
            total_return_pct: round_to(total_return, 2),
            final_value: round_to(final_value, 2),
            total_pnl: round_to(final_value - self.plan.initial_cash, 2),
            sharpe_ratio: metrics::sharpe_ratio(&values, &self.plan.metrics).map(|s| round_to(s, 3)),
            volatility_pct: metrics::volatility(&values, self.plan.metrics.period)
                .map(|v| round_to(v * 100.0, 2)),
            max_drawdown_pct: round_to(metrics::max_drawdown(&values) * 100.0, 2),
            total_trades: self.ledger.trades().len(),
            final_positions: self.ledger.long_positions().clone(),
            short_positions: self.ledger.short_positions().clone(),
            beta: beta.as_ref().map(|b| round_to(b.beta, 3)),
            beta_interpretation: beta.as_ref().map(|b| b.interpretation.clone()),
            correlation: beta.as_ref().map(|b| round_to(b.correlation, 3)),
            r_squared: beta.as_ref().map(|b| round_to(b.r_squared, 3)),
            hedge_trades: self.ledger.hedge_trades().len(),
            hedge_margin_used: round_to(self.ledger.hedge_margin_used(), 2),
            hedge_margin_available: round_to(self.ledger.hedge_margin_available(), 2),
            trade_log: self.ledger.trades().to_vec(),
        };
        (final_metrics, beta, returns_summary)
    }
}
