use crate::value_objects::trade::Trade;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;

/// Portfolio state recorded after one tick. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationSnapshot {
    pub label: String,
    pub timestamp: NaiveDateTime,
    pub prices: BTreeMap<String, f64>,
    pub portfolio_value: f64,
    pub trades_executed: Vec<String>,
    pub positions: BTreeMap<String, f64>,
    pub short_positions: BTreeMap<String, f64>,
    pub cash: f64,
    pub pnl: f64,
    pub hedge_margin_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalMetrics {
    pub total_return_pct: f64,
    pub final_value: f64,
    pub total_pnl: f64,
    pub sharpe_ratio: Option<f64>,
    pub volatility_pct: Option<f64>,
    pub max_drawdown_pct: f64,
    pub total_trades: usize,
    pub final_positions: BTreeMap<String, f64>,
    pub short_positions: BTreeMap<String, f64>,
    pub beta: Option<f64>,
    pub beta_interpretation: Option<String>,
    pub correlation: Option<f64>,
    pub r_squared: Option<f64>,
    pub hedge_trades: usize,
    pub hedge_margin_used: f64,
    pub hedge_margin_available: f64,
    /// Executed buy and sell orders, in execution order.
    pub trade_log: Vec<Trade>,
}

impl FinalMetrics {
    /// Well-formed placeholder reported for runs that never produced results.
    pub fn zeroed(initial_cash: f64) -> Self {
        Self {
            total_return_pct: 0.0,
            final_value: initial_cash,
            total_pnl: 0.0,
            sharpe_ratio: None,
            volatility_pct: None,
            max_drawdown_pct: 0.0,
            total_trades: 0,
            final_positions: BTreeMap::new(),
            short_positions: BTreeMap::new(),
            beta: None,
            beta_interpretation: None,
            correlation: None,
            r_squared: None,
            hedge_trades: 0,
            hedge_margin_used: 0.0,
            hedge_margin_available: 0.0,
            trade_log: Vec::new(),
        }
    }
}
