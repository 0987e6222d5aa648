use crate::services::price_resolver::PriceBook;
use crate::value_objects::order_outcome::{OrderOutcome, RejectReason};
use crate::value_objects::side::{HedgeKind, Side};
use crate::value_objects::trade::{HedgeTrade, Trade};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Fraction of a short sale's notional reserved against hedge margin.
pub const SHORT_MARGIN_REQUIREMENT: f64 = 0.5;
/// Hedge credit line as a fraction of the original cash.
pub const DEFAULT_HEDGE_MARGIN_FRACTION: f64 = 0.5;

const SHARE_EPSILON: f64 = 1e-9;

/// Cash, positions, margin and valuation history of one simulation.
#[derive(Debug, Clone)]
pub struct Ledger {
    cash: f64,
    long_positions: BTreeMap<String, f64>,
    short_positions: BTreeMap<String, f64>,
    hedge_margin_used: f64,
    hedge_margin_available: f64,
    trades: Vec<Trade>,
    hedge_trades: Vec<HedgeTrade>,
    valuation_history: BTreeMap<NaiveDateTime, f64>,
    original_value: f64,
    prices: Arc<PriceBook>,
}

impl Ledger {
    pub fn new(initial_cash: f64, prices: Arc<PriceBook>) -> Self {
        Self::with_margin_fraction(initial_cash, DEFAULT_HEDGE_MARGIN_FRACTION, prices)
    }

    pub fn with_margin_fraction(initial_cash: f64, margin_fraction: f64, prices: Arc<PriceBook>) -> Self {
        Self {
            cash: initial_cash,
            long_positions: BTreeMap::new(),
            short_positions: BTreeMap::new(),
            hedge_margin_used: 0.0,
            hedge_margin_available: initial_cash * margin_fraction.max(0.0),
            trades: Vec::new(),
            hedge_trades: Vec::new(),
            valuation_history: BTreeMap::new(),
            original_value: initial_cash,
            prices,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn original_value(&self) -> f64 {
        self.original_value
    }

    pub fn long_positions(&self) -> &BTreeMap<String, f64> {
        &self.long_positions
    }

    pub fn short_positions(&self) -> &BTreeMap<String, f64> {
        &self.short_positions
    }

    pub fn long_shares(&self, symbol: &str) -> f64 {
        self.long_positions.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn short_shares(&self, symbol: &str) -> f64 {
        self.short_positions.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn hedge_margin_used(&self) -> f64 {
        self.hedge_margin_used
    }

    pub fn hedge_margin_available(&self) -> f64 {
        self.hedge_margin_available
    }

    pub fn hedge_margin_balance(&self) -> f64 {
        self.hedge_margin_available - self.hedge_margin_used
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn hedge_trades(&self) -> &[HedgeTrade] {
        &self.hedge_trades
    }

    pub fn valuation_history(&self) -> &BTreeMap<NaiveDateTime, f64> {
        &self.valuation_history
    }

    pub fn prices(&self) -> &PriceBook {
        &self.prices
    }

    pub fn price_at(&self, symbol: &str, at: NaiveDateTime) -> Option<f64> {
        self.prices.price_at(symbol, at)
    }

    /// Buys at `min(limit, market)`; refused when the market trades above `limit`.
    pub fn buy(&mut self, symbol: &str, limit_price: f64, shares: f64, at: NaiveDateTime) -> OrderOutcome {
        if !valid_quantity(shares) {
            return OrderOutcome::rejected(RejectReason::InvalidQuantity);
        }
        let Some(market) = self.price_at(symbol, at) else {
            return OrderOutcome::rejected(RejectReason::MarketClosed);
        };
        if market > limit_price {
            return OrderOutcome::rejected(RejectReason::LimitExceeded {
                limit: limit_price,
                market,
            });
        }

        let price = limit_price.min(market);
        let cost = price * shares;
        if self.cash < cost {
            return OrderOutcome::rejected(RejectReason::InsufficientCash {
                required: cost,
                available: self.cash,
            });
        }

        self.cash -= cost;
        *self.long_positions.entry(symbol.to_string()).or_insert(0.0) += shares;
        self.record_trade(symbol, Side::Buy, shares, price, at);
        OrderOutcome::Filled { price, shares }
    }

    /// Sells at `max(limit, market)`; refused when the market trades below `limit`.
    pub fn sell(&mut self, symbol: &str, limit_price: f64, shares: f64, at: NaiveDateTime) -> OrderOutcome {
        if !valid_quantity(shares) {
            return OrderOutcome::rejected(RejectReason::InvalidQuantity);
        }
        let Some(market) = self.price_at(symbol, at) else {
            return OrderOutcome::rejected(RejectReason::MarketClosed);
        };
        if market < limit_price {
            return OrderOutcome::rejected(RejectReason::LimitNotReached {
                limit: limit_price,
                market,
            });
        }

        let held = self.long_shares(symbol);
        if held < shares {
            return OrderOutcome::rejected(RejectReason::InsufficientShares {
                requested: shares,
                held,
            });
        }

        let price = limit_price.max(market);
        self.cash += price * shares;
        reduce_position(&mut self.long_positions, symbol, shares);
        self.record_trade(symbol, Side::Sell, shares, price, at);
        OrderOutcome::Filled { price, shares }
    }

    /// Mark-to-market value, or `None` if any held symbol has no price at `at`.
    pub fn mark_to_market(&self, at: NaiveDateTime) -> Option<f64> {
        let mut value = self.cash;
        for (symbol, shares) in &self.long_positions {
            value += shares * self.price_at(symbol, at)?;
        }
        for (symbol, shares) in &self.short_positions {
            value -= shares * self.price_at(symbol, at)?;
        }
        Some(value)
    }

    /// Portfolio value at `at`, recorded into the valuation history.
    ///
    /// A closed market for any held symbol repeats the latest recorded value
    /// (or cash when nothing has been recorded yet).
    pub fn value(&mut self, at: NaiveDateTime) -> f64 {
        let value = match self.mark_to_market(at) {
            Some(value) => value,
            None => self
                .valuation_history
                .values()
                .next_back()
                .copied()
                .unwrap_or(self.cash),
        };
        self.valuation_history.insert(at, value);
        value
    }

    pub fn pnl(&mut self, at: NaiveDateTime) -> f64 {
        self.value(at) - self.original_value
    }

    pub fn hedge_trade(
        &mut self,
        symbol: &str,
        price: f64,
        shares: f64,
        at: NaiveDateTime,
        kind: HedgeKind,
    ) -> OrderOutcome {
        if !valid_quantity(shares) || !price.is_finite() || price <= 0.0 {
            return OrderOutcome::rejected(RejectReason::InvalidQuantity);
        }
        let value = price * shares;

        let margin_delta = match kind {
            HedgeKind::Short => {
                let required = value * SHORT_MARGIN_REQUIREMENT;
                let available = self.hedge_margin_balance();
                if required > available {
                    return OrderOutcome::rejected(RejectReason::InsufficientMargin {
                        required,
                        available,
                    });
                }
                self.cash += value;
                self.hedge_margin_used += required;
                *self.short_positions.entry(symbol.to_string()).or_insert(0.0) += shares;
                required
            }
            HedgeKind::Cover => {
                let held = self.short_shares(symbol);
                if held < shares {
                    return OrderOutcome::rejected(RejectReason::InsufficientShortPosition {
                        requested: shares,
                        held,
                    });
                }
                if self.cash < value {
                    return OrderOutcome::rejected(RejectReason::InsufficientCash {
                        required: value,
                        available: self.cash,
                    });
                }
                self.cash -= value;
                reduce_position(&mut self.short_positions, symbol, shares);
                let released = (value * SHORT_MARGIN_REQUIREMENT).min(self.hedge_margin_used);
                self.hedge_margin_used = (self.hedge_margin_used - released).max(0.0);
                -released
            }
            HedgeKind::MarginBuy => {
                if self.cash < value {
                    return OrderOutcome::rejected(RejectReason::InsufficientCash {
                        required: value,
                        available: self.cash,
                    });
                }
                self.cash -= value;
                *self.long_positions.entry(symbol.to_string()).or_insert(0.0) += shares;
                0.0
            }
        };

        self.hedge_trades.push(HedgeTrade {
            timestamp: at,
            symbol: symbol.to_string(),
            kind,
            shares,
            price,
            value,
            margin_delta,
        });
        OrderOutcome::Filled { price, shares }
    }

    fn record_trade(&mut self, symbol: &str, side: Side, shares: f64, price: f64, at: NaiveDateTime) {
        self.trades.push(Trade {
            timestamp: at,
            symbol: symbol.to_string(),
            side,
            shares,
            price,
        });
    }
}

fn valid_quantity(shares: f64) -> bool {
    shares.is_finite() && shares > 0.0
}

fn reduce_position(positions: &mut BTreeMap<String, f64>, symbol: &str, shares: f64) {
    if let Some(held) = positions.get_mut(symbol) {
        *held -= shares;
        if *held <= SHARE_EPSILON {
            positions.remove(symbol);
        }
    }
}
