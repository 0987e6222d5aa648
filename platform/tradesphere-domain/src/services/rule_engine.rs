use crate::entities::ledger::Ledger;
use crate::value_objects::order_outcome::{OrderOutcome, RejectReason};
use crate::value_objects::trading_rule::{RuleAction, TradingRule};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Added to the observed price when placing rule buys so the order fills at market.
pub const BUY_LIMIT_BUFFER: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RuleExecution {
    pub symbol: String,
    pub action: RuleAction,
    pub shares: f64,
    pub observed_price: f64,
    pub one_time: bool,
    pub outcome: OrderOutcome,
}

impl RuleExecution {
    /// Human readable trade line, only for filled orders.
    pub fn describe(&self) -> Option<String> {
        match self.outcome {
            OrderOutcome::Filled { price, shares } => {
                let verb = match self.action {
                    RuleAction::Buy => "Bought",
                    RuleAction::Sell => "Sold",
                };
                Some(format!("{verb} {} {} @ ${price:.2}", format_shares(shares), self.symbol))
            }
            OrderOutcome::Rejected { .. } => None,
        }
    }
}

pub(crate) fn format_shares(shares: f64) -> String {
    if shares.fract() == 0.0 {
        format!("{}", shares as i64)
    } else {
        format!("{shares}")
    }
}

/// Active trading rules grouped by symbol, evaluated in list order.
#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    rules: BTreeMap<String, Vec<TradingRule>>,
}

impl RuleBook {
    pub fn new(rules: impl IntoIterator<Item = TradingRule>) -> Self {
        let mut grouped: BTreeMap<String, Vec<TradingRule>> = BTreeMap::new();
        for rule in rules {
            grouped.entry(rule.symbol.clone()).or_default().push(rule);
        }
        Self { rules: grouped }
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn rules_for(&self, symbol: &str) -> &[TradingRule] {
        self.rules.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluates every rule whose symbol has a price this tick.
    ///
    /// Rules see the ledger as left by earlier rules in the same pass. One-time
    /// rules that filled are removed after the pass; a symbol whose list empties
    /// is dropped.
    pub fn evaluate(
        &mut self,
        ledger: &mut Ledger,
        prices: &BTreeMap<String, f64>,
        at: NaiveDateTime,
    ) -> Vec<RuleExecution> {
        let mut executions = Vec::new();
        let mut fired: Vec<(String, usize)> = Vec::new();

        for (symbol, rules) in &self.rules {
            let Some(&price) = prices.get(symbol) else {
                continue;
            };
            for (index, rule) in rules.iter().enumerate() {
                if !rule.matches(price) {
                    continue;
                }
                let outcome = apply(rule, ledger, price, at);
                if outcome.is_filled() && rule.one_time {
                    fired.push((symbol.clone(), index));
                }
                executions.push(RuleExecution {
                    symbol: symbol.clone(),
                    action: rule.action,
                    shares: rule.shares,
                    observed_price: price,
                    one_time: rule.one_time,
                    outcome,
                });
            }
        }

        for (symbol, index) in fired.into_iter().rev() {
            if let Some(rules) = self.rules.get_mut(&symbol) {
                rules.remove(index);
                if rules.is_empty() {
                    self.rules.remove(&symbol);
                }
            }
        }

        executions
    }
}

fn apply(rule: &TradingRule, ledger: &mut Ledger, price: f64, at: NaiveDateTime) -> OrderOutcome {
    match rule.action {
        RuleAction::Sell => {
            let held = ledger.long_shares(&rule.symbol);
            if held < rule.shares {
                return OrderOutcome::Rejected {
                    reason: RejectReason::InsufficientShares {
                        requested: rule.shares,
                        held,
                    },
                };
            }
            ledger.sell(&rule.symbol, price, rule.shares, at)
        }
        RuleAction::Buy => {
            let cost = price * rule.shares;
            if ledger.cash() < cost {
                return OrderOutcome::Rejected {
                    reason: RejectReason::InsufficientCash {
                        required: cost,
                        available: ledger.cash(),
                    },
                };
            }
            ledger.buy(&rule.symbol, price + BUY_LIMIT_BUFFER, rule.shares, at)
        }
    }
}
