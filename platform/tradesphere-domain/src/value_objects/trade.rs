use crate::value_objects::side::{HedgeKind, Side};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub side: Side,
    pub shares: f64,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeTrade {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub kind: HedgeKind,
    pub shares: f64,
    pub price: f64,
    pub value: f64,
    /// Margin reserved (positive) or released (negative) by this trade.
    pub margin_delta: f64,
}
