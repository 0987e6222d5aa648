use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderOutcome {
    Filled { price: f64, shares: f64 },
    Rejected { reason: RejectReason },
}

impl OrderOutcome {
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderOutcome::Filled { .. })
    }

    pub fn rejection(&self) -> Option<RejectReason> {
        match self {
            OrderOutcome::Filled { .. } => None,
            OrderOutcome::Rejected { reason } => Some(*reason),
        }
    }

    pub(crate) fn rejected(reason: RejectReason) -> Self {
        OrderOutcome::Rejected { reason }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    MarketClosed,
    /// Buy refused: the market trades above the caller's limit.
    LimitExceeded { limit: f64, market: f64 },
    /// Sell refused: the market trades below the caller's limit.
    LimitNotReached { limit: f64, market: f64 },
    InsufficientCash { required: f64, available: f64 },
    InsufficientShares { requested: f64, held: f64 },
    InsufficientMargin { required: f64, available: f64 },
    InsufficientShortPosition { requested: f64, held: f64 },
    InvalidQuantity,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::MarketClosed => "market_closed",
            RejectReason::LimitExceeded { .. } => "limit_exceeded",
            RejectReason::LimitNotReached { .. } => "limit_not_reached",
            RejectReason::InsufficientCash { .. } => "insufficient_cash",
            RejectReason::InsufficientShares { .. } => "insufficient_shares",
            RejectReason::InsufficientMargin { .. } => "insufficient_margin",
            RejectReason::InsufficientShortPosition { .. } => "insufficient_short_position",
            RejectReason::InvalidQuantity => "invalid_quantity",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MarketClosed => write!(f, "market closed"),
            RejectReason::LimitExceeded { limit, market } => write!(
                f,
                "market price ${market:.2} is above limit price ${limit:.2}"
            ),
            RejectReason::LimitNotReached { limit, market } => write!(
                f,
                "market price ${market:.2} is below limit price ${limit:.2}"
            ),
            RejectReason::InsufficientCash {
                required,
                available,
            } => write!(
                f,
                "insufficient cash: need ${required:.2}, have ${available:.2}"
            ),
            RejectReason::InsufficientShares { requested, held } => write!(
                f,
                "insufficient shares: requested {requested}, held {held}"
            ),
            RejectReason::InsufficientMargin {
                required,
                available,
            } => write!(
                f,
                "insufficient hedge margin: required ${required:.2}, available ${available:.2}"
            ),
            RejectReason::InsufficientShortPosition { requested, held } => write!(
                f,
                "insufficient short position: requested {requested}, short {held}"
            ),
            RejectReason::InvalidQuantity => write!(f, "share quantity must be positive"),
        }
    }
}
