pub mod frequency;
pub mod order_outcome;
pub mod price_bar;
pub mod price_series;
pub mod side;
pub mod snapshot;
pub mod trade;
pub mod trading_rule;
