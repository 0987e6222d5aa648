use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HedgeKind {
    /// Sell the benchmark short against hedge margin.
    Short,
    /// Buy back previously shorted shares.
    Cover,
    /// Go long the benchmark with ordinary cash.
    MarginBuy,
}

impl HedgeKind {
    pub fn label(self) -> &'static str {
        match self {
            HedgeKind::Short => "short",
            HedgeKind::Cover => "cover",
            HedgeKind::MarginBuy => "margin_buy",
        }
    }
}
