use crate::value_objects::price_bar::PriceBar;
use chrono::{Duration, NaiveDateTime};

/// Read-only, time-ordered bars for one symbol. Timestamps are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    symbol: String,
    bars: Vec<PriceBar>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Intraday,
    Daily,
}

impl Granularity {
    /// Maximum distance between a requested instant and the nearest bar.
    pub fn tolerance(self) -> Duration {
        match self {
            Granularity::Intraday => Duration::hours(2),
            Granularity::Daily => Duration::days(1),
        }
    }
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|bar| bar.timestamp);
        bars.dedup_by_key(|bar| bar.timestamp);
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn empty(symbol: impl Into<String>) -> Self {
        Self::new(symbol, Vec::new())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.bars.first().map(|bar| bar.timestamp)
    }

    /// Intraday when the first two bars are at most one hour apart, daily otherwise
    /// (including series with fewer than two bars).
    pub fn granularity(&self) -> Granularity {
        match (self.bars.first(), self.bars.get(1)) {
            (Some(first), Some(second)) if second.timestamp - first.timestamp <= Duration::hours(1) => {
                Granularity::Intraday
            }
            _ => Granularity::Daily,
        }
    }
}
