use crate::value_objects::price_series::PriceSeries;
use chrono::NaiveDateTime;
use std::collections::HashMap;

/// Mid price of the bar nearest to `at`, or `None` when the market is closed
/// (empty series, or nearest bar outside the granularity tolerance).
///
/// Equidistant neighbours resolve to the earlier bar.
pub fn resolve(series: &PriceSeries, at: NaiveDateTime) -> Option<f64> {
    let bars = series.bars();
    if bars.is_empty() {
        return None;
    }

    let idx = bars.partition_point(|bar| bar.timestamp < at);
    if let Some(bar) = bars.get(idx) {
        if bar.timestamp == at {
            return Some(bar.mid());
        }
    }

    let nearest = match (idx.checked_sub(1).map(|i| &bars[i]), bars.get(idx)) {
        (Some(before), Some(after)) => {
            if at - before.timestamp <= after.timestamp - at {
                before
            } else {
                after
            }
        }
        (Some(before), None) => before,
        (None, Some(after)) => after,
        (None, None) => return None,
    };

    let distance = if nearest.timestamp >= at {
        nearest.timestamp - at
    } else {
        at - nearest.timestamp
    };
    if distance <= series.granularity().tolerance() {
        Some(nearest.mid())
    } else {
        None
    }
}

/// Read-only price series per symbol for one simulation run.
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    series: HashMap<String, PriceSeries>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, series: PriceSeries) {
        self.series.insert(series.symbol().to_string(), series);
    }

    pub fn series(&self, symbol: &str) -> Option<&PriceSeries> {
        self.series.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.series.contains_key(symbol)
    }

    pub fn price_at(&self, symbol: &str, at: NaiveDateTime) -> Option<f64> {
        self.series.get(symbol).and_then(|series| resolve(series, at))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }
}

impl FromIterator<PriceSeries> for PriceBook {
    fn from_iter<I: IntoIterator<Item = PriceSeries>>(iter: I) -> Self {
        let mut book = PriceBook::new();
        for series in iter {
            book.insert(series);
        }
        book
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve, PriceBook};
    use crate::value_objects::price_bar::PriceBar;
    use crate::value_objects::price_series::PriceSeries;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 8, 4)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .expect("valid timestamp")
    }

    fn bar(timestamp: NaiveDateTime, low: f64, high: f64) -> PriceBar {
        PriceBar {
            timestamp,
            open: low,
            high,
            low,
            close: high,
            volume: 0.0,
        }
    }

    #[test]
    fn exact_match_returns_mid() {
        let series = PriceSeries::new("AAPL", vec![bar(t0(), 10.0, 12.0)]);
        assert_eq!(resolve(&series, t0()), Some(11.0));
    }

    #[test]
    fn empty_series_is_closed() {
        assert_eq!(resolve(&PriceSeries::empty("AAPL"), t0()), None);
    }

    #[test]
    fn intraday_series_uses_two_hour_tolerance() {
        let series = PriceSeries::new(
            "AAPL",
            vec![
                bar(t0(), 10.0, 12.0),
                bar(t0() + Duration::hours(1), 11.0, 13.0),
            ],
        );
        assert_eq!(resolve(&series, t0() + Duration::minutes(20)), Some(11.0));
        assert_eq!(resolve(&series, t0() + Duration::minutes(50)), Some(12.0));
        assert_eq!(resolve(&series, t0() + Duration::hours(3)), Some(12.0));
        assert_eq!(resolve(&series, t0() + Duration::hours(3) + Duration::minutes(1)), None);
        assert_eq!(resolve(&series, t0() - Duration::hours(3)), None);
    }

    #[test]
    fn daily_series_uses_one_day_tolerance() {
        let series = PriceSeries::new(
            "AAPL",
            vec![
                bar(t0(), 10.0, 12.0),
                bar(t0() + Duration::days(1), 20.0, 22.0),
            ],
        );
        assert_eq!(resolve(&series, t0() + Duration::days(2)), Some(21.0));
        assert_eq!(resolve(&series, t0() + Duration::days(2) + Duration::minutes(1)), None);
    }

    #[test]
    fn ties_resolve_to_earlier_bar() {
        let series = PriceSeries::new(
            "AAPL",
            vec![
                bar(t0(), 10.0, 12.0),
                bar(t0() + Duration::hours(3), 11.0, 13.0),
            ],
        );
        assert_eq!(resolve(&series, t0() + Duration::minutes(90)), Some(11.0));
    }

    #[test]
    fn book_resolves_by_symbol() {
        let book: PriceBook = vec![PriceSeries::new("SPY", vec![bar(t0(), 400.0, 402.0)])]
            .into_iter()
            .collect();
        assert_eq!(book.price_at("SPY", t0()), Some(401.0));
        assert_eq!(book.price_at("QQQ", t0()), None);
        assert!(book.contains("SPY"));
    }
}
