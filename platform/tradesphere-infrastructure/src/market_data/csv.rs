use super::record_read_metrics;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;
use tradesphere_domain::repositories::market_data::{
    HistoryQuery, PriceHistoryProvider, ProviderError, SymbolInfo,
};
use tradesphere_domain::value_objects::frequency::HistoryInterval;
use tradesphere_domain::value_objects::price_bar::PriceBar;

#[derive(Debug, Deserialize)]
pub struct PriceRecord {
    pub timestamp: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

/// Price history read from `<root>/<SYMBOL>_1h.csv` (hourly) and
/// `<root>/<SYMBOL>_1d.csv` or `<root>/<SYMBOL>.csv` (daily).
#[derive(Debug, Clone)]
pub struct CsvPriceHistory {
    root: PathBuf,
}

impl CsvPriceHistory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidates(&self, symbol: &str, interval: HistoryInterval) -> Vec<PathBuf> {
        match interval {
            HistoryInterval::Hourly => vec![self.root.join(format!("{symbol}_1h.csv"))],
            HistoryInterval::Daily => vec![
                self.root.join(format!("{symbol}_1d.csv")),
                self.root.join(format!("{symbol}.csv")),
            ],
        }
    }
}

impl PriceHistoryProvider for CsvPriceHistory {
    fn validate_symbol(&self, symbol: &str) -> Result<SymbolInfo, ProviderError> {
        let symbol = symbol.trim().to_uppercase();
        let valid = [HistoryInterval::Hourly, HistoryInterval::Daily]
            .into_iter()
            .flat_map(|interval| self.candidates(&symbol, interval))
            .any(|path| path.is_file());
        Ok(SymbolInfo {
            symbol: symbol.clone(),
            valid,
            name: Some(symbol),
            exchange: None,
        })
    }

    fn get_history(&self, query: &HistoryQuery) -> Result<Vec<PriceBar>, ProviderError> {
        let start = Instant::now();
        let symbol = query.symbol.trim().to_uppercase();
        let Some(path) = self
            .candidates(&symbol, query.interval)
            .into_iter()
            .find(|path| path.is_file())
        else {
            debug!(symbol = %symbol, interval = query.interval.label(), "no CSV price file");
            return Ok(Vec::new());
        };

        let result = load_csv(&path).map(|bars| {
            let from = query.start.and_time(NaiveTime::MIN);
            let to = query.end.and_time(NaiveTime::MIN) + chrono::Duration::days(1);
            bars.into_iter()
                .filter(|bar| bar.timestamp >= from && bar.timestamp < to)
                .collect::<Vec<_>>()
        });
        record_read_metrics("csv_history", start, &result);
        result
    }
}

pub fn load_csv(path: &Path) -> Result<Vec<PriceBar>, ProviderError> {
    let file = File::open(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => ProviderError::InvalidSymbol(path.display().to_string()),
        _ => ProviderError::Transport(format!("failed to open price CSV {}: {}", path.display(), err)),
    })?;
    let mut reader = ::csv::Reader::from_reader(file);

    let mut bars = Vec::new();
    for (row, result) in reader.deserialize::<PriceRecord>().enumerate() {
        let record = result.map_err(|err| {
            ProviderError::Malformed(format!("{} row {}: {}", path.display(), row + 1, err))
        })?;
        let timestamp = parse_timestamp(&record.timestamp).map_err(|err| {
            ProviderError::Malformed(format!("{} row {}: {}", path.display(), row + 1, err))
        })?;
        if !record.high.is_finite() || !record.low.is_finite() || record.high < record.low {
            return Err(ProviderError::Malformed(format!(
                "{} row {}: invalid high/low range",
                path.display(),
                row + 1
            )));
        }
        bars.push(PriceBar {
            timestamp,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        });
    }
    bars.sort_by_key(|bar| bar.timestamp);
    bars.dedup_by_key(|bar| bar.timestamp);
    Ok(bars)
}

/// Timestamps are tz-naive; offsets are dropped, keeping exchange-local wall time.
fn parse_timestamp(value: &str) -> Result<NaiveDateTime, String> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%z") {
        return Ok(dt.naive_local());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    Err(format!("unsupported timestamp format: {value}"))
}

#[cfg(test)]
mod tests {
    use super::{parse_timestamp, CsvPriceHistory};
    use chrono::NaiveDate;
    use std::fs;
    use std::path::PathBuf;
    use tradesphere_domain::repositories::market_data::{
        HistoryQuery, PriceHistoryProvider, ProviderError,
    };
    use tradesphere_domain::value_objects::frequency::HistoryInterval;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tradesphere-csv-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    fn query(interval: HistoryInterval) -> HistoryQuery {
        HistoryQuery {
            symbol: "aapl".to_string(),
            start: NaiveDate::from_ymd_opt(2025, 7, 21).expect("date"),
            end: NaiveDate::from_ymd_opt(2025, 7, 22).expect("date"),
            interval,
        }
    }

    #[test]
    fn parses_supported_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 7, 21)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .expect("timestamp");
        assert_eq!(parse_timestamp("2025-07-21 09:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-07-21T09:30:00-04:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-07-21 09:30").unwrap(), expected);
        assert!(parse_timestamp("21/07/2025").is_err());
    }

    #[test]
    fn reads_daily_file_and_filters_window() {
        let dir = temp_dir("daily");
        fs::write(
            dir.join("AAPL.csv"),
            "timestamp,open,high,low,close,volume\n\
             2025-07-20,1,2,1,2,10\n\
             2025-07-22,3,4,2,3,10\n\
             2025-07-21,2,3,1,2,10\n\
             2025-07-23,3,4,2,3,10\n",
        )
        .expect("write csv");
        let provider = CsvPriceHistory::new(&dir);
        assert!(provider.validate_symbol("aapl").expect("validate").valid);
        assert!(!provider.validate_symbol("MSFT").expect("validate").valid);

        let bars = provider.get_history(&query(HistoryInterval::Daily)).expect("bars");
        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
        assert_eq!(bars[0].mid(), 2.0);

        let hourly = provider.get_history(&query(HistoryInterval::Hourly)).expect("bars");
        assert!(hourly.is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_rows_are_reported() {
        let dir = temp_dir("malformed");
        fs::write(
            dir.join("AAPL_1d.csv"),
            "timestamp,open,high,low,close,volume\n2025-07-21,1,abc,1,2,10\n",
        )
        .expect("write csv");
        let err = CsvPriceHistory::new(&dir)
            .get_history(&query(HistoryInterval::Daily))
            .expect_err("malformed");
        assert!(matches!(err, ProviderError::Malformed(_)));
        let _ = fs::remove_dir_all(&dir);
    }
}
