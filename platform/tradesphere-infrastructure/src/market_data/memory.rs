use chrono::{Duration, NaiveTime};
use std::collections::{BTreeMap, HashMap};
use tradesphere_domain::repositories::market_data::{
    HistoryQuery, PriceHistoryProvider, ProviderError, SymbolInfo,
};
use tradesphere_domain::value_objects::frequency::HistoryInterval;
use tradesphere_domain::value_objects::price_bar::PriceBar;

/// Fixed price history held in memory. Used for demos, tests and replay.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPriceHistory {
    series: HashMap<String, BTreeMap<HistoryInterval, Vec<PriceBar>>>,
    names: HashMap<String, String>,
}

impl InMemoryPriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(
        mut self,
        symbol: &str,
        interval: HistoryInterval,
        mut bars: Vec<PriceBar>,
    ) -> Self {
        bars.sort_by_key(|bar| bar.timestamp);
        self.series
            .entry(symbol.trim().to_uppercase())
            .or_default()
            .insert(interval, bars);
        self
    }

    pub fn with_name(mut self, symbol: &str, name: &str) -> Self {
        self.names
            .insert(symbol.trim().to_uppercase(), name.to_string());
        self
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.series.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

impl PriceHistoryProvider for InMemoryPriceHistory {
    fn validate_symbol(&self, symbol: &str) -> Result<SymbolInfo, ProviderError> {
        let symbol = symbol.trim().to_uppercase();
        Ok(SymbolInfo {
            valid: self.series.contains_key(&symbol),
            name: self.names.get(&symbol).cloned(),
            exchange: None,
            symbol,
        })
    }

    fn get_history(&self, query: &HistoryQuery) -> Result<Vec<PriceBar>, ProviderError> {
        let symbol = query.symbol.trim().to_uppercase();
        let Some(bars) = self
            .series
            .get(&symbol)
            .and_then(|by_interval| by_interval.get(&query.interval))
        else {
            return Ok(Vec::new());
        };
        let from = query.start.and_time(NaiveTime::MIN);
        let to = query.end.and_time(NaiveTime::MIN) + Duration::days(1);
        Ok(bars
            .iter()
            .filter(|bar| bar.timestamp >= from && bar.timestamp < to)
            .cloned()
            .collect())
    }
}
