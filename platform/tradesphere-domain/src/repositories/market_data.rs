use crate::value_objects::frequency::HistoryInterval;
use crate::value_objects::price_bar::PriceBar;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub valid: bool,
    pub name: Option<String>,
    pub exchange: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: HistoryInterval,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),
    #[error("malformed price data: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transport(_) | ProviderError::RateLimited(_))
    }
}

/// Source of historical bars. An empty result means no data for the window,
/// not an error.
pub trait PriceHistoryProvider: Send + Sync {
    fn validate_symbol(&self, symbol: &str) -> Result<SymbolInfo, ProviderError>;
    fn get_history(&self, query: &HistoryQuery) -> Result<Vec<PriceBar>, ProviderError>;
}

pub trait BenchmarkPriceProvider: Send + Sync {
    fn benchmark_history(&self, query: &HistoryQuery) -> Result<Vec<PriceBar>, ProviderError>;
}

impl<P> PriceHistoryProvider for Arc<P>
where
    P: PriceHistoryProvider + ?Sized,
{
    fn validate_symbol(&self, symbol: &str) -> Result<SymbolInfo, ProviderError> {
        (**self).validate_symbol(symbol)
    }

    fn get_history(&self, query: &HistoryQuery) -> Result<Vec<PriceBar>, ProviderError> {
        (**self).get_history(query)
    }
}

impl<P> BenchmarkPriceProvider for Arc<P>
where
    P: BenchmarkPriceProvider + ?Sized,
{
    fn benchmark_history(&self, query: &HistoryQuery) -> Result<Vec<PriceBar>, ProviderError> {
        (**self).benchmark_history(query)
    }
}
