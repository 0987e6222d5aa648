use crate::config::ProviderSettings;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use tradesphere_domain::repositories::market_data::{
    BenchmarkPriceProvider, HistoryQuery, PriceHistoryProvider, ProviderError, SymbolInfo,
};
use tradesphere_domain::value_objects::frequency::HistoryInterval;
use tradesphere_domain::value_objects::price_bar::PriceBar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first.
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        Self {
            attempts: settings.retries.max(1),
            initial_backoff: Duration::from_millis(settings.backoff_ms),
            multiplier: if settings.backoff_multiplier.is_finite() && settings.backoff_multiplier >= 1.0 {
                settings.backoff_multiplier
            } else {
                1.0
            },
        }
    }

    pub fn no_backoff(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            initial_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&ProviderSettings::default())
    }
}

/// Retry-with-backoff and hourly-to-daily fallback around any history provider.
#[derive(Debug, Clone)]
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P> RetryingProvider<P>
where
    P: PriceHistoryProvider,
{
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn with_retry<T>(
        &self,
        operation: &str,
        symbol: &str,
        mut call: impl FnMut() -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let mut backoff = self.policy.initial_backoff;
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.policy.attempts => {
                    warn!(
                        operation,
                        symbol,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "provider call failed; retrying"
                    );
                    metrics::counter!("tradesphere.provider.retries").increment(1);
                    if !backoff.is_zero() {
                        thread::sleep(backoff);
                    }
                    backoff = backoff.mul_f64(self.policy.multiplier);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<P> PriceHistoryProvider for RetryingProvider<P>
where
    P: PriceHistoryProvider,
{
    fn validate_symbol(&self, symbol: &str) -> Result<SymbolInfo, ProviderError> {
        self.with_retry("validate_symbol", symbol, || self.inner.validate_symbol(symbol))
    }

    fn get_history(&self, query: &HistoryQuery) -> Result<Vec<PriceBar>, ProviderError> {
        let bars = self.with_retry("get_history", &query.symbol, || self.inner.get_history(query))?;
        if !bars.is_empty() || query.interval != HistoryInterval::Hourly {
            return Ok(bars);
        }

        debug!(symbol = %query.symbol, "no hourly bars; falling back to daily");
        metrics::counter!("tradesphere.provider.interval_fallbacks").increment(1);
        let daily = HistoryQuery {
            interval: HistoryInterval::Daily,
            ..query.clone()
        };
        self.with_retry("get_history", &query.symbol, || self.inner.get_history(&daily))
    }
}

/// Serves benchmark prices from an ordinary history provider.
#[derive(Debug, Clone)]
pub struct HistoryBenchmark<P> {
    inner: P,
}

impl<P> HistoryBenchmark<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P> BenchmarkPriceProvider for HistoryBenchmark<P>
where
    P: PriceHistoryProvider,
{
    fn benchmark_history(&self, query: &HistoryQuery) -> Result<Vec<PriceBar>, ProviderError> {
        self.inner.get_history(query)
    }
}

#[cfg(test)]
mod tests {
    use super::{RetryPolicy, RetryingProvider};
    use parking_lot::Mutex;
    use tradesphere_domain::repositories::market_data::{
        HistoryQuery, PriceHistoryProvider, ProviderError, SymbolInfo,
    };
    use tradesphere_domain::value_objects::frequency::HistoryInterval;
    use tradesphere_domain::value_objects::price_bar::PriceBar;

    struct Scripted {
        responses: Mutex<Vec<Result<Vec<PriceBar>, ProviderError>>>,
        intervals: Mutex<Vec<HistoryInterval>>,
    }

    impl Scripted {
        fn new(mut responses: Vec<Result<Vec<PriceBar>, ProviderError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                intervals: Mutex::new(Vec::new()),
            }
        }
    }

    impl PriceHistoryProvider for Scripted {
        fn validate_symbol(&self, symbol: &str) -> Result<SymbolInfo, ProviderError> {
            Ok(SymbolInfo {
                symbol: symbol.to_string(),
                valid: true,
                name: None,
                exchange: None,
            })
        }

        fn get_history(&self, query: &HistoryQuery) -> Result<Vec<PriceBar>, ProviderError> {
            self.intervals.lock().push(query.interval);
            self.responses.lock().pop().unwrap_or(Ok(Vec::new()))
        }
    }

    fn bar() -> PriceBar {
        PriceBar {
            timestamp: chrono::NaiveDate::from_ymd_opt(2025, 7, 21)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .expect("valid timestamp"),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        }
    }

    fn query(interval: HistoryInterval) -> HistoryQuery {
        HistoryQuery {
            symbol: "AAPL".to_string(),
            start: chrono::NaiveDate::from_ymd_opt(2025, 7, 21).expect("valid date"),
            end: chrono::NaiveDate::from_ymd_opt(2025, 8, 21).expect("valid date"),
            interval,
        }
    }

    #[test]
    fn transient_errors_are_retried() {
        let provider = RetryingProvider::new(
            Scripted::new(vec![
                Err(ProviderError::RateLimited("slow down".to_string())),
                Err(ProviderError::Transport("reset".to_string())),
                Ok(vec![bar()]),
            ]),
            RetryPolicy::no_backoff(3),
        );
        let bars = provider.get_history(&query(HistoryInterval::Daily)).expect("bars");
        assert_eq!(bars.len(), 1);
    }

    #[test]
    fn exhausted_retries_propagate_last_error() {
        let provider = RetryingProvider::new(
            Scripted::new(vec![
                Err(ProviderError::Transport("a".to_string())),
                Err(ProviderError::Transport("b".to_string())),
                Ok(vec![bar()]),
            ]),
            RetryPolicy::no_backoff(2),
        );
        let err = provider
            .get_history(&query(HistoryInterval::Daily))
            .expect_err("exhausted");
        assert_eq!(err, ProviderError::Transport("b".to_string()));
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let provider = RetryingProvider::new(
            Scripted::new(vec![
                Err(ProviderError::Malformed("bad row".to_string())),
                Ok(vec![bar()]),
            ]),
            RetryPolicy::no_backoff(3),
        );
        assert!(provider.get_history(&query(HistoryInterval::Daily)).is_err());
        assert_eq!(provider.inner().intervals.lock().len(), 1);
    }

    #[test]
    fn empty_hourly_history_falls_back_to_daily() {
        let provider = RetryingProvider::new(
            Scripted::new(vec![Ok(Vec::new()), Ok(vec![bar()])]),
            RetryPolicy::no_backoff(1),
        );
        let bars = provider.get_history(&query(HistoryInterval::Hourly)).expect("bars");
        assert_eq!(bars.len(), 1);
        assert_eq!(
            *provider.inner().intervals.lock(),
            vec![HistoryInterval::Hourly, HistoryInterval::Daily]
        );
    }
}
