use crate::config::{ConfigIssue, ProviderSettings, RuntimeSettings};
use crate::market_data::{HistoryBenchmark, RetryPolicy, RetryingProvider};
use chrono::Duration as ChronoDuration;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn};
use tradesphere_domain::repositories::market_data::{
    BenchmarkPriceProvider, HistoryQuery, PriceHistoryProvider, ProviderError,
};
use tradesphere_domain::services::engine::clock::SimulationClock;
use tradesphere_domain::services::engine::simulation::{
    RunControl, SimulationPlan, SimulationResults, SimulationRunner, TickProgress,
};
use tradesphere_domain::services::price_resolver::PriceBook;
use tradesphere_domain::value_objects::price_series::PriceSeries;

/// Extra calendar days fetched on both sides of the benchmark window.
pub const BENCHMARK_WINDOW_PADDING_DAYS: i64 = 5;

#[derive(Clone)]
pub struct MarketDataPorts {
    pub prices: Arc<dyn PriceHistoryProvider>,
    pub benchmarks: Arc<dyn BenchmarkPriceProvider>,
}

impl MarketDataPorts {
    pub fn new(prices: Arc<dyn PriceHistoryProvider>, benchmarks: Arc<dyn BenchmarkPriceProvider>) -> Self {
        Self { prices, benchmarks }
    }

    /// Wraps one history provider with the configured retry policy and serves
    /// benchmarks from it as well.
    pub fn from_history(provider: Arc<dyn PriceHistoryProvider>, settings: &ProviderSettings) -> Self {
        let retrying = Arc::new(RetryingProvider::new(provider, RetryPolicy::from_settings(settings)));
        Self {
            prices: retrying.clone(),
            benchmarks: Arc::new(HistoryBenchmark::new(retrying)),
        }
    }
}

impl std::fmt::Debug for MarketDataPorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataPorts").finish_non_exhaustive()
    }
}

/// Fetches every series the plan needs. Symbols the provider reports as
/// invalid are removed from the plan and reported as skipped entries.
pub fn load_price_book(
    plan: &mut SimulationPlan,
    ports: &MarketDataPorts,
    settings: &ProviderSettings,
) -> Result<(PriceBook, Vec<ConfigIssue>), String> {
    let origin = SimulationClock::new(plan.start_date, plan.frequency).origin().date();
    let end = origin + ChronoDuration::days(i64::from(plan.duration_days) + i64::from(settings.history_padding_days));
    let interval = plan.frequency.history_interval();

    let mut symbols: BTreeSet<String> = plan.tickers.keys().cloned().collect();
    symbols.extend(plan.rules.iter().map(|rule| rule.symbol.clone()));

    let mut skipped = Vec::new();
    let mut book = PriceBook::new();
    for symbol in symbols {
        match ports.prices.validate_symbol(&symbol) {
            Ok(info) if info.valid => {}
            Ok(_) | Err(ProviderError::InvalidSymbol(_)) => {
                warn!(symbol = %symbol, "invalid symbol; dropping its ticker and rules");
                plan.tickers.remove(&symbol);
                plan.rules.retain(|rule| rule.symbol != symbol);
                skipped.push(ConfigIssue {
                    entry: symbol.clone(),
                    reason: "invalid symbol".to_string(),
                });
                continue;
            }
            Err(err) => return Err(format!("failed to validate {symbol}: {err}")),
        }

        let bars = ports
            .prices
            .get_history(&HistoryQuery {
                symbol: symbol.clone(),
                start: origin,
                end,
                interval,
            })
            .map_err(|err| format!("failed to load price history for {symbol}: {err}"))?;
        if bars.is_empty() {
            warn!(symbol = %symbol, interval = interval.label(), "no price data available");
        }
        book.insert(PriceSeries::new(symbol, bars));
    }

    let mut benchmarks = BTreeSet::new();
    if let Some(hedge) = &plan.hedge {
        benchmarks.insert(hedge.benchmark.clone());
    }
    benchmarks.insert(plan.metrics_benchmark.clone());
    for symbol in benchmarks {
        let query = HistoryQuery {
            symbol: symbol.clone(),
            start: origin - ChronoDuration::days(BENCHMARK_WINDOW_PADDING_DAYS),
            end: end + ChronoDuration::days(BENCHMARK_WINDOW_PADDING_DAYS),
            interval,
        };
        match ports.benchmarks.benchmark_history(&query) {
            Ok(bars) if bars.is_empty() => {
                warn!(symbol = %symbol, "no benchmark data available; beta will be undefined");
            }
            Ok(bars) => book.insert(PriceSeries::new(symbol, bars)),
            Err(err) => {
                warn!(symbol = %symbol, error = %err, "benchmark fetch failed; beta will be undefined");
            }
        }
    }

    Ok((book, skipped))
}

/// Loads market data and runs one simulation to completion or cancellation.
pub fn run_simulation(
    mut plan: SimulationPlan,
    ports: &MarketDataPorts,
    provider: &ProviderSettings,
    runtime: &RuntimeSettings,
    control: &dyn RunControl,
    on_snapshot: &mut dyn FnMut(TickProgress<'_>),
) -> Result<(SimulationResults, Vec<ConfigIssue>), String> {
    let _span = info_span!(
        "simulation",
        run_id = %plan.run_id,
        frequency = plan.frequency.label(),
        duration_days = plan.duration_days
    )
    .entered();

    let stage_start = Instant::now();
    let (book, skipped) = load_price_book(&mut plan, ports, provider)?;
    metrics::histogram!("tradesphere.simulation.load_ms").record(stage_start.elapsed().as_millis() as f64);
    info!(symbols = book.symbols().count(), "price history loaded");

    let runner = SimulationRunner::new(plan, Arc::new(book)).map_err(|err| err.to_string())?;
    let tick_delay = Duration::from_millis(runtime.tick_delay_ms);
    let run_start = Instant::now();
    let results = runner.run(control, &mut |progress: TickProgress<'_>| {
        on_snapshot(progress);
        if progress.tick > 0 && !tick_delay.is_zero() {
            thread::sleep(tick_delay);
        }
    });
    metrics::histogram!("tradesphere.simulation.run_ms").record(run_start.elapsed().as_millis() as f64);
    info!(
        state = results.state.label(),
        snapshots = results.snapshots.len(),
        final_value = results.final_metrics.final_value,
        "simulation finished"
    );

    Ok((results, skipped))
}
