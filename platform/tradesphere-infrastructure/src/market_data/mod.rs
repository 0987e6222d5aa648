pub mod csv;
pub mod memory;

use std::time::Instant;

pub(crate) fn record_read_metrics<T, E>(kind: &'static str, start: Instant, result: &Result<T, E>) {
    let result_label = if result.is_ok() { "ok" } else { "err" };
    metrics::counter!(
        "tradesphere.infra.market_data.read.calls_total",
        "kind" => kind,
        "result" => result_label
    )
    .increment(1);
    metrics::histogram!(
        "tradesphere.infra.market_data.read_ms",
        "kind" => kind,
        "result" => result_label
    )
    .record(start.elapsed().as_millis() as f64);
}
