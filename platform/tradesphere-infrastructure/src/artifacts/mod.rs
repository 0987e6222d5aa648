use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tradesphere_domain::repositories::artifacts::ArtifactWriter;
use tradesphere_domain::services::audit::AuditEvent;
use tradesphere_domain::value_objects::snapshot::SimulationSnapshot;

#[derive(Debug, Default, Clone, Copy)]
pub struct FilesystemArtifactWriter;

impl FilesystemArtifactWriter {
    pub fn new() -> Self {
        Self
    }
}

fn record_write_metrics(kind: &'static str, start: Instant, result: &Result<(), String>) {
    let result_label = if result.is_ok() { "ok" } else { "err" };
    metrics::counter!(
        "tradesphere.infra.artifacts.write.calls_total",
        "kind" => kind,
        "result" => result_label
    )
    .increment(1);
    metrics::histogram!(
        "tradesphere.infra.artifacts.write_ms",
        "kind" => kind,
        "result" => result_label
    )
    .record(start.elapsed().as_millis() as f64);
}

fn holdings_column(holdings: &BTreeMap<String, f64>) -> String {
    holdings
        .iter()
        .map(|(symbol, shares)| format!("{symbol}:{shares}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn write_snapshots_csv(path: &Path, snapshots: &[SimulationSnapshot]) -> Result<(), String> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|err| format!("failed to create snapshots {}: {}", path.display(), err))?;
    writer
        .write_record([
            "label",
            "timestamp",
            "portfolio_value",
            "cash",
            "pnl",
            "hedge_margin_balance",
            "positions",
            "short_positions",
            "prices",
            "trades_executed",
        ])
        .map_err(|err| format!("failed to write snapshot header: {}", err))?;
    for snapshot in snapshots {
        writer
            .write_record([
                snapshot.label.clone(),
                snapshot.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                format!("{:.2}", snapshot.portfolio_value),
                format!("{:.2}", snapshot.cash),
                format!("{:.2}", snapshot.pnl),
                format!("{:.2}", snapshot.hedge_margin_balance),
                holdings_column(&snapshot.positions),
                holdings_column(&snapshot.short_positions),
                holdings_column(&snapshot.prices),
                snapshot.trades_executed.join("; "),
            ])
            .map_err(|err| format!("failed to write snapshot row: {}", err))?;
    }
    writer
        .flush()
        .map_err(|err| format!("failed to flush snapshots: {}", err))
}

pub fn write_audit_jsonl(path: &Path, events: &[AuditEvent]) -> Result<(), String> {
    let mut file =
        fs::File::create(path).map_err(|err| format!("failed to create audit log: {}", err))?;
    for event in events {
        let line = serde_json::to_string(event)
            .map_err(|err| format!("failed to serialize audit event: {}", err))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .map_err(|err| format!("failed to write audit event: {}", err))?;
    }
    Ok(())
}

impl ArtifactWriter for FilesystemArtifactWriter {
    fn ensure_dir(&self, path: &Path) -> Result<(), String> {
        let start = Instant::now();
        let result = fs::create_dir_all(path)
            .map_err(|err| format!("failed to create dir {}: {}", path.display(), err));
        record_write_metrics("ensure_dir", start, &result);
        result
    }

    fn write_json(&self, path: &Path, value: &serde_json::Value) -> Result<(), String> {
        let start = Instant::now();
        let result = serde_json::to_string_pretty(value)
            .map_err(|err| format!("failed to serialize json: {err}"))
            .and_then(|json| {
                fs::write(path, json)
                    .map_err(|err| format!("failed to write json {}: {}", path.display(), err))
            });
        record_write_metrics("json", start, &result);
        result
    }

    fn write_snapshots_csv(
        &self,
        path: &Path,
        snapshots: &[SimulationSnapshot],
    ) -> Result<(), String> {
        let start = Instant::now();
        let result = write_snapshots_csv(path, snapshots);
        record_write_metrics("snapshots_csv", start, &result);
        result
    }

    fn write_audit_jsonl(&self, path: &Path, events: &[AuditEvent]) -> Result<(), String> {
        let start = Instant::now();
        let result = write_audit_jsonl(path, events);
        record_write_metrics("audit_jsonl", start, &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::FilesystemArtifactWriter;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use std::fs;
    use tradesphere_domain::repositories::artifacts::ArtifactWriter;
    use tradesphere_domain::services::audit::AuditEvent;
    use tradesphere_domain::value_objects::snapshot::SimulationSnapshot;

    #[test]
    fn writes_snapshot_csv_and_audit_lines() {
        let dir = std::env::temp_dir().join(format!("tradesphere-artifacts-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let writer = FilesystemArtifactWriter::new();
        writer.ensure_dir(&dir).expect("ensure dir");

        let timestamp = NaiveDate::from_ymd_opt(2025, 7, 21)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("timestamp");
        let snapshot = SimulationSnapshot {
            label: "Day 0 (Initial)".to_string(),
            timestamp,
            prices: BTreeMap::from([("AAPL".to_string(), 200.0)]),
            portfolio_value: 10_000.0,
            trades_executed: vec!["Bought 10 AAPL @ $200.00".to_string()],
            positions: BTreeMap::from([("AAPL".to_string(), 10.0)]),
            short_positions: BTreeMap::new(),
            cash: 8_000.0,
            pnl: 0.0,
            hedge_margin_balance: 4_000.0,
        };
        let csv_path = dir.join("snapshots.csv");
        writer
            .write_snapshots_csv(&csv_path, &[snapshot])
            .expect("write csv");
        let contents = fs::read_to_string(&csv_path).expect("read csv");
        let mut lines = contents.lines();
        assert!(lines.next().expect("header").starts_with("label,timestamp,portfolio_value"));
        let row = lines.next().expect("row");
        assert!(row.starts_with("Day 0 (Initial),2025-07-21 00:00:00,10000.00,8000.00"));
        assert!(row.contains("AAPL:10"));

        let events = vec![
            AuditEvent::new("run-1", Some(timestamp), "engine", "start"),
            AuditEvent::new("run-1", None, "engine", "complete").with_symbol("AAPL"),
        ];
        let audit_path = dir.join("audit.jsonl");
        writer.write_audit_jsonl(&audit_path, &events).expect("write audit");
        let audit = fs::read_to_string(&audit_path).expect("read audit");
        assert_eq!(audit.lines().count(), 2);
        let second: serde_json::Value =
            serde_json::from_str(audit.lines().nth(1).expect("line")).expect("json");
        assert_eq!(second["symbol"], "AAPL");

        let json_path = dir.join("results.json");
        writer
            .write_json(&json_path, &serde_json::json!({ "state": "completed" }))
            .expect("write json");
        assert!(fs::read_to_string(&json_path).expect("read json").contains("completed"));
        let _ = fs::remove_dir_all(&dir);
    }
}
