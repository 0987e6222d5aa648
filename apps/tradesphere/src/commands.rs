use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tradesphere_application::config::{self, Config};
use tradesphere_application::registry::{SimulationRegistry, SimulationStatus};
use tradesphere_application::simulation::MarketDataPorts;
use tradesphere_domain::repositories::artifacts::ArtifactWriter;
use tradesphere_domain::services::engine::simulation::SimulationState;
use tradesphere_infrastructure::artifacts::FilesystemArtifactWriter;
use tradesphere_infrastructure::market_data::csv::CsvPriceHistory;

pub struct RunOptions {
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub out_dir: PathBuf,
    pub poll_ms: u64,
}

#[derive(Debug)]
pub struct CommandReport {
    pub success: bool,
    pub json: serde_json::Value,
}

pub fn validate(config_path: &Path) -> Result<CommandReport, String> {
    let config = config::load_config(config_path)?;
    let prepared = config
        .simulation
        .prepare("validate", &config.settings())?;
    let plan = &prepared.plan;
    Ok(CommandReport {
        success: true,
        json: serde_json::json!({
            "status": "ok",
            "mode": "validate",
            "frequency": plan.frequency.label(),
            "planned_ticks": plan.planned_ticks(),
            "tickers": plan.tickers,
            "trading_rules": plan.rules.len(),
            "hedge_enabled": plan.hedge.is_some(),
            "skipped_entries": prepared.skipped,
        }),
    })
}

pub fn run(options: RunOptions) -> Result<CommandReport, String> {
    let (config, config_toml) = config::load_config_with_source(&options.config_path)?;
    let registry = build_registry(&config, &options.data_dir);

    let id = registry.start(&config.simulation);
    info!(id = %id, config = %options.config_path.display(), "simulation submitted");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| format!("unable to start async runtime: {err}"))?;
    runtime.block_on(watch(&registry, &id, Duration::from_millis(options.poll_ms.max(10))));

    let status = registry
        .wait(&id)
        .ok_or_else(|| format!("simulation {id} disappeared from the registry"))?;
    let run_dir = options.out_dir.join(&id);
    write_artifacts(&FilesystemArtifactWriter::new(), &run_dir, &status, &config_toml)?;

    let success = status.state == SimulationState::Completed;
    Ok(CommandReport {
        success,
        json: serde_json::json!({
            "id": status.id,
            "status": status.state.label(),
            "error": status.error,
            "snapshots": status.results.len(),
            "skipped_entries": status.skipped_entries,
            "final_metrics": status.final_metrics,
            "artifacts": {
                "run_dir": run_dir.display().to_string(),
                "results_json": run_dir.join("results.json").display().to_string(),
                "snapshots_csv": run_dir.join("snapshots.csv").display().to_string(),
                "audit_jsonl": run_dir.join("audit.jsonl").display().to_string(),
            },
        }),
    })
}

fn build_registry(config: &Config, data_dir: &Path) -> SimulationRegistry {
    let settings = config.settings();
    let provider = Arc::new(CsvPriceHistory::new(data_dir));
    let ports = MarketDataPorts::from_history(provider, &settings.provider);
    SimulationRegistry::new(ports, settings)
}

/// Polls until the simulation reaches a terminal state; Ctrl-C requests a stop.
async fn watch(registry: &SimulationRegistry, id: &str, poll: Duration) {
    let mut ticker = tokio::time::interval(poll);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stop_requested = false;
    let mut last_reported = 0usize;

    loop {
        tokio::select! {
            signal = &mut ctrl_c, if !stop_requested => {
                if let Err(err) = signal {
                    warn!(error = %err, "failed to listen for Ctrl-C");
                }
                info!(id = %id, "interrupt received; stopping simulation");
                registry.stop(id);
                stop_requested = true;
            }
            _ = ticker.tick() => {
                let Some(status) = registry.status(id) else {
                    return;
                };
                if status.results.len() != last_reported {
                    last_reported = status.results.len();
                    if let Some(latest) = status.results.last() {
                        info!(
                            id = %id,
                            label = %latest.label,
                            portfolio_value = latest.portfolio_value,
                            progress = status.progress,
                            "tick"
                        );
                    }
                }
                if status.is_complete {
                    return;
                }
            }
        }
    }
}

fn write_artifacts(
    writer: &dyn ArtifactWriter,
    run_dir: &Path,
    status: &SimulationStatus,
    config_toml: &str,
) -> Result<(), String> {
    writer.ensure_dir(run_dir)?;
    let results = serde_json::to_value(status)
        .map_err(|err| format!("failed to serialize simulation status: {err}"))?;
    writer.write_json(&run_dir.join("results.json"), &results)?;
    writer.write_snapshots_csv(&run_dir.join("snapshots.csv"), &status.results)?;
    writer.write_audit_jsonl(&run_dir.join("audit.jsonl"), &status.audit_events)?;
    writer.write_json(
        &run_dir.join("config_snapshot.json"),
        &serde_json::json!({ "toml": config_toml }),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{run, validate, RunOptions};
    use std::fs;
    use std::path::PathBuf;

    fn workspace(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tradesphere-cli-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("data")).expect("create data dir");
        dir
    }

    const CONFIG: &str = r#"
[simulation]
initial_cash = 10000.0
start_date = "2025-07-21"
duration_days = 3
trading_frequency = "daily"

[simulation.tickers]
AAPL = 10
BOGUS = "lots"

[provider]
retries = 1
backoff_ms = 0
"#;

    #[test]
    fn validate_reports_plan_and_skipped_entries() {
        let dir = workspace("validate");
        let config_path = dir.join("sim.toml");
        fs::write(&config_path, CONFIG).expect("write config");

        let report = validate(&config_path).expect("valid config");
        assert!(report.success);
        assert_eq!(report.json["planned_ticks"], 3);
        assert_eq!(report.json["tickers"]["AAPL"], 10.0);
        assert_eq!(report.json["skipped_entries"][0]["entry"], "tickers.BOGUS");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn run_writes_artifacts_for_csv_prices() {
        let dir = workspace("run");
        let config_path = dir.join("sim.toml");
        fs::write(&config_path, CONFIG).expect("write config");
        let mut csv = String::from("timestamp,open,high,low,close,volume\n");
        for day in 15..=31 {
            let price = 200 + day;
            csv.push_str(&format!("2025-07-{day:02},{price},{price},{price},{price},100\n"));
        }
        fs::write(dir.join("data").join("AAPL_1d.csv"), csv).expect("write prices");

        let report = run(RunOptions {
            config_path,
            data_dir: dir.join("data"),
            out_dir: dir.join("runs"),
            poll_ms: 10,
        })
        .expect("run");
        assert!(report.success, "unexpected report: {}", report.json);
        assert_eq!(report.json["status"], "completed");
        assert_eq!(report.json["snapshots"], 4);

        let run_dir = PathBuf::from(report.json["artifacts"]["run_dir"].as_str().expect("run dir"));
        assert!(run_dir.join("results.json").is_file());
        assert!(run_dir.join("audit.jsonl").is_file());
        let snapshots = fs::read_to_string(run_dir.join("snapshots.csv")).expect("snapshots");
        assert_eq!(snapshots.lines().count(), 5);
        let _ = fs::remove_dir_all(&dir);
    }
}
