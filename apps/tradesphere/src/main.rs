mod commands;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tradesphere")]
#[command(about = "TradeSphere portfolio simulation and beta hedging runner.", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log filter used when TRADESPHERE_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Serve Prometheus metrics on host:port.
    #[arg(long, global = true, env = "TRADESPHERE_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one simulation to completion (Ctrl-C stops it early).
    Run(RunArgs),
    /// Parse and validate a configuration without fetching prices.
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Config file path (TOML).
    #[arg(long, env = "TRADESPHERE_CONFIG")]
    config: PathBuf,

    /// Directory holding `<SYMBOL>_1h.csv` / `<SYMBOL>_1d.csv` price files.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Output root; artifacts land in `<out>/<simulation id>/`.
    #[arg(long, default_value = "runs")]
    out: PathBuf,

    /// Status polling interval in milliseconds.
    #[arg(long, default_value_t = 250)]
    poll_ms: u64,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    #[arg(long, env = "TRADESPHERE_CONFIG")]
    config: PathBuf,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(&cli.log_level, cli.log_format) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
    if let Err(err) = init_metrics(cli.metrics_addr) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }

    let result = match cli.command {
        Command::Run(args) => commands::run(commands::RunOptions {
            config_path: args.config,
            data_dir: args.data_dir,
            out_dir: args.out,
            poll_ms: args.poll_ms,
        }),
        Command::Validate(args) => commands::validate(&args.config),
    };

    match result {
        Ok(report) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&report.json)
                    .unwrap_or_else(|_| "{\"status\":\"error\",\"error\":\"json\"}".to_string())
            );
            std::process::exit(if report.success { 0 } else { 2 });
        }
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(log_level: &str, format: LogFormat) -> Result<(), String> {
    let filter = std::env::var("TRADESPHERE_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| log_level.to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .map_err(|err| format!("invalid log filter: {err}"))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

#[cfg(feature = "prometheus")]
fn init_metrics(addr: Option<SocketAddr>) -> Result<Option<SocketAddr>, String> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let Some(addr) = addr else {
        return Ok(None);
    };

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|err| format!("failed to install prometheus exporter: {err}"))?;

    tracing::info!(metrics_addr = %addr, "prometheus metrics exporter enabled");
    Ok(Some(addr))
}

#[cfg(not(feature = "prometheus"))]
fn init_metrics(addr: Option<SocketAddr>) -> Result<Option<SocketAddr>, String> {
    if addr.is_some() {
        tracing::warn!("metrics address ignored: built without the prometheus feature");
    }
    Ok(None)
}
