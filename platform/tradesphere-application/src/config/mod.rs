use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tradesphere_domain::entities::metrics::MetricsConfig;
use tradesphere_domain::services::engine::simulation::SimulationPlan;
use tradesphere_domain::services::hedge::HedgeConfig;
use tradesphere_domain::value_objects::frequency::{ReturnPeriod, TradingFrequency};
use tradesphere_domain::value_objects::trading_rule::{RuleAction, RuleCondition, TradingRule};

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub simulation: SimulationRequest,
    #[serde(default)]
    pub hedge: HedgeSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub runtime: RuntimeSettings,
}

impl Config {
    pub fn settings(&self) -> SimulationSettings {
        SimulationSettings {
            hedge: self.hedge.clone(),
            metrics: self.metrics.clone(),
            provider: self.provider.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

/// Parameters of one simulation as submitted to the control surface.
///
/// Ticker and rule entries stay loosely typed so a single malformed entry can
/// be skipped instead of failing the whole request.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SimulationRequest {
    #[serde(default = "default_initial_cash")]
    pub initial_cash: f64,
    #[serde(default = "default_start_date")]
    pub start_date: String,
    #[serde(default = "default_duration_days")]
    pub duration_days: u32,
    #[serde(default = "default_trading_frequency")]
    pub trading_frequency: String,
    #[serde(default)]
    pub beta_hedge_enabled: bool,
    #[serde(default)]
    pub tickers: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub trading_rules: Vec<serde_json::Value>,
}

impl Default for SimulationRequest {
    fn default() -> Self {
        Self {
            initial_cash: default_initial_cash(),
            start_date: default_start_date(),
            duration_days: default_duration_days(),
            trading_frequency: default_trading_frequency(),
            beta_hedge_enabled: false,
            tickers: BTreeMap::new(),
            trading_rules: Vec::new(),
        }
    }
}

fn default_initial_cash() -> f64 {
    100_000.0
}

fn default_start_date() -> String {
    "2025-07-21".to_string()
}

fn default_duration_days() -> u32 {
    30
}

fn default_trading_frequency() -> String {
    "daily".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct HedgeSettings {
    #[serde(default = "default_benchmark")]
    pub benchmark: String,
    #[serde(default = "default_beta_threshold")]
    pub beta_threshold: f64,
    #[serde(default = "default_fraction")]
    pub margin_fraction: f64,
    #[serde(default = "default_fraction")]
    pub max_hedge_fraction: f64,
}

impl Default for HedgeSettings {
    fn default() -> Self {
        Self {
            benchmark: default_benchmark(),
            beta_threshold: default_beta_threshold(),
            margin_fraction: default_fraction(),
            max_hedge_fraction: default_fraction(),
        }
    }
}

fn default_benchmark() -> String {
    "SPY".to_string()
}

fn default_beta_threshold() -> f64 {
    0.05
}

fn default_fraction() -> f64 {
    0.5
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MetricsSettings {
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    #[serde(default = "default_period")]
    pub period: String,
    #[serde(default = "default_benchmark")]
    pub benchmark: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            risk_free_rate: default_risk_free_rate(),
            period: default_period(),
            benchmark: default_benchmark(),
        }
    }
}

fn default_risk_free_rate() -> f64 {
    0.02
}

fn default_period() -> String {
    "daily".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_history_padding_days")]
    pub history_padding_days: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            backoff_ms: default_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            history_padding_days: default_history_padding_days(),
        }
    }
}

fn default_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1_000
}

fn default_backoff_multiplier() -> f64 {
    1.5
}

fn default_history_padding_days() -> u32 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct RuntimeSettings {
    #[serde(default)]
    pub tick_delay_ms: u64,
}

/// Everything except the request itself; shared by every simulation a registry starts.
#[derive(Debug, Clone, Default)]
pub struct SimulationSettings {
    pub hedge: HedgeSettings,
    pub metrics: MetricsSettings,
    pub provider: ProviderSettings,
    pub runtime: RuntimeSettings,
}

/// A request entry that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigIssue {
    pub entry: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct PreparedSimulation {
    pub plan: SimulationPlan,
    pub skipped: Vec<ConfigIssue>,
}

#[derive(Debug, Deserialize)]
struct RawTradingRule {
    #[serde(alias = "ticker")]
    symbol: String,
    action: Option<String>,
    condition: String,
    threshold: f64,
    shares: f64,
    #[serde(default)]
    one_time: bool,
}

impl SimulationRequest {
    /// Builds a validated plan. Malformed ticker and rule entries are returned
    /// in `skipped`; request-level problems are errors.
    pub fn prepare(&self, run_id: &str, settings: &SimulationSettings) -> Result<PreparedSimulation, String> {
        let start_date = chrono::NaiveDate::parse_from_str(self.start_date.trim(), "%Y-%m-%d")
            .map_err(|err| format!("invalid start_date {}: {}", self.start_date, err))?;
        let frequency = TradingFrequency::parse(&self.trading_frequency).map_err(|err| err.to_string())?;

        let mut plan = SimulationPlan::new(run_id, self.initial_cash, start_date, self.duration_days);
        plan.frequency = frequency;
        plan.margin_fraction = settings.hedge.margin_fraction;
        plan.metrics = MetricsConfig {
            risk_free_rate: settings.metrics.risk_free_rate,
            period: ReturnPeriod::parse_or_daily(&settings.metrics.period),
        };
        plan.metrics_benchmark = settings.metrics.benchmark.trim().to_uppercase();
        if self.beta_hedge_enabled {
            plan.hedge = Some(HedgeConfig {
                benchmark: settings.hedge.benchmark.trim().to_uppercase(),
                beta_threshold: settings.hedge.beta_threshold,
                max_hedge_fraction: settings.hedge.max_hedge_fraction,
            });
        }

        let mut skipped = Vec::new();
        for (symbol, value) in &self.tickers {
            match parse_ticker(symbol, value) {
                Ok((symbol, shares)) => {
                    *plan.tickers.entry(symbol).or_insert(0.0) += shares;
                }
                Err(reason) => skipped.push(ConfigIssue {
                    entry: format!("tickers.{symbol}"),
                    reason,
                }),
            }
        }
        for (idx, value) in self.trading_rules.iter().enumerate() {
            match parse_rule(value) {
                Ok(rule) => plan.rules.push(rule),
                Err(reason) => skipped.push(ConfigIssue {
                    entry: format!("trading_rules[{idx}]"),
                    reason,
                }),
            }
        }

        plan.validate().map_err(|err| err.to_string())?;
        Ok(PreparedSimulation { plan, skipped })
    }
}

fn parse_ticker(symbol: &str, value: &serde_json::Value) -> Result<(String, f64), String> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err("symbol must not be empty".to_string());
    }
    let shares = value
        .as_f64()
        .ok_or_else(|| format!("shares must be a number (got {value})"))?;
    if !shares.is_finite() || shares < 0.0 {
        return Err(format!("shares must be finite and >= 0 (got {shares})"));
    }
    Ok((symbol, shares))
}

fn parse_rule(value: &serde_json::Value) -> Result<TradingRule, String> {
    let raw: RawTradingRule =
        serde_json::from_value(value.clone()).map_err(|err| format!("malformed rule: {err}"))?;
    let action = match raw.action.as_deref() {
        Some(action) => RuleAction::parse(action).map_err(|err| err.to_string())?,
        None => RuleAction::Sell,
    };
    let condition = RuleCondition::parse(&raw.condition).map_err(|err| err.to_string())?;
    TradingRule::new(raw.symbol, action, condition, raw.threshold, raw.shares, raw.one_time)
        .map_err(|err| err.to_string())
}

pub fn load_config(path: &Path) -> Result<Config, String> {
    let (config, _source) = load_config_with_source(path)?;
    Ok(config)
}

pub fn load_config_with_source(path: &Path) -> Result<(Config, String), String> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {}: {}", path.display(), err))?;
    let config = toml::from_str(&contents)
        .map_err(|err| format!("failed to parse TOML {}: {}", path.display(), err))?;
    Ok((config, contents))
}

#[cfg(test)]
mod tests {
    use super::{Config, SimulationSettings};
    use tradesphere_domain::value_objects::frequency::TradingFrequency;
    use tradesphere_domain::value_objects::trading_rule::RuleAction;

    fn parse_config(toml_str: &str) -> Config {
        toml::from_str(toml_str).expect("config should parse")
    }

    #[test]
    fn parse_config_rejects_malformed_toml() {
        let err = toml::from_str::<Config>("[simulation\ninitial_cash = 1").expect_err("malformed");
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn parse_config_rejects_unknown_fields() {
        let err = toml::from_str::<Config>(
            r#"
[simulation]
initial_cash = 1000.0
leverage = 3
"#,
        )
        .expect_err("unknown field");
        assert!(err.to_string().contains("leverage"));
    }

    #[test]
    fn defaults_fill_optional_tables() {
        let config = parse_config("[simulation]\n");
        assert_eq!(config.simulation.initial_cash, 100_000.0);
        assert_eq!(config.simulation.duration_days, 30);
        assert_eq!(config.hedge.benchmark, "SPY");
        assert_eq!(config.hedge.beta_threshold, 0.05);
        assert_eq!(config.metrics.risk_free_rate, 0.02);
        assert_eq!(config.provider.retries, 3);
        assert_eq!(config.runtime.tick_delay_ms, 0);
    }

    #[test]
    fn prepare_skips_malformed_entries() {
        let config = parse_config(
            r#"
[simulation]
initial_cash = 50000.0
start_date = "2025-07-21"
duration_days = 5
trading_frequency = "intraday"
beta_hedge_enabled = true

[simulation.tickers]
aapl = 10
MSFT = "ten"

[[simulation.trading_rules]]
symbol = "aapl"
condition = "greater_than"
threshold = 240.0
shares = 5

[[simulation.trading_rules]]
symbol = "AAPL"
action = "hold"
condition = "less_than"
threshold = 200.0
shares = 5

[[simulation.trading_rules]]
ticker = "TSLA"
action = "buy"
condition = "less_than"
threshold = -1.0
shares = 5
"#,
        );
        let prepared = config
            .simulation
            .prepare("sim-1", &config.settings())
            .expect("prepared");
        let plan = prepared.plan;
        assert_eq!(plan.frequency, TradingFrequency::Intraday);
        assert_eq!(plan.tickers.get("AAPL"), Some(&10.0));
        assert_eq!(plan.rules.len(), 1);
        assert_eq!(plan.rules[0].action, RuleAction::Sell);
        assert_eq!(plan.rules[0].symbol, "AAPL");
        assert!(plan.hedge.is_some());

        let entries: Vec<&str> = prepared.skipped.iter().map(|i| i.entry.as_str()).collect();
        assert_eq!(
            entries,
            vec!["tickers.MSFT", "trading_rules[1]", "trading_rules[2]"]
        );
    }

    #[test]
    fn prepare_rejects_bad_request_fields() {
        let mut config = parse_config("[simulation]\n");
        config.simulation.trading_frequency = "weekly".to_string();
        assert!(config
            .simulation
            .prepare("sim-1", &SimulationSettings::default())
            .is_err());

        let mut config = parse_config("[simulation]\n");
        config.simulation.start_date = "21/07/2025".to_string();
        let err = config
            .simulation
            .prepare("sim-1", &SimulationSettings::default())
            .expect_err("bad date");
        assert!(err.contains("start_date"));
    }

    #[test]
    fn demo_config_loads_and_prepares() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/sim.toml");
        let (config, source) = super::load_config_with_source(&path).expect("demo config");
        assert!(source.contains("[simulation]"));
        let prepared = config
            .simulation
            .prepare("demo", &config.settings())
            .expect("demo plan");
        assert!(prepared.skipped.is_empty());
        assert_eq!(prepared.plan.tickers.len(), 2);
        assert_eq!(prepared.plan.rules.len(), 2);
        assert_eq!(prepared.plan.frequency, TradingFrequency::Daily);
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = super::load_config(std::path::Path::new("/nonexistent/tradesphere.toml"))
            .expect_err("missing file");
        assert!(err.starts_with("failed to read config"));
    }
}
