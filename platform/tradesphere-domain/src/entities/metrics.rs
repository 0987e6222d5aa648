use crate::services::price_resolver::resolve;
use crate::value_objects::frequency::ReturnPeriod;
use crate::value_objects::price_series::PriceSeries;
use chrono::NaiveDateTime;
use serde::Serialize;

/// Trading days used when annualizing beta-side volatilities and returns.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

const MIN_STD: f64 = 1e-12;
const MIN_VARIANCE: f64 = 1e-20;
const MIN_ALIGNED_PAIRS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsConfig {
    pub risk_free_rate: f64,
    pub period: ReturnPeriod,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.02,
            period: ReturnPeriod::Daily,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnsSummary {
    pub total_return_pct: f64,
    pub annualized_return_pct: f64,
    pub volatility_pct: f64,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown_pct: f64,
    pub data_points: usize,
    pub time_period_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BetaBand {
    VeryHigh,
    High,
    Moderate,
    Low,
    VeryLow,
    Negative,
}

impl BetaBand {
    pub fn classify(beta: f64) -> Self {
        if beta > 1.5 {
            BetaBand::VeryHigh
        } else if beta > 1.2 {
            BetaBand::High
        } else if beta > 0.8 {
            BetaBand::Moderate
        } else if beta > 0.3 {
            BetaBand::Low
        } else if beta > -0.3 {
            BetaBand::VeryLow
        } else {
            BetaBand::Negative
        }
    }

    pub fn interpretation(self) -> &'static str {
        match self {
            BetaBand::VeryHigh => {
                "Very high beta - Portfolio is significantly more volatile than the market"
            }
            BetaBand::High => "High beta - Portfolio is more volatile than the market",
            BetaBand::Moderate => "Moderate beta - Portfolio moves roughly with the market",
            BetaBand::Low => "Low beta - Portfolio is less volatile than the market",
            BetaBand::VeryLow => {
                "Very low beta - Portfolio shows little correlation with the market"
            }
            BetaBand::Negative => "Negative beta - Portfolio moves opposite to the market",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BetaEstimate {
    pub beta: f64,
    pub correlation: f64,
    pub r_squared: f64,
    pub benchmark: String,
    pub data_points: usize,
    pub band: BetaBand,
    pub interpretation: String,
    pub portfolio_volatility: f64,
    pub benchmark_volatility: f64,
}

/// Simple returns between consecutive values; pairs whose earlier value is zero are skipped.
pub fn period_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|pair| pair[0] != 0.0)
        .map(|pair| (pair[1] - pair[0]) / pair[0])
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Annualized volatility as a fraction. `None` with fewer than two returns or zero dispersion.
pub fn volatility(values: &[f64], period: ReturnPeriod) -> Option<f64> {
    let returns = period_returns(values);
    if returns.len() < 2 {
        return None;
    }
    let std = std_dev(&returns);
    if std <= MIN_STD {
        return None;
    }
    Some(std * period.periods_per_year().sqrt())
}

/// Annualized excess return over annualized standard deviation.
pub fn sharpe_ratio(values: &[f64], config: &MetricsConfig) -> Option<f64> {
    let returns = period_returns(values);
    if returns.len() < 2 {
        return None;
    }
    let std = std_dev(&returns);
    if std <= MIN_STD {
        return None;
    }
    let periods = config.period.periods_per_year();
    let per_period_rf = config.risk_free_rate / periods;
    let excess = mean(&returns) - per_period_rf;
    Some(excess * periods / (std * periods.sqrt()))
}

/// Largest peak-to-trough decline as a fraction of the running peak.
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = match values.first() {
        Some(first) => *first,
        None => return 0.0,
    };
    let mut max_dd = 0.0f64;
    for value in values {
        if *value > peak {
            peak = *value;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
        }
    }
    max_dd
}

pub fn returns_summary(
    points: &[(NaiveDateTime, f64)],
    config: &MetricsConfig,
) -> Option<ReturnsSummary> {
    let values: Vec<f64> = points.iter().map(|(_, value)| *value).collect();
    let returns = period_returns(&values);
    if returns.len() < 2 {
        return None;
    }
    let (first, last) = (values[0], values[values.len() - 1]);
    if first == 0.0 {
        return None;
    }

    let total_return = (last - first) / first;
    let annualized = (1.0 + total_return).powf(TRADING_DAYS_PER_YEAR / returns.len() as f64) - 1.0;
    let time_period_days = match (points.first(), points.last()) {
        (Some((start, _)), Some((end, _))) => (*end - *start).num_days(),
        _ => 0,
    };

    Some(ReturnsSummary {
        total_return_pct: round_to(total_return * 100.0, 2),
        annualized_return_pct: round_to(annualized * 100.0, 2),
        volatility_pct: round_to(std_dev(&returns) * TRADING_DAYS_PER_YEAR.sqrt() * 100.0, 2),
        sharpe_ratio: sharpe_ratio(&values, config).map(|s| round_to(s, 3)),
        max_drawdown_pct: round_to(max_drawdown(&values) * 100.0, 2),
        data_points: values.len(),
        time_period_days,
    })
}

/// Beta of the valuation series against `benchmark`, using only periods whose
/// endpoints both resolve a benchmark price.
pub fn beta(points: &[(NaiveDateTime, f64)], benchmark: &PriceSeries) -> Option<BetaEstimate> {
    let mut portfolio_returns = Vec::new();
    let mut benchmark_returns = Vec::new();

    for pair in points.windows(2) {
        let (prev_at, prev_value) = pair[0];
        let (at, value) = pair[1];
        if prev_value == 0.0 {
            continue;
        }
        let (Some(start), Some(end)) = (resolve(benchmark, prev_at), resolve(benchmark, at)) else {
            continue;
        };
        if start <= 0.0 {
            continue;
        }
        portfolio_returns.push((value - prev_value) / prev_value);
        benchmark_returns.push((end - start) / start);
    }

    let n = portfolio_returns.len();
    if n < MIN_ALIGNED_PAIRS {
        return None;
    }

    let mean_p = mean(&portfolio_returns);
    let mean_b = mean(&benchmark_returns);
    let mut cov = 0.0;
    let mut var_p = 0.0;
    let mut var_b = 0.0;
    for (p, b) in portfolio_returns.iter().zip(&benchmark_returns) {
        cov += (p - mean_p) * (b - mean_b);
        var_p += (p - mean_p) * (p - mean_p);
        var_b += (b - mean_b) * (b - mean_b);
    }
    // Sample covariance over population benchmark variance.
    let sample = (n - 1) as f64;
    let population = n as f64;
    let (cov, var_p, var_b) = (cov / sample, var_p / sample, var_b / sample);
    let benchmark_variance = var_b * sample / population;
    if benchmark_variance <= MIN_VARIANCE {
        return None;
    }

    let beta = cov / benchmark_variance;
    let correlation = if var_p > MIN_VARIANCE {
        let c = cov / (var_p.sqrt() * var_b.sqrt());
        if c.is_nan() {
            0.0
        } else {
            c.clamp(-1.0, 1.0)
        }
    } else {
        0.0
    };
    let band = BetaBand::classify(beta);

    Some(BetaEstimate {
        beta,
        correlation,
        r_squared: correlation * correlation,
        benchmark: benchmark.symbol().to_string(),
        data_points: n,
        band,
        interpretation: band.interpretation().to_string(),
        portfolio_volatility: std_dev(&portfolio_returns) * TRADING_DAYS_PER_YEAR.sqrt(),
        benchmark_volatility: std_dev(&benchmark_returns) * TRADING_DAYS_PER_YEAR.sqrt(),
    })
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
