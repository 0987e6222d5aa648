use crate::error::DomainError;
use serde::{Deserialize, Serialize};

/// Intraday sessions are modelled as six hourly ticks after the open.
pub const INTRADAY_TICKS_PER_DAY: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingFrequency {
    Daily,
    Intraday,
}

impl TradingFrequency {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_lowercase().as_str() {
            "daily" | "1d" => Ok(TradingFrequency::Daily),
            "intraday" | "hourly" | "1h" => Ok(TradingFrequency::Intraday),
            _ => Err(DomainError::UnsupportedFrequency(value.to_string())),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TradingFrequency::Daily => "daily",
            TradingFrequency::Intraday => "intraday",
        }
    }

    pub fn planned_ticks(self, duration_days: u32) -> u32 {
        match self {
            TradingFrequency::Daily => duration_days,
            TradingFrequency::Intraday => duration_days.saturating_mul(INTRADAY_TICKS_PER_DAY),
        }
    }

    pub fn history_interval(self) -> HistoryInterval {
        match self {
            TradingFrequency::Daily => HistoryInterval::Daily,
            TradingFrequency::Intraday => HistoryInterval::Hourly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryInterval {
    Hourly,
    Daily,
}

impl HistoryInterval {
    pub fn label(self) -> &'static str {
        match self {
            HistoryInterval::Hourly => "1h",
            HistoryInterval::Daily => "1d",
        }
    }
}

/// Sampling period of the valuation series, used to annualize statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnPeriod {
    Daily,
    Weekly,
    Monthly,
    Annual,
}

impl ReturnPeriod {
    /// Unrecognized labels fall back to daily.
    pub fn parse_or_daily(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "weekly" => ReturnPeriod::Weekly,
            "monthly" => ReturnPeriod::Monthly,
            "annual" | "yearly" => ReturnPeriod::Annual,
            _ => ReturnPeriod::Daily,
        }
    }

    pub fn periods_per_year(self) -> f64 {
        match self {
            ReturnPeriod::Daily => 252.0,
            ReturnPeriod::Weekly => 52.0,
            ReturnPeriod::Monthly => 12.0,
            ReturnPeriod::Annual => 1.0,
        }
    }
}
