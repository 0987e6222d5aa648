use crate::error::DomainError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Buy,
    Sell,
}

impl RuleAction {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_lowercase().as_str() {
            "buy" => Ok(RuleAction::Buy),
            "sell" => Ok(RuleAction::Sell),
            _ => Err(DomainError::UnsupportedAction(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCondition {
    GreaterThan,
    LessThan,
}

impl RuleCondition {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_lowercase().as_str() {
            "greater_than" | "gt" | ">" => Ok(RuleCondition::GreaterThan),
            "less_than" | "lt" | "<" => Ok(RuleCondition::LessThan),
            _ => Err(DomainError::UnsupportedCondition(value.to_string())),
        }
    }

    pub fn holds(self, price: f64, threshold: f64) -> bool {
        match self {
            RuleCondition::GreaterThan => price > threshold,
            RuleCondition::LessThan => price < threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingRule {
    pub symbol: String,
    pub action: RuleAction,
    pub condition: RuleCondition,
    pub threshold: f64,
    pub shares: f64,
    pub one_time: bool,
}

impl TradingRule {
    pub fn new(
        symbol: impl Into<String>,
        action: RuleAction,
        condition: RuleCondition,
        threshold: f64,
        shares: f64,
        one_time: bool,
    ) -> Result<Self, DomainError> {
        let symbol = symbol.into().trim().to_uppercase();
        if symbol.is_empty() {
            return Err(DomainError::InvalidRule {
                symbol,
                reason: "symbol must not be empty".to_string(),
            });
        }
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(DomainError::InvalidRule {
                symbol,
                reason: format!("threshold must be finite and > 0 (got {threshold})"),
            });
        }
        if !shares.is_finite() || shares <= 0.0 {
            return Err(DomainError::InvalidRule {
                symbol,
                reason: format!("shares must be finite and > 0 (got {shares})"),
            });
        }
        Ok(Self {
            symbol,
            action,
            condition,
            threshold,
            shares,
            one_time,
        })
    }

    pub fn matches(&self, price: f64) -> bool {
        self.condition.holds(price, self.threshold)
    }
}
