use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("unsupported trading frequency: {0}")]
    UnsupportedFrequency(String),

    #[error("unsupported rule action: {0}")]
    UnsupportedAction(String),

    #[error("unsupported rule condition: {0}")]
    UnsupportedCondition(String),

    #[error("invalid trading rule for {symbol}: {reason}")]
    InvalidRule { symbol: String, reason: String },

    #[error("invalid simulation plan: {0}")]
    InvalidPlan(String),
}
