//! Error types for the risk engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Insufficient data: {required} observations required, {available} available")]
    DataInsufficient { required: usize, available: usize },

    #[error("Market data fetch failed for {symbol}: {message}")]
    Upstream { symbol: String, message: String },

    #[error("Market data fetch for {symbol} timed out after {timeout_secs}s")]
    Timeout { symbol: String, timeout_secs: u64 },

    #[error("Degenerate data: {0}")]
    Degenerate(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a data-insufficient error.
    pub fn insufficient(required: usize, available: usize) -> Self {
        Self::DataInsufficient {
            required,
            available,
        }
    }

    /// Shorthand for a collaborator failure.
    pub fn upstream(symbol: impl Into<String>, message: impl ToString) -> Self {
        Self::Upstream {
            symbol: symbol.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error means no decision could be established.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
