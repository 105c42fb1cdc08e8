//! Market data collaborator.
//!
//! The engine never fetches data itself; implementations of
//! [`MarketDataSource`] are injected at construction. Retry and backoff are
//! the implementation's concern.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::MarketDataPoint;
use crate::Result;

/// Window of a return-series request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The trailing `days` ending now.
    pub fn last_days(days: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::days(days),
            end,
        }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// Source of historical market data.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Time-ordered observations for a symbol, oldest first.
    async fn fetch_market_history(&self, symbol: &str) -> Result<Vec<MarketDataPoint>>;

    /// Period returns for a symbol within a time range, oldest first.
    async fn fetch_return_series(&self, symbol: &str, range: TimeRange) -> Result<Vec<f64>>;
}
