//! Market observations consumed by the assessor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single time-ordered market observation (oldest first in a series).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataPoint {
    pub timestamp: DateTime<Utc>,
    /// Last traded price.
    pub price: f64,
    /// Traded volume over the trailing 24h, in quote currency.
    #[serde(default)]
    pub volume_24h: f64,
    /// Price change over the trailing 24h, in percent.
    #[serde(default)]
    pub price_change_24h: f64,
    /// Market capitalisation, in quote currency.
    #[serde(default)]
    pub market_cap: f64,
}

impl MarketDataPoint {
    pub fn new(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self {
            timestamp,
            price,
            volume_24h: 0.0,
            price_change_24h: 0.0,
            market_cap: 0.0,
        }
    }

    pub fn with_volume(mut self, volume_24h: f64) -> Self {
        self.volume_24h = volume_24h;
        self
    }

    pub fn with_price_change(mut self, price_change_24h: f64) -> Self {
        self.price_change_24h = price_change_24h;
        self
    }

    pub fn with_market_cap(mut self, market_cap: f64) -> Self {
        self.market_cap = market_cap;
        self
    }
}

/// Simple period-over-period returns of a price series.
///
/// Pairs with a non-positive previous price are skipped.
pub fn simple_returns(series: &[MarketDataPoint]) -> Vec<f64> {
    series
        .windows(2)
        .filter(|w| w[0].price > 0.0)
        .map(|w| (w[1].price - w[0].price) / w[0].price)
        .collect()
}

/// Prices of a series, oldest first.
pub fn prices(series: &[MarketDataPoint]) -> Vec<f64> {
    series.iter().map(|p| p.price).collect()
}
