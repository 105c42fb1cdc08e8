//! File-backed market data: one JSON array of observations per symbol,
//! stored as `<data_dir>/<SYMBOL>.json`.

use async_trait::async_trait;
use risk_core::types::{simple_returns, MarketDataPoint};
use risk_core::{Error, MarketDataSource, Result, TimeRange};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct JsonFileSource {
    data_dir: PathBuf,
}

impl JsonFileSource {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, symbol: &str) -> Result<PathBuf> {
        if symbol.is_empty() || symbol.contains(['/', '\\']) || symbol.contains("..") {
            return Err(Error::InvalidInput(format!("invalid symbol: {symbol:?}")));
        }
        Ok(self.data_dir.join(format!("{symbol}.json")))
    }
}

#[async_trait]
impl MarketDataSource for JsonFileSource {
    async fn fetch_market_history(&self, symbol: &str) -> Result<Vec<MarketDataPoint>> {
        let path = self.path_for(symbol)?;
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::upstream(symbol, format!("{}: {e}", path.display())))?;

        let mut series: Vec<MarketDataPoint> = serde_json::from_str(&raw)?;
        series.sort_by_key(|p| p.timestamp);

        debug!(symbol = %symbol, observations = series.len(), "Loaded market history");
        Ok(series)
    }

    async fn fetch_return_series(&self, symbol: &str, range: TimeRange) -> Result<Vec<f64>> {
        let series: Vec<MarketDataPoint> = self
            .fetch_market_history(symbol)
            .await?
            .into_iter()
            .filter(|p| range.contains(p.timestamp))
            .collect();
        Ok(simple_returns(&series))
    }
}
