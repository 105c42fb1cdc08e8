//! Portfolio-level risk types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Derived portfolio risk, computed on demand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioRisk {
    /// Sum of asset weights.
    pub total_value: f64,
    /// sqrt of the sum of squared risk contributions.
    pub total_risk: f64,
    /// 1 - mean |pairwise correlation|; 0 for one asset or fewer.
    pub diversification: f64,
    /// Symmetric pairwise correlation matrix. Self-correlation is not stored.
    pub correlation: HashMap<String, HashMap<String, f64>>,
    pub asset_weights: HashMap<String, f64>,
    /// weight x volatility, per asset.
    pub risk_contribution: HashMap<String, f64>,
}

impl PortfolioRisk {
    /// Correlation between two members, if both are present.
    pub fn correlation_between(&self, a: &str, b: &str) -> Option<f64> {
        self.correlation.get(a).and_then(|row| row.get(b)).copied()
    }
}

/// Constraints passed to the optimizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioConstraints {
    pub min_weight: Option<f64>,
    pub max_weight: Option<f64>,
    pub long_only: bool,
}

/// Broad market regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketState {
    Bull,
    Bear,
    Sideways,
}

impl FromStr for MarketState {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bull" => Ok(Self::Bull),
            "bear" => Ok(Self::Bear),
            "sideways" => Ok(Self::Sideways),
            other => Err(crate::Error::InvalidInput(format!("unknown market state: {other}"))),
        }
    }
}

/// Market conditions used by the portfolio-level controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketConditions {
    pub state: MarketState,
    /// Market volatility (daily stdev of returns).
    pub volatility: f64,
}

impl Default for MarketConditions {
    fn default() -> Self {
        Self {
            state: MarketState::Sideways,
            volatility: 0.0,
        }
    }
}
