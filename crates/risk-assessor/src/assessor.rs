//! Per-symbol risk assessment.

use chrono::Utc;
use risk_core::types::{
    prices, simple_returns, MarketDataPoint, RiskFactors, RiskLevel, RiskProfile,
};
use risk_core::{Error, MarketDataSource, Result, RiskConfig};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::factors::{self, composite_score};
use crate::metrics;

/// Computes risk profiles from injected market history.
pub struct RiskAssessor {
    source: Arc<dyn MarketDataSource>,
    config: Arc<RiskConfig>,
}

impl RiskAssessor {
    /// Create a new assessor. Zero-valued config fields take their defaults.
    pub fn new(source: Arc<dyn MarketDataSource>, config: Arc<RiskConfig>) -> Self {
        Self {
            source,
            config: RiskConfig::shared_with_defaults(config),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn MarketDataSource> {
        &self.source
    }

    /// Fetch history and build a fresh profile.
    ///
    /// Fails only when the data source fails or times out; factor-level
    /// problems degrade to their defaults.
    pub async fn assess(&self, symbol: &str) -> Result<RiskProfile> {
        let series = self.fetch_history(symbol).await?;
        Ok(self.assess_series(symbol, &series))
    }

    async fn fetch_history(&self, symbol: &str) -> Result<Vec<MarketDataPoint>> {
        let timeout = self.config.assessment.fetch_timeout();
        match tokio::time::timeout(timeout, self.source.fetch_market_history(symbol)).await {
            Ok(Ok(series)) => Ok(series),
            Ok(Err(e)) => {
                warn!(symbol = %symbol, error = %e, "Market history fetch failed");
                Err(match e {
                    e @ (Error::Upstream { .. } | Error::Timeout { .. }) => e,
                    other => Error::upstream(symbol, other),
                })
            }
            Err(_) => {
                warn!(
                    symbol = %symbol,
                    timeout_secs = timeout.as_secs(),
                    "Market history fetch timed out"
                );
                Err(Error::Timeout {
                    symbol: symbol.to_string(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    /// Build a profile from an already-fetched series.
    pub fn assess_series(&self, symbol: &str, series: &[MarketDataPoint]) -> RiskProfile {
        let (risk_factors, degraded) = self.calculate_risk_factors(series);
        let risk_score = self.calculate_risk_score(&risk_factors);
        let risk_level = RiskLevel::from_score(risk_score, &self.config);

        let mut profile = RiskProfile::new(symbol, &self.config);
        profile.last_updated = Utc::now();
        profile.risk_factors = risk_factors;
        profile.risk_score = risk_score;
        profile.risk_level = risk_level;
        profile.degraded_factors = degraded;

        self.apply_advanced_metrics(&mut profile, series);

        debug!(
            symbol = %symbol,
            observations = series.len(),
            risk_score = risk_score,
            risk_level = %risk_level,
            degraded = ?profile.degraded_factors,
            "Assessed risk profile"
        );

        profile
    }

    /// Compute all five factors, substituting defaults where needed.
    ///
    /// Returns the factors and the names of those that were defaulted.
    pub fn calculate_risk_factors(&self, series: &[MarketDataPoint]) -> (RiskFactors, Vec<String>) {
        let mut degraded = Vec::new();
        let mut resolve = |name: &str, result: Result<f64>, default: f64| match result {
            Ok(value) => value,
            Err(e) => {
                debug!(factor = name, error = %e, default = default, "Risk factor degraded");
                degraded.push(name.to_string());
                default
            }
        };

        // No external market index is wired in, so the asset's own series
        // stands in as the market proxy.
        let returns = simple_returns(series);

        let liquidity = factors::liquidity_risk(series);
        let liquidity_default = match &liquidity {
            Err(Error::Degenerate(_)) => factors::ZERO_VOLUME_LIQUIDITY,
            _ => factors::DEFAULT_LIQUIDITY,
        };

        let risk_factors = RiskFactors {
            volatility: resolve(
                "volatility",
                factors::volatility_risk(series),
                factors::DEFAULT_VOLATILITY,
            ),
            liquidity: resolve("liquidity", liquidity, liquidity_default),
            market_risk: resolve(
                "market",
                factors::market_risk(&returns, &returns),
                factors::DEFAULT_MARKET,
            ),
            credit_risk: resolve("credit", factors::credit_risk(series), factors::DEFAULT_CREDIT),
            operational: resolve(
                "operational",
                factors::operational_risk(series),
                factors::DEFAULT_OPERATIONAL,
            ),
        };

        (risk_factors, degraded)
    }

    /// Weighted composite score, clamped to the configured ceiling.
    pub fn calculate_risk_score(&self, factors: &RiskFactors) -> f64 {
        composite_score(factors, &self.config.weights, self.config.assessment.max_risk_score)
    }

    fn apply_advanced_metrics(&self, profile: &mut RiskProfile, series: &[MarketDataPoint]) {
        let price_series = prices(series);
        let returns = simple_returns(series);

        profile.beta = factors::beta(&returns, &returns);
        if price_series.len() >= 2 {
            profile.max_drawdown = Some(metrics::max_drawdown(&price_series));
        }

        if returns.len() < metrics::MIN_ADVANCED_OBSERVATIONS {
            debug!(
                symbol = %profile.symbol,
                returns = returns.len(),
                required = metrics::MIN_ADVANCED_OBSERVATIONS,
                "Skipping advanced metrics: insufficient returns"
            );
            return;
        }

        if let Err(e) = self.compute_return_metrics(profile, &returns, &price_series) {
            debug!(symbol = %profile.symbol, error = %e, "Advanced metrics incomplete");
        }
    }

    fn compute_return_metrics(
        &self,
        profile: &mut RiskProfile,
        returns: &[f64],
        price_series: &[f64],
    ) -> Result<()> {
        let rf = self.config.assessment.risk_free_rate;
        profile.var_95 = metrics::historical_var(returns, 0.95, 1.0)?;
        profile.var_99 = metrics::historical_var(returns, 0.99, 1.0)?;
        profile.cvar_95 = metrics::expected_shortfall(returns, 0.95, 1.0)?;
        profile.sharpe_ratio = Some(metrics::sharpe_ratio(returns, rf)?);
        profile.sortino_ratio = Some(metrics::sortino_ratio(returns, rf)?);
        profile.stress_test_results =
            metrics::stress_test(price_series, &self.config.assessment.stress_scenarios)?;
        Ok(())
    }
}
