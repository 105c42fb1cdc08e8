//! Advanced risk metrics.
//!
//! ## Methods
//!
//! - **Parametric VaR**: normal approximation from mean and stdev of returns.
//! - **Historical VaR**: empirical quantile of sorted returns.
//! - **CVaR (Expected Shortfall)**: mean loss at or beyond the VaR quantile.
//! - **Sharpe / Sortino**: annualised over 252 trading days.
//! - **Max drawdown** and **stress tests** on the price series.
//!
//! Return-based metrics require [`MIN_ADVANCED_OBSERVATIONS`] returns and
//! fail with `DataInsufficient` below that, since a silent default would be
//! misleading.

use risk_core::stats;
use risk_core::types::StressTestResult;
use risk_core::{Error, Result};
use std::collections::BTreeMap;

/// Minimum number of returns for any return-based metric.
pub const MIN_ADVANCED_OBSERVATIONS: usize = 30;

/// Trading days per year used for annualisation.
const TRADING_DAYS: f64 = 252.0;

/// Absorbs float error in `n * (1 - confidence)` before flooring.
const INDEX_EPSILON: f64 = 1e-9;

fn require_observations(returns: &[f64]) -> Result<()> {
    if returns.len() < MIN_ADVANCED_OBSERVATIONS {
        return Err(Error::insufficient(MIN_ADVANCED_OBSERVATIONS, returns.len()));
    }
    Ok(())
}

/// One-tailed z-score magnitude for a confidence level.
pub fn z_score(confidence: f64) -> f64 {
    if (confidence - 0.99).abs() < 1e-9 {
        2.33
    } else if (confidence - 0.95).abs() < 1e-9 {
        1.65
    } else if (confidence - 0.90).abs() < 1e-9 {
        1.28
    } else {
        1.0
    }
}

/// Parametric VaR as a positive fraction, floored at 0.
///
/// `-(mean + q x stdev)` where `q = -z` is the lower-tail quantile.
pub fn parametric_var(returns: &[f64], confidence: f64) -> Result<f64> {
    require_observations(returns)?;
    let quantile = -z_score(confidence);
    let var = -(stats::mean(returns) + quantile * stats::std_dev(returns));
    Ok(var.max(0.0))
}

fn sorted(returns: &[f64]) -> Vec<f64> {
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

fn quantile_index(n: usize, confidence: f64) -> usize {
    let raw = (n as f64 * (1.0 - confidence) + INDEX_EPSILON).floor();
    (raw.max(0.0) as usize).min(n.saturating_sub(1))
}

/// Historical-simulation VaR: `-sorted[floor(n x (1 - confidence))] x position`.
pub fn historical_var(returns: &[f64], confidence: f64, position_size: f64) -> Result<f64> {
    require_observations(returns)?;
    let sorted = sorted(returns);
    let index = quantile_index(sorted.len(), confidence);
    Ok(-sorted[index] * position_size)
}

/// Expected shortfall over returns at or below the VaR threshold return.
///
/// Falls back to VaR when no return qualifies.
pub fn expected_shortfall(returns: &[f64], confidence: f64, position_size: f64) -> Result<f64> {
    require_observations(returns)?;
    let sorted = sorted(returns);
    let index = quantile_index(sorted.len(), confidence);
    let threshold = sorted[index];

    let tail: Vec<f64> = sorted
        .iter()
        .take_while(|&&r| r <= threshold)
        .map(|&r| -r * position_size)
        .collect();

    if tail.is_empty() {
        return historical_var(returns, confidence, position_size);
    }
    Ok(stats::mean(&tail))
}

fn excess_returns(returns: &[f64], annual_risk_free_rate: f64) -> Vec<f64> {
    let daily_rf = annual_risk_free_rate / TRADING_DAYS;
    returns.iter().map(|r| r - daily_rf).collect()
}

/// Annualised Sharpe ratio; 0 when excess returns have zero variance.
pub fn sharpe_ratio(returns: &[f64], annual_risk_free_rate: f64) -> Result<f64> {
    require_observations(returns)?;
    let excess = excess_returns(returns, annual_risk_free_rate);
    let sd = stats::std_dev(&excess);
    if sd == 0.0 {
        return Ok(0.0);
    }
    Ok(stats::mean(&excess) / sd * TRADING_DAYS.sqrt())
}

/// Annualised Sortino ratio.
///
/// The denominator is the downside deviation `sqrt(mean(min(r, 0)^2))` over
/// all excess returns. Returns `f64::INFINITY` when there is no downside
/// observation. Callers must handle non-finite values.
pub fn sortino_ratio(returns: &[f64], annual_risk_free_rate: f64) -> Result<f64> {
    require_observations(returns)?;
    let excess = excess_returns(returns, annual_risk_free_rate);
    if !excess.iter().any(|r| *r < 0.0) {
        return Ok(f64::INFINITY);
    }

    let downside_sq: Vec<f64> = excess.iter().map(|r| r.min(0.0).powi(2)).collect();
    let downside_dev = stats::mean(&downside_sq).sqrt();
    Ok(stats::mean(&excess) / downside_dev * TRADING_DAYS.sqrt())
}

/// Largest peak-to-trough decline as a fraction of the running peak.
pub fn max_drawdown(prices: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd: f64 = 0.0;

    for &price in prices {
        if price > peak {
            peak = price;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - price) / peak);
        }
    }

    max_dd
}

/// Apply each named shock to the latest price.
pub fn stress_test(
    prices: &[f64],
    scenarios: &BTreeMap<String, f64>,
) -> Result<Vec<StressTestResult>> {
    let returns: Vec<f64> = prices
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    let var_95 = historical_var(&returns, 0.95, 1.0)?;

    let base_price = prices.last().copied().ok_or_else(|| Error::insufficient(1, 0))?;

    Ok(scenarios
        .iter()
        .map(|(name, &shock)| {
            let shocked_price = base_price * (1.0 + shock);
            let loss = if base_price != 0.0 {
                (base_price - shocked_price) / base_price
            } else {
                0.0
            };
            StressTestResult {
                scenario: name.clone(),
                shock,
                base_price,
                shocked_price,
                loss,
                var_95,
            }
        })
        .collect())
}
