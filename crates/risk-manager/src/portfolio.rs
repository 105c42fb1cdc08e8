//! Portfolio aggregation: correlation matrix, diversification, risk
//! contributions, and the weight optimizer.

use risk_core::stats;
use risk_core::types::{PortfolioConstraints, PortfolioRisk};
use risk_core::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Symmetric pairwise Pearson correlation matrix. Self-correlation is not
/// stored; every symbol still gets a (possibly empty) row.
pub fn correlation_matrix(
    symbols: &[&str],
    returns: &HashMap<String, Vec<f64>>,
) -> HashMap<String, HashMap<String, f64>> {
    let mut matrix: HashMap<String, HashMap<String, f64>> = symbols
        .iter()
        .map(|s| (s.to_string(), HashMap::new()))
        .collect();

    for (i, a) in symbols.iter().enumerate() {
        for b in &symbols[i + 1..] {
            let (Some(ra), Some(rb)) = (returns.get(*a), returns.get(*b)) else {
                continue;
            };
            let corr = stats::correlation(ra, rb);
            if let Some(row) = matrix.get_mut(*a) {
                row.insert(b.to_string(), corr);
            }
            if let Some(row) = matrix.get_mut(*b) {
                row.insert(a.to_string(), corr);
            }
        }
    }

    matrix
}

/// `1 - mean |pairwise correlation|` over distinct pairs, clamped to [0, 1].
///
/// Zero for a portfolio of fewer than two assets.
pub fn diversification_score(correlation: &HashMap<String, HashMap<String, f64>>) -> f64 {
    let symbols: BTreeSet<&str> = correlation.keys().map(String::as_str).collect();
    if symbols.len() < 2 {
        return 0.0;
    }

    let symbols: Vec<&str> = symbols.into_iter().collect();
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in symbols.iter().enumerate() {
        for b in &symbols[i + 1..] {
            let value = correlation
                .get(*a)
                .and_then(|row| row.get(*b))
                .or_else(|| correlation.get(*b).and_then(|row| row.get(*a)));
            if let Some(c) = value {
                total += c.abs();
                pairs += 1;
            }
        }
    }

    if pairs == 0 {
        return 0.0;
    }
    (1.0 - total / pairs as f64).clamp(0.0, 1.0)
}

/// Aggregate risk for a weighted set of assets.
///
/// Every weighted symbol needs a return series; an empty weight map is
/// rejected.
pub fn calculate_portfolio_risk(
    weights: &HashMap<String, f64>,
    returns: &HashMap<String, Vec<f64>>,
) -> Result<PortfolioRisk> {
    if weights.is_empty() {
        return Err(Error::InvalidInput("portfolio has no positions".to_string()));
    }
    if let Some((symbol, weight)) = weights.iter().find(|(_, w)| !w.is_finite()) {
        return Err(Error::InvalidInput(format!("non-finite weight {weight} for {symbol}")));
    }
    if let Some(missing) = weights.keys().find(|s| !returns.contains_key(*s)) {
        return Err(Error::InvalidInput(format!("no return series for {missing}")));
    }

    let mut symbols: Vec<&str> = weights.keys().map(String::as_str).collect();
    symbols.sort_unstable();

    let correlation = correlation_matrix(&symbols, returns);
    let diversification = diversification_score(&correlation);

    let risk_contribution: HashMap<String, f64> = symbols
        .iter()
        .map(|s| {
            let volatility = returns.get(*s).map(|r| stats::std_dev(r)).unwrap_or(0.0);
            (s.to_string(), weights[*s] * volatility)
        })
        .collect();

    let total_risk = risk_contribution.values().map(|c| c * c).sum::<f64>().sqrt();
    let total_value = weights.values().sum();

    debug!(
        assets = symbols.len(),
        total_risk = total_risk,
        diversification = diversification,
        "Calculated portfolio risk"
    );

    Ok(PortfolioRisk {
        total_value,
        total_risk,
        diversification,
        correlation,
        asset_weights: weights.clone(),
        risk_contribution,
    })
}

/// Weight optimizer.
///
/// **Placeholder:** expected returns and the covariance matrix are computed,
/// but no optimization is performed. Every asset receives an equal weight
/// (`1/n`), regardless of `target_return`. Constraints are validated only.
pub fn optimize_portfolio(
    target_return: f64,
    returns: &HashMap<String, Vec<f64>>,
    constraints: &PortfolioConstraints,
) -> Result<HashMap<String, f64>> {
    if returns.is_empty() {
        return Err(Error::InvalidInput("no assets to optimize".to_string()));
    }
    if let (Some(min), Some(max)) = (constraints.min_weight, constraints.max_weight) {
        if min > max {
            return Err(Error::InvalidInput(format!(
                "min_weight {min} exceeds max_weight {max}"
            )));
        }
    }

    let mut symbols: Vec<&str> = returns.keys().map(String::as_str).collect();
    symbols.sort_unstable();

    let expected: Vec<f64> = symbols.iter().map(|s| stats::mean(&returns[*s])).collect();
    let covariance: Vec<Vec<f64>> = symbols
        .iter()
        .map(|a| {
            symbols
                .iter()
                .map(|b| stats::covariance(&returns[*a], &returns[*b]))
                .collect()
        })
        .collect();

    let weight = 1.0 / symbols.len() as f64;
    warn!(
        assets = symbols.len(),
        target_return = target_return,
        "Portfolio optimizer is a placeholder: returning equal weights"
    );
    debug!(expected_returns = ?expected, covariance = ?covariance, "Optimizer inputs");

    Ok(symbols.into_iter().map(|s| (s.to_string(), weight)).collect())
}
