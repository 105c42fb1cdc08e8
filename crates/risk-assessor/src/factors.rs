//! The five risk factors and the composite score.
//!
//! Every factor lies in [0, 1]. A factor that cannot be computed returns an
//! error; the assessor substitutes the matching `DEFAULT_*` value.

use risk_core::config::RiskWeights;
use risk_core::stats;
use risk_core::types::{simple_returns, MarketDataPoint, RiskFactors};
use risk_core::{Error, Result};

pub const DEFAULT_VOLATILITY: f64 = 0.5;
pub const DEFAULT_LIQUIDITY: f64 = 0.3;
pub const DEFAULT_MARKET: f64 = 0.4;
pub const DEFAULT_CREDIT: f64 = 0.2;
pub const DEFAULT_OPERATIONAL: f64 = 0.2;

/// Liquidity risk substituted when the series carries no volume at all.
pub const ZERO_VOLUME_LIQUIDITY: f64 = 0.5;

/// Minimum observations for volatility and operational risk.
pub const MIN_FACTOR_OBSERVATIONS: usize = 7;

/// Daily return stdev that maps to a volatility risk of 1.0.
const VOLATILITY_CEILING: f64 = 0.05;

/// Price move (fraction) counted as an operational anomaly.
const PRICE_JUMP_THRESHOLD: f64 = 0.10;

/// Volume move (fraction) counted as an operational anomaly.
const VOLUME_JUMP_THRESHOLD: f64 = 2.0;

/// Degraded factor values, in the same shape as [`RiskFactors`].
pub struct FactorDefaults;

impl FactorDefaults {
    pub fn factors() -> RiskFactors {
        RiskFactors {
            volatility: DEFAULT_VOLATILITY,
            liquidity: DEFAULT_LIQUIDITY,
            market_risk: DEFAULT_MARKET,
            credit_risk: DEFAULT_CREDIT,
            operational: DEFAULT_OPERATIONAL,
        }
    }
}

/// Stdev of simple returns scaled by a 5% daily ceiling.
pub fn volatility_risk(series: &[MarketDataPoint]) -> Result<f64> {
    if series.len() < MIN_FACTOR_OBSERVATIONS {
        return Err(Error::insufficient(MIN_FACTOR_OBSERVATIONS, series.len()));
    }
    let returns = simple_returns(series);
    Ok((stats::std_dev(&returns) / VOLATILITY_CEILING).clamp(0.0, 1.0))
}

/// High volume with low churn means low risk.
///
/// A series without any traded volume is [`Error::Degenerate`]; the assessor
/// maps it to [`ZERO_VOLUME_LIQUIDITY`].
pub fn liquidity_risk(series: &[MarketDataPoint]) -> Result<f64> {
    if series.is_empty() {
        return Err(Error::insufficient(1, 0));
    }

    let volumes: Vec<f64> = series.iter().map(|p| p.volume_24h).collect();
    let avg_volume = stats::mean(&volumes);
    if avg_volume <= 0.0 || !avg_volume.is_finite() {
        return Err(Error::Degenerate(format!("average volume {avg_volume}")));
    }

    let abs_changes: Vec<f64> = series.iter().map(|p| p.price_change_24h.abs()).collect();
    let avg_abs_change = stats::mean(&abs_changes);

    let liquidity_score = avg_volume * (1.0 - (avg_abs_change / 10.0).min(1.0)) / 1e6;
    Ok((1.0 - liquidity_score.min(1.0)).clamp(0.0, 1.0))
}

/// stdev(asset) / stdev(market); 1.0 when the market has zero variance.
pub fn beta(asset_returns: &[f64], market_returns: &[f64]) -> f64 {
    let (asset, market) = stats::align_tail(asset_returns, market_returns);
    let market_sd = stats::std_dev(market);
    if market_sd == 0.0 {
        return 1.0;
    }
    stats::std_dev(asset) / market_sd
}

/// |correlation| x beta against a market return series.
pub fn market_risk(asset_returns: &[f64], market_returns: &[f64]) -> Result<f64> {
    let n = asset_returns.len().min(market_returns.len());
    if n < 2 {
        return Err(Error::insufficient(2, n));
    }
    let correlation = stats::correlation(asset_returns, market_returns);
    let risk = correlation.abs() * beta(asset_returns, market_returns);
    Ok(risk.clamp(0.0, 1.0))
}

fn market_cap_risk(market_cap: f64) -> f64 {
    if market_cap > 1e9 {
        0.1
    } else if market_cap > 1e8 {
        0.3
    } else if market_cap > 1e7 {
        0.5
    } else {
        0.8
    }
}

fn volume_credit_risk(volume: f64) -> f64 {
    if volume > 1e7 {
        0.2
    } else if volume > 1e6 {
        0.4
    } else if volume > 1e5 {
        0.6
    } else {
        0.9
    }
}

/// Average of market-cap and volume tiers of the latest observation.
pub fn credit_risk(series: &[MarketDataPoint]) -> Result<f64> {
    let latest = series.last().ok_or_else(|| Error::insufficient(1, 0))?;
    Ok((market_cap_risk(latest.market_cap) + volume_credit_risk(latest.volume_24h)) / 2.0)
}

/// Share of >10% price moves and >200% volume moves, averaged.
pub fn operational_risk(series: &[MarketDataPoint]) -> Result<f64> {
    if series.len() < MIN_FACTOR_OBSERVATIONS {
        return Err(Error::insufficient(MIN_FACTOR_OBSERVATIONS, series.len()));
    }

    let periods = (series.len() - 1) as f64;
    let mut price_jumps = 0usize;
    let mut volume_jumps = 0usize;

    for w in series.windows(2) {
        let (prev, curr) = (&w[0], &w[1]);
        if prev.price > 0.0
            && ((curr.price - prev.price) / prev.price).abs() > PRICE_JUMP_THRESHOLD
        {
            price_jumps += 1;
        }
        if prev.volume_24h > 0.0
            && ((curr.volume_24h - prev.volume_24h) / prev.volume_24h).abs() > VOLUME_JUMP_THRESHOLD
        {
            volume_jumps += 1;
        }
    }

    let risk = (price_jumps as f64 / periods + volume_jumps as f64 / periods) / 2.0;
    Ok(risk.clamp(0.0, 1.0))
}

/// sum(factor x weight) x 100, clamped to [0, max_score].
pub fn composite_score(factors: &RiskFactors, weights: &RiskWeights, max_score: f64) -> f64 {
    let weighted = factors.volatility * weights.volatility
        + factors.liquidity * weights.liquidity
        + factors.market_risk * weights.market
        + factors.credit_risk * weights.credit
        + factors.operational * weights.operational;

    let score = weighted * 100.0;
    if score.is_finite() {
        score.clamp(0.0, max_score)
    } else {
        max_score
    }
}
