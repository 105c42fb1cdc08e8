//! Decision engine: turns a risk profile into a bounded trade decision.
//!
//! The base decision is a fold over an ordered list of pure rules. Each rule
//! can only shrink `max_position` or block trading, never relax it.

use risk_core::types::{
    MarketConditions, MarketState, PortfolioConstraints, PortfolioRisk, RiskDecision, RiskLevel,
    RiskProfile,
};
use risk_core::{Result, RiskConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::portfolio;

/// A single decision rule.
pub type DecisionRule = fn(RiskDecision, &RiskProfile, &RiskConfig) -> RiskDecision;

/// Base rules, applied in this order.
pub const DECISION_RULES: &[(&str, DecisionRule)] = &[
    ("critical_block", block_critical),
    ("level_cap", cap_by_level),
    ("score_penalty", penalize_excess_score),
    ("drawdown_block", block_on_drawdown),
    ("volatility_halving", halve_on_volatility),
    ("liquidity_block", block_on_illiquidity),
    ("diversification", reduce_for_concentration),
];

const VOLATILITY_LIMIT: f64 = 0.7;
const LIQUIDITY_LIMIT: f64 = 0.8;
const CONCENTRATION_FACTOR: f64 = 0.7;

const MIN_DIVERSIFICATION: f64 = 0.6;
const CORRELATION_LIMIT: f64 = 0.7;
const MAX_CORRELATED_MEMBERS: usize = 2;
const MAX_RISK_CONTRIBUTION: f64 = 0.15;
const MARKET_VOLATILITY_LIMIT: f64 = 0.05;
const VAR_LIMIT: f64 = 0.1;
const STRESS_LOSS_LIMIT: f64 = 0.15;

/// Fraction of `max_position_size` allowed per risk level.
pub fn level_cap_fraction(level: RiskLevel) -> f64 {
    match level {
        RiskLevel::Low => 1.0,
        RiskLevel::Medium => 0.6,
        RiskLevel::High => 0.3,
        RiskLevel::Critical => 0.0,
    }
}

/// Fraction of total capital allocated per risk level when sizing.
fn sizing_fraction(level: RiskLevel) -> f64 {
    match level {
        RiskLevel::Low => 0.10,
        RiskLevel::Medium => 0.05,
        RiskLevel::High => 0.02,
        RiskLevel::Critical => 0.0,
    }
}

/// Rule 1: critical risk blocks trading.
pub fn block_critical(
    decision: RiskDecision,
    profile: &RiskProfile,
    _config: &RiskConfig,
) -> RiskDecision {
    if profile.risk_level == RiskLevel::Critical {
        return decision.block(format!(
            "Critical risk level (score {:.1}): trading blocked",
            profile.risk_score
        ));
    }
    decision
}

/// Rule 2: cap by risk level, as a fraction of the configured maximum.
pub fn cap_by_level(
    decision: RiskDecision,
    profile: &RiskProfile,
    config: &RiskConfig,
) -> RiskDecision {
    if !decision.can_trade {
        return decision;
    }
    let cap = config.control.max_position_size * level_cap_fraction(profile.risk_level);
    let before = decision.max_position;
    let mut decision = decision.cap(cap);
    if decision.max_position < before {
        decision.warnings.push(format!(
            "Position capped at {:.4} for {} risk level",
            decision.max_position, profile.risk_level
        ));
    }
    decision
}

/// Rule 3: scores well above the threshold shrink the position further.
pub fn penalize_excess_score(
    decision: RiskDecision,
    profile: &RiskProfile,
    config: &RiskConfig,
) -> RiskDecision {
    let threshold = config.assessment.risk_threshold;
    if !decision.can_trade || profile.risk_score <= threshold + 10.0 {
        return decision;
    }
    let excess = (profile.risk_score - threshold) / config.assessment.max_risk_score;
    let factor = (1.0 - excess).max(0.1);
    decision.scale(
        factor,
        format!(
            "Risk score {:.1} exceeds threshold {:.1}: position scaled by {:.2}",
            profile.risk_score, threshold, factor
        ),
    )
}

/// Rule 4: historical drawdown beyond the limit blocks trading.
pub fn block_on_drawdown(
    decision: RiskDecision,
    profile: &RiskProfile,
    config: &RiskConfig,
) -> RiskDecision {
    let drawdown = profile.historical_drawdown();
    if drawdown > config.control.max_drawdown_limit {
        return decision.block(format!(
            "Historical drawdown {:.1}% exceeds limit {:.1}%: trading blocked",
            drawdown * 100.0,
            config.control.max_drawdown_limit * 100.0
        ));
    }
    decision
}

/// Rule 5: high volatility halves the position.
pub fn halve_on_volatility(
    decision: RiskDecision,
    profile: &RiskProfile,
    _config: &RiskConfig,
) -> RiskDecision {
    if !decision.can_trade || profile.risk_factors.volatility <= VOLATILITY_LIMIT {
        return decision;
    }
    decision.scale(
        0.5,
        format!(
            "High volatility risk {:.2}: position halved",
            profile.risk_factors.volatility
        ),
    )
}

/// Rule 6: illiquid instruments are blocked.
pub fn block_on_illiquidity(
    decision: RiskDecision,
    profile: &RiskProfile,
    _config: &RiskConfig,
) -> RiskDecision {
    if profile.risk_factors.liquidity > LIQUIDITY_LIMIT {
        return decision.block(format!(
            "Liquidity risk {:.2} too high: trading blocked",
            profile.risk_factors.liquidity
        ));
    }
    decision
}

/// Rule 7: elevated risk levels are treated as insufficiently diversified.
pub fn reduce_for_concentration(
    decision: RiskDecision,
    profile: &RiskProfile,
    _config: &RiskConfig,
) -> RiskDecision {
    if !decision.can_trade || !profile.risk_level.is_elevated() {
        return decision;
    }
    decision.scale(
        CONCENTRATION_FACTOR,
        "Insufficient diversification at elevated risk: position reduced by 30%",
    )
}

/// Advisory recommendations from factor thresholds and risk level.
pub fn recommendations(profile: &RiskProfile) -> Vec<String> {
    let mut recs = Vec::new();
    let f = &profile.risk_factors;

    if f.volatility > 0.6 {
        recs.push("High volatility: consider tighter stop-losses or hedging".to_string());
    }
    if f.liquidity > 0.6 {
        recs.push("Thin liquidity: prefer limit orders and smaller clips".to_string());
    }
    if f.market_risk > 0.7 {
        recs.push("Strong market sensitivity: diversify across uncorrelated assets".to_string());
    }
    if f.credit_risk > 0.6 {
        recs.push("Elevated credit risk: limit exposure to this issuer".to_string());
    }
    if f.operational > 0.5 {
        recs.push("Frequent price/volume anomalies: monitor execution closely".to_string());
    }

    match profile.risk_level {
        RiskLevel::Low => recs.push("Risk within acceptable bounds".to_string()),
        RiskLevel::Medium => recs.push("Moderate risk: size positions conservatively".to_string()),
        RiskLevel::High => recs.push("High risk: reduce exposure".to_string()),
        RiskLevel::Critical => recs.push("Critical risk: avoid new positions".to_string()),
    }

    recs
}

/// Result of a stop-loss check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopLossOutcome {
    pub triggered: bool,
    /// Amount of the position to sell.
    pub sell_amount: f64,
    /// Stop level that was breached, if any.
    pub level: Option<f64>,
    /// Fractional loss from entry.
    pub loss_pct: f64,
}

/// Risk controller.
pub struct RiskController {
    config: Arc<RiskConfig>,
}

impl RiskController {
    /// Zero-valued config fields take their defaults.
    pub fn new(config: Arc<RiskConfig>) -> Self {
        Self {
            config: RiskConfig::shared_with_defaults(config),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Apply the ordered rules to a requested position.
    pub fn make_decision(&self, profile: &RiskProfile, requested_position: f64) -> RiskDecision {
        let initial = RiskDecision::allow(
            profile.symbol.clone(),
            requested_position,
            profile.risk_score,
            profile.risk_level,
        );

        let mut decision = DECISION_RULES
            .iter()
            .fold(initial, |decision, (_, rule)| rule(decision, profile, &self.config));

        decision.recommendations = recommendations(profile);
        if !profile.degraded_factors.is_empty() {
            decision.warnings.push(format!(
                "Degraded risk factors (defaults used): {}",
                profile.degraded_factors.join(", ")
            ));
        }

        decision.max_position = decision
            .max_position
            .min(decision.requested_position)
            .min(self.config.control.max_position_size)
            .max(0.0);

        if decision.can_trade {
            debug!(
                symbol = %decision.symbol,
                requested = decision.requested_position,
                max_position = decision.max_position,
                risk_level = %decision.risk_level,
                "Risk decision made"
            );
        } else {
            error!(
                symbol = %decision.symbol,
                risk_score = decision.risk_score,
                warnings = ?decision.warnings,
                "Trading BLOCKED by risk controls"
            );
        }

        decision
    }

    /// Portfolio- and market-level adjustments on top of a base decision.
    ///
    /// Every step scales `max_position` independently. A bull market may
    /// raise it, but never above the level cap of rule 2 or the request.
    pub fn apply_advanced_risk_controls(
        &self,
        decision: RiskDecision,
        profile: &RiskProfile,
        portfolio: &PortfolioRisk,
        market: &MarketConditions,
    ) -> RiskDecision {
        if !decision.can_trade {
            return decision;
        }

        let ceiling = decision
            .requested_position
            .min(self.config.control.max_position_size * level_cap_fraction(profile.risk_level));
        let symbol = profile.symbol.as_str();
        let mut decision = decision;

        if portfolio.diversification < MIN_DIVERSIFICATION {
            decision = decision.scale(
                0.8,
                format!(
                    "Portfolio diversification {:.2} below {:.2}: position reduced by 20%",
                    portfolio.diversification, MIN_DIVERSIFICATION
                ),
            );
        }

        let correlated = portfolio
            .asset_weights
            .keys()
            .filter(|other| other.as_str() != symbol)
            .filter(|other| {
                portfolio
                    .correlation_between(symbol, other)
                    .map(|c| c.abs() > CORRELATION_LIMIT)
                    .unwrap_or(false)
            })
            .count();
        if correlated > MAX_CORRELATED_MEMBERS {
            decision = decision.scale(
                0.7,
                format!(
                    "{correlated} highly correlated portfolio members: position reduced by 30%"
                ),
            );
        }

        if let Some(&contribution) = portfolio.risk_contribution.get(symbol) {
            if contribution > MAX_RISK_CONTRIBUTION {
                decision = decision.scale(
                    0.85,
                    format!(
                        "Risk contribution {contribution:.3} above {MAX_RISK_CONTRIBUTION}: \
                         position reduced by 15%"
                    ),
                );
            }
        }

        match market.state {
            MarketState::Bull => {
                let boosted = (decision.max_position * 1.2).min(ceiling);
                if boosted > decision.max_position {
                    decision.max_position = boosted;
                    decision
                        .recommendations
                        .push("Bull market: position increased up to its level cap".to_string());
                }
            }
            MarketState::Bear => {
                decision = decision.scale(0.5, "Bear market: position halved");
            }
            MarketState::Sideways => {}
        }

        if market.volatility > MARKET_VOLATILITY_LIMIT {
            let factor = (1.0 - (market.volatility - MARKET_VOLATILITY_LIMIT) * 2.0).max(0.3);
            decision = decision.scale(
                factor,
                format!(
                    "Market volatility {:.3}: position scaled by {:.2}",
                    market.volatility, factor
                ),
            );
        }

        if profile.var_95 > VAR_LIMIT {
            let factor = (VAR_LIMIT / profile.var_95).max(0.4);
            decision = decision.scale(
                factor,
                format!(
                    "VaR(95%) {:.3} above {VAR_LIMIT}: position scaled by {factor:.2}",
                    profile.var_95
                ),
            );
        }

        let max_loss = profile
            .stress_test_results
            .iter()
            .map(|r| r.loss)
            .fold(0.0_f64, f64::max);
        if max_loss > STRESS_LOSS_LIMIT {
            let factor = (STRESS_LOSS_LIMIT / max_loss).max(0.5);
            decision = decision.scale(
                factor,
                format!(
                    "Stress-test loss {:.1}% above {:.0}%: position scaled by {factor:.2}",
                    max_loss * 100.0,
                    STRESS_LOSS_LIMIT * 100.0
                ),
            );
        }

        decision.max_position = decision.max_position.min(ceiling).max(0.0);
        decision
    }

    /// Capital to allocate to a position.
    pub fn calculate_position_size(
        &self,
        profile: &RiskProfile,
        total_capital: f64,
        available_capital: f64,
    ) -> f64 {
        let max_score = self.config.assessment.max_risk_score;
        let base = total_capital * sizing_fraction(profile.risk_level);
        let score_factor = 1.0 - (profile.risk_score / max_score).clamp(0.0, 1.0);
        let volatility_factor = 1.0 - profile.risk_factors.volatility.clamp(0.0, 1.0);

        let size = base * score_factor * volatility_factor;
        let limit = available_capital.min(self.config.control.max_position_size * total_capital);
        let size = size.min(limit).max(0.0);

        debug!(
            symbol = %profile.symbol,
            total_capital = total_capital,
            size = size,
            "Calculated position size"
        );
        size
    }

    /// Check a position against the configured stop-loss levels.
    ///
    /// Levels are scanned in ascending order; the deepest breached level is
    /// reported and `min(loss / level, 1)` of the position is sold.
    pub fn apply_stop_loss(
        &self,
        current_price: f64,
        entry_price: f64,
        position_size: f64,
    ) -> StopLossOutcome {
        if entry_price <= 0.0 || !current_price.is_finite() {
            return StopLossOutcome {
                triggered: false,
                sell_amount: 0.0,
                level: None,
                loss_pct: 0.0,
            };
        }

        let loss_pct = (entry_price - current_price) / entry_price;
        let level = self
            .config
            .control
            .stop_loss_levels
            .iter()
            .copied()
            .take_while(|&level| loss_pct >= level)
            .last();

        match level {
            Some(level) => {
                let ratio = (loss_pct / level).min(1.0);
                let sell_amount = position_size * ratio;
                info!(
                    entry_price = entry_price,
                    current_price = current_price,
                    loss_pct = loss_pct,
                    level = level,
                    sell_amount = sell_amount,
                    "Stop-loss triggered"
                );
                StopLossOutcome {
                    triggered: true,
                    sell_amount,
                    level: Some(level),
                    loss_pct,
                }
            }
            None => StopLossOutcome {
                triggered: false,
                sell_amount: 0.0,
                level: None,
                loss_pct,
            },
        }
    }

    pub fn calculate_portfolio_risk(
        &self,
        weights: &HashMap<String, f64>,
        returns: &HashMap<String, Vec<f64>>,
    ) -> Result<PortfolioRisk> {
        portfolio::calculate_portfolio_risk(weights, returns)
    }

    pub fn optimize_portfolio(
        &self,
        target_return: f64,
        returns: &HashMap<String, Vec<f64>>,
        constraints: &PortfolioConstraints,
    ) -> Result<HashMap<String, f64>> {
        portfolio::optimize_portfolio(target_return, returns, constraints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use risk_core::types::{RiskFactors, RiskSample, StressTestResult};

    fn controller() -> RiskController {
        RiskController::new(Arc::new(RiskConfig::default()))
    }

    fn calm_factors() -> RiskFactors {
        RiskFactors {
            volatility: 0.1,
            liquidity: 0.1,
            market_risk: 0.1,
            credit_risk: 0.1,
            operational: 0.0,
        }
    }

    fn profile(score: f64) -> RiskProfile {
        let config = RiskConfig::default();
        let mut p = RiskProfile::new("BTC", &config);
        p.risk_score = score;
        p.risk_level = RiskLevel::from_score(score, &config);
        p.risk_factors = calm_factors();
        p
    }

    #[test]
    fn test_critical_blocks() {
        let decision = controller().make_decision(&profile(95.0), 1.0);
        assert!(!decision.can_trade);
        assert_eq!(decision.max_position, 0.0);
        assert_eq!(decision.risk_level, RiskLevel::Critical);
        assert!(decision.warnings[0].contains("Critical"));
    }

    #[test]
    fn test_high_level_cap_is_thirty_percent() {
        let config = RiskConfig::default();
        let p = profile(75.0);
        assert_eq!(p.risk_level, RiskLevel::High);

        let initial = RiskDecision::allow("BTC", 1.0, p.risk_score, p.risk_level);
        let capped = cap_by_level(initial, &p, &config);
        assert!((capped.max_position - 0.03).abs() < 1e-12);

        // Full chain: rule 7 then reduces by a further 30%.
        let decision = controller().make_decision(&p, 1.0);
        assert!(decision.can_trade);
        assert!((decision.max_position - 0.021).abs() < 1e-12);
    }

    #[test]
    fn test_low_risk_passes_small_request() {
        let decision = controller().make_decision(&profile(20.0), 0.05);
        assert!(decision.can_trade);
        assert_eq!(decision.max_position, 0.05);
        assert!(decision.warnings.is_empty());
        assert_eq!(decision.recommendations, vec!["Risk within acceptable bounds".to_string()]);
    }

    #[test]
    fn test_score_penalty() {
        // score 85: High, and > threshold + 10
        let decision = controller().make_decision(&profile(85.0), 1.0);
        // 0.03 * (1 - 15/100) * 0.7
        assert!((decision.max_position - 0.03 * 0.85 * 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_drawdown_blocks() {
        let mut p = profile(20.0);
        for pnl in [100.0, 70.0] {
            p.push_sample(
                RiskSample {
                    timestamp: Utc::now(),
                    risk_score: 20.0,
                    position: 1.0,
                    pnl,
                },
                30,
            );
        }
        let decision = controller().make_decision(&p, 0.05);
        assert!(!decision.can_trade);
        assert_eq!(decision.max_position, 0.0);
    }

    #[test]
    fn test_volatility_halves_and_illiquidity_blocks() {
        let mut p = profile(20.0);
        p.risk_factors.volatility = 0.8;
        let decision = controller().make_decision(&p, 0.08);
        assert!((decision.max_position - 0.04).abs() < 1e-12);

        p.risk_factors.liquidity = 0.9;
        let decision = controller().make_decision(&p, 0.08);
        assert!(!decision.can_trade);
        assert_eq!(decision.max_position, 0.0);
    }

    #[test]
    fn test_decision_never_exceeds_request_or_cap() {
        let c = controller();
        for score in [0.0, 30.0, 55.0, 72.0, 81.0, 89.0, 99.0] {
            for requested in [0.0, 0.01, 0.05, 0.1, 0.5, 3.0, -1.0, f64::NAN] {
                let d = c.make_decision(&profile(score), requested);
                assert!(d.max_position >= 0.0);
                assert!(d.max_position <= c.config().control.max_position_size);
                if requested.is_finite() {
                    assert!(d.max_position <= requested.max(0.0));
                }
                if d.risk_level == RiskLevel::Critical {
                    assert!(!d.can_trade);
                    assert_eq!(d.max_position, 0.0);
                }
            }
        }
    }

    #[test]
    fn test_degraded_factors_are_traceable() {
        let mut p = profile(20.0);
        p.degraded_factors = vec!["volatility".to_string()];
        let decision = controller().make_decision(&p, 0.05);
        assert!(decision.warnings.iter().any(|w| w.contains("volatility")));
    }

    #[test]
    fn test_zero_config_fields_are_defaulted() {
        let mut config = RiskConfig::default();
        config.control.max_position_size = 0.0;
        config.control.stop_loss_levels.clear();
        let controller = RiskController::new(Arc::new(config));

        assert_eq!(controller.config().control.max_position_size, 0.10);
        let decision = controller.make_decision(&profile(20.0), 0.5);
        assert!(decision.can_trade);
        assert!(decision.max_position > 0.0);
        assert!(decision.max_position <= 0.10);
        assert!(controller.apply_stop_loss(90.0, 100.0, 10.0).triggered);
    }

    #[test]
    fn test_stop_loss_scenario() {
        let outcome = controller().apply_stop_loss(90.0, 100.0, 10.0);
        assert!(outcome.triggered);
        assert_eq!(outcome.level, Some(0.10));
        assert_eq!(outcome.sell_amount, 10.0);
    }

    #[test]
    fn test_stop_loss_not_triggered() {
        let c = controller();
        let outcome = c.apply_stop_loss(97.0, 100.0, 10.0);
        assert!(!outcome.triggered);
        assert_eq!(outcome.sell_amount, 0.0);

        let gain = c.apply_stop_loss(120.0, 100.0, 10.0);
        assert!(!gain.triggered);

        let invalid = c.apply_stop_loss(50.0, 0.0, 10.0);
        assert!(!invalid.triggered);
    }

    #[test]
    fn test_position_sizing() {
        let c = controller();
        let mut p = profile(20.0);
        p.risk_factors.volatility = 0.5;
        // 10% of 100k * 0.8 * 0.5 = 4000, below the 10k cap
        let size = c.calculate_position_size(&p, 100_000.0, 50_000.0);
        assert!((size - 4000.0).abs() < 1e-9);

        // Limited by available capital
        let size = c.calculate_position_size(&p, 100_000.0, 1_000.0);
        assert!((size - 1000.0).abs() < 1e-9);

        // Critical gets nothing
        let size = c.calculate_position_size(&profile(95.0), 100_000.0, 50_000.0);
        assert_eq!(size, 0.0);
    }

    fn portfolio(diversification: f64) -> PortfolioRisk {
        PortfolioRisk {
            diversification,
            asset_weights: HashMap::from([("BTC".to_string(), 0.5), ("ETH".to_string(), 0.5)]),
            ..Default::default()
        }
    }

    #[test]
    fn test_advanced_controls_bear_and_diversification() {
        let c = controller();
        let p = profile(20.0);
        let base = c.make_decision(&p, 0.05);
        let market = MarketConditions {
            state: MarketState::Bear,
            volatility: 0.0,
        };
        let adjusted = c.apply_advanced_risk_controls(base, &p, &portfolio(0.5), &market);
        // 0.05 * 0.8 * 0.5
        assert!((adjusted.max_position - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_bull_market_never_exceeds_base_cap() {
        let c = controller();
        let p = profile(20.0);
        let base = c.make_decision(&p, 0.09);
        let market = MarketConditions {
            state: MarketState::Bull,
            volatility: 0.0,
        };
        let adjusted = c.apply_advanced_risk_controls(base, &p, &portfolio(0.9), &market);
        assert!((adjusted.max_position - 0.09).abs() < 1e-12);

        let base = c.make_decision(&p, 0.5);
        let adjusted = c.apply_advanced_risk_controls(base, &p, &portfolio(0.9), &market);
        assert!((adjusted.max_position - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_advanced_controls_var_and_stress() {
        let c = controller();
        let mut p = profile(20.0);
        p.var_95 = 0.2;
        p.stress_test_results = vec![StressTestResult {
            scenario: "crash".to_string(),
            shock: -0.3,
            base_price: 100.0,
            shocked_price: 70.0,
            loss: 0.3,
            var_95: 0.2,
        }];
        let base = c.make_decision(&p, 0.1);
        let market = MarketConditions::default();
        let adjusted = c.apply_advanced_risk_controls(base, &p, &portfolio(0.9), &market);
        // 0.1 * max(0.1/0.2, 0.4) * max(0.15/0.3, 0.5)
        assert!((adjusted.max_position - 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_advanced_controls_market_volatility_floor() {
        let c = controller();
        let p = profile(20.0);
        let base = c.make_decision(&p, 0.1);
        let market = MarketConditions {
            state: MarketState::Sideways,
            volatility: 0.5,
        };
        let adjusted = c.apply_advanced_risk_controls(base, &p, &portfolio(0.9), &market);
        assert!((adjusted.max_position - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_advanced_controls_keep_block() {
        let c = controller();
        let p = profile(95.0);
        let base = c.make_decision(&p, 0.1);
        let market = MarketConditions {
            state: MarketState::Bull,
            volatility: 0.0,
        };
        let adjusted = c.apply_advanced_risk_controls(base, &p, &portfolio(0.9), &market);
        assert!(!adjusted.can_trade);
        assert_eq!(adjusted.max_position, 0.0);
    }
}
