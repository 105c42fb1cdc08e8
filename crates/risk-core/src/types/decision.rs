//! Trade decisions produced by the controller.

use serde::{Deserialize, Serialize};

use super::RiskLevel;

/// A binding, explainable trade/no-trade decision. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDecision {
    pub symbol: String,
    pub can_trade: bool,
    /// Position size after all reductions. Never above the requested size.
    pub max_position: f64,
    /// Position size the caller asked for.
    pub requested_position: f64,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    /// Advisory only.
    pub recommendations: Vec<String>,
    /// Applied reductions and blocks, in rule order.
    pub warnings: Vec<String>,
}

impl RiskDecision {
    /// Start a decision that allows the full requested size.
    pub fn allow(
        symbol: impl Into<String>,
        requested_position: f64,
        risk_score: f64,
        risk_level: RiskLevel,
    ) -> Self {
        let requested = if requested_position.is_finite() {
            requested_position.max(0.0)
        } else {
            0.0
        };
        Self {
            symbol: symbol.into(),
            can_trade: true,
            max_position: requested,
            requested_position: requested,
            risk_score,
            risk_level,
            recommendations: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Block trading entirely.
    pub fn block(mut self, warning: impl Into<String>) -> Self {
        self.can_trade = false;
        self.max_position = 0.0;
        self.warnings.push(warning.into());
        self
    }

    /// Scale the position down by `factor` (clamped to [0, 1]).
    pub fn scale(mut self, factor: f64, warning: impl Into<String>) -> Self {
        let factor = if factor.is_finite() { factor.clamp(0.0, 1.0) } else { 0.0 };
        self.max_position *= factor;
        self.warnings.push(warning.into());
        self
    }

    /// Cap the position to `cap`.
    pub fn cap(mut self, cap: f64) -> Self {
        self.max_position = self.max_position.min(cap.max(0.0));
        self
    }
}
