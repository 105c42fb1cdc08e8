//! Per-symbol risk profiles.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::RiskAlert;
use crate::config::RiskConfig;

/// Maximum number of alerts retained on a profile (oldest evicted first).
pub const MAX_PROFILE_ALERTS: usize = 100;

/// Discrete risk bucket. Ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Classify a score relative to the threshold and ceiling.
    ///
    /// Conditions are checked from most to least severe and the first match
    /// wins, so boundary ties resolve to the more severe bucket.
    pub fn classify(score: f64, threshold: f64, max_score: f64) -> Self {
        if score >= threshold + 20.0 || score >= 0.9 * max_score {
            Self::Critical
        } else if score >= threshold + 10.0 || score >= 0.7 * max_score {
            Self::High
        } else if score >= threshold || score >= 0.5 * max_score {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Classify using the assessment bounds of a config.
    pub fn from_score(score: f64, config: &RiskConfig) -> Self {
        Self::classify(
            score,
            config.assessment.risk_threshold,
            config.assessment.max_risk_score,
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Five independent risk dimensions, each in [0, 1] (higher is riskier).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub volatility: f64,
    pub liquidity: f64,
    pub market_risk: f64,
    pub credit_risk: f64,
    pub operational: f64,
}

impl Default for RiskFactors {
    /// The degraded defaults used when a factor cannot be computed.
    fn default() -> Self {
        Self {
            volatility: 0.5,
            liquidity: 0.3,
            market_risk: 0.4,
            credit_risk: 0.2,
            operational: 0.2,
        }
    }
}

/// Position bounds attached to a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionLimits {
    pub max_position: f64,
    pub max_drawdown: f64,
    pub diversification_min: usize,
    /// Ascending stop-loss percentages.
    pub stop_loss_levels: Vec<f64>,
}

impl PositionLimits {
    pub fn from_config(config: &RiskConfig) -> Self {
        Self {
            max_position: config.control.max_position_size,
            max_drawdown: config.control.max_drawdown_limit,
            diversification_min: config.control.diversification_min,
            stop_loss_levels: config.control.stop_loss_levels.clone(),
        }
    }
}

/// One historical sample of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskSample {
    pub timestamp: DateTime<Utc>,
    pub risk_score: f64,
    pub position: f64,
    pub pnl: f64,
}

/// Outcome of applying a named price shock to the latest observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressTestResult {
    pub scenario: String,
    pub shock: f64,
    pub base_price: f64,
    pub shocked_price: f64,
    /// Fractional loss versus the unshocked price.
    pub loss: f64,
    /// Historical VaR(95%) of the same series.
    pub var_95: f64,
}

/// Risk profile of a single symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskProfile {
    pub symbol: String,
    pub last_updated: DateTime<Utc>,
    /// Composite score in [0, max_risk_score].
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub risk_factors: RiskFactors,
    pub position_limits: PositionLimits,
    /// Bounded ring of recent samples, oldest first.
    pub historical_risk: VecDeque<RiskSample>,
    /// Bounded list of alerts, oldest first.
    pub alerts: VecDeque<RiskAlert>,
    pub var_95: f64,
    pub var_99: f64,
    pub cvar_95: f64,
    pub beta: f64,
    pub stress_test_results: Vec<StressTestResult>,
    pub max_drawdown: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub sortino_ratio: Option<f64>,
    /// Names of factors that fell back to their degraded default.
    #[serde(default)]
    pub degraded_factors: Vec<String>,
}

impl RiskProfile {
    /// Create an empty profile for a symbol.
    pub fn new(symbol: impl Into<String>, config: &RiskConfig) -> Self {
        Self {
            symbol: symbol.into(),
            last_updated: Utc::now(),
            risk_score: 0.0,
            risk_level: RiskLevel::Low,
            risk_factors: RiskFactors::default(),
            position_limits: PositionLimits::from_config(config),
            historical_risk: VecDeque::new(),
            alerts: VecDeque::new(),
            var_95: 0.0,
            var_99: 0.0,
            cvar_95: 0.0,
            beta: 1.0,
            stress_test_results: Vec::new(),
            max_drawdown: None,
            sharpe_ratio: None,
            sortino_ratio: None,
            degraded_factors: Vec::new(),
        }
    }

    /// Age of the profile relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_updated
    }

    /// Whether the profile is stale (age >= update interval).
    pub fn is_stale(&self, update_interval: std::time::Duration, now: DateTime<Utc>) -> bool {
        let interval = Duration::from_std(update_interval).unwrap_or(Duration::MAX);
        self.age(now) >= interval
    }

    /// Append a sample, evicting the oldest beyond `window`.
    pub fn push_sample(&mut self, sample: RiskSample, window: usize) {
        self.historical_risk.push_back(sample);
        while self.historical_risk.len() > window.max(1) {
            self.historical_risk.pop_front();
        }
    }

    /// Append an alert, evicting the oldest beyond [`MAX_PROFILE_ALERTS`].
    pub fn push_alert(&mut self, alert: RiskAlert) {
        self.alerts.push_back(alert);
        while self.alerts.len() > MAX_PROFILE_ALERTS {
            self.alerts.pop_front();
        }
    }

    /// Most recent sample, if any.
    pub fn last_sample(&self) -> Option<&RiskSample> {
        self.historical_risk.back()
    }

    /// Peak-to-current PnL drawdown ratio over the historical samples.
    ///
    /// Zero when there is no positive PnL peak to measure against.
    pub fn historical_drawdown(&self) -> f64 {
        let Some(current) = self.last_sample().map(|s| s.pnl) else {
            return 0.0;
        };
        let peak = self
            .historical_risk
            .iter()
            .map(|s| s.pnl)
            .fold(f64::NEG_INFINITY, f64::max);

        if peak <= 0.0 || !peak.is_finite() {
            return 0.0;
        }
        ((peak - current) / peak).max(0.0)
    }

    /// Take over history and alerts from the profile this one replaces.
    pub fn carry_forward(&mut self, previous: RiskProfile) {
        let mut history = previous.historical_risk;
        history.extend(self.historical_risk.drain(..));
        self.historical_risk = history;
        let mut alerts = previous.alerts;
        alerts.extend(self.alerts.drain(..));
        self.alerts = alerts;
    }
}
