//! Risk alerts raised by the monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of threshold crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// Risk score crossed the `high_risk` threshold.
    HighRisk,
    /// Risk score crossed the `critical` threshold.
    CriticalRisk,
    /// Max drawdown crossed the `drawdown` threshold.
    Drawdown,
    /// Volatility factor crossed the `volatility` threshold.
    Volatility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    High,
    Critical,
}

/// An alert. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAlert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub symbol: String,
    pub risk_score: f64,
    /// Threshold that was crossed.
    pub threshold: f64,
}

impl RiskAlert {
    pub fn new(
        alert_type: AlertType,
        severity: AlertSeverity,
        symbol: impl Into<String>,
        risk_score: f64,
        threshold: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            alert_type,
            severity,
            message: message.into(),
            symbol: symbol.into(),
            risk_score,
            threshold,
        }
    }
}
