//! Aggregated risk reports and statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RiskAlert, RiskLevel};

/// Per-symbol line of a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRiskSummary {
    pub symbol: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub last_updated: DateTime<Utc>,
    pub var_95: f64,
    pub active_alerts: usize,
}

/// Aggregate of all cached profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    pub generated_at: DateTime<Utc>,
    /// Sorted by descending risk score.
    pub symbols: Vec<SymbolRiskSummary>,
    pub portfolio_level: RiskLevel,
    pub high_risk_count: usize,
    pub critical_count: usize,
    pub average_score: f64,
    /// Alerts raised within the report window, newest first.
    pub recent_alerts: Vec<RiskAlert>,
}

/// Summary statistics over the profile cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskStatistics {
    pub total_symbols: usize,
    pub high_risk_count: usize,
    pub critical_count: usize,
    pub average_score: f64,
}
