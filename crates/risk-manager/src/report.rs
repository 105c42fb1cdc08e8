//! Report and statistics generation over the profile cache.

use chrono::{DateTime, Duration, Utc};
use risk_core::types::{
    RiskAlert, RiskLevel, RiskProfile, RiskReport, RiskStatistics, SymbolRiskSummary,
};

/// Portfolio-wide risk level from per-symbol counts.
///
/// Any critical symbol makes the portfolio critical. More than a third of
/// symbols at high risk makes it high; any high symbol makes it medium.
pub fn aggregate_level(high: usize, critical: usize, total: usize) -> RiskLevel {
    if critical > 0 {
        RiskLevel::Critical
    } else if high > 0 && high * 3 > total {
        RiskLevel::High
    } else if high > 0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub fn statistics(profiles: &[RiskProfile]) -> RiskStatistics {
    let total_symbols = profiles.len();
    let high_risk_count = profiles.iter().filter(|p| p.risk_level == RiskLevel::High).count();
    let critical_count = profiles
        .iter()
        .filter(|p| p.risk_level == RiskLevel::Critical)
        .count();
    let average_score = if total_symbols == 0 {
        0.0
    } else {
        profiles.iter().map(|p| p.risk_score).sum::<f64>() / total_symbols as f64
    };

    RiskStatistics {
        total_symbols,
        high_risk_count,
        critical_count,
        average_score,
    }
}

/// Build a report. Alerts older than `alert_window` are left out.
pub fn build_report(
    profiles: &[RiskProfile],
    alert_window: Duration,
    now: DateTime<Utc>,
) -> RiskReport {
    let stats = statistics(profiles);
    let cutoff = now - alert_window;

    let mut symbols: Vec<SymbolRiskSummary> = profiles
        .iter()
        .map(|p| SymbolRiskSummary {
            symbol: p.symbol.clone(),
            risk_score: p.risk_score,
            risk_level: p.risk_level,
            last_updated: p.last_updated,
            var_95: p.var_95,
            active_alerts: p.alerts.iter().filter(|a| a.timestamp >= cutoff).count(),
        })
        .collect();
    symbols.sort_by(|a, b| {
        b.risk_score
            .total_cmp(&a.risk_score)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    let mut recent_alerts: Vec<RiskAlert> = profiles
        .iter()
        .flat_map(|p| p.alerts.iter())
        .filter(|a| a.timestamp >= cutoff)
        .cloned()
        .collect();
    recent_alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    RiskReport {
        generated_at: now,
        symbols,
        portfolio_level: aggregate_level(
            stats.high_risk_count,
            stats.critical_count,
            stats.total_symbols,
        ),
        high_risk_count: stats.high_risk_count,
        critical_count: stats.critical_count,
        average_score: stats.average_score,
        recent_alerts,
    }
}
