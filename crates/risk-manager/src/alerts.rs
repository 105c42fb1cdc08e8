//! Threshold alerts and subscriber fan-out.

use dashmap::DashSet;
use risk_core::config::{
    THRESHOLD_CRITICAL, THRESHOLD_DRAWDOWN, THRESHOLD_HIGH_RISK, THRESHOLD_VOLATILITY,
};
use risk_core::types::{AlertSeverity, AlertType, RiskAlert, RiskProfile};
use risk_core::RiskConfig;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

const ALERT_CHANNEL_CAPACITY: usize = 256;

/// Receives every alert raised by the manager.
///
/// Called inline, in registration order, so implementations should return
/// quickly.
pub trait RiskAlertSubscriber: Send + Sync {
    fn on_risk_alert(&self, alert: &RiskAlert);
}

/// Evaluates thresholds and fans alerts out to subscribers.
///
/// Alerts are edge-triggered: a condition fires once when it is crossed and
/// re-arms only after the value falls back below its threshold.
pub struct AlertDispatcher {
    subscribers: RwLock<Vec<Arc<dyn RiskAlertSubscriber>>>,
    alert_tx: broadcast::Sender<RiskAlert>,
    active: DashSet<(String, AlertType)>,
}

impl Default for AlertDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertDispatcher {
    pub fn new() -> Self {
        let (alert_tx, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Self {
            subscribers: RwLock::new(Vec::new()),
            alert_tx,
            active: DashSet::new(),
        }
    }

    pub async fn subscribe(&self, subscriber: Arc<dyn RiskAlertSubscriber>) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.push(subscriber);
        debug!(subscribers = subscribers.len(), "Alert subscriber registered");
    }

    /// Receiver for alerts raised from now on.
    pub fn stream(&self) -> broadcast::Receiver<RiskAlert> {
        self.alert_tx.subscribe()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Deliver an alert to every subscriber and to the broadcast stream.
    pub async fn notify(&self, alert: &RiskAlert) {
        let snapshot = self.subscribers.read().await.clone();
        for subscriber in &snapshot {
            subscriber.on_risk_alert(alert);
        }
        // No receivers is not an error.
        let _ = self.alert_tx.send(alert.clone());
    }

    /// Alerts newly raised by `profile`, updating the armed state.
    pub fn evaluate(&self, profile: &RiskProfile, config: &RiskConfig) -> Vec<RiskAlert> {
        let mut raised = Vec::new();
        let score = profile.risk_score;
        let critical = config.alert_threshold(THRESHOLD_CRITICAL);
        let high = config.alert_threshold(THRESHOLD_HIGH_RISK);

        let critical_edge = self.edge(&profile.symbol, AlertType::CriticalRisk, score >= critical);
        // Marked as crossed even when critical fires, so de-escalating from
        // critical to high does not raise a second alert.
        let high_edge = self.edge(&profile.symbol, AlertType::HighRisk, score >= high);

        if critical_edge {
            raised.push(RiskAlert::new(
                AlertType::CriticalRisk,
                AlertSeverity::Critical,
                &profile.symbol,
                score,
                critical,
                format!(
                    "Critical risk score {score:.1} for {} (threshold {critical:.1})",
                    profile.symbol
                ),
            ));
        } else if high_edge {
            raised.push(RiskAlert::new(
                AlertType::HighRisk,
                AlertSeverity::High,
                &profile.symbol,
                score,
                high,
                format!("High risk score {score:.1} for {} (threshold {high:.1})", profile.symbol),
            ));
        }

        let drawdown_threshold = config.alert_threshold(THRESHOLD_DRAWDOWN);
        let drawdown = profile
            .max_drawdown
            .unwrap_or(0.0)
            .max(profile.historical_drawdown());
        if self.edge(&profile.symbol, AlertType::Drawdown, drawdown >= drawdown_threshold) {
            raised.push(RiskAlert::new(
                AlertType::Drawdown,
                AlertSeverity::Warning,
                &profile.symbol,
                drawdown,
                drawdown_threshold,
                format!(
                    "Drawdown {:.1}% for {} exceeds {:.1}%",
                    drawdown * 100.0,
                    profile.symbol,
                    drawdown_threshold * 100.0
                ),
            ));
        }

        let volatility_threshold = config.alert_threshold(THRESHOLD_VOLATILITY);
        let volatility = profile.risk_factors.volatility;
        if self.edge(&profile.symbol, AlertType::Volatility, volatility >= volatility_threshold) {
            raised.push(RiskAlert::new(
                AlertType::Volatility,
                AlertSeverity::Warning,
                &profile.symbol,
                volatility,
                volatility_threshold,
                format!(
                    "Volatility risk {volatility:.2} for {} exceeds {volatility_threshold:.2}",
                    profile.symbol
                ),
            ));
        }

        for alert in &raised {
            warn!(
                symbol = %alert.symbol,
                alert_type = ?alert.alert_type,
                severity = ?alert.severity,
                value = alert.risk_score,
                threshold = alert.threshold,
                "Risk alert raised"
            );
        }

        raised
    }

    /// True when `above` transitions from false to true for this key.
    fn edge(&self, symbol: &str, alert_type: AlertType, above: bool) -> bool {
        let key = (symbol.to_string(), alert_type);
        if above {
            self.active.insert(key)
        } else {
            self.active.remove(&key);
            false
        }
    }
}
