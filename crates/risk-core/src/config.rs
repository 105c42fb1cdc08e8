//! Configuration management for the risk engine.
//!
//! `RiskConfig` is supplied wholesale at construction and read-only after
//! that. Zero-valued fields are replaced by the documented defaults in
//! [`RiskConfig::with_defaults`], which every loader calls.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Alert threshold key for the high-risk score alert.
pub const THRESHOLD_HIGH_RISK: &str = "high_risk";
/// Alert threshold key for the critical score alert.
pub const THRESHOLD_CRITICAL: &str = "critical";
/// Alert threshold key for the max-drawdown alert.
pub const THRESHOLD_DRAWDOWN: &str = "drawdown";
/// Alert threshold key for the volatility-factor alert.
pub const THRESHOLD_VOLATILITY: &str = "volatility";

/// Process-wide risk configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub assessment: AssessmentConfig,
    pub control: ControlConfig,
    pub monitoring: MonitoringConfig,
    pub weights: RiskWeights,
}

/// Bounds used while assessing a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    /// Ceiling of the composite risk score (default 100).
    pub max_risk_score: f64,
    /// Score at which a symbol is considered risky (default 70).
    pub risk_threshold: f64,
    /// Profile age after which it is re-assessed (default 1h).
    pub update_interval_secs: u64,
    /// Number of historical samples kept per profile (default 30).
    pub history_window: usize,
    /// Annual risk-free rate used by Sharpe and Sortino (default 2%).
    pub risk_free_rate: f64,
    /// Upper bound on a single market-data fetch (default 30s).
    pub fetch_timeout_secs: u64,
    /// Named fractional price shocks for stress testing.
    pub stress_scenarios: BTreeMap<String, f64>,
}

/// Bounds used while controlling position size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Maximum position as a fraction of capital (default 0.10).
    pub max_position_size: f64,
    /// Maximum tolerated historical drawdown (default 0.20).
    pub max_drawdown_limit: f64,
    /// Minimum number of portfolio members for diversification (default 5).
    pub diversification_min: usize,
    /// Ascending stop-loss percentages (default 5%, 10%, 15%).
    pub stop_loss_levels: Vec<f64>,
}

/// Background monitoring parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Alert thresholds keyed by `high_risk`, `critical`, `drawdown`, `volatility`.
    pub alert_thresholds: HashMap<String, f64>,
    /// Re-assessment period (default 5m).
    pub monitoring_interval_secs: u64,
    /// Report aggregation period (default 1h).
    pub report_interval_secs: u64,
    /// Whether the background monitor runs at all.
    pub real_time_enabled: bool,
    /// Window of alerts included in reports (default 24h).
    pub alert_history_secs: u64,
    /// Bounded wait when stopping the monitor (default 5s).
    pub shutdown_timeout_secs: u64,
}

/// Weights of the five risk factors in the composite score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub volatility: f64,
    pub liquidity: f64,
    pub market: f64,
    pub credit: f64,
    pub operational: f64,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            max_risk_score: 100.0,
            risk_threshold: 70.0,
            update_interval_secs: 3600,
            history_window: 30,
            risk_free_rate: 0.02,
            fetch_timeout_secs: 30,
            stress_scenarios: default_stress_scenarios(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_position_size: 0.10,
            max_drawdown_limit: 0.20,
            diversification_min: 5,
            stop_loss_levels: vec![0.05, 0.10, 0.15],
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            alert_thresholds: default_alert_thresholds(),
            monitoring_interval_secs: 300,
            report_interval_secs: 3600,
            real_time_enabled: true,
            alert_history_secs: 86_400,
            shutdown_timeout_secs: 5,
        }
    }
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            volatility: 0.3,
            liquidity: 0.2,
            market: 0.25,
            credit: 0.15,
            operational: 0.1,
        }
    }
}

fn default_alert_thresholds() -> HashMap<String, f64> {
    HashMap::from([
        (THRESHOLD_HIGH_RISK.to_string(), 80.0),
        (THRESHOLD_CRITICAL.to_string(), 90.0),
        (THRESHOLD_DRAWDOWN.to_string(), 0.15),
        (THRESHOLD_VOLATILITY.to_string(), 0.3),
    ])
}

fn default_stress_scenarios() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("market_crash".to_string(), -0.30),
        ("flash_crash".to_string(), -0.20),
        ("moderate_decline".to_string(), -0.10),
        ("black_swan".to_string(), -0.50),
    ])
}

/// Replace a zero (or non-finite) value with its default.
fn or_default_f64(value: f64, default: f64) -> f64 {
    if value == 0.0 || !value.is_finite() {
        default
    } else {
        value
    }
}

fn or_default_u64(value: u64, default: u64) -> u64 {
    if value == 0 {
        default
    } else {
        value
    }
}

impl RiskConfig {
    /// Load configuration from an optional file layered under `RISK__*`
    /// environment variables, then apply defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading risk configuration file");
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("RISK")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("control.stop_loss_levels"),
        );

        let loaded: RiskConfig = builder.build()?.try_deserialize()?;
        Ok(loaded.with_defaults())
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Fill zero-valued and missing fields with the documented defaults.
    pub fn with_defaults(mut self) -> Self {
        let a = AssessmentConfig::default();
        self.assessment.max_risk_score =
            or_default_f64(self.assessment.max_risk_score, a.max_risk_score);
        self.assessment.risk_threshold =
            or_default_f64(self.assessment.risk_threshold, a.risk_threshold);
        self.assessment.update_interval_secs =
            or_default_u64(self.assessment.update_interval_secs, a.update_interval_secs);
        if self.assessment.history_window == 0 {
            self.assessment.history_window = a.history_window;
        }
        self.assessment.fetch_timeout_secs =
            or_default_u64(self.assessment.fetch_timeout_secs, a.fetch_timeout_secs);
        if !self.assessment.risk_free_rate.is_finite() {
            self.assessment.risk_free_rate = a.risk_free_rate;
        }
        if self.assessment.stress_scenarios.is_empty() {
            self.assessment.stress_scenarios = a.stress_scenarios;
        }

        let c = ControlConfig::default();
        self.control.max_position_size =
            or_default_f64(self.control.max_position_size, c.max_position_size);
        self.control.max_drawdown_limit =
            or_default_f64(self.control.max_drawdown_limit, c.max_drawdown_limit);
        if self.control.diversification_min == 0 {
            self.control.diversification_min = c.diversification_min;
        }
        self.control
            .stop_loss_levels
            .retain(|level| level.is_finite() && *level > 0.0);
        if self.control.stop_loss_levels.is_empty() {
            self.control.stop_loss_levels = c.stop_loss_levels;
        }
        self.control
            .stop_loss_levels
            .sort_by(|a, b| a.total_cmp(b));

        let m = MonitoringConfig::default();
        for (key, default) in default_alert_thresholds() {
            let entry = self.monitoring.alert_thresholds.entry(key).or_insert(default);
            *entry = or_default_f64(*entry, default);
        }
        self.monitoring.monitoring_interval_secs =
            or_default_u64(self.monitoring.monitoring_interval_secs, m.monitoring_interval_secs);
        self.monitoring.report_interval_secs =
            or_default_u64(self.monitoring.report_interval_secs, m.report_interval_secs);
        self.monitoring.alert_history_secs =
            or_default_u64(self.monitoring.alert_history_secs, m.alert_history_secs);
        self.monitoring.shutdown_timeout_secs =
            or_default_u64(self.monitoring.shutdown_timeout_secs, m.shutdown_timeout_secs);

        let w = RiskWeights::default();
        self.weights.volatility = or_default_f64(self.weights.volatility, w.volatility);
        self.weights.liquidity = or_default_f64(self.weights.liquidity, w.liquidity);
        self.weights.market = or_default_f64(self.weights.market, w.market);
        self.weights.credit = or_default_f64(self.weights.credit, w.credit);
        self.weights.operational = or_default_f64(self.weights.operational, w.operational);

        let total = self.weights.total();
        if (total - 1.0).abs() > 1e-6 {
            warn!(total_weight = total, "Risk weights do not sum to 1.0");
        }

        self
    }

    /// Shared configuration with defaults applied, for component constructors.
    pub fn shared_with_defaults(config: Arc<Self>) -> Arc<Self> {
        Arc::new(Arc::unwrap_or_clone(config).with_defaults())
    }

    /// Alert threshold by key, falling back to the documented default.
    pub fn alert_threshold(&self, key: &str) -> f64 {
        self.monitoring
            .alert_thresholds
            .get(key)
            .copied()
            .or_else(|| default_alert_thresholds().get(key).copied())
            .unwrap_or(f64::INFINITY)
    }
}

impl AssessmentConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl MonitoringConfig {
    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl RiskWeights {
    pub fn total(&self) -> f64 {
        self.volatility + self.liquidity + self.market + self.credit + self.operational
    }
}
