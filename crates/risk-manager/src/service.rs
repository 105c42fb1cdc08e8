//! The risk manager: orchestrates assessment, control, alerts and the
//! background monitor behind one handle.

use chrono::{Duration as ChronoDuration, Utc};
use futures_util::future::join_all;
use risk_assessor::RiskAssessor;
use risk_core::types::{
    MarketConditions, PortfolioConstraints, PortfolioRisk, RiskAlert, RiskDecision, RiskProfile,
    RiskReport, RiskSample, RiskStatistics,
};
use risk_core::{Error, MarketDataSource, Result, RiskConfig, TimeRange};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::alerts::{AlertDispatcher, RiskAlertSubscriber};
use crate::cache::ProfileCache;
use crate::controller::{RiskController, StopLossOutcome};
use crate::monitor::MonitorHandle;
use crate::report;

/// State shared between the manager handle and its monitor task.
pub(crate) struct ManagerState {
    config: Arc<RiskConfig>,
    assessor: RiskAssessor,
    controller: RiskController,
    cache: ProfileCache,
    alerts: AlertDispatcher,
    last_report: RwLock<Option<RiskReport>>,
}

impl ManagerState {
    pub(crate) fn config(&self) -> &RiskConfig {
        &self.config
    }

    async fn profile_for(&self, symbol: &str, force: bool) -> Result<RiskProfile> {
        let window = self.config.assessment.history_window;
        let assessor = &self.assessor;

        self.cache
            .get_or_refresh(symbol, force, |previous| async move {
                let mut fresh = assessor.assess(symbol).await?;
                let (position, pnl) = previous
                    .as_ref()
                    .and_then(|p| p.last_sample())
                    .map(|s| (s.position, s.pnl))
                    .unwrap_or((0.0, 0.0));
                if let Some(previous) = previous {
                    fresh.carry_forward(previous);
                }
                let sample = RiskSample {
                    timestamp: fresh.last_updated,
                    risk_score: fresh.risk_score,
                    position,
                    pnl,
                };
                fresh.push_sample(sample, window);
                Ok(fresh)
            })
            .await
    }

    /// Evaluate thresholds, attach new alerts to the cached profile and
    /// notify subscribers.
    async fn check_and_trigger_alerts(&self, profile: &RiskProfile) -> Vec<RiskAlert> {
        let raised = self.alerts.evaluate(profile, &self.config);
        if raised.is_empty() {
            return raised;
        }

        let to_store = raised.clone();
        self.cache
            .update(&profile.symbol, move |p| {
                for alert in to_store {
                    p.push_alert(alert);
                }
            })
            .await;

        for alert in &raised {
            self.alerts.notify(alert).await;
        }
        raised
    }

    pub(crate) async fn run_monitoring_cycle(&self) {
        let symbols = self.cache.symbols();
        if symbols.is_empty() {
            return;
        }

        let results = join_all(symbols.iter().map(|symbol| async move {
            let result = self.profile_for(symbol, true).await;
            (symbol, result)
        }))
        .await;

        let mut refreshed = 0usize;
        for (symbol, result) in results {
            match result {
                Ok(profile) => {
                    refreshed += 1;
                    self.check_and_trigger_alerts(&profile).await;
                }
                Err(e) => warn!(symbol = %symbol, error = %e, "Monitor re-assessment failed"),
            }
        }

        debug!(symbols = symbols.len(), refreshed = refreshed, "Monitoring cycle complete");
    }

    fn build_report(&self) -> RiskReport {
        let profiles = self.cache.snapshot();
        let window = ChronoDuration::seconds(self.config.monitoring.alert_history_secs as i64);
        report::build_report(&profiles, window, Utc::now())
    }

    pub(crate) async fn publish_report(&self) {
        let report = self.build_report();
        info!(
            symbols = report.symbols.len(),
            high_risk = report.high_risk_count,
            critical = report.critical_count,
            average_score = report.average_score,
            portfolio_level = %report.portfolio_level,
            "Risk report generated"
        );
        *self.last_report.write().await = Some(report);
    }

    async fn fetch_returns(
        &self,
        symbols: Vec<String>,
        range: TimeRange,
    ) -> Result<HashMap<String, Vec<f64>>> {
        let timeout = self.config.assessment.fetch_timeout();
        let source = self.assessor.source();

        let fetches = symbols.into_iter().map(|symbol| async move {
            let fetch = source.fetch_return_series(&symbol, range);
            let result = match tokio::time::timeout(timeout, fetch).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    symbol: symbol.clone(),
                    timeout_secs: timeout.as_secs(),
                }),
            };
            (symbol, result)
        });

        let mut returns = HashMap::new();
        for (symbol, result) in join_all(fetches).await {
            let series = result.map_err(|e| {
                warn!(symbol = %symbol, error = %e, "Return series fetch failed");
                match e {
                    e @ (Error::Upstream { .. } | Error::Timeout { .. }) => e,
                    other => Error::upstream(&symbol, other),
                }
            })?;
            returns.insert(symbol, series);
        }
        Ok(returns)
    }
}

/// Risk management entry point.
///
/// Cancellation follows the usual async contract: dropping a returned future
/// abandons the work. Data-source calls are bounded by the configured fetch
/// timeout.
pub struct RiskManager {
    state: Arc<ManagerState>,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl RiskManager {
    pub fn new(source: Arc<dyn MarketDataSource>, config: RiskConfig) -> Self {
        let config = Arc::new(config.with_defaults());
        let state = ManagerState {
            assessor: RiskAssessor::new(source, config.clone()),
            controller: RiskController::new(config.clone()),
            cache: ProfileCache::new(config.assessment.update_interval()),
            alerts: AlertDispatcher::new(),
            last_report: RwLock::new(None),
            config,
        };

        info!(
            max_risk_score = state.config.assessment.max_risk_score,
            risk_threshold = state.config.assessment.risk_threshold,
            update_interval_secs = state.config.assessment.update_interval_secs,
            "Risk manager initialized"
        );

        Self {
            state: Arc::new(state),
            monitor: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.state.config
    }

    pub fn controller(&self) -> &RiskController {
        &self.state.controller
    }

    /// Cached profile if fresh, otherwise a new assessment.
    pub async fn assess_risk(&self, symbol: &str) -> Result<RiskProfile> {
        self.state.profile_for(symbol, false).await
    }

    /// Cached profile, without assessing.
    pub fn profile(&self, symbol: &str) -> Option<RiskProfile> {
        self.state.cache.get(symbol)
    }

    /// Assess (or reuse) the profile and decide on a requested position.
    pub async fn make_risk_decision(
        &self,
        symbol: &str,
        requested_position: f64,
    ) -> Result<RiskDecision> {
        let profile = self.assess_risk(symbol).await?;
        let decision = self.state.controller.make_decision(&profile, requested_position);
        self.state.check_and_trigger_alerts(&profile).await;
        Ok(decision)
    }

    /// Base decision followed by the portfolio- and market-level controls.
    pub async fn make_portfolio_decision(
        &self,
        symbol: &str,
        requested_position: f64,
        weights: &HashMap<String, f64>,
        range: TimeRange,
        market: &MarketConditions,
    ) -> Result<RiskDecision> {
        let profile = self.assess_risk(symbol).await?;
        let decision = self.state.controller.make_decision(&profile, requested_position);
        self.state.check_and_trigger_alerts(&profile).await;

        let portfolio = self.portfolio_risk_for(weights, range).await?;
        Ok(self
            .state
            .controller
            .apply_advanced_risk_controls(decision, &profile, &portfolio, market))
    }

    /// Append a position/PnL sample to a cached profile.
    pub async fn record_position(
        &self,
        symbol: &str,
        position: f64,
        pnl: f64,
    ) -> Option<RiskProfile> {
        let window = self.state.config.assessment.history_window;
        self.state
            .cache
            .update(symbol, |p| {
                let sample = RiskSample {
                    timestamp: Utc::now(),
                    risk_score: p.risk_score,
                    position,
                    pnl,
                };
                p.push_sample(sample, window);
            })
            .await
    }

    pub fn calculate_portfolio_risk(
        &self,
        weights: &HashMap<String, f64>,
        returns: &HashMap<String, Vec<f64>>,
    ) -> Result<PortfolioRisk> {
        self.state.controller.calculate_portfolio_risk(weights, returns)
    }

    /// Portfolio risk with return series fetched from the data source.
    pub async fn portfolio_risk_for(
        &self,
        weights: &HashMap<String, f64>,
        range: TimeRange,
    ) -> Result<PortfolioRisk> {
        let returns = self.state.fetch_returns(weights.keys().cloned().collect(), range).await?;
        self.calculate_portfolio_risk(weights, &returns)
    }

    pub fn optimize_portfolio(
        &self,
        target_return: f64,
        returns: &HashMap<String, Vec<f64>>,
        constraints: &PortfolioConstraints,
    ) -> Result<HashMap<String, f64>> {
        self.state.controller.optimize_portfolio(target_return, returns, constraints)
    }

    pub async fn calculate_position_size(
        &self,
        symbol: &str,
        total_capital: f64,
        available_capital: f64,
    ) -> Result<f64> {
        let profile = self.assess_risk(symbol).await?;
        Ok(self
            .state
            .controller
            .calculate_position_size(&profile, total_capital, available_capital))
    }

    pub fn apply_stop_loss(
        &self,
        current_price: f64,
        entry_price: f64,
        position_size: f64,
    ) -> StopLossOutcome {
        self.state
            .controller
            .apply_stop_loss(current_price, entry_price, position_size)
    }

    pub async fn subscribe_alerts(&self, subscriber: Arc<dyn RiskAlertSubscriber>) {
        self.state.alerts.subscribe(subscriber).await;
    }

    /// Broadcast receiver of every alert raised from now on.
    pub fn alert_stream(&self) -> broadcast::Receiver<RiskAlert> {
        self.state.alerts.stream()
    }

    pub fn get_risk_report(&self) -> RiskReport {
        self.state.build_report()
    }

    /// Report produced by the most recent monitor report tick.
    pub async fn last_report(&self) -> Option<RiskReport> {
        self.state.last_report.read().await.clone()
    }

    pub fn get_risk_statistics(&self) -> RiskStatistics {
        report::statistics(&self.state.cache.snapshot())
    }

    /// Start the background monitor. Returns `false` if real-time
    /// monitoring is disabled or a monitor is already running.
    pub async fn start_monitoring(&self) -> bool {
        if !self.state.config.monitoring.real_time_enabled {
            info!("Real-time monitoring disabled, not starting monitor");
            return false;
        }

        let mut monitor = self.monitor.lock().await;
        if monitor.as_ref().is_some_and(|m| !m.is_finished()) {
            debug!("Risk monitor already running");
            return false;
        }
        *monitor = Some(MonitorHandle::spawn(self.state.clone()));
        true
    }

    /// Stop the background monitor, waiting up to the configured shutdown
    /// timeout. No-op when it is not running.
    pub async fn stop_monitoring(&self) {
        let handle = self.monitor.lock().await.take();
        if let Some(handle) = handle {
            handle.stop(self.state.config.monitoring.shutdown_timeout()).await;
        }
    }

    pub async fn is_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .await
            .as_ref()
            .is_some_and(|m| !m.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use risk_core::types::{AlertType, MarketDataPoint, MarketState, RiskLevel};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio_test::{assert_err, assert_ok};

    /// In-memory source with a call counter and optional latency.
    struct StaticSource {
        history: HashMap<String, Vec<MarketDataPoint>>,
        calls: AtomicUsize,
        delay: std::time::Duration,
    }

    impl StaticSource {
        fn new() -> Self {
            Self {
                history: HashMap::new(),
                calls: AtomicUsize::new(0),
                delay: std::time::Duration::ZERO,
            }
        }

        fn with(mut self, symbol: &str, series: Vec<MarketDataPoint>) -> Self {
            self.history.insert(symbol.to_string(), series);
            self
        }

        fn with_delay(mut self, delay: std::time::Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MarketDataSource for StaticSource {
        async fn fetch_market_history(&self, symbol: &str) -> Result<Vec<MarketDataPoint>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.history
                .get(symbol)
                .cloned()
                .ok_or_else(|| Error::upstream(symbol, "unknown symbol"))
        }

        async fn fetch_return_series(&self, symbol: &str, range: TimeRange) -> Result<Vec<f64>> {
            let series = self.fetch_market_history(symbol).await?;
            let in_range: Vec<MarketDataPoint> = series
                .into_iter()
                .filter(|p| range.contains(p.timestamp))
                .collect();
            Ok(risk_core::types::simple_returns(&in_range))
        }
    }

    fn calm_series(days: i64) -> Vec<MarketDataPoint> {
        let start = Utc::now() - Duration::days(days);
        (0..days)
            .map(|i| {
                MarketDataPoint::new(start + Duration::days(i), 100.0 * 1.001_f64.powi(i as i32))
                    .with_volume(5e7)
                    .with_price_change(0.1)
                    .with_market_cap(5e10)
            })
            .collect()
    }

    fn wild_series(days: i64) -> Vec<MarketDataPoint> {
        let start = Utc::now() - Duration::days(days);
        (0..days)
            .map(|i| {
                let price = if i % 2 == 0 { 100.0 } else { 160.0 };
                let volume = if i % 3 == 0 { 1e3 } else { 1e4 };
                MarketDataPoint::new(start + Duration::days(i), price)
                    .with_volume(volume)
                    .with_price_change(60.0)
                    .with_market_cap(1e6)
            })
            .collect()
    }

    fn manager(source: StaticSource) -> (RiskManager, Arc<StaticSource>) {
        let source = Arc::new(source);
        (RiskManager::new(source.clone(), RiskConfig::default()), source)
    }

    struct Collector(StdMutex<Vec<RiskAlert>>);

    impl RiskAlertSubscriber for Collector {
        fn on_risk_alert(&self, alert: &RiskAlert) {
            self.0.lock().unwrap().push(alert.clone());
        }
    }

    #[tokio::test]
    async fn test_concurrent_assessments_fetch_once() {
        let (manager, source) = manager(
            StaticSource::new()
                .with("BTC", calm_series(40))
                .with_delay(std::time::Duration::from_millis(50)),
        );
        let manager = Arc::new(manager);

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.assess_risk("BTC").await })
            })
            .collect();
        for task in tasks {
            assert_ok!(task.await.unwrap());
        }
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_calm_symbol_can_trade() {
        let (manager, _) = manager(StaticSource::new().with("BTC", calm_series(40)));
        let decision = manager.make_risk_decision("BTC", 0.05).await.unwrap();
        assert!(decision.can_trade, "warnings: {:?}", decision.warnings);
        assert!(decision.max_position <= 0.05);
        assert!(decision.max_position > 0.0);
        assert_eq!(decision.risk_level, RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_wild_symbol_is_blocked_and_alerts() {
        let (manager, _) = manager(StaticSource::new().with("JUNK", wild_series(40)));
        let collector = Arc::new(Collector(StdMutex::new(Vec::new())));
        manager.subscribe_alerts(collector.clone()).await;
        let mut stream = manager.alert_stream();

        let decision = manager.make_risk_decision("JUNK", 1.0).await.unwrap();
        assert!(!decision.can_trade);
        assert_eq!(decision.max_position, 0.0);

        let alerts = collector.0.lock().unwrap().clone();
        assert!(alerts.iter().any(|a| a.alert_type == AlertType::Volatility));
        assert_eq!(stream.recv().await.unwrap().id, alerts[0].id);

        let profile = manager.profile("JUNK").unwrap();
        assert_eq!(profile.alerts.len(), alerts.len());

        // Same state again: nothing new.
        manager.make_risk_decision("JUNK", 1.0).await.unwrap();
        assert_eq!(collector.0.lock().unwrap().len(), alerts.len());
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let (manager, _) = manager(StaticSource::new());
        let err = assert_err!(manager.make_risk_decision("NOPE", 1.0).await);
        assert!(err.is_upstream());
        assert!(manager.profile("NOPE").is_none());
    }

    #[tokio::test]
    async fn test_record_position_feeds_drawdown_rule() {
        let (manager, _) = manager(StaticSource::new().with("BTC", calm_series(40)));
        assert!(manager.record_position("BTC", 1.0, 100.0).await.is_none());

        manager.assess_risk("BTC").await.unwrap();
        manager.record_position("BTC", 1.0, 100.0).await.unwrap();
        let profile = manager.record_position("BTC", 1.0, 50.0).await.unwrap();
        assert!((profile.historical_drawdown() - 0.5).abs() < 1e-12);

        let decision = manager.make_risk_decision("BTC", 0.05).await.unwrap();
        assert!(!decision.can_trade);
    }

    #[tokio::test]
    async fn test_portfolio_decision() {
        let (manager, _) = manager(
            StaticSource::new()
                .with("BTC", calm_series(40))
                .with("ETH", wild_series(40)),
        );
        let weights = HashMap::from([("BTC".to_string(), 0.6), ("ETH".to_string(), 0.4)]);
        let market = MarketConditions {
            state: MarketState::Bear,
            volatility: 0.0,
        };

        let base = manager.make_risk_decision("BTC", 0.05).await.unwrap();
        let decision = manager
            .make_portfolio_decision("BTC", 0.05, &weights, TimeRange::last_days(60), &market)
            .await
            .unwrap();
        assert!(decision.can_trade);
        assert!(decision.max_position <= base.max_position * 0.5 + 1e-12);

        let risk = manager.portfolio_risk_for(&weights, TimeRange::last_days(60)).await.unwrap();
        assert_eq!(risk.asset_weights.len(), 2);
        assert!((0.0..=1.0).contains(&risk.diversification));
    }

    #[tokio::test]
    async fn test_report_and_statistics() {
        let (manager, _) = manager(
            StaticSource::new()
                .with("BTC", calm_series(40))
                .with("JUNK", wild_series(40)),
        );
        manager.assess_risk("BTC").await.unwrap();
        manager.make_risk_decision("JUNK", 1.0).await.unwrap();

        let stats = manager.get_risk_statistics();
        assert_eq!(stats.total_symbols, 2);

        let report = manager.get_risk_report();
        assert_eq!(report.symbols.len(), 2);
        assert_eq!(report.symbols[0].symbol, "JUNK");
        assert!(!report.recent_alerts.is_empty());
        assert!(manager.last_report().await.is_none());
    }

    #[tokio::test]
    async fn test_monitor_start_and_stop() {
        let mut config = RiskConfig::default();
        config.monitoring.monitoring_interval_secs = 1;
        config.monitoring.report_interval_secs = 1;
        let source = Arc::new(StaticSource::new().with("BTC", calm_series(40)));
        let manager = RiskManager::new(source.clone(), config);

        manager.assess_risk("BTC").await.unwrap();
        assert!(manager.start_monitoring().await);
        assert!(!manager.start_monitoring().await);

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(manager.is_monitoring().await);
        // First ticks fire immediately: one forced re-assessment and a report.
        assert!(source.calls() >= 2);
        assert!(manager.last_report().await.is_some());

        manager.stop_monitoring().await;
        assert!(!manager.is_monitoring().await);
        // Idempotent
        manager.stop_monitoring().await;
    }

    #[tokio::test]
    async fn test_stop_monitoring_abandons_in_flight_cycle() {
        let mut config = RiskConfig::default();
        config.monitoring.shutdown_timeout_secs = 1;
        let source = Arc::new(
            StaticSource::new()
                .with("SLOW", calm_series(40))
                .with_delay(std::time::Duration::from_secs(5)),
        );
        let manager = RiskManager::new(source.clone(), config);

        let mut seeded = RiskProfile::new("SLOW", manager.config());
        seeded.risk_score = 12.0;
        manager
            .state
            .cache
            .get_or_refresh("SLOW", false, |_| async { Ok(seeded) })
            .await
            .unwrap();

        assert!(manager.start_monitoring().await);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        // First monitor tick is mid-fetch.
        assert_eq!(source.calls(), 1);

        let started = std::time::Instant::now();
        manager.stop_monitoring().await;
        assert!(started.elapsed() < manager.config().monitoring.shutdown_timeout());
        assert!(!manager.is_monitoring().await);
        assert_eq!(manager.profile("SLOW").map(|p| p.risk_score), Some(12.0));
    }

    #[tokio::test]
    async fn test_monitor_disabled() {
        let mut config = RiskConfig::default();
        config.monitoring.real_time_enabled = false;
        let manager = RiskManager::new(Arc::new(StaticSource::new()), config);
        assert!(!manager.start_monitoring().await);
        assert!(!manager.is_monitoring().await);
    }

    #[tokio::test]
    async fn test_stop_loss_passthrough() {
        let (manager, _) = manager(StaticSource::new());
        let outcome = manager.apply_stop_loss(90.0, 100.0, 10.0);
        assert!(outcome.triggered);
        assert_eq!(outcome.sell_amount, 10.0);
    }
}
