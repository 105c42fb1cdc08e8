//! Background monitor: periodic re-assessment and report generation.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::service::ManagerState;

/// Handle to a running monitor task.
pub(crate) struct MonitorHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub(crate) fn spawn(state: Arc<ManagerState>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(state, shutdown_rx));
        Self { shutdown_tx, task }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal shutdown and wait up to `timeout`; abort the task after that.
    pub(crate) async fn stop(self, timeout: Duration) {
        let MonitorHandle { shutdown_tx, mut task } = self;
        let _ = shutdown_tx.send(true);

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => info!("Risk monitor stopped"),
            Ok(Err(e)) => warn!(error = %e, "Risk monitor task failed"),
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "Risk monitor did not stop in time, aborting"
                );
                task.abort();
            }
        }
    }
}

async fn run(state: Arc<ManagerState>, mut shutdown: watch::Receiver<bool>) {
    let monitoring = &state.config().monitoring;
    let mut monitor_tick = interval(monitoring.monitoring_interval());
    let mut report_tick = interval(monitoring.report_interval());
    monitor_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    report_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        monitoring_interval_secs = monitoring.monitoring_interval_secs,
        report_interval_secs = monitoring.report_interval_secs,
        "Risk monitor started"
    );

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => break,

            _ = monitor_tick.tick() => {
                // A cycle in progress is abandoned on shutdown.
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = state.run_monitoring_cycle() => {}
                }
            }

            _ = report_tick.tick() => {
                state.publish_report().await;
            }
        }
    }
}
