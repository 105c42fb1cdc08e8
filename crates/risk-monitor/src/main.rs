//! Risk Monitor
//!
//! Prints a risk decision per symbol, then keeps re-assessing in the
//! background until interrupted.

mod source;

use anyhow::Result;
use clap::Parser;
use risk_core::types::RiskAlert;
use risk_core::RiskConfig;
use risk_manager::{RiskAlertSubscriber, RiskManager};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::source::JsonFileSource;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser)]
#[command(name = "risk-monitor")]
#[command(about = "Risk decisions and monitoring over file-backed market data")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON). Overridden by RISK__* variables.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding one <SYMBOL>.json history file per symbol
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Symbols to assess, comma separated
    #[arg(short, long, value_delimiter = ',', required = true)]
    symbols: Vec<String>,

    /// Requested position size for each decision
    #[arg(short, long, default_value_t = 0.1)]
    requested_position: f64,

    /// Print decisions and exit without monitoring
    #[arg(long)]
    once: bool,
}

struct LogAlerts;

impl RiskAlertSubscriber for LogAlerts {
    fn on_risk_alert(&self, alert: &RiskAlert) {
        warn!(
            symbol = %alert.symbol,
            severity = ?alert.severity,
            alert_type = ?alert.alert_type,
            "{}",
            alert.message
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "risk_monitor=info,risk_manager=info,risk_assessor=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(symbols = ?cli.symbols, data_dir = %cli.data_dir.display(), "Starting Risk Monitor");

    let config = RiskConfig::load(cli.config.as_deref())?;
    let source = Arc::new(JsonFileSource::new(&cli.data_dir));
    let manager = RiskManager::new(source, config);
    manager.subscribe_alerts(Arc::new(LogAlerts)).await;

    for symbol in &cli.symbols {
        match manager.make_risk_decision(symbol, cli.requested_position).await {
            Ok(decision) => println!("{}", serde_json::to_string(&decision)?),
            Err(e) => error!(symbol = %symbol, error = %e, "Risk decision failed"),
        }
    }

    if cli.once || !manager.start_monitoring().await {
        return Ok(());
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    manager.stop_monitoring().await;

    if let Some(report) = manager.last_report().await {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
