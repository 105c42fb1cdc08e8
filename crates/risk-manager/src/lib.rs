//! Risk Manager
//!
//! Rule-based trade decisions, portfolio controls, a single-flight profile
//! cache, threshold alerts, and the background monitor.

pub mod alerts;
pub mod cache;
pub mod controller;
mod monitor;
pub mod portfolio;
pub mod report;
pub mod service;

pub use alerts::{AlertDispatcher, RiskAlertSubscriber};
pub use cache::ProfileCache;
pub use controller::{RiskController, StopLossOutcome, DECISION_RULES};
pub use portfolio::diversification_score;
pub use service::RiskManager;
