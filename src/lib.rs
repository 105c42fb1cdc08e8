//! Risk Engine: per-symbol risk assessment, trade controls, and monitoring.
//!
//! This is the root crate that provides benchmark and integration-test
//! access to the internal crates. For actual functionality, use the
//! individual crates directly:
//!
//! - `risk-core`: Shared types, configuration, statistics, data-source trait
//! - `risk-assessor`: Risk factors, composite score, VaR/CVaR, stress tests
//! - `risk-manager`: Decision rules, portfolio controls, cache, alerts, monitor

pub use risk_assessor as assessor;
pub use risk_core as core;
pub use risk_manager as manager;
