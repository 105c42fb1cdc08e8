//! Risk Assessor
//!
//! Computes risk factors, composite scores, and advanced metrics (VaR, CVaR,
//! Sharpe, Sortino, drawdown, stress tests) from market history.

pub mod assessor;
pub mod factors;
pub mod metrics;

pub use assessor::RiskAssessor;
pub use factors::{composite_score, FactorDefaults};
pub use metrics::MIN_ADVANCED_OBSERVATIONS;
