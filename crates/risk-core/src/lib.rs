//! Risk Core Library
//!
//! Shared types, configuration, statistics, and collaborator traits for the
//! risk assessment and control crates.

pub mod config;
pub mod error;
pub mod source;
pub mod stats;
pub mod types;

pub use config::RiskConfig;
pub use error::{Error, Result};
pub use source::{MarketDataSource, TimeRange};
