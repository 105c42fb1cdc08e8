//! Core domain types for the risk engine.

pub mod alert;
pub mod decision;
pub mod market;
pub mod portfolio;
pub mod profile;
pub mod report;

pub use alert::*;
pub use decision::*;
pub use market::*;
pub use portfolio::*;
pub use profile::*;
pub use report::*;
