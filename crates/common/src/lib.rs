//! Routecheck Common Library
//!
//! Shared data model, error taxonomy and configuration for the regression harness.

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{HarnessConfig, RunMode};
pub use error::{Error, Result};
pub use types::*;

/// Routecheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
