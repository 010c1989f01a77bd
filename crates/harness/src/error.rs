//! The harness shares the common error taxonomy

pub use routecheck_common::error::{Error, Result};
