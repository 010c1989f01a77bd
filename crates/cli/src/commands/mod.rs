//! CLI Commands

pub mod dataset;
pub mod environment;
pub mod reference;
