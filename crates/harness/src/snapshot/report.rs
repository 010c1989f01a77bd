//! Accumulated comparison failures of one run

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub test: String,
    pub query: String,
    pub mismatches: Vec<String>,
    pub diff: String,
}

/// Failures keyed by test name and query URL
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub entries: Vec<ReportEntry>,
}

impl ComparisonReport {
    pub fn add(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Write `report.json` into `dir`
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("report.json");
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        info!("Report written to: {}", path.display());
        Ok(path)
    }
}
