//! Reference snapshots: create them once, compare every later run against them
//!
//! In create mode a response becomes a new reference file. In compare mode the
//! current filter is applied to both the live response and the stored
//! `full_response`, every structural mismatch is collected, and failures leave
//! both filtered documents plus a unified diff behind.

pub mod diff;
pub mod filter;
pub mod report;
pub mod store;

pub use filter::{DefaultFilter, JourneyFilter, Mismatch, ResponseFilter};
pub use report::{ComparisonReport, ReportEntry};
pub use store::{regenerate, HostNormalizer, ReferenceDocument, ReferenceKey, ReferenceStore};

use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::{Error, Result};
use routecheck_common::{HarnessConfig, RunMode};

/// Evidence left by a failed comparison
#[derive(Debug, Clone)]
pub struct Failure {
    pub mismatches: Vec<Mismatch>,
    pub diff: String,
    pub response_artifact: PathBuf,
    pub reference_artifact: PathBuf,
}

#[derive(Debug, Clone)]
pub enum ComparisonResult {
    /// A new reference file was written
    Created(PathBuf),
    Passed,
    Failed(Failure),
}

impl ComparisonResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

pub struct SnapshotComparator {
    store: ReferenceStore,
    mode: RunMode,
    normalizer: HostNormalizer,
    report: ComparisonReport,
}

impl SnapshotComparator {
    pub fn new(store: ReferenceStore, mode: RunMode, normalizer: HostNormalizer) -> Self {
        Self {
            store,
            mode,
            normalizer,
            report: ComparisonReport::default(),
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            ReferenceStore::new(&config.reference_dir, &config.response_dir),
            config.mode,
            HostNormalizer::new(config.routing_host(), &config.host_placeholder),
        )
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn store(&self) -> &ReferenceStore {
        &self.store
    }

    pub fn report(&self) -> &ComparisonReport {
        &self.report
    }

    /// Create or check the reference of `key` against one live response body.
    pub fn compare(
        &mut self,
        key: &ReferenceKey,
        query: &str,
        live_body: &str,
        filter: &dyn ResponseFilter,
    ) -> Result<ComparisonResult> {
        let query = self.normalizer.apply(query);
        let raw: Value = serde_json::from_str(&self.normalizer.apply(live_body))?;

        match self.mode {
            RunMode::Create => {
                let document = ReferenceDocument::build(query, raw, filter);
                let path = self.store.create(key, &document)?;
                Ok(ComparisonResult::Created(path))
            }
            RunMode::Compare => self.check(key, query, raw, filter),
        }
    }

    fn check(
        &mut self,
        key: &ReferenceKey,
        query: String,
        raw: Value,
        filter: &dyn ResponseFilter,
    ) -> Result<ComparisonResult> {
        let reference = self.store.read(key)?;
        let expected = filter.filter(&reference.full_response);
        let actual = filter.filter(&raw);

        let mismatches = filter.compare(&actual, &expected);
        if mismatches.is_empty() {
            debug!("{} matches {}", key.prefix(), self.store.reference_path(key).display());
            return Ok(ComparisonResult::Passed);
        }

        let diff = diff::unified_diff(
            &serde_json::to_string_pretty(&expected)?,
            &serde_json::to_string_pretty(&actual)?,
        );
        let response_doc = ReferenceDocument {
            query: query.clone(),
            response: actual,
            full_response: raw,
        };
        let reference_doc = ReferenceDocument {
            response: expected,
            ..reference
        };
        let (response_artifact, reference_artifact) =
            self.store.write_artifacts(key, &response_doc, &reference_doc)?;

        info!(
            "{}: {} mismatch(es), artifacts in {}",
            key.prefix(),
            mismatches.len(),
            self.store.artifact_dir(key).display()
        );
        self.report.add(ReportEntry {
            test: key.prefix(),
            query,
            mismatches: mismatches.iter().map(ToString::to_string).collect(),
            diff: diff.clone(),
        });

        Ok(ComparisonResult::Failed(Failure {
            mismatches,
            diff,
            response_artifact,
            reference_artifact,
        }))
    }

    /// `compare`, with a mismatch turned into an error once its evidence is on disk
    pub fn assert_matches(
        &mut self,
        key: &ReferenceKey,
        query: &str,
        live_body: &str,
        filter: &dyn ResponseFilter,
    ) -> Result<ComparisonResult> {
        match self.compare(key, query, live_body, filter)? {
            ComparisonResult::Failed(failure) => {
                eprintln!("{}", diff::render_failure(&key.prefix(), &failure.diff));
                Err(Error::Mismatch {
                    test: key.prefix(),
                    query: self.normalizer.apply(query),
                    count: failure.mismatches.len(),
                })
            }
            other => Ok(other),
        }
    }

    /// Write `report.json` when at least one comparison failed
    pub fn write_report(&self) -> Result<Option<PathBuf>> {
        if self.report.is_empty() {
            return Ok(None);
        }
        self.report.write(self.store.response_dir()).map(Some)
    }
}
