//! On-disk reference documents and failure artifacts

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::filter::ResponseFilter;
use crate::error::{Error, Result};

/// Stored expected output of one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDocument {
    /// Request URL with the backend host replaced by the placeholder
    pub query: String,
    /// Filtered response used for comparison
    pub response: Value,
    /// Raw response, host-normalized, from which `response` is re-derived
    pub full_response: Value,
}

impl ReferenceDocument {
    pub fn build(query: String, full_response: Value, filter: &dyn ResponseFilter) -> Self {
        Self {
            query,
            response: filter.filter(&full_response),
            full_response,
        }
    }

    pub fn to_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Identifies one `request_compare` call: suite, test, 1-based call ordinal
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceKey {
    pub suite: String,
    pub test: String,
    pub ordinal: u32,
}

impl ReferenceKey {
    pub fn new(suite: impl Into<String>, test: impl Into<String>, ordinal: u32) -> Self {
        Self {
            suite: suite.into(),
            test: test.into(),
            ordinal,
        }
    }

    /// File stem shared by the reference and its artifacts
    pub fn prefix(&self) -> String {
        format!("{}_{}", self.test, self.ordinal)
    }
}

/// Maps keys to reference files and failure artifact locations
#[derive(Debug, Clone)]
pub struct ReferenceStore {
    reference_dir: PathBuf,
    response_dir: PathBuf,
}

impl ReferenceStore {
    pub fn new(reference_dir: impl Into<PathBuf>, response_dir: impl Into<PathBuf>) -> Self {
        Self {
            reference_dir: reference_dir.into(),
            response_dir: response_dir.into(),
        }
    }

    pub fn response_dir(&self) -> &Path {
        &self.response_dir
    }

    /// `{reference_dir}/{suite}/{test}_{ordinal}.json`
    pub fn reference_path(&self, key: &ReferenceKey) -> PathBuf {
        self.reference_dir
            .join(&key.suite)
            .join(format!("{}.json", key.prefix()))
    }

    /// `{response_dir}/{suite}/{test}`
    pub fn artifact_dir(&self, key: &ReferenceKey) -> PathBuf {
        self.response_dir.join(&key.suite).join(&key.test)
    }

    /// Read a reference that must exist
    pub fn read(&self, key: &ReferenceKey) -> Result<ReferenceDocument> {
        read_document(&self.reference_path(key))
    }

    /// Write a new reference; never replaces an existing file
    pub fn create(&self, key: &ReferenceKey, document: &ReferenceDocument) -> Result<PathBuf> {
        let path = self.reference_path(key);
        if path.exists() {
            return Err(Error::ReferenceExists(path));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(Error::ReferenceExists(path)),
            Err(e) => return Err(e.into()),
        };
        file.write_all(document.to_pretty()?.as_bytes())?;
        info!("Created reference file: {}", path.display());
        Ok(path)
    }

    /// Write `{prefix}_resp.json` and `{prefix}_ref.json`, creating the directory on demand
    pub fn write_artifacts(
        &self,
        key: &ReferenceKey,
        response: &ReferenceDocument,
        reference: &ReferenceDocument,
    ) -> Result<(PathBuf, PathBuf)> {
        let dir = self.artifact_dir(key);
        std::fs::create_dir_all(&dir)?;
        let prefix = key.prefix();
        let response_path = dir.join(format!("{prefix}_resp.json"));
        let reference_path = dir.join(format!("{prefix}_ref.json"));
        std::fs::write(&response_path, response.to_pretty()?)?;
        std::fs::write(&reference_path, reference.to_pretty()?)?;
        debug!("Artifacts written to {}", dir.display());
        Ok((response_path, reference_path))
    }

    /// Remove every artifact of previous runs
    pub fn purge_artifacts(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.response_dir) {
            Ok(()) => {
                info!("Purged {}", self.response_dir.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn read_document(path: &Path) -> Result<ReferenceDocument> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::ReferenceMissing(path.to_path_buf())),
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&content)?)
}

/// Re-derive `response` from `full_response` with the current filter.
///
/// Returns whether the file changed.
pub fn regenerate(path: &Path, filter: &dyn ResponseFilter) -> Result<bool> {
    let mut document = read_document(path)?;
    let response = filter.filter(&document.full_response);
    if response == document.response {
        return Ok(false);
    }
    document.response = response;
    std::fs::write(path, document.to_pretty()?)?;
    info!("Regenerated {}", path.display());
    Ok(true)
}

/// Swaps the backend `host[:port]` for a stable placeholder
#[derive(Debug, Clone)]
pub struct HostNormalizer {
    host: String,
    placeholder: String,
}

impl HostNormalizer {
    pub fn new(host: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            placeholder: placeholder.into(),
        }
    }

    /// Rewrite `://{host}` wherever it is a whole URL host
    pub fn apply(&self, text: &str) -> String {
        if self.host.is_empty() {
            return text.to_string();
        }
        let needle = format!("://{}", self.host);
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(pos) = rest.find(&needle) {
            let end = pos + needle.len();
            out.push_str(&rest[..pos]);
            if ends_host(&rest[end..]) {
                out.push_str("://");
                out.push_str(&self.placeholder);
            } else {
                out.push_str(&needle);
            }
            rest = &rest[end..];
        }
        out.push_str(rest);
        out
    }
}

/// The host stops here unless more hostname characters follow
fn ends_host(tail: &str) -> bool {
    tail.chars()
        .next()
        .map_or(true, |c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
}
