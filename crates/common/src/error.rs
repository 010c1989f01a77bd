//! Error types for Routecheck

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using Routecheck Error
pub type Result<T> = std::result::Result<T, Error>;

/// Routecheck error types
///
/// `NotReady` is the only retryable condition. Everything else is fatal
/// and propagates out of a wait on the first occurrence.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Timed out after {elapsed:?} waiting for {wait}: {last}")]
    Timeout {
        wait: String,
        elapsed: Duration,
        last: Box<Error>,
    },

    #[error("Environment unavailable: {0}")]
    EnvironmentUnavailable(String),

    #[error("Command `{command}` failed in container {container} (exit code {code:?}): {output}")]
    ExecFailed {
        container: String,
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("Container not found: {0}")]
    ContainerMissing(String),

    #[error("Dataset '{data_type}' of {dataset} in state '{state}'")]
    JobFailed {
        dataset: String,
        data_type: String,
        state: String,
    },

    #[error("Coverage {dataset} not running (status: {status})")]
    CoverageNotRunning { dataset: String, status: String },

    #[error("Diff(s) in parameters of {dataset}: {diffs}")]
    ConfigMismatch { dataset: String, diffs: String },

    #[error("Reference file not found: {}", .0.display())]
    ReferenceMissing(PathBuf),

    #[error("Reference file already present: {}", .0.display())]
    ReferenceExists(PathBuf),

    #[error("Response of {test} differs from reference ({count} mismatch(es)) for {query}")]
    Mismatch {
        test: String,
        query: String,
        count: usize,
    },

    #[error("Unexpected HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl Error {
    /// Build a retryable condition.
    pub fn not_ready(reason: impl Into<String>) -> Self {
        Error::NotReady(reason.into())
    }

    /// Default retry predicate: only `NotReady` drives another poll.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::NotReady(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_not_ready_is_retryable() {
        assert!(Error::not_ready("pending").is_retryable());
        assert!(!Error::EnvironmentUnavailable("docker".into()).is_retryable());
        assert!(!Error::JobFailed {
            dataset: "fr-idf".into(),
            data_type: "fusio".into(),
            state: "failed".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_timeout_message_names_wait_and_cause() {
        let err = Error::Timeout {
            wait: "reload of fr-idf".into(),
            elapsed: Duration::from_secs(3),
            last: Box::new(Error::not_ready("last_load_at unchanged")),
        };
        let msg = err.to_string();
        assert!(msg.contains("reload of fr-idf"));
        assert!(msg.contains("last_load_at unchanged"));
        assert!(err.is_timeout());
    }
}
