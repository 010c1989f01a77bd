//! Core types for Routecheck

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Routing-engine scenario a dataset is exercised with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    NewDefault,
    Distributed,
    Experimental,
    Asgard,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::NewDefault
    }
}

impl Scenario {
    /// Value sent as `_override_scenario` on journey queries.
    ///
    /// Every scenario built on the distributed planner is forced to
    /// `distributed`; everything else runs `new_default`.
    pub fn override_value(&self) -> &'static str {
        match self {
            Scenario::Distributed | Scenario::Experimental | Scenario::Asgard => "distributed",
            Scenario::NewDefault => "new_default",
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scenario::NewDefault => write!(f, "new_default"),
            Scenario::Distributed => write!(f, "distributed"),
            Scenario::Experimental => write!(f, "experimental"),
            Scenario::Asgard => write!(f, "asgard"),
        }
    }
}

/// A named test data region with its own ingestion and reload behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,

    /// Upper bound for each ingestion and reload wait
    #[serde(default = "default_reload_timeout_ms")]
    pub reload_timeout_ms: u64,

    /// Fixed interval between two polls of the same wait
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub scenario: Scenario,
}

fn default_reload_timeout_ms() -> u64 {
    180_000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reload_timeout_ms: default_reload_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            scenario: Scenario::default(),
        }
    }

    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.scenario = scenario;
        self
    }

    pub fn with_timing(mut self, reload_timeout: Duration, poll_interval: Duration) -> Self {
        self.reload_timeout_ms = millis(reload_timeout);
        self.poll_interval_ms = millis(poll_interval);
        self
    }

    pub fn reload_timeout(&self) -> Duration {
        Duration::from_millis(self.reload_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Whole milliseconds, rounding a sub-millisecond remainder up
fn millis(duration: Duration) -> u64 {
    let ms = duration.as_millis() + u128::from(duration.subsec_nanos() % 1_000_000 != 0);
    u64::try_from(ms).unwrap_or(u64::MAX)
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// State of one data set inside an ingestion job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Done => write!(f, "done"),
            JobState::Failed => write!(f, "failed"),
            JobState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Layout of `created_at` in the job registry
pub const JOB_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Job entry as returned by `GET /v0/jobs/{name}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub created_at: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub data_sets: Vec<JobDataSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDataSet {
    #[serde(rename = "type")]
    pub data_type: String,
    pub state: JobState,
}

/// `GET /v0/jobs/{name}` envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsResponse {
    #[serde(default)]
    pub jobs: Vec<Job>,
}

/// Transient view of one ingested data set, re-derived on every poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadJob {
    pub dataset_type: String,
    pub created_at: NaiveDateTime,
    pub state: JobState,
}

impl JobsResponse {
    /// Flatten jobs into one `LoadJob` per data set, preserving registry order.
    ///
    /// Jobs whose timestamp does not parse are skipped.
    pub fn load_jobs(&self) -> Vec<LoadJob> {
        let mut out = Vec::new();
        for job in &self.jobs {
            let Ok(created_at) = NaiveDateTime::parse_from_str(&job.created_at, JOB_TIMESTAMP_FORMAT)
            else {
                tracing::debug!("Skipping job with unparsable created_at {}", job.created_at);
                continue;
            };
            for ds in &job.data_sets {
                out.push(LoadJob {
                    dataset_type: ds.data_type.clone(),
                    created_at,
                    state: ds.state,
                });
            }
        }
        out
    }
}

/// Instance entry of `GET /v0/instances/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
}

/// Inner part of `GET /coverage/{name}/status`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub last_load_at: Option<String>,
}

/// `GET /coverage/{name}/status` envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageStatusResponse {
    #[serde(default)]
    pub status: CoverageStatus,
}

/// Container status as reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerStatus {
    Created,
    Running,
    Exited,
    RemovedUnknown,
}

impl ContainerStatus {
    /// Map a runtime state string (`docker ps` `State` column).
    pub fn parse(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "exited" => Self::Exited,
            _ => Self::RemovedUnknown,
        }
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerStatus::Created => write!(f, "created"),
            ContainerStatus::Running => write!(f, "running"),
            ContainerStatus::Exited => write!(f, "exited"),
            ContainerStatus::RemovedUnknown => write!(f, "removed-unknown"),
        }
    }
}

/// Ephemeral view of one container; never cached across polls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
    pub status: ContainerStatus,
}
