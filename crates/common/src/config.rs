//! Harness configuration

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::Dataset;

/// Whether query responses create references or are checked against them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Compare,
    Create,
}

impl Default for RunMode {
    fn default() -> Self {
        Self::Compare
    }
}

/// Top-level configuration of one suite run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL of the job/instance registry
    pub ingestion_url: String,

    /// Base URL of the routing query API
    pub routing_url: String,

    /// Host directory holding `{dataset}/{category}/` input folders
    pub data_dir: PathBuf,

    /// Input directory inside the worker container
    pub container_input_path: String,

    /// Directory of compiled outputs inside the worker container
    pub container_output_path: String,

    /// Committed reference documents
    pub reference_dir: PathBuf,

    /// Failure artifacts, purged once per process
    pub response_dir: PathBuf,

    /// Name fragment of the ingestion worker container
    pub worker_container: String,

    /// Name fragment of the one-shot instance configurator container
    pub configurator_container: String,

    /// Replaces the routing host in stored queries and responses
    pub host_placeholder: String,

    /// Parameters pushed to every instance and verified afterwards
    pub instance_defaults: Map<String, Value>,

    pub mode: RunMode,

    /// Assume datasets are already loaded
    pub skip_loading: bool,

    pub compose: ComposeConfig,

    pub waits: WaitsConfig,

    pub datasets: Vec<Dataset>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            ingestion_url: "http://localhost:9898".to_string(),
            routing_url: "http://localhost:9191".to_string(),
            data_dir: PathBuf::from("data"),
            container_input_path: "/srv/ed/input".to_string(),
            container_output_path: "/srv/ed/output".to_string(),
            reference_dir: PathBuf::from("references"),
            response_dir: PathBuf::from("output"),
            worker_container: "tyr_worker".to_string(),
            configurator_container: "instances_configurator".to_string(),
            host_placeholder: "localhost".to_string(),
            instance_defaults: default_instance_parameters(),
            mode: RunMode::default(),
            skip_loading: false,
            compose: ComposeConfig::default(),
            waits: WaitsConfig::default(),
            datasets: Vec::new(),
        }
    }
}

/// Parameter values every coverage is expected to run with
pub fn default_instance_parameters() -> Map<String, Value> {
    let defaults = json!({
        "max_walking_duration_to_pt": 1800,
        "walking_speed": 1.12,
        "bike_speed": 4.1,
        "max_nb_transfers": 10,
        "min_tc_with_car": 300,
    });
    match defaults {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Compose project driving the container fleet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    /// Fragment present in every fleet container name
    pub project_name: String,

    /// Working directory of compose invocations
    pub directory: PathBuf,

    pub files: Vec<PathBuf>,

    /// Extra environment for compose (image tags, ...)
    pub env: BTreeMap<String, String>,

    /// Runtime binary (`docker` or `podman`); detected when unset
    pub runtime: Option<String>,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert("TAG".to_string(), "dev".to_string());
        Self {
            project_name: "routecheck".to_string(),
            directory: PathBuf::from("."),
            files: vec![PathBuf::from("docker-compose.yml")],
            env,
            runtime: None,
        }
    }
}

/// Bounds of the suite-level readiness waits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitsConfig {
    pub service_timeout_secs: u64,
    pub service_interval_ms: u64,
    pub registration_timeout_secs: u64,
    pub registration_interval_ms: u64,
    pub container_timeout_secs: u64,
    pub container_interval_ms: u64,
    /// Engine stop and container removal during teardown
    pub removal_timeout_secs: u64,
    pub removal_interval_ms: u64,
    /// Fail instead of passing when a waited-on container does not exist
    pub strict_containers: bool,
}

impl Default for WaitsConfig {
    fn default() -> Self {
        Self {
            service_timeout_secs: 3000,
            service_interval_ms: 2000,
            registration_timeout_secs: 60,
            registration_interval_ms: 500,
            container_timeout_secs: 3000,
            container_interval_ms: 2000,
            removal_timeout_secs: 60,
            removal_interval_ms: 1000,
            strict_containers: false,
        }
    }
}

impl WaitsConfig {
    pub fn service(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.service_timeout_secs),
            Duration::from_millis(self.service_interval_ms),
        )
    }

    pub fn registration(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.registration_timeout_secs),
            Duration::from_millis(self.registration_interval_ms),
        )
    }

    pub fn container(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.container_timeout_secs),
            Duration::from_millis(self.container_interval_ms),
        )
    }

    pub fn removal(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.removal_timeout_secs),
            Duration::from_millis(self.removal_interval_ms),
        )
    }
}

impl HarnessConfig {
    /// Load configuration from file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str::<Self>(&content)?
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay `ROUTECHECK_*` variables resolved through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ROUTECHECK_INGESTION_URL") {
            self.ingestion_url = v;
        }
        if let Some(v) = lookup("ROUTECHECK_ROUTING_URL") {
            self.routing_url = v;
        }
        if let Some(v) = lookup("ROUTECHECK_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROUTECHECK_REFERENCE_DIR") {
            self.reference_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROUTECHECK_RESPONSE_DIR") {
            self.response_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROUTECHECK_COMPOSE_DIR") {
            self.compose.directory = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (key, url) in [("ingestion_url", &self.ingestion_url), ("routing_url", &self.routing_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::InvalidConfig(format!("{key} must be an http(s) URL, got '{url}'")));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for ds in &self.datasets {
            if !seen.insert(ds.name.as_str()) {
                return Err(Error::InvalidConfig(format!("dataset '{}' declared twice", ds.name)));
            }
            if ds.poll_interval_ms == 0 {
                return Err(Error::InvalidConfig(format!("dataset '{}' has a zero poll interval", ds.name)));
            }
        }
        Ok(())
    }

    /// `host[:port]` of the routing API, as it appears inside responses
    pub fn routing_host(&self) -> &str {
        let url = self.routing_url.trim_end_matches('/');
        url.split_once("://").map(|(_, rest)| rest).unwrap_or(url)
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_toml() {
        let config: HarnessConfig = toml::from_str(
            r#"
routing_url = "http://jormun:80"
mode = "create"

[instance_defaults]
walking_speed = 1.5

[[datasets]]
name = "fr-idf"
reload_timeout_ms = 30000
"#,
        )
        .unwrap();
        assert_eq!(config.routing_url, "http://jormun:80");
        assert_eq!(config.mode, RunMode::Create);
        assert_eq!(config.instance_defaults.len(), 1);
        assert_eq!(config.datasets[0].reload_timeout_ms, 30_000);
        assert_eq!(config.worker_container, "tyr_worker");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HarnessConfig::default();
        config.apply_overrides(|key| match key {
            "ROUTECHECK_ROUTING_URL" => Some("http://example:8080/".to_string()),
            "ROUTECHECK_DATA_DIR" => Some("/tmp/data".to_string()),
            _ => None,
        });
        assert_eq!(config.routing_host(), "example:8080");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/data"));
        assert_eq!(config.ingestion_url, "http://localhost:9898");
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut config = HarnessConfig::default();
        config.datasets = vec![Dataset::new("a"), Dataset::new("a")];
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.mode, RunMode::Compare);
        assert_eq!(config.instance_defaults, default_instance_parameters());
    }
}
