//! Per-dataset load orchestration
//!
//! Runs once per dataset per suite:
//!
//! ```text
//! ensure-instance-registered -> verify-configuration -> clear-stale-output
//!   -> stage-and-push-input -> await-ingestion (per data set type)
//!   -> await-reload -> mark loaded
//! ```
//!
//! Teardown goes the other way, per engine:
//!
//! ```text
//! stop -> wait stopped -> remove -> wait absent -> forget loaded
//! ```

use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::fleet::ContainerFleet;
use crate::readiness::{
    wait_container_absent, wait_container_stopped, wait_instance_registered, wait_job_state,
    wait_reload_timestamp_changed, MissingContainerPolicy,
};
use crate::retry::RetryPolicy;
use crate::staging::stage_dataset;
use routecheck_common::{Dataset, HarnessConfig};

/// Inputs of the load sequence, independent of the dataset
#[derive(Debug, Clone)]
pub struct LoaderSettings {
    pub data_dir: PathBuf,
    pub container_input_path: String,
    pub container_output_path: String,
    pub worker_container: String,
    pub instance_defaults: Map<String, Value>,
    pub registration: RetryPolicy,
    pub removal: RetryPolicy,
    pub missing_containers: MissingContainerPolicy,
    pub skip_loading: bool,
}

impl LoaderSettings {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            container_input_path: config.container_input_path.trim_end_matches('/').to_string(),
            container_output_path: config.container_output_path.trim_end_matches('/').to_string(),
            worker_container: config.worker_container.clone(),
            instance_defaults: config.instance_defaults.clone(),
            registration: RetryPolicy::from_pair(config.waits.registration()),
            removal: RetryPolicy::from_pair(config.waits.removal()),
            missing_containers: MissingContainerPolicy::strict(config.waits.strict_containers),
            skip_loading: config.skip_loading,
        }
    }
}

/// What `load` did for one dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Data pushed and picked up; lists the data set types ingested
    Loaded { dataset_types: Vec<String> },
    AlreadyLoaded,
    Skipped,
}

/// Drives datasets into the backend and remembers which ones are done.
///
/// The loaded set lives as long as the loader, i.e. one suite run.
pub struct DatasetLoader {
    backend: Arc<dyn Backend>,
    fleet: Arc<dyn ContainerFleet>,
    settings: LoaderSettings,
    loaded: HashSet<String>,
}

impl DatasetLoader {
    pub fn new(backend: Arc<dyn Backend>, fleet: Arc<dyn ContainerFleet>, settings: LoaderSettings) -> Self {
        Self {
            backend,
            fleet,
            settings,
            loaded: HashSet::new(),
        }
    }

    pub fn is_loaded(&self, dataset: &str) -> bool {
        self.loaded.contains(dataset)
    }

    /// Load every dataset in order, stopping at the first failure
    pub async fn ensure_loaded(&mut self, datasets: &[Dataset]) -> Result<()> {
        for dataset in datasets {
            self.load(dataset).await?;
        }
        Ok(())
    }

    /// Run the full sequence for `dataset` unless it already ran
    pub async fn load(&mut self, dataset: &Dataset) -> Result<LoadOutcome> {
        if self.settings.skip_loading {
            info!("Skipping data loading for {}", dataset);
            return Ok(LoadOutcome::Skipped);
        }
        if self.loaded.contains(&dataset.name) {
            info!("Dataset {} has already been loaded, skipping", dataset);
            return Ok(LoadOutcome::AlreadyLoaded);
        }

        self.ensure_instance_registered(dataset).await?;
        self.verify_configuration(dataset).await?;
        self.clear_stale_output(dataset).await;

        let baseline = self.backend.coverage_status(&dataset.name).await?.last_load_at;
        let since = Utc::now().naive_utc();

        let dataset_types = self.stage_and_push_input(dataset).await?;
        if dataset_types.is_empty() {
            warn!("Nothing staged for {}, the engine will not reload", dataset);
        } else {
            self.await_ingestion(dataset, &dataset_types, since).await?;
            self.await_reload(dataset, baseline.as_deref()).await?;
        }

        self.loaded.insert(dataset.name.clone());
        info!("Dataset {} loaded", dataset);
        Ok(LoadOutcome::Loaded { dataset_types })
    }

    /// Wait for the registry to know the instance, then push default parameters
    async fn ensure_instance_registered(&self, dataset: &Dataset) -> Result<()> {
        wait_instance_registered(self.backend.as_ref(), &dataset.name, &self.settings.registration).await?;
        self.backend
            .update_instance(&dataset.name, &self.settings.instance_defaults)
            .await?;
        debug!("Default parameters pushed to {}", dataset);
        Ok(())
    }

    /// Read back status and parameters; any discrepancy is fatal
    async fn verify_configuration(&self, dataset: &Dataset) -> Result<()> {
        let status = self.backend.coverage_status(&dataset.name).await?;
        if status.status != "running" {
            return Err(Error::CoverageNotRunning {
                dataset: dataset.name.clone(),
                status: status.status,
            });
        }

        let mut diffs = BTreeMap::new();
        for (key, expected) in &self.settings.instance_defaults {
            match status.parameters.get(key) {
                None => {
                    diffs.insert(key.clone(), "Missing in registry".to_string());
                }
                Some(actual) if !same_value(actual, expected) => {
                    diffs.insert(key.clone(), format!("{expected} != {actual}"));
                }
                Some(_) => {}
            }
        }
        if !diffs.is_empty() {
            return Err(Error::ConfigMismatch {
                dataset: dataset.name.clone(),
                diffs: serde_json::to_string(&diffs)?,
            });
        }
        Ok(())
    }

    /// Best effort: a stale compiled output would be reloaded as-is
    async fn clear_stale_output(&self, dataset: &Dataset) {
        let path = format!("{}/{}.nav.lz4", self.settings.container_output_path, dataset.name);
        let worker = match self.fleet.find(&self.settings.worker_container).await {
            Ok(Some(worker)) => worker,
            Ok(None) => {
                error!("No container found for {}", self.settings.worker_container);
                return;
            }
            Err(e) => {
                error!("Cannot list containers to clear {}: {}", path, e);
                return;
            }
        };
        info!("Removing {} from {}", path, worker.name);
        if let Err(e) = self.fleet.exec(&worker.name, &format!("rm -f {path}")).await {
            warn!("Could not remove {}: {}", path, e);
        }
    }

    /// Push every category folder present locally; returns staged data set types
    async fn stage_and_push_input(&self, dataset: &Dataset) -> Result<Vec<String>> {
        info!("Updating data for {}", dataset);
        let archives = stage_dataset(&self.settings.data_dir, &dataset.name)?;
        if archives.is_empty() {
            warn!("No input data found for {} under {}", dataset, self.settings.data_dir.display());
            return Ok(Vec::new());
        }

        let worker = self
            .fleet
            .find(&self.settings.worker_container)
            .await?
            .ok_or_else(|| Error::ContainerMissing(self.settings.worker_container.clone()))?;

        let input_path = format!("{}/{}", self.settings.container_input_path, dataset.name);
        self.fleet.exec(&worker.name, &format!("mkdir -p {input_path}")).await?;

        let mut dataset_types = Vec::new();
        for archive in archives {
            info!("Pushing {} ({} bytes) to {}:{}", archive.tar_name, archive.bytes.len(), worker.name, input_path);
            self.fleet.push_archive(&worker.name, &input_path, archive.bytes).await?;
            dataset_types.push(archive.category.dataset_type.to_string());
        }
        Ok(dataset_types)
    }

    async fn await_ingestion(&self, dataset: &Dataset, dataset_types: &[String], since: chrono::NaiveDateTime) -> Result<()> {
        let policy = RetryPolicy::new(dataset.reload_timeout(), dataset.poll_interval());
        for data_type in dataset_types {
            wait_job_state(self.backend.as_ref(), &dataset.name, data_type, since, &policy).await?;
        }
        Ok(())
    }

    async fn await_reload(&self, dataset: &Dataset, baseline: Option<&str>) -> Result<()> {
        let policy = RetryPolicy::new(dataset.reload_timeout(), dataset.poll_interval());
        wait_reload_timestamp_changed(self.backend.as_ref(), &dataset.name, baseline, &policy).await
    }

    /// Restart the engine container of each dataset
    pub async fn restart_engines(&self, datasets: &[Dataset]) -> Result<()> {
        for dataset in datasets {
            debug!("Restarting the engine of {}", dataset);
            match self.fleet.find(&dataset.name).await? {
                Some(container) => self.fleet.restart(&container.name).await?,
                None => error!("No container found for engine {}", dataset),
            }
        }
        Ok(())
    }

    /// Stop then remove the engine container of each dataset.
    ///
    /// A removed engine loses its data, so the dataset is no longer
    /// considered loaded. Returns the names of the removed containers.
    pub async fn remove_engines(&mut self, datasets: &[Dataset]) -> Result<Vec<String>> {
        let policy = self.settings.removal;
        let mut removed = Vec::new();
        for dataset in datasets {
            let container = match self.fleet.find(&dataset.name).await? {
                Some(container) => container,
                None => {
                    warn!("No container found for engine {}", dataset);
                    self.loaded.remove(&dataset.name);
                    continue;
                }
            };

            info!("Stopping {}", container.name);
            self.fleet.stop(&container.name).await?;
            wait_container_stopped(self.fleet.as_ref(), &container.name, self.settings.missing_containers, &policy)
                .await?;

            info!("Removing {}", container.name);
            self.fleet.remove(&container.name).await?;
            wait_container_absent(self.fleet.as_ref(), &container.name, &policy).await?;

            self.loaded.remove(&dataset.name);
            removed.push(container.name);
        }
        Ok(removed)
    }
}

/// Numbers compare by value so `10` matches `10.0`
fn same_value(actual: &Value, expected: &Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => actual == expected,
    }
}
