//! Named readiness waits, each a small predicate run under a `RetryPolicy`

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::fleet::ContainerFleet;
use crate::retry::RetryPolicy;
use routecheck_common::{ContainerStatus, JobState};

/// What a container wait does when no container matches the name.
///
/// `Satisfied` keeps the historical behavior: a container that cannot be
/// observed is treated as having reached the state, with a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingContainerPolicy {
    #[default]
    Satisfied,
    Fatal,
}

impl MissingContainerPolicy {
    pub fn strict(strict: bool) -> Self {
        if strict {
            Self::Fatal
        } else {
            Self::Satisfied
        }
    }

    fn on_missing(self, name: &str) -> Result<()> {
        match self {
            Self::Satisfied => {
                warn!("No container found for '{}', considering it done", name);
                Ok(())
            }
            Self::Fatal => Err(Error::ContainerMissing(name.to_string())),
        }
    }
}

/// Succeeds once a GET on `url` answers 200.
pub async fn wait_service_reachable(backend: &dyn Backend, url: &str, policy: &RetryPolicy) -> Result<()> {
    policy
        .execute(&format!("service {url}"), || async {
            match backend.probe(url).await {
                Ok(200) => Ok(()),
                Ok(status) => Err(Error::not_ready(format!("{url} answered {status}"))),
                Err(e) => Err(Error::not_ready(format!("{url} unreachable: {e}"))),
            }
        })
        .await?;
    info!("{} responding", url);
    Ok(())
}

/// Last step of environment bring-up: the registry answers its cities status.
pub async fn wait_cities_ready(backend: &dyn Backend, ingestion_url: &str, policy: &RetryPolicy) -> Result<()> {
    let url = format!("{}/v0/cities/status", ingestion_url.trim_end_matches('/'));
    wait_service_reachable(backend, &url, policy).await
}

/// Succeeds once the container matching `name` reports `expected`.
pub async fn wait_container_status(
    fleet: &dyn ContainerFleet,
    name: &str,
    expected: ContainerStatus,
    missing: MissingContainerPolicy,
    policy: &RetryPolicy,
) -> Result<()> {
    policy
        .execute(&format!("container {name} to be {expected}"), || async {
            match fleet.find(name).await? {
                Some(c) if c.status == expected => Ok(()),
                Some(c) => Err(Error::not_ready(format!(
                    "{} status: {} - expected: {}",
                    c.name, c.status, expected
                ))),
                None => missing.on_missing(name),
            }
        })
        .await
}

/// Succeeds once the container matching `name` is no longer running.
pub async fn wait_container_stopped(
    fleet: &dyn ContainerFleet,
    name: &str,
    missing: MissingContainerPolicy,
    policy: &RetryPolicy,
) -> Result<()> {
    policy
        .execute(&format!("container {name} to stop"), || async {
            match fleet.find(name).await? {
                Some(c) if c.status == ContainerStatus::Running => {
                    Err(Error::not_ready(format!("{} still running", c.name)))
                }
                Some(c) => {
                    info!("Container {}: status {}", c.name, c.status);
                    Ok(())
                }
                None => missing.on_missing(name),
            }
        })
        .await
}

/// Succeeds once no container name contains `name`.
pub async fn wait_container_absent(fleet: &dyn ContainerFleet, name: &str, policy: &RetryPolicy) -> Result<()> {
    policy
        .execute(&format!("container {name} removal"), || async {
            match fleet.find(name).await? {
                Some(c) => Err(Error::not_ready(format!("{} not yet removed", c.name))),
                None => Ok(()),
            }
        })
        .await
}

/// Succeeds once the fleet has no container left.
pub async fn wait_fleet_empty(fleet: &dyn ContainerFleet, policy: &RetryPolicy) -> Result<()> {
    policy
        .execute("fleet shutdown", || async {
            let remaining = fleet.list().await?;
            if remaining.is_empty() {
                Ok(())
            } else {
                Err(Error::not_ready(format!("{} container(s) still present", remaining.len())))
            }
        })
        .await
}

/// The configurator container runs once then exits; wait for both.
pub async fn wait_instance_configuration(
    fleet: &dyn ContainerFleet,
    configurator: &str,
    missing: MissingContainerPolicy,
    policy: &RetryPolicy,
) -> Result<()> {
    wait_container_status(fleet, configurator, ContainerStatus::Running, missing, policy).await?;
    wait_container_status(fleet, configurator, ContainerStatus::Exited, missing, policy).await?;
    info!("Instance configuration done");
    Ok(())
}

/// Succeeds once the registry lists `instance`.
pub async fn wait_instance_registered(backend: &dyn Backend, instance: &str, policy: &RetryPolicy) -> Result<()> {
    policy
        .execute(&format!("registration of instance {instance}"), || async {
            let instances = backend.list_instances().await?;
            if instances.iter().any(|name| name == instance) {
                Ok(())
            } else {
                Err(Error::not_ready(format!("instance {instance} not yet scanned")))
            }
        })
        .await
}

/// Succeeds once a job created after `since` has ingested `data_type`.
///
/// The first matching data set decides: `done` succeeds, `failed` is fatal,
/// any other state (or no match yet) polls again. Jobs created at or before
/// `since` belong to a previous load and are ignored.
pub async fn wait_job_state(
    backend: &dyn Backend,
    dataset: &str,
    data_type: &str,
    since: NaiveDateTime,
    policy: &RetryPolicy,
) -> Result<()> {
    policy
        .execute(&format!("{data_type} ingestion of {dataset}"), || async {
            let jobs = backend.jobs(dataset).await?;
            let job = jobs
                .iter()
                .filter(|j| j.created_at > since)
                .find(|j| j.dataset_type == data_type);
            match job.map(|j| j.state) {
                Some(JobState::Done) => {
                    info!("Dataset '{}' of {} done", data_type, dataset);
                    Ok(())
                }
                Some(JobState::Failed) => Err(Error::JobFailed {
                    dataset: dataset.to_string(),
                    data_type: data_type.to_string(),
                    state: JobState::Failed.to_string(),
                }),
                Some(state) => Err(Error::not_ready(format!(
                    "job with dataset '{data_type}' still in process ({state})"
                ))),
                None => Err(Error::not_ready(format!("job with dataset '{data_type}' not yet created"))),
            }
        })
        .await
}

/// Succeeds on the first poll where `last_load_at` differs from `previous`.
pub async fn wait_reload_timestamp_changed(
    backend: &dyn Backend,
    dataset: &str,
    previous: Option<&str>,
    policy: &RetryPolicy,
) -> Result<()> {
    policy
        .execute(&format!("reload of {dataset}"), || async {
            let status = backend.coverage_status(dataset).await?;
            if status.last_load_at.as_deref() == previous {
                Err(Error::not_ready(format!("{dataset} data is not reloaded")))
            } else {
                info!("{} reloaded at {:?}", dataset, status.last_load_at);
                Ok(())
            }
        })
        .await
}
