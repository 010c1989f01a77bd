//! Compose environment lifecycle: up, status, clean

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::info;

use crate::output::{print_list, print_success, OutputFormat, TableDisplay};
use routecheck_common::{ContainerHandle, HarnessConfig};
use routecheck_harness::readiness::{wait_cities_ready, wait_fleet_empty, wait_instance_configuration, MissingContainerPolicy};
use routecheck_harness::{ContainerFleet, DockerFleet, HttpBackend, RetryPolicy};

#[derive(Args)]
pub struct UpArgs {
    /// Pull images before starting; a failed pull keeps the local images
    #[arg(long)]
    pub pull: bool,
}

/// Start the project, then wait for instance configuration and the registry
pub async fn up(args: UpArgs, config: &HarnessConfig) -> Result<()> {
    let fleet = DockerFleet::new(config.compose.clone()).await?;
    let backend = HttpBackend::new(&config.ingestion_url, &config.routing_url)?;
    let containers = RetryPolicy::from_pair(config.waits.container());
    let missing = MissingContainerPolicy::strict(config.waits.strict_containers);

    if args.pull {
        info!("Pulling images for {}", config.compose.project_name);
        fleet.pull().await?;
    }
    fleet
        .up(&[])
        .await
        .with_context(|| format!("starting {} from {}", config.compose.project_name, fleet.compose_directory().display()))?;

    wait_instance_configuration(&fleet, &config.configurator_container, missing, &containers).await?;
    wait_cities_ready(&backend, &config.ingestion_url, &RetryPolicy::from_pair(config.waits.service())).await?;

    print_success(&format!("Environment {} is up", config.compose.project_name));
    Ok(())
}

/// Stop and remove the project, then wait for the fleet to drain
pub async fn clean(config: &HarnessConfig) -> Result<()> {
    let fleet = DockerFleet::new(config.compose.clone()).await?;
    fleet.down().await?;
    wait_fleet_empty(&fleet, &RetryPolicy::from_pair(config.waits.container())).await?;
    print_success(&format!("Environment {} removed", config.compose.project_name));
    Ok(())
}

#[derive(Serialize)]
struct ContainerRow {
    name: String,
    id: String,
    status: String,
}

impl From<ContainerHandle> for ContainerRow {
    fn from(c: ContainerHandle) -> Self {
        Self {
            name: c.name,
            id: c.id.chars().take(12).collect(),
            status: c.status.to_string(),
        }
    }
}

impl TableDisplay for ContainerRow {
    fn headers() -> Vec<&'static str> {
        vec!["NAME", "ID", "STATUS"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.name.clone(), self.id.clone(), self.status.clone()]
    }
}

/// List the containers of the project
pub async fn status(config: &HarnessConfig, format: OutputFormat) -> Result<()> {
    let fleet = DockerFleet::new(config.compose.clone()).await?;
    let mut containers = fleet.list().await?;
    containers.sort_by(|a, b| a.name.cmp(&b.name));
    let rows: Vec<ContainerRow> = containers.into_iter().map(ContainerRow::from).collect();
    print_list(&rows, format);
    Ok(())
}
