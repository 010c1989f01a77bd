//! Dataset loading, engine restarts and engine teardown

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::output::{print_success, print_warning};
use routecheck_common::{Dataset, HarnessConfig};
use routecheck_harness::{DatasetLoader, DockerFleet, HttpBackend, LoadOutcome, LoaderSettings};

/// Named datasets, or every configured one when `names` is empty
fn select(config: &HarnessConfig, names: &[String]) -> Result<Vec<Dataset>> {
    if names.is_empty() {
        return Ok(config.datasets.clone());
    }
    let mut selected = Vec::new();
    for name in names {
        match config.dataset(name) {
            Some(dataset) => selected.push(dataset.clone()),
            None => bail!("dataset '{}' is not configured", name),
        }
    }
    Ok(selected)
}

async fn loader(config: &HarnessConfig) -> Result<DatasetLoader> {
    let backend = Arc::new(HttpBackend::new(&config.ingestion_url, &config.routing_url)?);
    let fleet = Arc::new(DockerFleet::new(config.compose.clone()).await?);
    Ok(DatasetLoader::new(backend, fleet, LoaderSettings::from_config(config)))
}

pub async fn load(config: &HarnessConfig, names: &[String]) -> Result<()> {
    let datasets = select(config, names)?;
    if datasets.is_empty() {
        print_warning("No dataset configured");
        return Ok(());
    }
    let mut loader = loader(config).await?;
    for dataset in &datasets {
        match loader.load(dataset).await? {
            LoadOutcome::Loaded { dataset_types } if dataset_types.is_empty() => {
                print_warning(&format!("{dataset}: no input data found"))
            }
            LoadOutcome::Loaded { dataset_types } => {
                print_success(&format!("{dataset}: loaded {}", dataset_types.join(", ")))
            }
            LoadOutcome::AlreadyLoaded => print_success(&format!("{dataset}: already loaded")),
            LoadOutcome::Skipped => print_warning(&format!("{dataset}: loading skipped")),
        }
    }
    Ok(())
}

pub async fn restart(config: &HarnessConfig, names: &[String]) -> Result<()> {
    let datasets = select(config, names)?;
    loader(config).await?.restart_engines(&datasets).await?;
    print_success(&format!("Restarted {} engine(s)", datasets.len()));
    Ok(())
}

pub async fn stop(config: &HarnessConfig, names: &[String]) -> Result<()> {
    let datasets = select(config, names)?;
    let removed = loader(config).await?.remove_engines(&datasets).await?;
    if removed.is_empty() {
        print_warning("No engine container found");
    } else {
        print_success(&format!("Removed {}", removed.join(", ")));
    }
    Ok(())
}
