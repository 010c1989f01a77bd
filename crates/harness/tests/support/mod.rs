//! In-memory backend and container fleet sharing one mutable world

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use routecheck_common::{
    ContainerHandle, ContainerStatus, CoverageStatus, Dataset, Error, HarnessConfig, JobState, LoadJob, Result,
};
use routecheck_harness::staging::DATA_CATEGORIES;
use routecheck_harness::{Backend, ContainerFleet};

pub const WORKER: &str = "routecheck-tyr_worker-1";
pub const ENGINE: &str = "routecheck-fr-idf-kraken-1";
pub const CONFIGURATOR: &str = "routecheck-instances_configurator-1";

#[derive(Debug, Clone)]
pub struct Push {
    pub container: String,
    pub path: String,
    pub bytes: Vec<u8>,
}

impl Push {
    /// `(name, content)` of every tar entry
    pub fn entries(&self) -> Vec<(String, Vec<u8>)> {
        let mut archive = tar::Archive::new(self.bytes.as_slice());
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name = entry.path().unwrap().to_string_lossy().into_owned();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                (name, data)
            })
            .collect()
    }
}

pub struct World {
    pub instances: Vec<String>,
    /// `list_instances` polls answering empty before the instances show up
    pub scan_delay: u32,
    pub list_polls: u32,
    pub coverage_status: String,
    pub parameters: Map<String, Value>,
    pub accept_updates: bool,
    pub last_load_at: Option<String>,
    pub jobs: Vec<LoadJob>,
    /// State of the jobs created by a push
    pub job_outcome: JobState,
    pub probe_status: u16,
    pub probes: Vec<String>,
    pub containers: Vec<ContainerHandle>,
    pub pushes: Vec<Push>,
    pub execs: Vec<(String, String)>,
    pub restarts: Vec<String>,
    /// `stop <name>` / `rm <name>` in call order
    pub teardown: Vec<String>,
    /// Containers that keep running when stopped
    pub unstoppable: Vec<String>,
    pub responses: HashMap<String, String>,
    pub fetches: Vec<String>,
}

impl Default for World {
    fn default() -> Self {
        Self {
            instances: vec!["fr-idf".to_string()],
            scan_delay: 0,
            list_polls: 0,
            coverage_status: "running".to_string(),
            parameters: Map::new(),
            accept_updates: true,
            last_load_at: Some("20240101T000000".to_string()),
            jobs: Vec::new(),
            job_outcome: JobState::Done,
            probe_status: 200,
            probes: Vec::new(),
            containers: vec![
                container(WORKER, ContainerStatus::Running),
                container(ENGINE, ContainerStatus::Running),
                container(CONFIGURATOR, ContainerStatus::Exited),
            ],
            pushes: Vec::new(),
            execs: Vec::new(),
            restarts: Vec::new(),
            teardown: Vec::new(),
            unstoppable: Vec::new(),
            responses: HashMap::new(),
            fetches: Vec::new(),
        }
    }
}

impl World {
    pub fn add_job(&mut self, dataset_type: &str, created_at: NaiveDateTime, state: JobState) {
        self.jobs.push(LoadJob {
            dataset_type: dataset_type.to_string(),
            created_at,
            state,
        });
    }
}

pub fn container(name: &str, status: ContainerStatus) -> ContainerHandle {
    ContainerHandle {
        id: format!("id-{name}"),
        name: name.to_string(),
        status,
    }
}

/// Strictly after any timestamp taken before the call
pub fn fresh_timestamp() -> NaiveDateTime {
    Utc::now().naive_utc() + ChronoDuration::milliseconds(1)
}

pub type SharedWorld = Arc<Mutex<World>>;

pub struct FakeBackend {
    world: SharedWorld,
}

#[async_trait]
impl Backend for FakeBackend {
    async fn probe(&self, url: &str) -> Result<u16> {
        let mut world = self.world.lock();
        world.probes.push(url.to_string());
        Ok(world.probe_status)
    }

    async fn list_instances(&self) -> Result<Vec<String>> {
        let mut world = self.world.lock();
        world.list_polls += 1;
        if world.list_polls <= world.scan_delay {
            return Ok(Vec::new());
        }
        Ok(world.instances.clone())
    }

    async fn update_instance(&self, _name: &str, params: &Map<String, Value>) -> Result<()> {
        let mut world = self.world.lock();
        if world.accept_updates {
            for (key, value) in params {
                world.parameters.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn jobs(&self, _name: &str) -> Result<Vec<LoadJob>> {
        Ok(self.world.lock().jobs.clone())
    }

    async fn coverage_status(&self, _name: &str) -> Result<CoverageStatus> {
        let world = self.world.lock();
        Ok(CoverageStatus {
            status: world.coverage_status.clone(),
            parameters: world.parameters.clone(),
            last_load_at: world.last_load_at.clone(),
        })
    }

    async fn get_text(&self, url: &str) -> Result<(u16, String)> {
        let mut world = self.world.lock();
        world.fetches.push(url.to_string());
        match world.responses.get(url) {
            Some(body) => Ok((200, body.clone())),
            None => Ok((404, r#"{"error": {"id": "unknown_object"}}"#.to_string())),
        }
    }
}

pub struct FakeFleet {
    world: SharedWorld,
}

/// Data set type of a pushed archive, from its first entry
fn pushed_type(push: &Push) -> Option<String> {
    let (name, _) = push.entries().into_iter().next()?;
    if name.ends_with(".pbf") {
        return Some("osm".to_string());
    }
    let stem = name.strip_suffix(".zip")?;
    DATA_CATEGORIES
        .iter()
        .find(|c| c.folder == stem)
        .map(|c| c.dataset_type.to_string())
}

#[async_trait]
impl ContainerFleet for FakeFleet {
    async fn list(&self) -> Result<Vec<ContainerHandle>> {
        Ok(self.world.lock().containers.clone())
    }

    async fn exec(&self, container: &str, command: &str) -> Result<String> {
        self.world.lock().execs.push((container.to_string(), command.to_string()));
        Ok(String::new())
    }

    async fn push_archive(&self, container: &str, target_path: &str, archive: Vec<u8>) -> Result<()> {
        let push = Push {
            container: container.to_string(),
            path: target_path.to_string(),
            bytes: archive,
        };
        let data_type = pushed_type(&push);
        let mut world = self.world.lock();
        if let Some(data_type) = data_type {
            let state = world.job_outcome;
            world.add_job(&data_type, fresh_timestamp(), state);
        }
        let reloads = world.pushes.len() + 1;
        world.last_load_at = Some(format!("reload-{reloads}"));
        world.pushes.push(push);
        Ok(())
    }

    async fn restart(&self, container: &str) -> Result<()> {
        self.world.lock().restarts.push(container.to_string());
        Ok(())
    }

    async fn stop(&self, container: &str) -> Result<()> {
        let mut world = self.world.lock();
        world.teardown.push(format!("stop {container}"));
        if world.unstoppable.iter().any(|name| name == container) {
            return Ok(());
        }
        match world.containers.iter_mut().find(|c| c.name == container) {
            Some(c) => {
                c.status = ContainerStatus::Exited;
                Ok(())
            }
            None => Err(Error::ContainerMissing(container.to_string())),
        }
    }

    async fn remove(&self, container: &str) -> Result<()> {
        let mut world = self.world.lock();
        world.teardown.push(format!("rm {container}"));
        world.containers.retain(|c| c.name != container);
        Ok(())
    }
}

pub fn fakes(world: World) -> (SharedWorld, Arc<FakeBackend>, Arc<FakeFleet>) {
    let world = Arc::new(Mutex::new(world));
    let (backend, fleet) = attach(world.clone());
    (world, backend, fleet)
}

/// Fresh fakes over an existing world
pub fn attach(world: SharedWorld) -> (Arc<FakeBackend>, Arc<FakeFleet>) {
    let backend = Arc::new(FakeBackend { world: world.clone() });
    let fleet = Arc::new(FakeFleet { world });
    (backend, fleet)
}

pub fn config(root: &Path) -> HarnessConfig {
    HarnessConfig {
        routing_url: "http://jormun:9191".to_string(),
        data_dir: root.join("data"),
        reference_dir: root.join("references"),
        response_dir: root.join("output"),
        datasets: vec![dataset()],
        ..HarnessConfig::default()
    }
}

pub fn dataset() -> Dataset {
    Dataset::new("fr-idf").with_timing(Duration::from_secs(10), Duration::from_millis(100))
}

pub fn write_file(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}
