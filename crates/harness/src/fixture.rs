//! Test-facing surface: one `Session` per run, one `TestCase` per test function

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{Backend, HttpBackend};
use crate::error::{Error, Result};
use crate::fleet::{ContainerFleet, DockerFleet};
use crate::loader::{DatasetLoader, LoaderSettings};
use crate::snapshot::{ComparisonResult, JourneyFilter, ReferenceKey, ResponseFilter, SnapshotComparator};
use routecheck_common::{Dataset, HarnessConfig, Scenario};

/// Whether `datetime` is the departure or the arrival of the journey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatetimeRepresents {
    #[default]
    Departure,
    Arrival,
}

impl fmt::Display for DatetimeRepresents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Departure => write!(f, "departure"),
            Self::Arrival => write!(f, "arrival"),
        }
    }
}

/// Parameters of a journeys request
#[derive(Debug, Clone, Default)]
pub struct JourneyQuery {
    pub from: String,
    pub to: String,
    pub datetime: String,
    pub datetime_represents: DatetimeRepresents,
    pub first_section_mode: Vec<String>,
    pub last_section_mode: Vec<String>,
    pub direct_path_mode: Vec<String>,
    pub forbidden_uris: Vec<String>,
    /// Appended verbatim, in order
    pub extra: Vec<(String, String)>,
}

impl JourneyQuery {
    pub fn new(from: impl Into<String>, to: impl Into<String>, datetime: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            datetime: datetime.into(),
            ..Default::default()
        }
    }

    pub fn arrival(mut self) -> Self {
        self.datetime_represents = DatetimeRepresents::Arrival;
        self
    }

    pub fn first_section_mode(mut self, mode: impl Into<String>) -> Self {
        self.first_section_mode.push(mode.into());
        self
    }

    pub fn last_section_mode(mut self, mode: impl Into<String>) -> Self {
        self.last_section_mode.push(mode.into());
        self
    }

    pub fn direct_path_mode(mut self, mode: impl Into<String>) -> Self {
        self.direct_path_mode.push(mode.into());
        self
    }

    pub fn forbid(mut self, uri: impl Into<String>) -> Self {
        self.forbidden_uris.push(uri.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    /// Query string, unencoded, in a fixed parameter order so stored queries stay stable
    pub fn query_string(&self, scenario: Scenario) -> String {
        let mut query = format!(
            "from={}&to={}&datetime={}&datetime_represents={}",
            self.from, self.to, self.datetime, self.datetime_represents
        );
        let repeated = [
            ("first_section_mode[]", &self.first_section_mode),
            ("last_section_mode[]", &self.last_section_mode),
            ("direct_path_mode[]", &self.direct_path_mode),
            ("forbidden_uris[]", &self.forbidden_uris),
        ];
        for (name, values) in repeated {
            for value in values {
                query.push_str(&format!("&{name}={value}"));
            }
        }
        for (key, value) in &self.extra {
            query.push_str(&format!("&{key}={value}"));
        }
        query.push_str(&format!("&_override_scenario={}", scenario.override_value()));
        query.push_str(&format!("&_current_datetime={}", self.datetime));
        query
    }

    pub fn url(&self, routing_url: &str, dataset: &Dataset) -> String {
        format!(
            "{}/v1/coverage/{}/journeys?{}",
            routing_url.trim_end_matches('/'),
            dataset.name,
            self.query_string(dataset.scenario)
        )
    }
}

/// State shared by every test of one run: clients, loaded datasets, comparator
pub struct Session {
    config: HarnessConfig,
    backend: Arc<dyn Backend>,
    loader: DatasetLoader,
    comparator: SnapshotComparator,
}

impl Session {
    /// Purges the artifacts of previous runs; nothing else is removed until the next session
    pub fn new(config: HarnessConfig, backend: Arc<dyn Backend>, fleet: Arc<dyn ContainerFleet>) -> Result<Self> {
        let comparator = SnapshotComparator::from_config(&config);
        comparator.store().purge_artifacts()?;
        let loader = DatasetLoader::new(backend.clone(), fleet, LoaderSettings::from_config(&config));
        info!("Session started in {:?} mode", config.mode);
        Ok(Self {
            config,
            backend,
            loader,
            comparator,
        })
    }

    /// Session over the real HTTP backend and container runtime
    pub async fn connect(config: HarnessConfig) -> Result<Self> {
        let backend = Arc::new(HttpBackend::new(&config.ingestion_url, &config.routing_url)?);
        let fleet = Arc::new(DockerFleet::new(config.compose.clone()).await?);
        Self::new(config, backend, fleet)
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn loader(&mut self) -> &mut DatasetLoader {
        &mut self.loader
    }

    pub fn comparator(&self) -> &SnapshotComparator {
        &self.comparator
    }

    fn resolve(&self, names: &[&str]) -> Result<Vec<Dataset>> {
        names
            .iter()
            .map(|name| {
                self.config
                    .dataset(name)
                    .cloned()
                    .ok_or_else(|| Error::InvalidConfig(format!("unknown dataset '{name}'")))
            })
            .collect()
    }

    /// Suite setup: load each named dataset unless this session already did
    pub async fn setup(&mut self, datasets: &[&str]) -> Result<()> {
        let datasets = self.resolve(datasets)?;
        self.loader.ensure_loaded(&datasets).await
    }

    /// Start a test of `suite` running against `dataset`
    pub fn test_case(&mut self, suite: &str, test: &str, dataset: &str) -> Result<TestCase<'_>> {
        let dataset = self
            .resolve(&[dataset])?
            .pop()
            .ok_or_else(|| Error::InvalidConfig("no dataset".to_string()))?;
        Ok(TestCase {
            session: self,
            suite: suite.to_string(),
            test: test.to_string(),
            dataset,
            ordinal: 0,
        })
    }

    /// Write the comparison report, if anything failed
    pub fn finish(&self) -> Result<Option<PathBuf>> {
        self.comparator.write_report()
    }
}

/// One test function; numbers its `request_compare` calls from 1
pub struct TestCase<'a> {
    session: &'a mut Session,
    suite: String,
    test: String,
    dataset: Dataset,
    ordinal: u32,
}

impl TestCase<'_> {
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Calls made so far
    pub fn calls(&self) -> u32 {
        self.ordinal
    }

    /// `GET {routing}/v1/coverage/{dataset}/{path}`
    pub async fn api(&mut self, path: &str, filter: &dyn ResponseFilter) -> Result<ComparisonResult> {
        let url = format!(
            "{}/v1/coverage/{}/{}",
            self.routing_url(),
            self.dataset.name,
            path.trim_start_matches('/')
        );
        self.request_compare(&url, filter).await
    }

    /// `GET {routing}/v1{path}`
    pub async fn raw_api(&mut self, path: &str, filter: &dyn ResponseFilter) -> Result<ComparisonResult> {
        let url = format!("{}/v1{}", self.routing_url(), path);
        self.request_compare(&url, filter).await
    }

    pub async fn journey(&mut self, query: &JourneyQuery) -> Result<ComparisonResult> {
        let url = query.url(&self.session.config.routing_url, &self.dataset);
        self.request_compare(&url, &JourneyFilter::default()).await
    }

    /// Fetch once, then create or check the reference for the next ordinal
    pub async fn request_compare(&mut self, url: &str, filter: &dyn ResponseFilter) -> Result<ComparisonResult> {
        self.ordinal += 1;
        let key = ReferenceKey::new(&self.suite, &self.test, self.ordinal);

        let (status, body) = self.session.backend.get_text(url).await?;
        if status != 200 {
            warn!("{} answered {}", url, status);
        } else {
            debug!("{} answered {}", url, status);
        }
        self.session.comparator.assert_matches(&key, url, &body, filter)
    }

    fn routing_url(&self) -> &str {
        self.session.config.routing_url.trim_end_matches('/')
    }
}
