//! HTTP access to the job/instance registry and the routing API

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use routecheck_common::{CoverageStatus, CoverageStatusResponse, Instance, JobsResponse, LoadJob};

/// Narrow capability over the backend services.
///
/// Waiters and the loader only ever talk to the platform through this
/// trait, so tests can swap in an in-memory backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Status code of a GET on `url`; transport failure is an error.
    async fn probe(&self, url: &str) -> Result<u16>;

    /// Names of the instances known to the registry
    async fn list_instances(&self) -> Result<Vec<String>>;

    /// Push parameter values to one instance
    async fn update_instance(&self, name: &str, params: &Map<String, Value>) -> Result<()>;

    /// Ingestion jobs of one instance, flattened per data set
    async fn jobs(&self, name: &str) -> Result<Vec<LoadJob>>;

    /// Running status of one coverage on the routing engine
    async fn coverage_status(&self, name: &str) -> Result<CoverageStatus>;

    /// Raw body of a routing query
    async fn get_text(&self, url: &str) -> Result<(u16, String)>;
}

/// Backend over reqwest
pub struct HttpBackend {
    client: reqwest::Client,
    ingestion_url: String,
    routing_url: String,
}

impl HttpBackend {
    pub fn new(ingestion_url: &str, routing_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            ingestion_url: ingestion_url.trim_end_matches('/').to_string(),
            routing_url: routing_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn ingestion_url(&self) -> &str {
        &self.ingestion_url
    }

    pub fn routing_url(&self) -> &str {
        &self.routing_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET {}", url);
        let resp = self.client.get(url).send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp.json::<T>().await?)
    }
}

/// Connection-level failures mean the environment is broken, not busy.
fn transport(e: reqwest::Error) -> Error {
    if e.is_connect() {
        Error::EnvironmentUnavailable(e.to_string())
    } else {
        Error::Http(e)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn probe(&self, url: &str) -> Result<u16> {
        let resp = self.client.get(url).send().await.map_err(transport)?;
        Ok(resp.status().as_u16())
    }

    async fn list_instances(&self) -> Result<Vec<String>> {
        let url = format!("{}/v0/instances/", self.ingestion_url);
        let instances: Vec<Instance> = self.get_json(&url).await?;
        Ok(instances.into_iter().map(|i| i.name).collect())
    }

    async fn update_instance(&self, name: &str, params: &Map<String, Value>) -> Result<()> {
        let url = format!("{}/v0/instances/{}", self.ingestion_url, name);
        debug!("PUT {}", url);
        let resp = self
            .client
            .put(&url)
            .json(params)
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(Error::HttpStatus {
                url,
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn jobs(&self, name: &str) -> Result<Vec<LoadJob>> {
        let url = format!("{}/v0/jobs/{}", self.ingestion_url, name);
        let resp: JobsResponse = self.get_json(&url).await?;
        Ok(resp.load_jobs())
    }

    async fn coverage_status(&self, name: &str) -> Result<CoverageStatus> {
        let url = format!("{}/v1/coverage/{}/status", self.routing_url, name);
        let resp: CoverageStatusResponse = self.get_json(&url).await?;
        Ok(resp.status)
    }

    async fn get_text(&self, url: &str) -> Result<(u16, String)> {
        debug!("GET {}", url);
        let resp = self.client.get(url).send().await.map_err(transport)?;
        let status = resp.status().as_u16();
        Ok((status, resp.text().await?))
    }
}
