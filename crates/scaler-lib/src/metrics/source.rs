//! Raw usage source backed by the Kubernetes API (through `kubectl proxy`
//! or an equivalent unauthenticated endpoint)
//!
//! Responses are decoded into explicit schema structs; a body that does not
//! match fails with `SourceError::Parse` instead of yielding zero values.

use crate::error::{ConfigError, SourceError};
use crate::models::{Resource, ResourceKind, Sample};
use crate::units::UnitConverter;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

const PODS_PATH: &str = "api/v1/pods";
const NODES_PATH: &str = "api/v1/nodes";
const POD_METRICS_PATH: &str = "apis/metrics.k8s.io/v1beta1/pods";
const NODE_METRICS_PATH: &str = "apis/metrics.k8s.io/v1beta1/nodes";

/// Source of inventory and instant usage readings
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Current pods followed by current nodes
    async fn list_resources(&self) -> Result<Vec<Resource>, SourceError>;

    /// Normalized usage of every node, stamped with `timestamp`
    async fn node_samples(&self, timestamp: i64) -> Result<Vec<Sample>, SourceError>;

    /// Normalized usage of every pod (summed over containers), stamped with `timestamp`
    async fn pod_samples(&self, timestamp: i64) -> Result<Vec<Sample>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    items: Vec<ResourceItem>,
}

#[derive(Debug, Deserialize)]
struct ResourceItem {
    metadata: ObjectMeta,
}

#[derive(Debug, Deserialize)]
struct Usage {
    cpu: String,
    memory: String,
}

#[derive(Debug, Deserialize)]
struct NodeMetricsList {
    items: Vec<NodeMetricsItem>,
}

#[derive(Debug, Deserialize)]
struct NodeMetricsItem {
    metadata: ObjectMeta,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct PodMetricsList {
    items: Vec<PodMetricsItem>,
}

#[derive(Debug, Deserialize)]
struct PodMetricsItem {
    metadata: ObjectMeta,
    containers: Vec<ContainerMetricsItem>,
}

#[derive(Debug, Deserialize)]
struct ContainerMetricsItem {
    usage: Usage,
}

/// HTTP implementation of [`MetricsSource`]
pub struct HttpMetricsSource {
    client: Client,
    base_url: Url,
}

impl HttpMetricsSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError(format!("failed to create HTTP client: {}", e)))?;

        let base_url = Url::parse(base_url)
            .map_err(|e| ConfigError(format!("invalid metrics source URL {}: {}", base_url, e)))?;

        Ok(Self { client, base_url })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| SourceError::fetch(path, e))?;
        let url_str = url.to_string();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::fetch(&url_str, e))?;

        if response.status() != StatusCode::OK {
            return Err(SourceError::fetch(
                &url_str,
                format!("unexpected status {}", response.status()),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::fetch(&url_str, e))?;

        debug!(url = %url_str, bytes = body.len(), "fetched metrics source response");
        serde_json::from_slice(&body).map_err(|e| SourceError::parse(&url_str, e))
    }

    async fn list_kind(&self, path: &str, kind: ResourceKind) -> Result<Vec<Resource>, SourceError> {
        let list: ResourceList = self.get_json(path).await?;
        Ok(list
            .items
            .into_iter()
            .map(|item| Resource {
                name: item.metadata.name,
                kind,
            })
            .collect())
    }
}

fn usage_sample(
    url: &str,
    name: String,
    timestamp: i64,
    usages: &[&Usage],
) -> Result<Sample, SourceError> {
    let mut cpu = 0.0;
    let mut memory = 0.0;
    for usage in usages {
        cpu += UnitConverter::cpu_cores(&usage.cpu).map_err(|e| SourceError::from_unit(url, e))?;
        memory +=
            UnitConverter::memory_gib(&usage.memory).map_err(|e| SourceError::from_unit(url, e))?;
    }
    Ok(Sample::new(name, timestamp, cpu, memory))
}

#[async_trait]
impl MetricsSource for HttpMetricsSource {
    async fn list_resources(&self) -> Result<Vec<Resource>, SourceError> {
        let mut resources = self.list_kind(PODS_PATH, ResourceKind::Pod).await?;
        resources.extend(self.list_kind(NODES_PATH, ResourceKind::Node).await?);
        Ok(resources)
    }

    async fn node_samples(&self, timestamp: i64) -> Result<Vec<Sample>, SourceError> {
        let list: NodeMetricsList = self.get_json(NODE_METRICS_PATH).await?;
        list.items
            .into_iter()
            .map(|item| {
                usage_sample(NODE_METRICS_PATH, item.metadata.name, timestamp, &[&item.usage])
            })
            .collect()
    }

    async fn pod_samples(&self, timestamp: i64) -> Result<Vec<Sample>, SourceError> {
        let list: PodMetricsList = self.get_json(POD_METRICS_PATH).await?;
        list.items
            .into_iter()
            .map(|item| {
                let usages: Vec<&Usage> = item.containers.iter().map(|c| &c.usage).collect();
                usage_sample(POD_METRICS_PATH, item.metadata.name, timestamp, &usages)
            })
            .collect()
    }
}
