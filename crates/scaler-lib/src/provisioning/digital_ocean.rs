//! DigitalOcean droplets API client

use super::provider::{CreateRequest, Instance, Provider};
use crate::error::{ConfigError, ProvisioningError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const DROPLETS_PATH: &str = "v2/droplets";
const PAGE_SIZE: u32 = 200;

#[derive(Debug, Deserialize)]
struct DropletList {
    #[serde(default)]
    droplets: Vec<Droplet>,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    pages: Option<Pages>,
}

#[derive(Debug, Deserialize)]
struct Pages {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DropletEnvelope {
    droplet: Droplet,
}

#[derive(Debug, Deserialize)]
struct Droplet {
    id: u64,
    name: String,
    status: String,
    #[serde(default)]
    networks: Networks,
}

#[derive(Debug, Default, Deserialize)]
struct Networks {
    #[serde(default)]
    v4: Vec<NetworkV4>,
}

#[derive(Debug, Deserialize)]
struct NetworkV4 {
    ip_address: String,
    #[serde(rename = "type")]
    kind: String,
}

impl From<Droplet> for Instance {
    fn from(droplet: Droplet) -> Self {
        let public_ipv4 = droplet
            .networks
            .v4
            .into_iter()
            .find(|n| n.kind == "public")
            .map(|n| n.ip_address);

        Instance {
            id: droplet.id,
            name: droplet.name,
            status: droplet.status,
            public_ipv4,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateBody<'a> {
    name: &'a str,
    region: &'a str,
    size: &'a str,
    image: u64,
    ssh_keys: &'a [u64],
    private_networking: bool,
}

/// [`Provider`] backed by the DigitalOcean v2 API
pub struct DigitalOceanProvider {
    client: Client,
    base_url: Url,
    token: String,
}

impl DigitalOceanProvider {
    pub fn new(api_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError(format!("failed to create HTTP client: {}", e)))?;

        let base_url = Url::parse(api_url)
            .map_err(|e| ConfigError(format!("invalid provider URL {}: {}", api_url, e)))?;

        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, String> {
        self.base_url.join(path).map_err(|e| e.to_string())
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, String> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("API error ({}): {}", status, body));
        }

        response.json().await.map_err(|e| e.to_string())
    }

    async fn fetch_all(&self) -> Result<Vec<Instance>, String> {
        let mut url = self.url(DROPLETS_PATH)?;
        url.query_pairs_mut()
            .append_pair("per_page", &PAGE_SIZE.to_string());

        let mut instances = Vec::new();
        let mut pages = 0;
        loop {
            let page: DropletList = self.send_json(self.client.get(url)).await?;
            pages += 1;
            instances.extend(page.droplets.into_iter().map(Instance::from));

            match page.links.pages.and_then(|p| p.next) {
                Some(next) => url = Url::parse(&next).map_err(|e| e.to_string())?,
                None => break,
            }
        }

        debug!(instances = instances.len(), pages, "listed droplets");
        Ok(instances)
    }
}

#[async_trait]
impl Provider for DigitalOceanProvider {
    async fn list_instances(&self) -> Result<Vec<Instance>, ProvisioningError> {
        self.fetch_all().await.map_err(ProvisioningError::CreateFailed)
    }

    async fn create_instance(&self, request: &CreateRequest) -> Result<Instance, ProvisioningError> {
        let existing = self.fetch_all().await.map_err(ProvisioningError::CreateFailed)?;
        if existing.iter().any(|i| i.name == request.name) {
            return Err(ProvisioningError::NameConflict(request.name.clone()));
        }

        let body = CreateBody {
            name: &request.name,
            region: &request.region,
            size: &request.size,
            image: request.image_id,
            ssh_keys: &request.ssh_key_ids,
            private_networking: request.private_networking,
        };
        let url = self.url(DROPLETS_PATH).map_err(ProvisioningError::CreateFailed)?;

        let created: DropletEnvelope = self
            .send_json(self.client.post(url).json(&body))
            .await
            .map_err(ProvisioningError::CreateFailed)?;

        info!(
            id = created.droplet.id,
            name = %created.droplet.name,
            region = %request.region,
            "droplet created"
        );
        Ok(created.droplet.into())
    }

    async fn get_instance(&self, id: u64) -> Result<Instance, ProvisioningError> {
        let url = self
            .url(&format!("{}/{}", DROPLETS_PATH, id))
            .map_err(ProvisioningError::PollFailed)?;

        let found: DropletEnvelope = self
            .send_json(self.client.get(url))
            .await
            .map_err(ProvisioningError::PollFailed)?;

        Ok(found.droplet.into())
    }
}
