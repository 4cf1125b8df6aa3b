//! Autoscaler configuration
//!
//! Values come from an optional config file (base path from
//! `AUTOSCALER_CONFIG_FILE`, default `autoscaler`, any format the `config`
//! crate detects) overlaid by `AUTOSCALER_*` environment variables, with
//! `__` separating nested keys: `AUTOSCALER_PROVIDER__TOKEN=...`.

use scaler_lib::error::ConfigError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "AUTOSCALER";
const CONFIG_FILE_VAR: &str = "AUTOSCALER_CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "autoscaler";

#[derive(Debug, Clone, Deserialize)]
pub struct AutoscalerConfig {
    /// Port for the query, health and Prometheus endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Control loop interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub metrics_source: MetricsSourceConfig,

    #[serde(default)]
    pub scaling: ScalingConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub provisioning: ProvisioningConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSourceConfig {
    /// Kubernetes API base, typically `kubectl proxy`
    #[serde(default = "default_source_url")]
    pub base_url: String,

    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScalingConfig {
    #[serde(default = "default_threshold")]
    pub cpu_threshold: f64,

    #[serde(default = "default_threshold")]
    pub mem_threshold: f64,

    /// Act on scale-out decisions; when false they are only logged
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_url")]
    pub api_url: String,

    /// API token; required when scaling is enabled
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_size")]
    pub size: String,

    #[serde(default = "default_image_id")]
    pub image_id: u64,

    #[serde(default = "default_ssh_key_ids")]
    pub ssh_key_ids: Vec<u64>,

    #[serde(default = "default_true")]
    pub private_networking: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    /// Seconds between instance status checks
    #[serde(default = "default_status_interval")]
    pub poll_interval_secs: u64,

    /// Status checks before an attempt times out
    #[serde(default = "default_attempt_budget")]
    pub attempt_budget: u32,

    #[serde(default = "default_hosts_file")]
    pub hosts_file: PathBuf,

    #[serde(default = "default_playbooks")]
    pub playbooks: Vec<PathBuf>,

    #[serde(default = "default_ansible_binary")]
    pub ansible_binary: String,
}

fn default_api_port() -> u16 {
    3001
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./autoscaler.redb")
}

fn default_poll_interval() -> u64 {
    30
}

fn default_source_url() -> String {
    "http://127.0.0.1:8001".to_string()
}

fn default_source_timeout() -> u64 {
    10
}

fn default_threshold() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

fn default_provider_url() -> String {
    "https://api.digitalocean.com".to_string()
}

fn default_region() -> String {
    "fra1".to_string()
}

fn default_size() -> String {
    "s-1vcpu-1gb".to_string()
}

fn default_image_id() -> u64 {
    41695378
}

fn default_ssh_key_ids() -> Vec<u64> {
    vec![23483771]
}

fn default_status_interval() -> u64 {
    15
}

fn default_attempt_budget() -> u32 {
    10
}

fn default_hosts_file() -> PathBuf {
    PathBuf::from("kube-cluster/hosts")
}

fn default_playbooks() -> Vec<PathBuf> {
    ["initial.yml", "kube-dependencies.yml", "workers.yml"]
        .iter()
        .map(|p| PathBuf::from("kube-cluster").join(p))
        .collect()
}

fn default_ansible_binary() -> String {
    "ansible-playbook".to_string()
}

impl Default for MetricsSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_url(),
            timeout_secs: default_source_timeout(),
        }
    }
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: default_threshold(),
            mem_threshold: default_threshold(),
            enabled: true,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_provider_url(),
            token: None,
            region: default_region(),
            size: default_size(),
            image_id: default_image_id(),
            ssh_key_ids: default_ssh_key_ids(),
            private_networking: true,
        }
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_status_interval(),
            attempt_budget: default_attempt_budget(),
            hosts_file: default_hosts_file(),
            playbooks: default_playbooks(),
            ansible_binary: default_ansible_binary(),
        }
    }
}

impl AutoscalerConfig {
    /// Load from the config file and environment, then validate
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var(CONFIG_FILE_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let builder = config::Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("provider.ssh_key_ids")
                    .with_list_parse_key("provisioning.playbooks")
                    .try_parsing(true),
            );

        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let config = builder
            .build()
            .map_err(|e| ConfigError(e.to_string()))?
            .try_deserialize::<Self>()
            .map_err(|e| ConfigError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_unit_range = |v: f64| v > 0.0 && v <= 1.0;

        if !in_unit_range(self.scaling.cpu_threshold) {
            return Err(ConfigError(format!(
                "scaling.cpu_threshold must be in (0, 1], got {}",
                self.scaling.cpu_threshold
            )));
        }
        if !in_unit_range(self.scaling.mem_threshold) {
            return Err(ConfigError(format!(
                "scaling.mem_threshold must be in (0, 1], got {}",
                self.scaling.mem_threshold
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError("poll_interval_secs must be nonzero".to_string()));
        }
        if self.provisioning.poll_interval_secs == 0 {
            return Err(ConfigError(
                "provisioning.poll_interval_secs must be nonzero".to_string(),
            ));
        }
        if self.provisioning.attempt_budget == 0 {
            return Err(ConfigError(
                "provisioning.attempt_budget must be nonzero".to_string(),
            ));
        }

        let has_token = self
            .provider
            .token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        if self.scaling.enabled && !has_token {
            return Err(ConfigError(
                "provider.token is required when scaling is enabled".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.metrics_source.timeout_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.provisioning.poll_interval_secs)
    }
}
