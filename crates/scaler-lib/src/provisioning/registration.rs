//! Joining an active instance to the cluster
//!
//! Registration appends the worker to the ansible inventory; bootstrap then
//! runs the node playbooks against that inventory. Neither step removes the
//! instance on failure.

use crate::error::ProvisioningError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Append-only ansible host inventory
#[derive(Debug, Clone)]
pub struct HostRegistry {
    path: PathBuf,
}

impl HostRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inventory line for one worker
    pub fn entry(name: &str, address: &str) -> String {
        format!("{} ansible_host={} ansible_user=root\n", name, address)
    }

    pub async fn register(&self, name: &str, address: &str) -> Result<(), ProvisioningError> {
        let fail = |e: std::io::Error| {
            ProvisioningError::Registration(format!("{}: {}", self.path.display(), e))
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(fail)?;
        file.write_all(Self::entry(name, address).as_bytes())
            .await
            .map_err(fail)?;
        file.flush().await.map_err(fail)?;

        debug!(worker = name, address, path = %self.path.display(), "appended host entry");
        Ok(())
    }
}

/// Brings a registered worker into the cluster
#[async_trait]
pub trait NodeBootstrapper: Send + Sync {
    async fn bootstrap(&self, worker_name: &str) -> Result<(), ProvisioningError>;
}

/// Runs each playbook in order with `-i <inventory>`; every run must succeed
pub struct AnsibleBootstrapper {
    binary: String,
    inventory: PathBuf,
    playbooks: Vec<PathBuf>,
}

impl AnsibleBootstrapper {
    pub fn new(binary: impl Into<String>, inventory: impl Into<PathBuf>, playbooks: Vec<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            inventory: inventory.into(),
            playbooks,
        }
    }

    async fn run_playbook(&self, playbook: &Path) -> Result<(), ProvisioningError> {
        let output = Command::new(&self.binary)
            .arg("-i")
            .arg(&self.inventory)
            .arg(playbook)
            .output()
            .await
            .map_err(|e| {
                ProvisioningError::Bootstrap(format!("failed to run {}: {}", self.binary, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProvisioningError::Bootstrap(format!(
                "{} exited with {}: {}",
                playbook.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeBootstrapper for AnsibleBootstrapper {
    async fn bootstrap(&self, worker_name: &str) -> Result<(), ProvisioningError> {
        for playbook in &self.playbooks {
            info!(worker = worker_name, playbook = %playbook.display(), "running playbook");
            self.run_playbook(playbook).await?;
        }
        Ok(())
    }
}
