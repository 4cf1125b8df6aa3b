//! Cloud provider capability

use crate::error::ProvisioningError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Status string the provider reports once an instance is usable
pub const ACTIVE_STATUS: &str = "active";

/// Provider-side view of a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: u64,
    pub name: String,
    pub status: String,
    /// First public IPv4 address, once assigned
    pub public_ipv4: Option<String>,
}

impl Instance {
    pub fn is_active(&self) -> bool {
        self.status == ACTIVE_STATUS
    }
}

/// Creation parameters; everything except the name comes from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image_id: u64,
    pub ssh_key_ids: Vec<u64>,
    pub private_networking: bool,
}

impl CreateRequest {
    /// Template from fixed machine settings; `name` is filled per attempt
    pub fn template(
        region: impl Into<String>,
        size: impl Into<String>,
        image_id: u64,
        ssh_key_ids: Vec<u64>,
        private_networking: bool,
    ) -> Self {
        Self {
            name: String::new(),
            region: region.into(),
            size: size.into(),
            image_id,
            ssh_key_ids,
            private_networking,
        }
    }

    pub fn named(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

/// Instance inventory and lifecycle operations
#[async_trait]
pub trait Provider: Send + Sync {
    /// Every instance on the account
    async fn list_instances(&self) -> Result<Vec<Instance>, ProvisioningError>;

    /// Request a new instance; an existing instance with the same name is a `NameConflict`
    async fn create_instance(&self, request: &CreateRequest) -> Result<Instance, ProvisioningError>;

    /// Current state of one instance
    async fn get_instance(&self, id: u64) -> Result<Instance, ProvisioningError>;
}
