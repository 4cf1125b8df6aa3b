//! Component health for the liveness and readiness probes
//!
//! Each control loop step reports into the registry after it runs. A failed
//! step degrades its component and the next success restores it; a store
//! failure marks the store unhealthy because the rest of the cycle cannot
//! run without it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Ordered from best to worst so the cluster status is the maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Last run failed, the loop keeps going
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    /// Liveness still passes
    pub fn is_operational(&self) -> bool {
        *self != ComponentStatus::Unhealthy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failed runs since the last success
    pub consecutive_failures: u32,
    pub updated_at: i64,
}

impl ComponentHealth {
    fn healthy() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            consecutive_failures: 0,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    fn failed(&mut self, status: ComponentStatus, message: String) {
        self.status = status;
        self.message = Some(message);
        self.consecutive_failures += 1;
        self.updated_at = chrono::Utc::now().timestamp();
    }
}

/// Body of `GET /healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Body of `GET /readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names, one per control loop step plus the store
pub mod components {
    pub const INGESTION: &str = "ingestion";
    pub const ROLLUP: &str = "rollup";
    pub const CAPACITY: &str = "capacity";
    pub const PROVISIONER: &str = "provisioner";
    pub const STORE: &str = "store";

    pub const ALL: [&str; 5] = [INGESTION, ROLLUP, CAPACITY, PROVISIONER, STORE];
}

#[derive(Debug, Default)]
struct RegistryState {
    components: BTreeMap<String, ComponentHealth>,
    ready: bool,
}

impl RegistryState {
    fn fail(&mut self, name: &str, status: ComponentStatus, message: String) {
        self.components
            .entry(name.to_string())
            .or_insert_with(ComponentHealth::healthy)
            .failed(status, message);
    }

    fn worst(&self) -> ComponentStatus {
        self.components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Shared between the control loop and the HTTP probes
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start every autoscaler component as healthy
    pub async fn register_all(&self) {
        for name in components::ALL {
            self.set_healthy(name).await;
        }
    }

    pub async fn set_healthy(&self, name: &str) {
        self.state
            .write()
            .await
            .components
            .insert(name.to_string(), ComponentHealth::healthy());
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.state
            .write()
            .await
            .fail(name, ComponentStatus::Degraded, message.into());
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.state
            .write()
            .await
            .fail(name, ComponentStatus::Unhealthy, message.into());
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn status_of(&self, name: &str) -> Option<ComponentStatus> {
        self.state
            .read()
            .await
            .components
            .get(name)
            .map(|c| c.status)
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: state.worst(),
            components: state.components.clone(),
        }
    }

    /// Ready once started, until a component turns unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;

        let reason = if !state.ready {
            Some("Autoscaler not yet initialized".to_string())
        } else {
            state
                .components
                .iter()
                .find(|(_, c)| c.status == ComponentStatus::Unhealthy)
                .map(|(name, _)| format!("{} is unhealthy", name))
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}
