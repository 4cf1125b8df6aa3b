//! Scale-out attempt state machine
//!
//! `Requested -> Polling -> {Active | TimedOut | Failed}`. One controller
//! call drives one attempt to a terminal state; nothing is retried here and
//! a created instance is never deleted, whatever happens after creation.

use super::identity::next_worker_for;
use super::provider::{CreateRequest, Provider};
use super::registration::{HostRegistry, NodeBootstrapper};
use crate::clock::Clock;
use crate::error::ProvisioningError;
use crate::observability::StructuredLogger;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStatus {
    Requested,
    Polling,
    Active,
    TimedOut,
    Failed,
}

/// Progress of one scale-out attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisioningAttempt {
    /// Allocated once the inventory has been read
    pub worker_name: Option<String>,
    /// Provider id, set once creation succeeded
    pub external_id: Option<u64>,
    pub status: ProvisioningStatus,
    /// Status checks performed while polling
    pub retries_used: u32,
}

impl ProvisioningAttempt {
    fn new() -> Self {
        Self {
            worker_name: None,
            external_id: None,
            status: ProvisioningStatus::Requested,
            retries_used: 0,
        }
    }
}

/// How an attempt ended
#[derive(Debug)]
pub enum ProvisioningOutcome {
    /// Active, registered in the inventory and bootstrapped
    Completed { address: String },
    /// Active, but registration or bootstrap failed; the instance is left running
    JoinFailed(ProvisioningError),
    /// Attempt budget spent without an active status
    TimedOut(ProvisioningError),
    /// Inventory, creation or a status check failed
    Failed(ProvisioningError),
    /// Shutdown arrived while waiting on the provider; the instance state is unknown
    Cancelled,
}

impl ProvisioningOutcome {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            ProvisioningOutcome::Completed { .. } => "completed",
            ProvisioningOutcome::JoinFailed(_) => "join_failed",
            ProvisioningOutcome::TimedOut(_) => "timed_out",
            ProvisioningOutcome::Failed(_) => "failed",
            ProvisioningOutcome::Cancelled => "cancelled",
        }
    }

    pub fn error(&self) -> Option<&ProvisioningError> {
        match self {
            ProvisioningOutcome::JoinFailed(e)
            | ProvisioningOutcome::TimedOut(e)
            | ProvisioningOutcome::Failed(e) => Some(e),
            ProvisioningOutcome::Completed { .. } | ProvisioningOutcome::Cancelled => None,
        }
    }
}

#[derive(Debug)]
pub struct ProvisioningReport {
    pub attempt: ProvisioningAttempt,
    pub outcome: ProvisioningOutcome,
}

/// Polling cadence for one attempt
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub attempt_budget: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            attempt_budget: 10,
        }
    }
}

pub struct ProvisioningController {
    provider: Arc<dyn Provider>,
    registry: HostRegistry,
    bootstrapper: Arc<dyn NodeBootstrapper>,
    clock: Arc<dyn Clock>,
    template: CreateRequest,
    poll: PollSettings,
    logger: StructuredLogger,
}

impl ProvisioningController {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: HostRegistry,
        bootstrapper: Arc<dyn NodeBootstrapper>,
        clock: Arc<dyn Clock>,
        template: CreateRequest,
    ) -> Self {
        Self {
            provider,
            registry,
            bootstrapper,
            clock,
            template,
            poll: PollSettings::default(),
            logger: StructuredLogger::new("provisioner"),
        }
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    fn transition(&self, attempt: &mut ProvisioningAttempt, to: ProvisioningStatus) {
        let from = attempt.status;
        attempt.status = to;
        self.logger.log_transition(attempt, from);
    }

    fn fail(
        &self,
        mut attempt: ProvisioningAttempt,
        error: ProvisioningError,
    ) -> ProvisioningReport {
        self.transition(&mut attempt, ProvisioningStatus::Failed);
        ProvisioningReport {
            attempt,
            outcome: ProvisioningOutcome::Failed(error),
        }
    }

    /// Run one attempt to a terminal state, or until `shutdown` fires while waiting
    pub async fn provision(&self, shutdown: &mut broadcast::Receiver<()>) -> ProvisioningReport {
        let mut attempt = ProvisioningAttempt::new();

        // Requested
        let inventory = match self.provider.list_instances().await {
            Ok(instances) => instances,
            Err(e) => return self.fail(attempt, e),
        };
        let worker_name = match next_worker_for(&inventory) {
            Ok(name) => name,
            Err(e) => return self.fail(attempt, e),
        };
        attempt.worker_name = Some(worker_name.clone());

        let created = match self
            .provider
            .create_instance(&self.template.named(worker_name.as_str()))
            .await
        {
            Ok(instance) => instance,
            Err(e) => return self.fail(attempt, e),
        };
        attempt.external_id = Some(created.id);
        self.transition(&mut attempt, ProvisioningStatus::Polling);

        // Polling
        let mut active = None;
        for check in 1..=self.poll.attempt_budget {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    warn!(
                        worker = %worker_name,
                        external_id = created.id,
                        retries_used = attempt.retries_used,
                        "shutdown while polling; instance status unresolved"
                    );
                    return ProvisioningReport {
                        attempt,
                        outcome: ProvisioningOutcome::Cancelled,
                    };
                }
                _ = self.clock.sleep(self.poll.interval) => {}
            }

            attempt.retries_used = check;
            match self.provider.get_instance(created.id).await {
                Ok(instance) if instance.is_active() => {
                    active = Some(instance);
                    break;
                }
                Ok(_) => {}
                Err(e) => return self.fail(attempt, e),
            }
        }

        let Some(instance) = active else {
            self.transition(&mut attempt, ProvisioningStatus::TimedOut);
            let error = ProvisioningError::TimedOut {
                external_id: created.id,
                attempts: attempt.retries_used,
            };
            return ProvisioningReport {
                attempt,
                outcome: ProvisioningOutcome::TimedOut(error),
            };
        };
        self.transition(&mut attempt, ProvisioningStatus::Active);

        // Active
        let outcome = match self.join(&worker_name, instance.public_ipv4).await {
            Ok(address) => {
                self.logger.log_worker_registered(&worker_name, &address);
                ProvisioningOutcome::Completed { address }
            }
            Err(e) => {
                warn!(
                    worker = %worker_name,
                    external_id = created.id,
                    error = %e,
                    "instance is active but did not join the cluster; manual cleanup required"
                );
                ProvisioningOutcome::JoinFailed(e)
            }
        };

        ProvisioningReport { attempt, outcome }
    }

    async fn join(
        &self,
        worker_name: &str,
        address: Option<String>,
    ) -> Result<String, ProvisioningError> {
        let address = address.ok_or_else(|| {
            ProvisioningError::Registration(format!("{} has no public IPv4 address", worker_name))
        })?;

        self.registry.register(worker_name, &address).await?;
        self.bootstrapper.bootstrap(worker_name).await?;
        Ok(address)
    }
}
