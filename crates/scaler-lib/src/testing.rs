//! In-process fakes for the external collaborators

use crate::clock::Clock;
use crate::error::{ProvisioningError, SourceError};
use crate::metrics::MetricsSource;
use crate::models::{Resource, ResourceKind, Sample};
use crate::provisioning::{CreateRequest, Instance, NodeBootstrapper, Provider};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Usage reading without a timestamp: `(name, cpu cores, memory GiB)`
pub type Reading = (&'static str, f64, f64);

/// Metrics source serving fixed readings
#[derive(Default)]
pub struct FakeSource {
    pub nodes: Mutex<Vec<Reading>>,
    pub pods: Mutex<Vec<Reading>>,
    pub failing: AtomicBool,
    pub node_calls: AtomicUsize,
}

impl FakeSource {
    pub fn with_nodes(nodes: Vec<Reading>) -> Self {
        Self {
            nodes: Mutex::new(nodes),
            ..Default::default()
        }
    }

    pub fn with_pods(self, pods: Vec<Reading>) -> Self {
        *self.pods.lock().unwrap() = pods;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn stamp(readings: &[Reading], timestamp: i64) -> Vec<Sample> {
        readings
            .iter()
            .map(|(name, cpu, mem)| Sample::new(*name, timestamp, *cpu, *mem))
            .collect()
    }

    fn check(&self) -> Result<(), SourceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::fetch("fake://metrics", "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsSource for FakeSource {
    async fn list_resources(&self) -> Result<Vec<Resource>, SourceError> {
        self.check()?;
        let tag = |readings: &[Reading], kind: ResourceKind| -> Vec<Resource> {
            readings
                .iter()
                .map(|(name, _, _)| Resource {
                    name: name.to_string(),
                    kind,
                })
                .collect()
        };

        let mut resources = tag(&self.pods.lock().unwrap(), ResourceKind::Pod);
        resources.extend(tag(&self.nodes.lock().unwrap(), ResourceKind::Node));
        Ok(resources)
    }

    async fn node_samples(&self, timestamp: i64) -> Result<Vec<Sample>, SourceError> {
        self.node_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(Self::stamp(&self.nodes.lock().unwrap(), timestamp))
    }

    async fn pod_samples(&self, timestamp: i64) -> Result<Vec<Sample>, SourceError> {
        self.check()?;
        Ok(Self::stamp(&self.pods.lock().unwrap(), timestamp))
    }
}

/// Scripted cloud provider.
///
/// Status checks pop from `statuses`; once empty they keep returning
/// `"new"`. A `None` entry simulates a transport failure.
pub struct FakeProvider {
    pub instances: Mutex<Vec<Instance>>,
    pub statuses: Mutex<VecDeque<Option<&'static str>>>,
    pub created: Mutex<Vec<CreateRequest>>,
    pub fail_create: AtomicBool,
    /// Report a name conflict on create even though the name is not listed
    pub conflict: AtomicBool,
    pub status_calls: AtomicUsize,
    pub address: Mutex<Option<String>>,
}

impl FakeProvider {
    pub fn new(existing: &[&str]) -> Self {
        let instances = existing
            .iter()
            .enumerate()
            .map(|(i, name)| Instance {
                id: i as u64 + 1,
                name: name.to_string(),
                status: "active".to_string(),
                public_ipv4: Some(format!("10.0.0.{}", i + 1)),
            })
            .collect();

        Self {
            instances: Mutex::new(instances),
            statuses: Mutex::new(VecDeque::new()),
            created: Mutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
            conflict: AtomicBool::new(false),
            status_calls: AtomicUsize::new(0),
            address: Mutex::new(Some("203.0.113.7".to_string())),
        }
    }

    pub fn with_statuses(self, statuses: Vec<Option<&'static str>>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }
}

#[async_trait]
impl Provider for FakeProvider {
    async fn list_instances(&self) -> Result<Vec<Instance>, ProvisioningError> {
        Ok(self.instances.lock().unwrap().clone())
    }

    async fn create_instance(&self, request: &CreateRequest) -> Result<Instance, ProvisioningError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ProvisioningError::CreateFailed("quota exceeded".to_string()));
        }

        let mut instances = self.instances.lock().unwrap();
        if self.conflict.load(Ordering::SeqCst) || instances.iter().any(|i| i.name == request.name) {
            return Err(ProvisioningError::NameConflict(request.name.clone()));
        }

        let instance = Instance {
            id: 1000 + instances.len() as u64,
            name: request.name.clone(),
            status: "new".to_string(),
            public_ipv4: None,
        };
        instances.push(instance.clone());
        self.created.lock().unwrap().push(request.clone());
        Ok(instance)
    }

    async fn get_instance(&self, id: u64) -> Result<Instance, ProvisioningError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let status = self.statuses.lock().unwrap().pop_front().unwrap_or(Some("new"));
        let Some(status) = status else {
            return Err(ProvisioningError::PollFailed("connection reset".to_string()));
        };

        let mut instances = self.instances.lock().unwrap();
        let instance = instances
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| ProvisioningError::PollFailed(format!("instance {} not found", id)))?;
        instance.status = status.to_string();
        if status == "active" {
            instance.public_ipv4 = self.address.lock().unwrap().clone();
        }
        Ok(instance.clone())
    }
}

/// Bootstrapper that records the workers it was asked to join
#[derive(Default)]
pub struct FakeBootstrapper {
    pub joined: Mutex<Vec<String>>,
    pub failing: AtomicBool,
}

#[async_trait]
impl NodeBootstrapper for FakeBootstrapper {
    async fn bootstrap(&self, worker_name: &str) -> Result<(), ProvisioningError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProvisioningError::Bootstrap(
                "kube-cluster/workers.yml exited with status 2".to_string(),
            ));
        }
        self.joined.lock().unwrap().push(worker_name.to_string());
        Ok(())
    }
}

/// Manually driven clock.
///
/// `sleep` returns immediately, advances the clock and records the
/// requested duration.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    /// Durations passed to `sleep` so far
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        self.advance(duration.as_secs() as i64);
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_records_sleeps() {
        let clock = ManualClock::new(100);
        clock.sleep(Duration::from_secs(15)).await;
        clock.sleep(Duration::from_secs(15)).await;

        assert_eq!(clock.now(), 130);
        assert_eq!(clock.sleeps().len(), 2);
    }
}
