//! Cluster capacity inferred from node names.
//!
//! Totals are a naming convention, not a machine size lookup: a node whose
//! name contains `worker` counts as one unit of CPU and memory, otherwise a
//! name containing `master` counts as two. Any other node adds usage but no
//! capacity.

use crate::error::SourceError;
use crate::metrics::MetricsSource;
use crate::models::{CapacitySnapshot, Sample};
use std::sync::Arc;
use tracing::debug;

const WORKER_UNITS: f64 = 1.0;
const MASTER_UNITS: f64 = 2.0;

/// Capacity units contributed by a node with this name
pub fn capacity_units(node_name: &str) -> f64 {
    if node_name.contains("worker") {
        WORKER_UNITS
    } else if node_name.contains("master") {
        MASTER_UNITS
    } else {
        0.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Fold normalized node samples into a snapshot
pub fn summarize(nodes: &[Sample]) -> CapacitySnapshot {
    let mut snapshot = nodes
        .iter()
        .fold(CapacitySnapshot::default(), |mut acc, node| {
            let units = capacity_units(&node.resource_name);
            acc.total_cpu += units;
            acc.total_memory += units;
            acc.used_cpu += node.cpu_value;
            acc.used_memory += node.memory_value;
            acc
        });

    snapshot.used_cpu = round2(snapshot.used_cpu);
    snapshot.used_memory = round2(snapshot.used_memory);
    snapshot
}

/// Reads current node usage and derives cluster capacity
pub struct CapacityModel {
    source: Arc<dyn MetricsSource>,
}

impl CapacityModel {
    pub fn new(source: Arc<dyn MetricsSource>) -> Self {
        Self { source }
    }

    /// Current totals and usage; performs no writes
    pub async fn snapshot(&self, now: i64) -> Result<CapacitySnapshot, SourceError> {
        let nodes = self.source.node_samples(now).await?;
        let snapshot = summarize(&nodes);

        debug!(
            nodes = nodes.len(),
            total_cpu = snapshot.total_cpu,
            used_cpu = snapshot.used_cpu,
            total_memory = snapshot.total_memory,
            used_memory = snapshot.used_memory,
            "capacity snapshot"
        );
        Ok(snapshot)
    }
}
