//! Core data models for the autoscaler

use serde::{Deserialize, Serialize};

/// Length of one rollup bucket in seconds
pub const HOUR_SECS: i64 = 3600;

/// Start of the hour bucket containing `timestamp`
pub fn hour_start(timestamp: i64) -> i64 {
    timestamp.div_euclid(HOUR_SECS) * HOUR_SECS
}

/// Last second that still belongs to the bucket starting at `hour_start`
pub fn hour_end(hour_start: i64) -> i64 {
    hour_start + HOUR_SECS - 1
}

/// Instant usage reading for one resource, normalized to cores and GiB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub resource_name: String,
    pub timestamp: i64,
    pub cpu_value: f64,
    pub memory_value: f64,
}

impl Sample {
    pub fn new(
        resource_name: impl Into<String>,
        timestamp: i64,
        cpu_value: f64,
        memory_value: f64,
    ) -> Self {
        Self {
            resource_name: resource_name.into(),
            timestamp,
            cpu_value,
            memory_value,
        }
    }
}

/// Mean usage of one resource over one hour bucket.
///
/// `timestamp` is always hour aligned. The store keeps at most one row per
/// `(resource_name, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyRollup {
    pub resource_name: String,
    pub timestamp: i64,
    pub cpu_value: f64,
    pub memory_value: f64,
}

impl HourlyRollup {
    /// Average a group of samples into the bucket starting at `hour_start`.
    ///
    /// Returns `None` for an empty group.
    pub fn from_samples(
        resource_name: impl Into<String>,
        hour_start: i64,
        samples: &[Sample],
    ) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let count = samples.len() as f64;
        let (cpu_total, memory_total) = samples
            .iter()
            .fold((0.0, 0.0), |(cpu, mem), s| (cpu + s.cpu_value, mem + s.memory_value));

        Some(Self {
            resource_name: resource_name.into(),
            timestamp: hour_start,
            cpu_value: cpu_total / count,
            memory_value: memory_total / count,
        })
    }
}

/// Kind of cluster resource reported by the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pod,
    Node,
}

/// Named resource discovered from the cluster inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub kind: ResourceKind,
}

/// Cluster-wide capacity and usage at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub total_cpu: f64,
    pub total_memory: f64,
    pub used_cpu: f64,
    pub used_memory: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hour_bucket_alignment() {
        assert_eq!(hour_start(7199), 3600);
        assert_eq!(hour_start(7200), 7200);
        assert_eq!(hour_start(0), 0);
        assert_eq!(hour_end(3600), 7199);
    }

    #[test]
    fn test_rollup_is_unweighted_mean() {
        let samples = vec![
            Sample::new("etcd-master", 3601, 1.0, 1.0),
            Sample::new("etcd-master", 3602, 2.0, 2.0),
        ];

        let rollup = HourlyRollup::from_samples("etcd-master", 3600, &samples).unwrap();
        assert_eq!(rollup.timestamp, 3600);
        assert_eq!(rollup.cpu_value, 1.5);
        assert_eq!(rollup.memory_value, 1.5);
    }

    #[test]
    fn test_rollup_of_nothing() {
        assert!(HourlyRollup::from_samples("idle", 0, &[]).is_none());
    }

    #[test]
    fn test_resource_kind_serialization() {
        let json = serde_json::to_string(&ResourceKind::Node).unwrap();
        assert_eq!(json, "\"node\"");
    }
}
