//! Scale-out decision
//!
//! Memory pressure is compared against total memory capacity. Comparing it
//! against total CPU capacity would mix units whenever the two totals
//! diverge.

use crate::models::CapacitySnapshot;
use serde::{Deserialize, Serialize};

/// Outcome of evaluating cluster pressure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDecision {
    /// Provision one more worker
    ScaleOut,
    /// Pressure below both thresholds
    NoAction,
}

/// Fire `ScaleOut` when either resource exceeds its share of capacity
pub fn decide(snapshot: &CapacitySnapshot, cpu_threshold: f64, mem_threshold: f64) -> ScaleDecision {
    let cpu_pressure = snapshot.used_cpu > cpu_threshold * snapshot.total_cpu;
    let mem_pressure = snapshot.used_memory > mem_threshold * snapshot.total_memory;

    if cpu_pressure || mem_pressure {
        ScaleDecision::ScaleOut
    } else {
        ScaleDecision::NoAction
    }
}

/// Configured thresholds, each a fraction of total capacity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingPolicy {
    pub cpu_threshold: f64,
    pub mem_threshold: f64,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self {
            cpu_threshold: 0.5,
            mem_threshold: 0.5,
        }
    }
}

impl ScalingPolicy {
    pub fn new(cpu_threshold: f64, mem_threshold: f64) -> Self {
        Self {
            cpu_threshold,
            mem_threshold,
        }
    }

    pub fn decide(&self, snapshot: &CapacitySnapshot) -> ScaleDecision {
        decide(snapshot, self.cpu_threshold, self.mem_threshold)
    }
}
