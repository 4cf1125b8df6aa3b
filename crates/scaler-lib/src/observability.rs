//! Prometheus metrics and named log events for the autoscaler

use crate::models::CapacitySnapshot;
use crate::provisioning::{ProvisioningAttempt, ProvisioningStatus};
use crate::scaling::ScaleDecision;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Cycle latency buckets in seconds; a provisioning cycle can run for minutes
const CYCLE_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 180.0, 600.0,
];

static GLOBAL_METRICS: OnceLock<ScalerMetricsInner> = OnceLock::new();

struct ScalerMetricsInner {
    samples_ingested: IntCounter,
    duplicate_samples: IntCounter,
    rollups_written: IntCounter,
    samples_flushed: IntCounter,
    cycle_latency_seconds: Histogram,
    cycle_errors: IntCounterVec,
    cluster_cpu_cores: GaugeVec,
    cluster_memory_gib: GaugeVec,
    provisioning_attempts: IntCounterVec,
}

impl ScalerMetricsInner {
    fn new() -> Self {
        Self {
            samples_ingested: register_int_counter!(
                "node_autoscaler_samples_ingested_total",
                "Usage samples written to the transient bucket"
            )
            .expect("Failed to register samples_ingested"),

            duplicate_samples: register_int_counter!(
                "node_autoscaler_duplicate_samples_total",
                "Samples skipped because their key was already recorded"
            )
            .expect("Failed to register duplicate_samples"),

            rollups_written: register_int_counter!(
                "node_autoscaler_rollups_written_total",
                "Hourly rollups written to the durable bucket"
            )
            .expect("Failed to register rollups_written"),

            samples_flushed: register_int_counter!(
                "node_autoscaler_samples_flushed_total",
                "Transient samples removed by retention"
            )
            .expect("Failed to register samples_flushed"),

            cycle_latency_seconds: register_histogram!(
                "node_autoscaler_cycle_latency_seconds",
                "Duration of one control loop cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            cycle_errors: register_int_counter_vec!(
                "node_autoscaler_cycle_errors_total",
                "Control loop step failures",
                &["step"]
            )
            .expect("Failed to register cycle_errors"),

            cluster_cpu_cores: register_gauge_vec!(
                "node_autoscaler_cluster_cpu_cores",
                "Cluster CPU from the last capacity snapshot",
                &["kind"]
            )
            .expect("Failed to register cluster_cpu_cores"),

            cluster_memory_gib: register_gauge_vec!(
                "node_autoscaler_cluster_memory_gib",
                "Cluster memory from the last capacity snapshot",
                &["kind"]
            )
            .expect("Failed to register cluster_memory_gib"),

            provisioning_attempts: register_int_counter_vec!(
                "node_autoscaler_provisioning_attempts_total",
                "Scale-out attempts by terminal outcome",
                &["outcome"]
            )
            .expect("Failed to register provisioning_attempts"),
        }
    }
}

/// Handle to the process-wide autoscaler metrics; clones share one registry entry
#[derive(Clone)]
pub struct ScalerMetrics {
    _private: (),
}

impl Default for ScalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScalerMetricsInner {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new)
    }

    pub fn record_ingest(&self, inserted: usize, duplicates: usize) {
        self.inner().samples_ingested.inc_by(inserted as u64);
        self.inner().duplicate_samples.inc_by(duplicates as u64);
    }

    pub fn record_compaction(&self, rollups_written: usize, samples_flushed: usize) {
        self.inner().rollups_written.inc_by(rollups_written as u64);
        self.inner().samples_flushed.inc_by(samples_flushed as u64);
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    pub fn inc_cycle_error(&self, step: &str) {
        self.inner().cycle_errors.with_label_values(&[step]).inc();
    }

    pub fn set_capacity(&self, snapshot: &CapacitySnapshot) {
        let inner = self.inner();
        inner.cluster_cpu_cores.with_label_values(&["used"]).set(snapshot.used_cpu);
        inner.cluster_cpu_cores.with_label_values(&["total"]).set(snapshot.total_cpu);
        inner.cluster_memory_gib.with_label_values(&["used"]).set(snapshot.used_memory);
        inner.cluster_memory_gib.with_label_values(&["total"]).set(snapshot.total_memory);
    }

    pub fn inc_provisioning_attempt(&self, outcome: &str) {
        self.inner()
            .provisioning_attempts
            .with_label_values(&[outcome])
            .inc();
    }
}

/// Named autoscaler events on top of `tracing`
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, scaling_enabled: bool) {
        info!(
            event = "autoscaler_started",
            instance = %self.instance,
            version = %version,
            scaling_enabled = scaling_enabled,
            "Node autoscaler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "autoscaler_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Node autoscaler shutting down"
        );
    }

    pub fn log_decision(&self, snapshot: &CapacitySnapshot, decision: ScaleDecision) {
        info!(
            event = "scale_decision",
            instance = %self.instance,
            decision = ?decision,
            used_cpu = snapshot.used_cpu,
            total_cpu = snapshot.total_cpu,
            used_memory = snapshot.used_memory,
            total_memory = snapshot.total_memory,
            "Evaluated cluster pressure"
        );
    }

    pub fn log_transition(&self, attempt: &ProvisioningAttempt, from: ProvisioningStatus) {
        let unsuccessful = matches!(
            attempt.status,
            ProvisioningStatus::Failed | ProvisioningStatus::TimedOut
        );
        if unsuccessful {
            warn!(
                event = "provisioning_transition",
                instance = %self.instance,
                worker = ?attempt.worker_name,
                external_id = ?attempt.external_id,
                from = ?from,
                to = ?attempt.status,
                retries_used = attempt.retries_used,
                "Provisioning attempt ended without an active instance"
            );
        } else {
            info!(
                event = "provisioning_transition",
                instance = %self.instance,
                worker = ?attempt.worker_name,
                external_id = ?attempt.external_id,
                from = ?from,
                to = ?attempt.status,
                retries_used = attempt.retries_used,
                "Provisioning attempt advanced"
            );
        }
    }

    pub fn log_worker_registered(&self, worker: &str, address: &str) {
        info!(
            event = "worker_registered",
            instance = %self.instance,
            worker = %worker,
            address = %address,
            "Worker joined the cluster"
        );
    }

    pub fn log_cycle_failure(&self, step: &str, error: &dyn std::fmt::Display) {
        warn!(
            event = "cycle_failed",
            instance = %self.instance,
            step = %step,
            error = %error,
            "Control loop step failed"
        );
    }
}
