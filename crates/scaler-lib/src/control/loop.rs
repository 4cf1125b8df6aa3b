//! Autoscaler control loop
//!
//! One cycle runs ingestion, rollup and flush, a capacity snapshot, the
//! scale-out decision and, when it fires, a full provisioning attempt. Steps
//! run strictly in order and the next tick waits for the cycle to finish.

use crate::clock::Clock;
use crate::error::{ConfigError, ScalerError, StoreError};
use crate::health::{components, HealthRegistry};
use crate::metrics::{CompactionReport, IngestReport, Ingestor, MetricsSource, RollupEngine};
use crate::models::CapacitySnapshot;
use crate::observability::{ScalerMetrics, StructuredLogger};
use crate::provisioning::{ProvisioningController, ProvisioningOutcome, ProvisioningReport};
use crate::scaling::{CapacityModel, ScaleDecision, ScalingPolicy};
use crate::store::SampleStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Time between cycle starts (default: 30 seconds)
    pub interval: Duration,
    pub policy: ScalingPolicy,
    /// When false, decisions are logged but never acted on
    pub scaling_enabled: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            policy: ScalingPolicy::default(),
            scaling_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepError {
    pub step: &'static str,
    pub message: String,
}

/// What one cycle did
#[derive(Debug, Default)]
pub struct CycleReport {
    pub ingest: Option<IngestReport>,
    pub compaction: Option<CompactionReport>,
    pub snapshot: Option<CapacitySnapshot>,
    pub decision: Option<ScaleDecision>,
    pub provisioning: Option<ProvisioningReport>,
    pub errors: Vec<StepError>,
}

impl CycleReport {
    /// Shutdown interrupted a provisioning attempt
    pub fn cancelled(&self) -> bool {
        matches!(
            self.provisioning,
            Some(ProvisioningReport {
                outcome: ProvisioningOutcome::Cancelled,
                ..
            })
        )
    }
}

pub struct ControlLoop {
    ingestor: Ingestor,
    engine: Arc<RollupEngine>,
    capacity: CapacityModel,
    provisioner: Option<ProvisioningController>,
    clock: Arc<dyn Clock>,
    config: ControlConfig,
    health: HealthRegistry,
    metrics: ScalerMetrics,
    logger: StructuredLogger,
}

impl ControlLoop {
    pub fn new(
        source: Arc<dyn MetricsSource>,
        store: Arc<dyn SampleStore>,
        clock: Arc<dyn Clock>,
        config: ControlConfig,
    ) -> Self {
        let engine = Arc::new(RollupEngine::new(store));
        Self {
            ingestor: Ingestor::new(source.clone(), engine.clone()),
            engine,
            capacity: CapacityModel::new(source),
            provisioner: None,
            clock,
            config,
            health: HealthRegistry::new(),
            metrics: ScalerMetrics::new(),
            logger: StructuredLogger::new("node-autoscaler"),
        }
    }

    /// Run cycles until `shutdown` fires
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            scaling_enabled = self.config.scaling_enabled,
            "Starting control loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => {
                    info!("Shutting down control loop");
                    break;
                }
            }

            let report = self.run_cycle(&mut shutdown).await;
            if report.cancelled() {
                info!("Shutting down control loop during provisioning");
                break;
            }
        }
    }

    /// One full cycle; step failures are recorded, never returned
    pub async fn run_cycle(&self, shutdown: &mut broadcast::Receiver<()>) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        self.cycle(&mut report, shutdown).await;

        let elapsed = started.elapsed();
        self.metrics.observe_cycle_latency(elapsed.as_secs_f64());
        debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            errors = report.errors.len(),
            decision = ?report.decision,
            "Control cycle complete"
        );
        report
    }

    async fn cycle(&self, report: &mut CycleReport, shutdown: &mut broadcast::Receiver<()>) {
        let now = self.clock.now();

        match self.ingestor.ingest(now).await {
            Ok(ingest) => {
                self.metrics.record_ingest(ingest.inserted, ingest.duplicates);
                self.health.set_healthy(components::INGESTION).await;
                report.ingest = Some(ingest);
            }
            Err(ScalerError::Store(e)) => {
                self.step_failed(report, components::INGESTION, &e).await;
                self.store_failed(&e).await;
                return;
            }
            Err(e) => self.step_failed(report, components::INGESTION, &e).await,
        }

        match self.engine.compact(now).await {
            Ok(compaction) => {
                self.metrics
                    .record_compaction(compaction.rollup.written, compaction.flushed);
                self.health.set_healthy(components::ROLLUP).await;
                self.health.set_healthy(components::STORE).await;
                report.compaction = Some(compaction);
            }
            Err(e) => {
                self.step_failed(report, components::ROLLUP, &e).await;
                self.store_failed(&e).await;
                return;
            }
        }

        let snapshot = match self.capacity.snapshot(now).await {
            Ok(snapshot) => {
                self.health.set_healthy(components::CAPACITY).await;
                snapshot
            }
            Err(e) => {
                self.step_failed(report, components::CAPACITY, &e).await;
                return;
            }
        };
        self.metrics.set_capacity(&snapshot);
        report.snapshot = Some(snapshot);

        let decision = self.config.policy.decide(&snapshot);
        self.logger.log_decision(&snapshot, decision);
        report.decision = Some(decision);

        if decision != ScaleDecision::ScaleOut {
            return;
        }

        let provisioner = match &self.provisioner {
            Some(p) if self.config.scaling_enabled => p,
            _ => {
                info!("Scale-out indicated but scaling is disabled");
                return;
            }
        };

        let attempt = provisioner.provision(shutdown).await;
        self.metrics.inc_provisioning_attempt(attempt.outcome.label());
        match attempt.outcome.error() {
            Some(e) => {
                self.logger.log_cycle_failure(components::PROVISIONER, e);
                self.metrics.inc_cycle_error(components::PROVISIONER);
                self.health
                    .set_degraded(components::PROVISIONER, e.to_string())
                    .await;
                report.errors.push(StepError {
                    step: components::PROVISIONER,
                    message: e.to_string(),
                });
            }
            None => self.health.set_healthy(components::PROVISIONER).await,
        }
        report.provisioning = Some(attempt);
    }

    async fn step_failed(
        &self,
        report: &mut CycleReport,
        step: &'static str,
        error: &(dyn std::fmt::Display + Sync),
    ) {
        self.logger.log_cycle_failure(step, error);
        self.metrics.inc_cycle_error(step);
        self.health.set_degraded(step, error.to_string()).await;
        report.errors.push(StepError {
            step,
            message: error.to_string(),
        });
    }

    async fn store_failed(&self, error: &StoreError) {
        self.health
            .set_unhealthy(components::STORE, error.to_string())
            .await;
    }
}

/// Builder for the control loop
pub struct ControlLoopBuilder {
    source: Option<Arc<dyn MetricsSource>>,
    store: Option<Arc<dyn SampleStore>>,
    clock: Option<Arc<dyn Clock>>,
    provisioner: Option<ProvisioningController>,
    config: ControlConfig,
    health: HealthRegistry,
    metrics: ScalerMetrics,
    logger: StructuredLogger,
}

impl ControlLoopBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            store: None,
            clock: None,
            provisioner: None,
            config: ControlConfig::default(),
            health: HealthRegistry::new(),
            metrics: ScalerMetrics::new(),
            logger: StructuredLogger::new("node-autoscaler"),
        }
    }

    pub fn source(mut self, source: Arc<dyn MetricsSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn store(mut self, store: Arc<dyn SampleStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn provisioner(mut self, provisioner: ProvisioningController) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn policy(mut self, policy: ScalingPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn scaling_enabled(mut self, enabled: bool) -> Self {
        self.config.scaling_enabled = enabled;
        self
    }

    /// Registry shared with the HTTP probes
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn metrics(mut self, metrics: ScalerMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> Result<ControlLoop, ConfigError> {
        let source = self
            .source
            .ok_or_else(|| ConfigError("metrics source is required".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| ConfigError("sample store is required".to_string()))?;
        let clock = self
            .clock
            .ok_or_else(|| ConfigError("clock is required".to_string()))?;

        let mut control = ControlLoop::new(source, store, clock, self.config);
        control.provisioner = self.provisioner;
        control.health = self.health;
        control.metrics = self.metrics;
        control.logger = self.logger;
        Ok(control)
    }
}

impl Default for ControlLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
