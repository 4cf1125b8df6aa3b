//! Hourly rollup of transient samples
//!
//! Ordering constraint: transient samples for an hour may only be flushed
//! after that hour has been rolled up, otherwise they are lost for good.
//! [`RollupEngine::compact`] is the only place that calls `flush` in the
//! daemon and it does so strictly after a successful rollup pass.

use crate::error::{StoreError, StoreResult};
use crate::models::{hour_end, hour_start, HourlyRollup, Sample};
use crate::store::SampleStore;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of rolling up one or more hours
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RollupReport {
    /// Hour buckets processed
    pub hours: Vec<i64>,
    /// Rollup rows newly written
    pub written: usize,
    /// Rollup rows that already existed and were left untouched
    pub already_present: usize,
}

impl RollupReport {
    fn merge(&mut self, other: RollupReport) {
        self.hours.extend(other.hours);
        self.written += other.written;
        self.already_present += other.already_present;
    }
}

/// Result of a full rollup-then-flush pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    pub rollup: RollupReport,
    pub flushed: usize,
    pub cutoff: i64,
}

/// Owns the transient and durable buckets of the sample store
pub struct RollupEngine {
    store: Arc<dyn SampleStore>,
}

impl RollupEngine {
    pub fn new(store: Arc<dyn SampleStore>) -> Self {
        Self { store }
    }

    /// Record an instant sample in the transient bucket.
    ///
    /// A repeated `(resource_name, timestamp)` fails with
    /// `StoreError::DuplicateKey`; callers treat that as already recorded.
    pub async fn ingest(&self, sample: &Sample) -> StoreResult<()> {
        self.store.insert_sample(sample).await
    }

    /// Roll up every resource's samples in the hour starting at `hour`.
    ///
    /// Safe to re-run: rows that already exist are left as they are.
    pub async fn rollup(&self, hour: i64) -> StoreResult<RollupReport> {
        let hour = hour_start(hour);
        let samples = self.store.samples_between(hour, hour_end(hour)).await?;

        let mut by_resource: BTreeMap<String, Vec<Sample>> = BTreeMap::new();
        for sample in samples {
            by_resource
                .entry(sample.resource_name.clone())
                .or_default()
                .push(sample);
        }

        let mut report = RollupReport {
            hours: vec![hour],
            ..Default::default()
        };

        for (name, group) in by_resource {
            let Some(rollup) = HourlyRollup::from_samples(name, hour, &group) else {
                continue;
            };

            if self.record_rollup(&rollup).await? {
                report.written += 1;
            } else {
                report.already_present += 1;
            }
        }

        debug!(
            hour,
            written = report.written,
            already_present = report.already_present,
            "hourly rollup complete"
        );
        Ok(report)
    }

    /// Write one durable rollup; `false` when a row for that key already exists
    pub async fn record_rollup(&self, rollup: &HourlyRollup) -> StoreResult<bool> {
        match self.store.insert_rollup(rollup).await {
            Ok(()) => Ok(true),
            Err(StoreError::DuplicateKey { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete transient samples with `timestamp <= cutoff`.
    ///
    /// Only call this for hours that have already been rolled up.
    pub async fn flush(&self, cutoff: i64) -> StoreResult<usize> {
        self.store.delete_samples_through(cutoff).await
    }

    /// Roll up every closed hour still present in the transient bucket.
    ///
    /// An hour is closed once `now` has moved past its last second.
    pub async fn rollup_closed_hours(&self, now: i64) -> StoreResult<RollupReport> {
        let open_hour = hour_start(now);
        let pending = self.store.samples_between(i64::MIN, open_hour - 1).await?;
        let hours: BTreeSet<i64> = pending.iter().map(|s| hour_start(s.timestamp)).collect();

        let mut report = RollupReport::default();
        for hour in hours {
            report.merge(self.rollup(hour).await?);
        }
        Ok(report)
    }

    /// Roll up all closed hours, then flush everything before the open hour
    pub async fn compact(&self, now: i64) -> StoreResult<CompactionReport> {
        let rollup = self.rollup_closed_hours(now).await?;

        let cutoff = hour_start(now) - 1;
        let flushed = self.flush(cutoff).await?;

        if !rollup.hours.is_empty() || flushed > 0 {
            info!(
                hours = rollup.hours.len(),
                written = rollup.written,
                flushed,
                cutoff,
                "compacted transient samples"
            );
        }

        Ok(CompactionReport {
            rollup,
            flushed,
            cutoff,
        })
    }
}
