//! Synthetic hourly history for a fresh store
//!
//! Every discovered resource gets one rollup per hour ending at the last
//! closed hour. Writes go through [`RollupEngine::record_rollup`], so
//! re-running a backfill never overwrites real rollups.

use crate::error::ScalerResult;
use crate::metrics::{MetricsSource, RollupEngine};
use crate::models::{hour_start, HourlyRollup, HOUR_SECS};
use rand::Rng;
use std::sync::Arc;
use tracing::info;

/// Two weeks of hourly points
pub const DEFAULT_BACKFILL_HOURS: u32 = 14 * 24;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillReport {
    pub resources: usize,
    pub written: usize,
    pub already_present: usize,
}

/// Random usage in cores, `[0, 1)`
pub fn synthetic_cpu<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen::<f64>()
}

/// Random usage in GiB, `[0, 2)` in steps of 0.01
pub fn synthetic_memory<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let whole = rng.gen_range(0..2) as f64;
    let hundredths = rng.gen_range(0..100) as f64 / 100.0;
    whole + hundredths
}

/// Hour buckets covered by a backfill of `hours` ending at the last closed hour
pub fn backfill_hours(now: i64, hours: u32) -> Vec<i64> {
    let last_closed = hour_start(now) - HOUR_SECS;
    (0..=i64::from(hours))
        .rev()
        .map(|back| last_closed - back * HOUR_SECS)
        .collect()
}

pub struct Backfill {
    source: Arc<dyn MetricsSource>,
    engine: Arc<RollupEngine>,
}

impl Backfill {
    pub fn new(source: Arc<dyn MetricsSource>, engine: Arc<RollupEngine>) -> Self {
        Self { source, engine }
    }

    pub async fn run<R: Rng + Send>(
        &self,
        now: i64,
        hours: u32,
        rng: &mut R,
    ) -> ScalerResult<BackfillReport> {
        let resources = self.source.list_resources().await?;
        let buckets = backfill_hours(now, hours);

        let mut report = BackfillReport {
            resources: resources.len(),
            ..Default::default()
        };

        for resource in &resources {
            for &hour in &buckets {
                let rollup = HourlyRollup {
                    resource_name: resource.name.clone(),
                    timestamp: hour,
                    cpu_value: synthetic_cpu(rng),
                    memory_value: synthetic_memory(rng),
                };

                if self.engine.record_rollup(&rollup).await? {
                    report.written += 1;
                } else {
                    report.already_present += 1;
                }
            }
        }

        info!(
            resources = report.resources,
            hours = buckets.len(),
            written = report.written,
            already_present = report.already_present,
            "backfill complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{RedbSampleStore, SampleStore};
    use crate::testing::FakeSource;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const NOW: i64 = 1_700_000_000;

    fn setup(source: FakeSource) -> (Arc<RedbSampleStore>, Backfill) {
        let store = Arc::new(RedbSampleStore::open_in_memory().unwrap());
        let engine = Arc::new(RollupEngine::new(store.clone()));
        (store, Backfill::new(Arc::new(source), engine))
    }

    #[test]
    fn test_hours_end_at_last_closed_hour() {
        let hours = backfill_hours(NOW, 3);
        let last_closed = hour_start(NOW) - HOUR_SECS;

        assert_eq!(hours.len(), 4);
        assert_eq!(hours.last(), Some(&last_closed));
        assert_eq!(hours[0], last_closed - 3 * HOUR_SECS);
        assert!(hours.windows(2).all(|w| w[1] - w[0] == HOUR_SECS));
    }

    #[test]
    fn test_default_span_is_two_weeks() {
        assert_eq!(backfill_hours(NOW, DEFAULT_BACKFILL_HOURS).len(), 337);
    }

    #[test]
    fn test_synthetic_values_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let cpu = synthetic_cpu(&mut rng);
            assert!((0.0..1.0).contains(&cpu));

            let mem = synthetic_memory(&mut rng);
            assert!((0.0..2.0).contains(&mem));
            assert!(((mem * 100.0).round() - mem * 100.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_backfill_every_resource() {
        let (store, backfill) = setup(
            FakeSource::with_nodes(vec![("master", 0.0, 0.0)])
                .with_pods(vec![("etcd-master", 0.0, 0.0)]),
        );
        let mut rng = StdRng::seed_from_u64(1);

        let report = backfill.run(NOW, 24, &mut rng).await.unwrap();

        assert_eq!(report.resources, 2);
        assert_eq!(report.written, 50);
        for name in ["master", "etcd-master"] {
            let rows = store.rollups_for(name, 0, NOW).await.unwrap();
            assert_eq!(rows.len(), 25);
        }
    }

    #[tokio::test]
    async fn test_backfill_keeps_existing_rollups() {
        let (store, backfill) = setup(FakeSource::with_nodes(vec![("master", 0.0, 0.0)]));
        let last_closed = hour_start(NOW) - HOUR_SECS;
        store
            .insert_rollup(&HourlyRollup {
                resource_name: "master".to_string(),
                timestamp: last_closed,
                cpu_value: 42.0,
                memory_value: 42.0,
            })
            .await
            .unwrap();
        let mut rng = StdRng::seed_from_u64(2);

        let report = backfill.run(NOW, 2, &mut rng).await.unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.already_present, 1);
        let rows = store.rollups_for("master", last_closed, last_closed).await.unwrap();
        assert_eq!(rows[0].cpu_value, 42.0);
    }

    #[tokio::test]
    async fn test_backfill_fails_when_inventory_unavailable() {
        let source = FakeSource::with_nodes(vec![("master", 0.0, 0.0)]);
        source.set_failing(true);
        let (store, backfill) = setup(source);
        let mut rng = StdRng::seed_from_u64(3);

        assert!(backfill.run(NOW, 2, &mut rng).await.is_err());
        assert!(store.rollups_for("master", 0, NOW).await.unwrap().is_empty());
    }
}
