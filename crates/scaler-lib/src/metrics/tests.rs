//! Scenario tests for ingestion, rollup, retention and queries

use super::*;
use crate::models::{hour_start, HourlyRollup, Sample};
use crate::store::{RedbSampleStore, SampleStore};
use crate::testing::{FakeSource, ManualClock};
use std::sync::Arc;

/// 2023-11-14T22:13:20Z, mid-hour
const NOW: i64 = 1_700_000_000;

fn current_hour() -> i64 {
    hour_start(NOW)
}

fn last_hour() -> i64 {
    current_hour() - 3600
}

fn setup() -> (Arc<RedbSampleStore>, RollupEngine) {
    let store = Arc::new(RedbSampleStore::open_in_memory().unwrap());
    let engine = RollupEngine::new(store.clone());
    (store, engine)
}

fn rollup(name: &str, timestamp: i64, cpu: f64, mem: f64) -> HourlyRollup {
    HourlyRollup {
        resource_name: name.to_string(),
        timestamp,
        cpu_value: cpu,
        memory_value: mem,
    }
}

mod rollup_tests {
    use super::*;

    #[tokio::test]
    async fn test_rollup_averages_previous_hour() {
        let (store, engine) = setup();

        for pod in ["etcd-master", "kube-apiserver-master"] {
            for i in 1..=2 {
                engine
                    .ingest(&Sample::new(pod, last_hour() + i, i as f64, i as f64))
                    .await
                    .unwrap();
            }
        }
        engine
            .ingest(&Sample::new("master", last_hour(), 2.0, 1.0))
            .await
            .unwrap();

        let report = engine.rollup(last_hour()).await.unwrap();
        assert_eq!(report.written, 3);

        for pod in ["etcd-master", "kube-apiserver-master"] {
            let rows = store.rollups_for(pod, 0, NOW).await.unwrap();
            assert_eq!(rows, vec![rollup(pod, last_hour(), 1.5, 1.5)]);
        }
        let rows = store.rollups_for("master", 0, NOW).await.unwrap();
        assert_eq!(rows, vec![rollup("master", last_hour(), 2.0, 1.0)]);
    }

    #[tokio::test]
    async fn test_rollup_twice_keeps_one_row_per_resource() {
        let (store, engine) = setup();
        engine
            .ingest(&Sample::new("master", last_hour() + 10, 1.0, 1.0))
            .await
            .unwrap();
        engine
            .ingest(&Sample::new("worker1", last_hour() + 20, 0.5, 0.5))
            .await
            .unwrap();

        let first = engine.rollup(last_hour()).await.unwrap();
        let second = engine.rollup(last_hour()).await.unwrap();

        assert_eq!(first.written, 2);
        assert_eq!(second.written, 0);
        assert_eq!(second.already_present, 2);
        assert_eq!(store.rollups_for("master", 0, NOW).await.unwrap().len(), 1);
        assert_eq!(store.rollups_for("worker1", 0, NOW).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rollup_skips_idle_resources() {
        let (store, engine) = setup();

        // Samples exist only in the current hour
        engine
            .ingest(&Sample::new("etcd-master", NOW - 1, 1.0, 1.0))
            .await
            .unwrap();

        let report = engine.rollup(last_hour()).await.unwrap();

        assert_eq!(report.written, 0);
        assert!(store.rollups_for("etcd-master", 0, NOW).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rollup_window_is_inclusive_of_last_second() {
        let (store, engine) = setup();
        engine
            .ingest(&Sample::new("master", last_hour(), 1.0, 1.0))
            .await
            .unwrap();
        engine
            .ingest(&Sample::new("master", last_hour() + 3599, 3.0, 3.0))
            .await
            .unwrap();
        engine
            .ingest(&Sample::new("master", current_hour(), 100.0, 100.0))
            .await
            .unwrap();

        engine.rollup(last_hour()).await.unwrap();

        let rows = store.rollups_for("master", 0, NOW).await.unwrap();
        assert_eq!(rows, vec![rollup("master", last_hour(), 2.0, 2.0)]);
    }

    #[tokio::test]
    async fn test_duplicate_ingest_reports_duplicate_key() {
        let (_store, engine) = setup();
        let sample = Sample::new("master", NOW, 1.0, 1.0);

        engine.ingest(&sample).await.unwrap();
        let err = engine.ingest(&sample).await.unwrap_err();
        assert!(err.is_duplicate());
    }
}

mod retention_tests {
    use super::*;

    #[tokio::test]
    async fn test_flush_removes_only_through_cutoff() {
        let (store, engine) = setup();
        let timestamps = [NOW - 7200, NOW - 3600, last_hour(), current_hour(), NOW];
        for ts in timestamps {
            engine.ingest(&Sample::new("res1", ts, 2.0, 1.0)).await.unwrap();
        }

        engine.flush(current_hour() - 1).await.unwrap();

        let left: Vec<i64> = store
            .samples_for("res1", 0, NOW)
            .await
            .unwrap()
            .iter()
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(left, vec![current_hour(), NOW]);
    }

    #[tokio::test]
    async fn test_compact_rolls_up_before_flushing() {
        let (store, engine) = setup();
        let name = "etcd-master";

        store
            .insert_rollup(&rollup(name, last_hour() - 14400, 2.0, 1.0))
            .await
            .unwrap();
        store
            .insert_rollup(&rollup(name, last_hour() - 3600, 2.0, 1.0))
            .await
            .unwrap();

        for (offset, value) in [(0, 10.0), (122, 1.0), (1444, 1.0)] {
            engine
                .ingest(&Sample::new(name, last_hour() + offset, value, value))
                .await
                .unwrap();
        }
        engine
            .ingest(&Sample::new(name, NOW, 5.0, 5.0))
            .await
            .unwrap();

        let report = engine.compact(NOW).await.unwrap();

        assert_eq!(report.rollup.hours, vec![last_hour()]);
        assert_eq!(report.flushed, 3);
        assert_eq!(report.cutoff, current_hour() - 1);

        let hourly = store.rollups_for(name, 0, NOW).await.unwrap();
        let timestamps: Vec<i64> = hourly.iter().map(|r| r.timestamp).collect();
        assert_eq!(
            timestamps,
            vec![last_hour() - 14400, last_hour() - 3600, last_hour()]
        );
        assert_eq!(hourly[2].cpu_value, 4.0);

        let transient = store.samples_for(name, 0, NOW).await.unwrap();
        assert_eq!(transient.len(), 1);
        assert_eq!(transient[0].timestamp, NOW);
    }

    #[tokio::test]
    async fn test_compact_catches_up_on_missed_hours() {
        let (store, engine) = setup();
        for hours_ago in 1..=3 {
            engine
                .ingest(&Sample::new("worker1", current_hour() - hours_ago * 3600 + 5, 1.0, 1.0))
                .await
                .unwrap();
        }

        let report = engine.compact(NOW).await.unwrap();

        assert_eq!(report.rollup.hours.len(), 3);
        assert_eq!(store.rollups_for("worker1", 0, NOW).await.unwrap().len(), 3);
        assert!(store.samples_between(i64::MIN, NOW).await.unwrap().is_empty());
    }
}

mod query_tests {
    use super::*;

    fn service(store: Arc<RedbSampleStore>) -> MetricsQueryService {
        MetricsQueryService::new(store, Arc::new(ManualClock::new(NOW)))
    }

    #[tokio::test]
    async fn test_query_appends_live_rollup_for_open_hour() {
        let (store, engine) = setup();
        let name = "etcd-master";

        for ts in [last_hour() - 14400, last_hour() - 3600, last_hour()] {
            store.insert_rollup(&rollup(name, ts, 2.0, 1.0)).await.unwrap();
        }
        for (ts, value) in [(current_hour() + 20, 1.0), (current_hour() + 10, 1.0), (NOW, 10.0)] {
            engine.ingest(&Sample::new(name, ts, value, value)).await.unwrap();
        }

        let points = service(store).query(name, 0, NOW).await.unwrap();

        let timestamps: Vec<i64> = points.iter().map(|p| p.timestamp).collect();
        assert_eq!(
            timestamps,
            vec![last_hour() - 14400, last_hour() - 3600, last_hour(), current_hour()]
        );
        assert_eq!(points[3].cpu_value, 4.0);
    }

    #[tokio::test]
    async fn test_query_before_open_hour_has_no_live_point() {
        let (store, engine) = setup();
        let name = "master";
        store
            .insert_rollup(&rollup(name, last_hour(), 1.0, 1.0))
            .await
            .unwrap();
        engine.ingest(&Sample::new(name, NOW, 9.0, 9.0)).await.unwrap();

        let points = service(store).query(name, 0, current_hour() - 1).await.unwrap();

        assert_eq!(points, vec![rollup(name, last_hour(), 1.0, 1.0)]);
    }

    #[tokio::test]
    async fn test_stored_open_hour_rollup_wins_over_live_samples() {
        let (store, engine) = setup();
        let name = "worker1";
        store
            .insert_rollup(&rollup(name, current_hour(), 0.3, 0.7))
            .await
            .unwrap();
        for ts in [current_hour() + 5, NOW] {
            engine.ingest(&Sample::new(name, ts, 9.0, 9.0)).await.unwrap();
        }

        let points = service(store).query(name, 0, NOW).await.unwrap();

        assert_eq!(points, vec![rollup(name, current_hour(), 0.3, 0.7)]);
    }

    #[tokio::test]
    async fn test_query_open_hour_without_samples() {
        let (store, _engine) = setup();
        store
            .insert_rollup(&rollup("master", last_hour(), 1.0, 1.0))
            .await
            .unwrap();

        let points = service(store).query("master", 0, NOW).await.unwrap();
        assert_eq!(points.len(), 1);
    }

    #[tokio::test]
    async fn test_query_ignores_other_resources() {
        let (store, engine) = setup();
        engine.ingest(&Sample::new("worker1", NOW, 1.0, 1.0)).await.unwrap();
        store
            .insert_rollup(&rollup("worker1", last_hour(), 1.0, 1.0))
            .await
            .unwrap();

        let points = service(store).query("worker2", 0, NOW).await.unwrap();
        assert!(points.is_empty());
    }
}

mod ingest_tests {
    use super::*;

    #[tokio::test]
    async fn test_ingest_stores_nodes_and_pods() {
        let (store, engine) = setup();
        let source = Arc::new(
            FakeSource::with_nodes(vec![("master", 0.5, 1.0)])
                .with_pods(vec![("etcd-master", 0.1, 0.2)]),
        );
        let ingestor = Ingestor::new(source, Arc::new(engine));

        let report = ingestor.ingest(NOW).await.unwrap();

        assert_eq!(report.inserted, 2);
        assert_eq!(store.samples_between(NOW, NOW).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_retried_ingest_is_not_an_error() {
        let (store, engine) = setup();
        let source = Arc::new(FakeSource::with_nodes(vec![("master", 0.5, 1.0)]));
        let ingestor = Ingestor::new(source, Arc::new(engine));

        ingestor.ingest(NOW).await.unwrap();
        let retry = ingestor.ingest(NOW).await.unwrap();

        assert_eq!(retry.inserted, 0);
        assert_eq!(retry.duplicates, 1);
        assert_eq!(store.samples_for("master", 0, NOW).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_nothing() {
        let (store, engine) = setup();
        let source = Arc::new(FakeSource::with_nodes(vec![("master", 0.5, 1.0)]));
        source.set_failing(true);
        let ingestor = Ingestor::new(source, Arc::new(engine));

        let err = ingestor.ingest(NOW).await.unwrap_err();

        assert!(matches!(err, crate::error::ScalerError::Source(_)));
        assert!(store.samples_between(i64::MIN, i64::MAX).await.unwrap().is_empty());
    }
}
