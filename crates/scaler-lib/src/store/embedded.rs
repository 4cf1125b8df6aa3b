//! redb-backed sample store.
//!
//! Supports an on-disk database for the daemon and an in-memory backend for
//! tests. redb serializes write transactions, which gives the
//! check-then-insert in `insert_unique` the semantics of a unique index.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::tables::{MetricKey, HOURLY_ROLLUPS, TRANSIENT_SAMPLES};
use super::SampleStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{HourlyRollup, Sample};

/// Map any `Display` error into `StoreError::Persistence`
macro_rules! persistence {
    () => {
        |e| StoreError::Persistence(e.to_string())
    };
}

type MetricTable = TableDefinition<'static, MetricKey, &'static [u8]>;

/// Thread-safe sample store backed by redb
#[derive(Clone)]
pub struct RedbSampleStore {
    db: Arc<Database>,
}

impl RedbSampleStore {
    /// Open (or create) a persistent store at the given path
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(persistence!())?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "sample store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(persistence!())?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory sample store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(persistence!())?;
        txn.open_table(TRANSIENT_SAMPLES).map_err(persistence!())?;
        txn.open_table(HOURLY_ROLLUPS).map_err(persistence!())?;
        txn.commit().map_err(persistence!())?;
        Ok(())
    }

    fn insert_unique<T: Serialize>(
        &self,
        table: MetricTable,
        resource_name: &str,
        timestamp: i64,
        row: &T,
    ) -> StoreResult<()> {
        let value = serde_json::to_vec(row).map_err(persistence!())?;
        let txn = self.db.begin_write().map_err(persistence!())?;
        {
            let mut table = txn.open_table(table).map_err(persistence!())?;
            if table
                .get((resource_name, timestamp))
                .map_err(persistence!())?
                .is_some()
            {
                return Err(StoreError::DuplicateKey {
                    resource_name: resource_name.to_string(),
                    timestamp,
                });
            }
            table
                .insert((resource_name, timestamp), value.as_slice())
                .map_err(persistence!())?;
        }
        txn.commit().map_err(persistence!())?;
        Ok(())
    }

    fn read_resource_range<T: DeserializeOwned>(
        &self,
        table: MetricTable,
        resource_name: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<T>> {
        if start > end {
            return Ok(Vec::new());
        }

        let txn = self.db.begin_read().map_err(persistence!())?;
        let table = txn.open_table(table).map_err(persistence!())?;
        let mut rows = Vec::new();
        for entry in table
            .range((resource_name, start)..=(resource_name, end))
            .map_err(persistence!())?
        {
            let (_, value) = entry.map_err(persistence!())?;
            rows.push(serde_json::from_slice(value.value()).map_err(persistence!())?);
        }
        Ok(rows)
    }

    fn scan_samples(&self, start: i64, end: i64) -> StoreResult<Vec<Sample>> {
        let txn = self.db.begin_read().map_err(persistence!())?;
        let table = txn.open_table(TRANSIENT_SAMPLES).map_err(persistence!())?;
        let mut samples = Vec::new();
        for entry in table.iter().map_err(persistence!())? {
            let (key, value) = entry.map_err(persistence!())?;
            let (_, timestamp) = key.value();
            if timestamp < start || timestamp > end {
                continue;
            }
            samples.push(serde_json::from_slice(value.value()).map_err(persistence!())?);
        }
        Ok(samples)
    }

    fn remove_samples_through(&self, cutoff: i64) -> StoreResult<usize> {
        let txn = self.db.begin_write().map_err(persistence!())?;
        let removed = {
            let mut table = txn.open_table(TRANSIENT_SAMPLES).map_err(persistence!())?;

            let mut expired: Vec<(String, i64)> = Vec::new();
            for entry in table.iter().map_err(persistence!())? {
                let (key, _) = entry.map_err(persistence!())?;
                let (name, timestamp) = key.value();
                if timestamp <= cutoff {
                    expired.push((name.to_string(), timestamp));
                }
            }

            for (name, timestamp) in &expired {
                table
                    .remove((name.as_str(), *timestamp))
                    .map_err(persistence!())?;
            }
            expired.len()
        };
        txn.commit().map_err(persistence!())?;

        debug!(cutoff, removed, "flushed transient samples");
        Ok(removed)
    }

    /// Run a transaction on the blocking pool; redb commits fsync
    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&RedbSampleStore) -> StoreResult<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(persistence!())?
    }
}

#[async_trait]
impl SampleStore for RedbSampleStore {
    async fn insert_sample(&self, sample: &Sample) -> StoreResult<()> {
        let sample = sample.clone();
        self.blocking(move |store| {
            store.insert_unique(
                TRANSIENT_SAMPLES,
                &sample.resource_name,
                sample.timestamp,
                &sample,
            )
        })
        .await
    }

    async fn insert_rollup(&self, rollup: &HourlyRollup) -> StoreResult<()> {
        let rollup = rollup.clone();
        self.blocking(move |store| {
            store.insert_unique(
                HOURLY_ROLLUPS,
                &rollup.resource_name,
                rollup.timestamp,
                &rollup,
            )
        })
        .await
    }

    async fn samples_between(&self, start: i64, end: i64) -> StoreResult<Vec<Sample>> {
        self.blocking(move |store| store.scan_samples(start, end)).await
    }

    async fn samples_for(
        &self,
        resource_name: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<Sample>> {
        let resource_name = resource_name.to_string();
        self.blocking(move |store| {
            store.read_resource_range(TRANSIENT_SAMPLES, &resource_name, start, end)
        })
        .await
    }

    async fn rollups_for(
        &self,
        resource_name: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<HourlyRollup>> {
        let resource_name = resource_name.to_string();
        self.blocking(move |store| {
            store.read_resource_range(HOURLY_ROLLUPS, &resource_name, start, end)
        })
        .await
    }

    async fn delete_samples_through(&self, cutoff: i64) -> StoreResult<usize> {
        self.blocking(move |store| store.remove_samples_through(cutoff)).await
    }
}
