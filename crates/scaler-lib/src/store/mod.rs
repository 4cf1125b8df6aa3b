//! Sample persistence
//!
//! Two buckets share the same key `(resource_name, timestamp)` with a
//! uniqueness constraint:
//! - the transient bucket holds instant samples until their hour is rolled up
//! - the durable bucket holds hourly rollups and is retained
//!
//! Components receive an `Arc<dyn SampleStore>` explicitly; there is no
//! process-wide handle. Implementations must be safe for concurrent readers
//! and writers and must not cache rollups in memory.

mod embedded;
mod tables;


pub use embedded::RedbSampleStore;

use crate::error::StoreResult;
use crate::models::{HourlyRollup, Sample};
use async_trait::async_trait;

#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Insert into the transient bucket.
    ///
    /// Fails with `StoreError::DuplicateKey` when the key is already present.
    async fn insert_sample(&self, sample: &Sample) -> StoreResult<()>;

    /// Insert into the durable bucket.
    ///
    /// Fails with `StoreError::DuplicateKey` when the key is already present;
    /// the existing row is left untouched.
    async fn insert_rollup(&self, rollup: &HourlyRollup) -> StoreResult<()>;

    /// Transient samples of every resource with `start <= timestamp <= end`
    async fn samples_between(&self, start: i64, end: i64) -> StoreResult<Vec<Sample>>;

    /// Transient samples of one resource, timestamp ascending
    async fn samples_for(
        &self,
        resource_name: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<Sample>>;

    /// Durable rollups of one resource, timestamp ascending
    async fn rollups_for(
        &self,
        resource_name: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<HourlyRollup>>;

    /// Delete transient samples with `timestamp <= cutoff`, returning the count
    async fn delete_samples_through(&self, cutoff: i64) -> StoreResult<usize>;
}
