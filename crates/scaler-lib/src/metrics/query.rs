//! Range queries over stored rollups plus the still-open hour

use crate::clock::Clock;
use crate::error::StoreResult;
use crate::models::{hour_end, hour_start, HourlyRollup};
use crate::store::SampleStore;
use std::sync::Arc;

/// Answers `/metrics` queries.
///
/// Nothing is cached: every query reads the store, so it stays consistent
/// with the control loop writing concurrently.
pub struct MetricsQueryService {
    store: Arc<dyn SampleStore>,
    clock: Arc<dyn Clock>,
}

impl MetricsQueryService {
    pub fn new(store: Arc<dyn SampleStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Rollups of `resource_name` with `start <= timestamp <= end`, ascending.
    ///
    /// When `end` reaches into the open hour, a live rollup of that hour's
    /// transient samples is appended as the last point.
    pub async fn query(
        &self,
        resource_name: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<HourlyRollup>> {
        let mut points = self.store.rollups_for(resource_name, start, end).await?;

        let open_hour = hour_start(self.clock.now());
        if end < open_hour {
            return Ok(points);
        }

        if points.iter().any(|p| p.timestamp == open_hour) {
            return Ok(points);
        }

        let samples = self
            .store
            .samples_for(resource_name, open_hour, hour_end(open_hour))
            .await?;

        if let Some(live) = HourlyRollup::from_samples(resource_name, open_hour, &samples) {
            points.push(live);
        }

        Ok(points)
    }
}
