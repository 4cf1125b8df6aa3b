//! Sample ingestion from the metrics source into the transient bucket

use super::{MetricsSource, RollupEngine};
use crate::error::{ScalerResult, StoreError};
use std::sync::Arc;
use tracing::debug;

/// Counts from one ingestion step
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    pub duplicates: usize,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.inserted + self.duplicates
    }
}

/// Pulls node and pod usage and records it
pub struct Ingestor {
    source: Arc<dyn MetricsSource>,
    engine: Arc<RollupEngine>,
}

impl Ingestor {
    pub fn new(source: Arc<dyn MetricsSource>, engine: Arc<RollupEngine>) -> Self {
        Self { source, engine }
    }

    /// Fetch current usage and store it stamped with `timestamp`.
    ///
    /// Both fetches complete before anything is written, so a fetch or
    /// parse failure leaves the store untouched. A duplicate key (from a
    /// retried poll at the same second) counts as recorded.
    pub async fn ingest(&self, timestamp: i64) -> ScalerResult<IngestReport> {
        let mut samples = self.source.node_samples(timestamp).await?;
        samples.extend(self.source.pod_samples(timestamp).await?);

        let mut report = IngestReport::default();
        for sample in &samples {
            match self.engine.ingest(sample).await {
                Ok(()) => report.inserted += 1,
                Err(StoreError::DuplicateKey { .. }) => report.duplicates += 1,
                Err(e) => return Err(e.into()),
            }
        }

        debug!(
            timestamp,
            inserted = report.inserted,
            duplicates = report.duplicates,
            "ingested samples"
        );
        Ok(report)
    }
}
