//! Time-windowed metrics pipeline
//!
//! Instant samples flow from a [`MetricsSource`] into the transient bucket,
//! are averaged into hourly rollups by the [`RollupEngine`], and are served
//! back by the [`MetricsQueryService`] together with a live view of the
//! still-open hour.

mod ingest;
mod query;
mod rollup;
mod source;

#[cfg(test)]
mod tests;

pub use ingest::{IngestReport, Ingestor};
pub use query::MetricsQueryService;
pub use rollup::{CompactionReport, RollupEngine, RollupReport};
pub use source::{HttpMetricsSource, MetricsSource};
