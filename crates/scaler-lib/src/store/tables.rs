//! redb table definitions.
//!
//! Both tables are keyed by `(resource_name, timestamp)`; values are JSON.
//! Tuple keys sort by name first, so a per-resource range scan returns rows
//! in timestamp order.

use redb::TableDefinition;

pub type MetricKey = (&'static str, i64);

/// Instant samples for hours not yet flushed
pub const TRANSIENT_SAMPLES: TableDefinition<MetricKey, &[u8]> =
    TableDefinition::new("metrics_last_hour");

/// Hourly rollups, retained
pub const HOURLY_ROLLUPS: TableDefinition<MetricKey, &[u8]> =
    TableDefinition::new("metrics_hourly");
