pub mod backfill;
pub mod metrics;
