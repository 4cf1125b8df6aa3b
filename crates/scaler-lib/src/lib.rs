//! Core library for the node autoscaler
//!
//! This crate provides:
//! - Usage ingestion from the Kubernetes metrics API
//! - Hourly rollup, retention and range queries over an embedded store
//! - Capacity estimation and the scale-out decision
//! - Worker provisioning on DigitalOcean with ansible bootstrap
//! - The control loop, health checks and observability

pub mod backfill;
pub mod clock;
pub mod control;
pub mod error;
pub mod health;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod provisioning;
pub mod scaling;
pub mod store;
pub mod units;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{
    ConfigError, ProvisioningError, ScalerError, ScalerResult, SourceError, StoreError,
};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ScalerMetrics, StructuredLogger};
