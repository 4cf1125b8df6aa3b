//! Capacity estimation and the scale-out policy

mod capacity;
mod policy;

pub use capacity::{capacity_units, summarize, CapacityModel};
pub use policy::{decide, ScaleDecision, ScalingPolicy};
