//! The polling control loop that ties ingestion, rollup, the scale-out
//! decision and provisioning together

mod r#loop;


pub use r#loop::{ControlConfig, ControlLoop, ControlLoopBuilder, CycleReport, StepError};
