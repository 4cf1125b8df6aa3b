//! Worker provisioning: provider access, naming, registration and the
//! attempt state machine

mod controller;
mod digital_ocean;
mod identity;
mod provider;
mod registration;


pub use controller::{
    PollSettings, ProvisioningAttempt, ProvisioningController, ProvisioningOutcome,
    ProvisioningReport, ProvisioningStatus,
};
pub use digital_ocean::DigitalOceanProvider;
pub use identity::{next_worker_for, next_worker_name, worker_index};
pub use provider::{CreateRequest, Instance, Provider, ACTIVE_STATUS};
pub use registration::{AnsibleBootstrapper, HostRegistry, NodeBootstrapper};
