//! EDS field unit test orchestrator
//!
//! Runs scheduled dust-shield activations, the daily noon baseline and manual
//! tests against the panel rack, recording before/after measurements.

pub mod config;
pub mod faults;
pub mod hardware;
pub mod metrics;
pub mod orchestrator;
pub mod persistence;
pub mod record;
pub mod simulated;
pub mod status;

pub use config::{Config, ConfigSource};
pub use faults::{ErrorSet, FailSafeSignal, FaultToken};
pub use hardware::FieldHardware;
pub use orchestrator::{OrchestrationLoop, TickReport};
