//! Field-unit basic library
//!
//! Provides functions shared by all field-unit services:
//! - logging (console + daily file)
//! - graceful shutdown
//! - configuration path and value helpers
//! - service bootstrap

pub mod config_loader;
pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;

pub use service_bootstrap::ServiceInfo;
