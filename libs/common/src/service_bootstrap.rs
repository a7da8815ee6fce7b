//! Unified service bootstrap utilities
//!
//! Startup banner and logging initialization for field-unit services.

use crate::config_loader::get_config_value;
use crate::logging::{self, LogConfig};
use tracing::{info, Level};

/// Service metadata for startup
pub struct ServiceInfo {
    /// Service name (e.g., "fieldsrv")
    pub name: String,
    /// Service version from Cargo.toml
    pub version: String,
    /// Service description
    pub description: String,
}

impl ServiceInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
        }
    }
}

/// Print startup banner
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = r#"
 ███████╗██████╗ ███████╗
 ██╔════╝██╔══██╗██╔════╝
 █████╗  ██║  ██║███████╗
 ██╔══╝  ██║  ██║╚════██║
 ███████╗██████╔╝███████║
 ╚══════╝╚═════╝ ╚══════╝
            "#;

    info!("{}", banner);
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!("");
}

/// Initialize logging for a service
///
/// Log root directory priority:
/// 1. `{SERVICE}_LOG_DIR` environment variable
/// 2. `config_dir` from the service configuration
/// 3. `logs`
///
/// `level` is the default filter; `RUST_LOG` overrides it. `{SERVICE}_LOG_KEEP`
/// sets how many daily files are kept.
pub fn init_logging(
    service: &ServiceInfo,
    config_dir: Option<&str>,
    level: Option<&str>,
) -> anyhow::Result<()> {
    let level = level
        .and_then(|s| s.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    let defaults = LogConfig::default();
    let keep_env = format!("{}_LOG_KEEP", service.name.to_uppercase());
    let log_config = LogConfig {
        service_name: service.name.clone(),
        log_dir: logging::resolve_log_root(&service.name, config_dir),
        level,
        max_log_files: get_config_value(None, &keep_env, defaults.max_log_files),
        ..defaults
    };

    logging::init_with_config(log_config).map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_info_creation() {
        let service = ServiceInfo::new("fieldsrv", "0.1.0", "EDS field test orchestrator");
        assert_eq!(service.name, "fieldsrv");
        assert_eq!(service.version, "0.1.0");
        assert_eq!(service.description, "EDS field test orchestrator");
    }
}
