//! Configuration loading helper functions
//! Provides utilities for locating configuration with fallback logic

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Get configuration value with priority: ENV > config file > Default
///
/// # Arguments
/// * `file_value` - Value from the configuration file, if present
/// * `env_var` - Environment variable name to check
/// * `default` - Default value to use as fallback
pub fn get_config_value<T>(file_value: Option<T>, env_var: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    // Priority 1: Environment variable
    if let Ok(env_str) = std::env::var(env_var) {
        match env_str.parse::<T>() {
            Ok(val) => {
                info!("Using {} from environment: {}", env_var, env_str);
                return val;
            },
            Err(e) => {
                warn!("Failed to parse {} from environment: {}", env_var, e);
            },
        }
    }

    // Priority 2: Configuration file
    if let Some(val) = file_value {
        debug!("Using {} from configuration file", env_var);
        return val;
    }

    // Priority 3: Default value
    debug!("Using default value for {}", env_var);
    default
}

/// Locate the service configuration file
///
/// Priority:
/// 1. Explicit path (command line)
/// 2. `{SERVICE}_CONFIG` environment variable
/// 3. `config/{service}.yaml`
///
/// The returned path may not exist; callers fall back to built-in defaults.
pub fn resolve_config_path(service_name: &str, explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }

    let env_var = format!("{}_CONFIG", service_name.to_uppercase());
    if let Ok(path) = std::env::var(&env_var) {
        if !path.is_empty() {
            info!("Using configuration from {}: {}", env_var, path);
            return PathBuf::from(path);
        }
    }

    PathBuf::from("config").join(format!("{}.yaml", service_name))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_get_config_value_priority() {
        std::env::remove_var("CFGTEST_TICK_SECS");
        assert_eq!(get_config_value(Some(5u64), "CFGTEST_TICK_SECS", 1), 5);
        assert_eq!(get_config_value(None, "CFGTEST_TICK_SECS", 1u64), 1);

        std::env::set_var("CFGTEST_TICK_SECS", "9");
        assert_eq!(get_config_value(Some(5u64), "CFGTEST_TICK_SECS", 1), 9);

        // Unparseable env value falls through to the file value
        std::env::set_var("CFGTEST_TICK_SECS", "nine");
        assert_eq!(get_config_value(Some(5u64), "CFGTEST_TICK_SECS", 1), 5);
        std::env::remove_var("CFGTEST_TICK_SECS");
    }

    #[test]
    fn test_resolve_config_path() {
        std::env::remove_var("CFGPATHTEST_CONFIG");
        assert_eq!(
            resolve_config_path("cfgpathtest", None),
            PathBuf::from("config/cfgpathtest.yaml")
        );
        assert_eq!(
            resolve_config_path("cfgpathtest", Some(PathBuf::from("/etc/eds.yaml"))),
            PathBuf::from("/etc/eds.yaml")
        );

        std::env::set_var("CFGPATHTEST_CONFIG", "/boot/eds.yaml");
        assert_eq!(
            resolve_config_path("cfgpathtest", None),
            PathBuf::from("/boot/eds.yaml")
        );
        std::env::remove_var("CFGPATHTEST_CONFIG");
    }
}
