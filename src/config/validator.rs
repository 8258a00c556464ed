use crate::config::{AppConfig, PolicyConfig, PolicyFileConfig};
use crate::errors::{Result, WardenError};
use crate::server::ServerConfig;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Validate the entire application configuration
pub fn validate_config(config: &AppConfig) -> Result<()> {
    debug!("Validating configuration...");

    validate_server_config(&config.server)?;
    validate_policy_file(&config.policies)?;

    debug!("Configuration validation successful");
    Ok(())
}

/// Validate listener and runtime settings
fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.host.is_empty() {
        return Err(WardenError::ConfigurationError(
            "Server host cannot be empty".to_string(),
        ));
    }

    if config.port == config.metrics_port {
        return Err(WardenError::ConfigurationError(format!(
            "Service port and metrics port must differ (both {})",
            config.port
        )));
    }

    if config.sweep_interval_secs == 0 {
        return Err(WardenError::ConfigurationError(
            "sweep_interval_secs must be greater than 0".to_string(),
        ));
    }

    debug!("Server configuration valid");
    Ok(())
}

/// Validate a policy file: at least one policy, unique names and prefixes
pub fn validate_policy_file(config: &PolicyFileConfig) -> Result<()> {
    if config.policies.is_empty() {
        return Err(WardenError::ConfigurationError(
            "At least one policy must be configured".to_string(),
        ));
    }

    let mut names = HashSet::new();
    let mut prefixes = HashSet::new();

    for policy in &config.policies {
        validate_policy(policy)?;

        if !names.insert(policy.name.as_str()) {
            return Err(WardenError::ConfigurationError(format!(
                "Duplicate policy name '{}'",
                policy.name
            )));
        }

        if !prefixes.insert(policy.route_prefix.as_str()) {
            return Err(WardenError::ConfigurationError(format!(
                "Route prefix '{}' is claimed by more than one policy",
                policy.route_prefix
            )));
        }
    }

    Ok(())
}

/// Validate one policy entry after preset resolution
fn validate_policy(config: &PolicyConfig) -> Result<()> {
    if config.name.trim().is_empty() {
        return Err(WardenError::InvalidPolicy(
            "Policy name cannot be empty".to_string(),
        ));
    }

    if !config.route_prefix.starts_with('/') {
        return Err(WardenError::InvalidPolicy(format!(
            "route_prefix for policy '{}' must start with '/' (got '{}')",
            config.name, config.route_prefix
        )));
    }

    let policy = config.to_policy();

    if policy.window.is_zero() {
        return Err(WardenError::InvalidPolicy(format!(
            "window_ms must be positive for policy '{}'",
            config.name
        )));
    }

    if policy.window.as_millis() < 1000 {
        warn!(
            "Window for policy '{}' is shorter than one second ({:?})",
            config.name, policy.window
        );
    }

    if policy.max == 0 {
        return Err(WardenError::InvalidPolicy(format!(
            "max must be positive for policy '{}'",
            config.name
        )));
    }

    if policy.block_threshold == 0 {
        return Err(WardenError::InvalidPolicy(format!(
            "block_threshold must be positive for policy '{}'",
            config.name
        )));
    }

    if policy.block_duration.is_zero() {
        return Err(WardenError::InvalidPolicy(format!(
            "block_duration_ms must be positive for policy '{}'",
            config.name
        )));
    }

    if policy.block_duration < policy.window {
        warn!(
            "Block duration for policy '{}' ({:?}) is shorter than its window ({:?})",
            config.name, policy.block_duration, policy.window
        );
    }

    if policy.max > 1_000_000 {
        warn!(
            "Very high max ({}) for policy '{}'",
            policy.max, config.name
        );
    }

    if !policy.standard_headers && !policy.legacy_headers {
        debug!("Policy '{}' emits no quota headers", config.name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_config(policies: PolicyFileConfig) -> AppConfig {
        AppConfig {
            server: ServerConfig::default(),
            policies,
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&app_config(PolicyFileConfig::default())).is_ok());
    }

    #[test]
    fn test_validate_same_ports() {
        let mut config = app_config(PolicyFileConfig::default());
        config.server.metrics_port = config.server.port;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_policies() {
        let config = PolicyFileConfig { policies: vec![] };
        assert!(validate_policy_file(&config).is_err());
    }

    #[test]
    fn test_validate_zero_max() {
        let mut policy = PolicyConfig::new("test", "/test");
        policy.max = Some(0);
        assert!(matches!(
            validate_policy(&policy),
            Err(WardenError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_validate_zero_window() {
        let mut policy = PolicyConfig::new("test", "/test");
        policy.window_ms = Some(0);
        assert!(validate_policy(&policy).is_err());
    }

    #[test]
    fn test_validate_relative_prefix() {
        let policy = PolicyConfig::new("test", "api");
        assert!(validate_policy(&policy).is_err());
    }

    #[test]
    fn test_validate_duplicate_names() {
        let config = PolicyFileConfig {
            policies: vec![PolicyConfig::new("a", "/x"), PolicyConfig::new("a", "/y")],
        };
        assert!(validate_policy_file(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_prefixes() {
        let config = PolicyFileConfig {
            policies: vec![PolicyConfig::new("a", "/x"), PolicyConfig::new("b", "/x")],
        };
        assert!(validate_policy_file(&config).is_err());
    }
}
