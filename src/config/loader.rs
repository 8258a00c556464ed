use crate::config::validator::{validate_config, validate_policy_file};
use crate::config::{AppConfig, PolicyFileConfig};
use crate::errors::{Result, WardenError};
use crate::server::ServerConfig;
use std::path::Path;
use tracing::{debug, info};

/// Load policy configuration from JSON file
pub async fn load_policy_config_from_file<P: AsRef<Path>>(path: P) -> Result<PolicyFileConfig> {
    let path = path.as_ref();
    info!("Loading policy configuration from: {}", path.display());

    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(WardenError::FileSystemError)?;

    let config: PolicyFileConfig = serde_json::from_str(&contents).map_err(WardenError::JsonError)?;

    validate_policy_file(&config)?;

    info!("Policy configuration loaded and validated successfully");
    log_policy_summary(&config);

    Ok(config)
}

/// Load complete application configuration
/// - Server settings from environment variables
/// - Policies from the JSON file named by `WARDEN_POLICY_CONFIG`
pub async fn load_config() -> Result<AppConfig> {
    info!("Loading application configuration...");

    let server = ServerConfig::from_env();
    log_server_summary(&server);

    debug!("Policy config path: {}", server.policy_config_path.display());
    let policies = load_policy_config_from_file(&server.policy_config_path).await?;

    let app_config = AppConfig { server, policies };
    validate_config(&app_config)?;

    info!("Application configuration loaded and validated successfully");
    Ok(app_config)
}

fn log_server_summary(config: &ServerConfig) {
    info!("=== Configuration Summary ===");
    info!("Service address: {}", config.addr());
    info!("Metrics port: {}", config.metrics_port);
    info!("Sweep interval: {}s", config.sweep_interval_secs);
    info!("Policy file: {}", config.policy_config_path.display());
    info!("=============================");
}

fn log_policy_summary(config: &PolicyFileConfig) {
    debug!("=== Policy Summary ===");
    debug!("Policies: {}", config.policies.len());

    for entry in &config.policies {
        let policy = entry.to_policy();
        debug!(
            "  {} (prefix: {}): {} req / {:?}, block after {} violations for {:?}",
            policy.name,
            entry.route_prefix,
            policy.max,
            policy.window,
            policy.block_threshold,
            policy.block_duration
        );
    }
    debug!("======================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "policies": [ {{ "name": "login", "route_prefix": "/login", "preset": "auth" }} ] }}"#
        )
        .unwrap();

        let config = load_policy_config_from_file(file.path()).await.unwrap();
        assert_eq!(config.policies.len(), 1);
        assert_eq!(config.policies[0].name, "login");
    }

    #[tokio::test]
    async fn test_load_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = load_policy_config_from_file(file.path()).await.unwrap_err();
        assert!(matches!(err, WardenError::JsonError(_)));
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_policy() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "policies": [ {{ "name": "bad", "route_prefix": "/bad", "max": 0 }} ] }}"#
        )
        .unwrap();

        let err = load_policy_config_from_file(file.path()).await.unwrap_err();
        assert!(matches!(err, WardenError::InvalidPolicy(_)));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = load_policy_config_from_file("/nonexistent/warden/policies.json")
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::FileSystemError(_)));
    }
}
