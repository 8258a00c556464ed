pub mod loader;
pub mod validator;
pub mod watcher;

use crate::limiter::{KeyStrategy, Policy};
use crate::server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listener and runtime settings (loaded from environment variables only)
    pub server: ServerConfig,

    /// Admission policies (loaded from file, supports hot reload)
    pub policies: PolicyFileConfig,
}

/// Policy configuration file (JSON)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFileConfig {
    #[serde(default = "default_policies")]
    pub policies: Vec<PolicyConfig>,
}

impl Default for PolicyFileConfig {
    fn default() -> Self {
        Self {
            policies: default_policies(),
        }
    }
}

/// Built-in policy shapes a config entry can start from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Strict,
    Auth,
    AiInference,
}

impl Preset {
    pub fn policy(self) -> Policy {
        match self {
            Preset::Strict => Policy::strict(),
            Preset::Auth => Policy::auth(),
            Preset::AiInference => Policy::ai_inference(),
        }
    }
}

/// One policy entry. Unset fields fall back to the preset, then to the
/// base defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Unique policy name (e.g., "auth", "default")
    pub name: String,

    /// Requests whose path starts with this prefix use this policy
    pub route_prefix: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<Preset>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_threshold: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_duration_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_headers: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_headers: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<KeyStrategy>,
}

impl PolicyConfig {
    pub fn new(name: impl Into<String>, route_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            route_prefix: route_prefix.into(),
            preset: None,
            window_ms: None,
            max: None,
            block_threshold: None,
            block_duration_ms: None,
            standard_headers: None,
            legacy_headers: None,
            key: None,
        }
    }

    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = Some(preset);
        self
    }

    /// Resolve into a runtime policy
    pub fn to_policy(&self) -> Policy {
        let mut policy = self.preset.map(Preset::policy).unwrap_or_default();
        policy.name = self.name.clone();

        if let Some(window_ms) = self.window_ms {
            policy.window = Duration::from_millis(window_ms);
        }
        if let Some(max) = self.max {
            policy.max = max;
        }
        if let Some(threshold) = self.block_threshold {
            policy.block_threshold = threshold;
        }
        if let Some(block_ms) = self.block_duration_ms {
            policy.block_duration = Duration::from_millis(block_ms);
        }
        if let Some(standard) = self.standard_headers {
            policy.standard_headers = standard;
        }
        if let Some(legacy) = self.legacy_headers {
            policy.legacy_headers = legacy;
        }
        if let Some(key) = self.key {
            policy = policy.with_key_strategy(key);
        }
        policy
    }
}

fn default_policies() -> Vec<PolicyConfig> {
    vec![
        PolicyConfig::new("default", "/"),
        PolicyConfig::new("strict", "/api").with_preset(Preset::Strict),
        PolicyConfig::new("auth", "/api/auth").with_preset(Preset::Auth),
        PolicyConfig::new("ai_inference", "/api/ai").with_preset(Preset::AiInference),
    ]
}
