use crate::limiter::key::{KeyGenerator, KeyStrategy};
use crate::limiter::RequestParts;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX: u64 = 100;
pub const DEFAULT_BLOCK_THRESHOLD: u32 = 5;
pub const DEFAULT_BLOCK_DURATION: Duration = Duration::from_secs(60 * 60);

/// Immutable admission policy owned by one limiter instance
#[derive(Clone)]
pub struct Policy {
    /// Name used in logs, metrics and the service API
    pub name: String,

    /// Length of one counting window
    pub window: Duration,

    /// Requests admitted per window
    pub max: u64,

    /// Violations that put a client on the blacklist
    pub block_threshold: u32,

    /// How long a blacklist entry lasts
    pub block_duration: Duration,

    /// Emit `RateLimit-*` headers
    pub standard_headers: bool,

    /// Emit `X-RateLimit-*` headers
    pub legacy_headers: bool,

    pub key_generator: KeyGenerator,
}

impl Policy {
    pub fn new(name: impl Into<String>, window: Duration, max: u64) -> Self {
        Self {
            name: name.into(),
            window,
            max,
            block_threshold: DEFAULT_BLOCK_THRESHOLD,
            block_duration: DEFAULT_BLOCK_DURATION,
            standard_headers: true,
            legacy_headers: false,
            key_generator: KeyStrategy::Ip.generator(),
        }
    }

    /// General purpose: short window, moderate ceiling, blocks quickly.
    pub fn strict() -> Self {
        Self::new("strict", Duration::from_secs(60), 30)
            .with_block_threshold(3)
            .with_block_duration(Duration::from_secs(30 * 60))
    }

    /// Login and credential endpoints.
    pub fn auth() -> Self {
        Self::new("auth", Duration::from_secs(15 * 60), 5)
            .with_block_threshold(3)
            .with_block_duration(Duration::from_secs(60 * 60))
    }

    /// Cost-sensitive inference endpoints, tracked per address and user.
    pub fn ai_inference() -> Self {
        Self::new("ai_inference", Duration::from_secs(60), 10)
            .with_block_threshold(2)
            .with_block_duration(Duration::from_secs(15 * 60))
            .with_key_strategy(KeyStrategy::IpUser)
    }

    pub fn with_block_threshold(mut self, threshold: u32) -> Self {
        self.block_threshold = threshold;
        self
    }

    pub fn with_block_duration(mut self, duration: Duration) -> Self {
        self.block_duration = duration;
        self
    }

    pub fn with_headers(mut self, standard: bool, legacy: bool) -> Self {
        self.standard_headers = standard;
        self.legacy_headers = legacy;
        self
    }

    pub fn with_key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_generator = strategy.generator();
        self
    }

    pub fn with_key_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&dyn RequestParts) -> String + Send + Sync + 'static,
    {
        self.key_generator = Arc::new(generator);
        self
    }

    pub fn window_ms(&self) -> u64 {
        self.window.as_millis() as u64
    }

    pub fn block_duration_ms(&self) -> u64 {
        self.block_duration.as_millis() as u64
    }

    /// `RateLimit-Policy` header value, e.g. `100;w=60`.
    pub fn header_value(&self) -> String {
        format!("{};w={}", self.max, self.window.as_secs())
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new("default", DEFAULT_WINDOW, DEFAULT_MAX)
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("name", &self.name)
            .field("window", &self.window)
            .field("max", &self.max)
            .field("block_threshold", &self.block_threshold)
            .field("block_duration", &self.block_duration)
            .field("standard_headers", &self.standard_headers)
            .field("legacy_headers", &self.legacy_headers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_relationships() {
        let auth = Policy::auth();
        let ai = Policy::ai_inference();
        let strict = Policy::strict();

        assert!(auth.window > strict.window);
        assert!(auth.max < strict.max);
        assert!(ai.block_duration < auth.block_duration);
        assert!(ai.block_threshold < auth.block_threshold);
    }

    #[test]
    fn test_custom_key_generator() {
        struct PathOnly;
        impl RequestParts for PathOnly {
            fn header(&self, _name: &str) -> Option<&str> {
                None
            }
            fn path(&self) -> &str {
                "/tenant/7"
            }
        }

        let policy = Policy::default().with_key_generator(|req| format!("path:{}", req.path()));
        assert_eq!((policy.key_generator)(&PathOnly), "path:/tenant/7");
    }

    #[test]
    fn test_header_value() {
        assert_eq!(Policy::default().header_value(), "100;w=60");
        assert_eq!(Policy::auth().header_value(), "5;w=900");
    }
}
