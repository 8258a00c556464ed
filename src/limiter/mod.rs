pub mod fixed_window;
pub mod key;
pub mod policy;

pub use fixed_window::RateLimiter;
pub use key::{default_key, ip_and_user_key, KeyGenerator, KeyStrategy, ANONYMOUS_KEY};
pub use policy::Policy;

use axum::http::StatusCode;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::warn;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The narrow view of an inbound request the limiter needs.
pub trait RequestParts {
    /// Header value by lowercase name. Missing or non-UTF-8 values are `None`.
    fn header(&self, name: &str) -> Option<&str>;

    /// Target path of the request.
    fn path(&self) -> &str;

    /// Authenticated user id, when the host has one.
    fn user_id(&self) -> Option<&str> {
        None
    }
}

/// Request extension carrying the authenticated user id, inserted by an
/// upstream auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

impl<B> RequestParts for axum::http::Request<B> {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }

    fn path(&self) -> &str {
        self.uri().path()
    }

    fn user_id(&self) -> Option<&str> {
        self.extensions()
            .get::<AuthenticatedUser>()
            .map(|u| u.0.as_str())
    }
}

/// Quota metadata attached to admitted and rate-limited decisions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quota {
    pub limit: u64,
    pub remaining: u64,
    /// End of the current window (Unix epoch milliseconds)
    pub reset_at_ms: u64,
}

impl Quota {
    pub fn reset_at_rfc3339(&self) -> String {
        format_epoch_ms(self.reset_at_ms)
    }

    pub fn reset_at_epoch_secs(&self) -> u64 {
        self.reset_at_ms.div_ceil(1000)
    }
}

/// Outcome of a single admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Admitted {
        quota: Quota,
    },
    /// Quota for the current window is exhausted.
    RateLimited {
        quota: Quota,
        retry_after_secs: u64,
        violations: u32,
    },
    /// Client is under a temporary full block.
    Blocked {
        retry_after_secs: Option<u64>,
    },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Decision::Admitted { .. } => StatusCode::OK,
            Decision::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Decision::Blocked { .. } => StatusCode::FORBIDDEN,
        }
    }

    pub fn quota(&self) -> Option<&Quota> {
        match self {
            Decision::Admitted { quota } | Decision::RateLimited { quota, .. } => Some(quota),
            Decision::Blocked { .. } => None,
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Decision::Admitted { .. } => None,
            Decision::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            Decision::Blocked { retry_after_secs } => *retry_after_secs,
        }
    }

    /// Short label used in logs, metrics and the service API.
    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Admitted { .. } => "admitted",
            Decision::RateLimited { .. } => "rate_limited",
            Decision::Blocked { .. } => "blocked",
        }
    }
}

/// Observable state of one client, computed through the admission lookup path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientStatus {
    pub key: String,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_until: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    pub violations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_reset: Option<String>,
}

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted_buckets: usize,
    pub expired_blocks: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.evicted_buckets == 0 && self.expired_blocks == 0
    }
}

/// Passed to the limit-reached hook each time a request is rejected for
/// exceeding its ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitEvent {
    pub policy: String,
    pub key: String,
    pub path: String,
    pub count: u64,
    pub violations: u32,
    /// True when this violation put the client on the blacklist.
    pub blacklisted: bool,
}

/// Side-effecting hook invoked when a client exceeds its quota.
///
/// Errors and panics raised here never change the admission decision.
pub trait LimitNotifier: Send + Sync {
    fn notify(&self, event: &LimitEvent) -> Result<(), BoxError>;
}

/// Logs every limit event at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl LimitNotifier for TracingNotifier {
    fn notify(&self, event: &LimitEvent) -> Result<(), BoxError> {
        warn!(
            policy = %event.policy,
            key = %event.key,
            path = %event.path,
            count = event.count,
            violations = event.violations,
            blacklisted = event.blacklisted,
            "Rate limit reached"
        );
        Ok(())
    }
}

pub(crate) fn format_epoch_ms(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_request_parts_for_http_request() {
        let mut req = axum::http::Request::builder()
            .uri("/api/ai/generate?x=1")
            .header("X-Real-IP", "5.6.7.8")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(AuthenticatedUser("user-42".to_string()));

        assert_eq!(req.header("x-real-ip"), Some("5.6.7.8"));
        assert_eq!(RequestParts::path(&req), "/api/ai/generate");
        assert_eq!(RequestParts::user_id(&req), Some("user-42"));
    }

    #[test]
    fn test_decision_helpers() {
        let quota = Quota {
            limit: 3,
            remaining: 0,
            reset_at_ms: 60_000,
        };
        let limited = Decision::RateLimited {
            quota: quota.clone(),
            retry_after_secs: 59,
            violations: 1,
        };
        assert_eq!(limited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.retry_after_secs(), Some(59));
        assert_eq!(limited.quota(), Some(&quota));

        let blocked = Decision::Blocked {
            retry_after_secs: None,
        };
        assert_eq!(blocked.status_code(), StatusCode::FORBIDDEN);
        assert!(blocked.quota().is_none());
        assert_eq!(blocked.outcome(), "blocked");
    }

    #[test]
    fn test_reset_formats() {
        let quota = Quota {
            limit: 1,
            remaining: 1,
            reset_at_ms: 1_700_000_000_500,
        };
        assert_eq!(quota.reset_at_rfc3339(), "2023-11-14T22:13:20.500Z");
        assert_eq!(quota.reset_at_epoch_secs(), 1_700_000_001);
    }

    #[test]
    fn test_far_future_timestamps_do_not_wrap() {
        let formatted = format_epoch_ms(u64::MAX);
        assert!(!formatted.starts_with("19"), "wrapped to {}", formatted);
        assert_eq!(
            formatted,
            DateTime::<Utc>::MAX_UTC.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
    }
}
