//! Quota response headers.
//!
//! Two conventions can be emitted side by side: the structured `RateLimit-*`
//! set (reset as an RFC 3339 timestamp plus a `RateLimit-Policy` of the form
//! `<max>;w=<window-seconds>`) and the legacy `X-RateLimit-*` set (reset as
//! epoch seconds).

use crate::limiter::{Policy, Quota};
use axum::http::header::{HeaderMap, HeaderValue, RETRY_AFTER};

pub const RATELIMIT_LIMIT: &str = "ratelimit-limit";
pub const RATELIMIT_REMAINING: &str = "ratelimit-remaining";
pub const RATELIMIT_RESET: &str = "ratelimit-reset";
pub const RATELIMIT_POLICY: &str = "ratelimit-policy";

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Attach the quota headers `policy` asks for.
pub fn apply_quota_headers(headers: &mut HeaderMap, policy: &Policy, quota: &Quota) {
    if policy.standard_headers {
        headers.insert(RATELIMIT_LIMIT, HeaderValue::from(quota.limit));
        headers.insert(RATELIMIT_REMAINING, HeaderValue::from(quota.remaining));
        if let Ok(reset) = HeaderValue::from_str(&quota.reset_at_rfc3339()) {
            headers.insert(RATELIMIT_RESET, reset);
        }
        if let Ok(value) = HeaderValue::from_str(&policy.header_value()) {
            headers.insert(RATELIMIT_POLICY, value);
        }
    }

    if policy.legacy_headers {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(quota.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(quota.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(quota.reset_at_epoch_secs()));
    }
}

pub fn apply_retry_after(headers: &mut HeaderMap, retry_after_secs: u64) {
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
}
