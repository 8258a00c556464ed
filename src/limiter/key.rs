//! Client identification.
//!
//! Key generators never fail: any request without a usable identity header
//! falls back to [`ANONYMOUS_KEY`], so all unidentified traffic shares one
//! bucket.

use crate::limiter::RequestParts;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Key shared by every request that carries no identifying header.
pub const ANONYMOUS_KEY: &str = "anonymous";

/// Identity headers, most trusted first.
const CDN_CLIENT_IP: &str = "cf-connecting-ip";
const REAL_IP: &str = "x-real-ip";
const FORWARDED_FOR: &str = "x-forwarded-for";

/// Derives a client key from a request.
pub type KeyGenerator = Arc<dyn Fn(&dyn RequestParts) -> String + Send + Sync>;

/// Network identity of the caller.
pub fn default_key(req: &dyn RequestParts) -> String {
    non_blank(req.header(CDN_CLIENT_IP))
        .or_else(|| non_blank(req.header(REAL_IP)))
        .or_else(|| {
            req.header(FORWARDED_FOR)
                .and_then(|list| non_blank(list.split(',').next()))
        })
        .map(str::to_string)
        .unwrap_or_else(|| ANONYMOUS_KEY.to_string())
}

/// Network identity plus the authenticated user id when one is known, so the
/// same address is tracked separately per logical user.
pub fn ip_and_user_key(req: &dyn RequestParts) -> String {
    let ip = default_key(req);
    match non_blank(req.user_id()) {
        Some(user) => format!("{}:{}", ip, user),
        None => ip,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Key generator selectable from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    #[default]
    Ip,
    IpUser,
}

impl KeyStrategy {
    pub fn generator(self) -> KeyGenerator {
        match self {
            KeyStrategy::Ip => Arc::new(default_key) as KeyGenerator,
            KeyStrategy::IpUser => Arc::new(ip_and_user_key) as KeyGenerator,
        }
    }
}
