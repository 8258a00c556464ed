//! axum middleware translating admission decisions into HTTP responses.
//!
//! ```ignore
//! let state = RateLimitLayerState::new(Arc::new(RateLimiter::new(Policy::auth())));
//! let app = Router::new()
//!     .route("/login", post(login))
//!     .layer(axum::middleware::from_fn_with_state(state, enforce));
//! ```

pub mod headers;

use crate::limiter::{Decision, Policy, RateLimiter};
use crate::registry::PolicyRegistry;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

pub const TOO_MANY_REQUESTS_MESSAGE: &str = "Too many requests";
pub const BLOCKED_MESSAGE: &str = "Access denied. You have been temporarily blocked.";

/// Post-processor for rejection responses
pub type ResponseHandler = Arc<dyn Fn(&Decision, Response) -> Response + Send + Sync>;

#[derive(Clone)]
enum LimiterSelector {
    Single(Arc<RateLimiter>),
    Routed(Arc<PolicyRegistry>),
}

/// Middleware state: which limiter(s) to consult and how to shape rejections
#[derive(Clone)]
pub struct RateLimitLayerState {
    selector: LimiterSelector,
    handler: Option<ResponseHandler>,
}

impl RateLimitLayerState {
    /// Every request goes through `limiter`
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            selector: LimiterSelector::Single(limiter),
            handler: None,
        }
    }

    /// Pick the limiter by longest route prefix. Paths no policy covers pass
    /// through untouched.
    pub fn routed(registry: Arc<PolicyRegistry>) -> Self {
        Self {
            selector: LimiterSelector::Routed(registry),
            handler: None,
        }
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Decision, Response) -> Response + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    fn limiter_for(&self, path: &str) -> Option<Arc<RateLimiter>> {
        match &self.selector {
            LimiterSelector::Single(limiter) => Some(limiter.clone()),
            LimiterSelector::Routed(registry) => registry.for_path(path),
        }
    }
}

/// Admission middleware, for use with `axum::middleware::from_fn_with_state`.
pub async fn enforce(
    State(state): State<RateLimitLayerState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = state.limiter_for(request.uri().path()) else {
        return next.run(request).await;
    };

    let decision = limiter.admit(&request);

    if let Decision::Admitted { quota } = &decision {
        let mut response = next.run(request).await;
        headers::apply_quota_headers(response.headers_mut(), limiter.policy(), quota);
        return response;
    }

    let response = rejection_response(limiter.policy(), &decision);
    match &state.handler {
        Some(handler) => handler(&decision, response),
        None => response,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectionBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    violations: Option<u32>,
}

/// 429 for an exhausted quota, 403 for a block. Admitted decisions map to an
/// empty 200.
pub fn rejection_response(policy: &Policy, decision: &Decision) -> Response {
    match decision {
        Decision::RateLimited {
            quota,
            retry_after_secs,
            violations,
        } => {
            let body = RejectionBody {
                error: TOO_MANY_REQUESTS_MESSAGE,
                retry_after: Some(*retry_after_secs),
                violations: Some(*violations),
            };
            let mut response = (decision.status_code(), Json(body)).into_response();
            headers::apply_retry_after(response.headers_mut(), *retry_after_secs);
            headers::apply_quota_headers(response.headers_mut(), policy, quota);
            response
        }
        Decision::Blocked { retry_after_secs } => {
            let body = RejectionBody {
                error: BLOCKED_MESSAGE,
                retry_after: *retry_after_secs,
                violations: None,
            };
            let mut response = (decision.status_code(), Json(body)).into_response();
            if let Some(secs) = retry_after_secs {
                headers::apply_retry_after(response.headers_mut(), *secs);
            }
            response
        }
        Decision::Admitted { .. } => decision.status_code().into_response(),
    }
}
