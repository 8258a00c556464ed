use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::PolicyFileConfig;
use crate::errors::{Result, WardenError};
use crate::limiter::{ClientStatus, Decision, RateLimiter, RequestParts};
use crate::registry::PolicyRegistry;

/// Body of `POST /v1/admit`
#[derive(Debug, Clone, Deserialize)]
pub struct AdmitRequest {
    /// Policy name; when absent the policy is chosen by `path`
    #[serde(default)]
    pub policy: Option<String>,
    pub path: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl AdmitRequest {
    /// Header names are matched case-insensitively.
    fn normalized(mut self) -> Self {
        self.headers = self
            .headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        self
    }
}

impl RequestParts for AdmitRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmitResponse {
    pub decision: &'static str,
    pub key: String,
    pub policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violations: Option<u32>,
}

impl AdmitResponse {
    fn new(key: String, policy: String, decision: &Decision) -> Self {
        let quota = decision.quota();
        Self {
            decision: decision.outcome(),
            key,
            policy,
            limit: quota.map(|q| q.limit),
            remaining: quota.map(|q| q.remaining),
            reset: quota.map(|q| q.reset_at_rfc3339()),
            retry_after: decision.retry_after_secs(),
            violations: match decision {
                Decision::RateLimited { violations, .. } => Some(*violations),
                _ => None,
            },
        }
    }
}

fn resolve_limiter(registry: &PolicyRegistry, req: &AdmitRequest) -> Result<Arc<RateLimiter>> {
    match &req.policy {
        Some(name) => registry
            .by_name(name)
            .ok_or_else(|| WardenError::UnknownPolicy(name.clone())),
        None => registry.for_path(&req.path).ok_or_else(|| {
            WardenError::UnknownPolicy(format!("no policy covers path '{}'", req.path))
        }),
    }
}

pub async fn admit(
    State(registry): State<Arc<PolicyRegistry>>,
    Json(req): Json<AdmitRequest>,
) -> Result<Json<AdmitResponse>> {
    let req = req.normalized();
    let limiter = resolve_limiter(&registry, &req)?;

    let key = limiter.client_key(&req);
    let decision = limiter.check(&key, &req.path, limiter.now_ms());

    debug!(
        policy = %limiter.policy().name,
        key = %key,
        outcome = decision.outcome(),
        "Handled admit request"
    );

    Ok(Json(AdmitResponse::new(
        key,
        limiter.policy().name.clone(),
        &decision,
    )))
}

pub async fn client_status(
    State(registry): State<Arc<PolicyRegistry>>,
    Path((policy, key)): Path<(String, String)>,
) -> Result<Json<ClientStatus>> {
    let limiter = registry
        .by_name(&policy)
        .ok_or_else(|| WardenError::UnknownPolicy(policy.clone()))?;

    info!(policy = %policy, key = %key, "Received client status request");
    Ok(Json(limiter.status(&key)))
}

pub async fn current_config(State(registry): State<Arc<PolicyRegistry>>) -> Json<PolicyFileConfig> {
    debug!("Received config request");
    Json(registry.config())
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub policies: usize,
}

pub async fn health_check(State(registry): State<Arc<PolicyRegistry>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "serving",
        policies: registry.names().len(),
    })
}

#[cfg(test)]
mod tests {
    use crate::clock::ManualClock;
    use crate::config::PolicyFileConfig;
    use crate::registry::PolicyRegistry;
    use crate::server::router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let registry = PolicyRegistry::with_clock(
            PolicyFileConfig::default(),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            None,
        );
        router(Arc::new(registry))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn admit_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/admit")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_admit_by_path_until_blocked() {
        let app = app();
        let body = json!({
            "path": "/api/auth/login",
            "headers": { "CF-Connecting-IP": "1.2.3.4", "X-Real-IP": "5.6.7.8" }
        });

        for remaining in (0..5).rev() {
            let (status, json) = send(&app, admit_request(body.clone())).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["decision"], "admitted");
            assert_eq!(json["key"], "1.2.3.4");
            assert_eq!(json["policy"], "auth");
            assert_eq!(json["remaining"], remaining);
        }

        // auth blocks on the third violation
        for violations in 1..=3 {
            let (_, json) = send(&app, admit_request(body.clone())).await;
            assert_eq!(json["decision"], "rate_limited");
            assert_eq!(json["violations"], violations);
        }

        let (_, json) = send(&app, admit_request(body)).await;
        assert_eq!(json["decision"], "blocked");
        assert_eq!(json["retryAfter"], 3600);

        let (status, json) = send(
            &app,
            Request::get("/v1/status/auth/1.2.3.4").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["blocked"], true);
        assert_eq!(json["violations"], 3);
    }

    #[tokio::test]
    async fn test_admit_with_named_policy_and_user() {
        let app = app();
        let body = json!({
            "policy": "ai_inference",
            "path": "/anything",
            "headers": { "x-forwarded-for": "7.7.7.7, 10.0.0.1" },
            "user_id": "alice"
        });

        let (status, json) = send(&app, admit_request(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["key"], "7.7.7.7:alice");
        assert_eq!(json["limit"], 10);
    }

    #[tokio::test]
    async fn test_unknown_policy_is_404() {
        let app = app();
        let (status, json) = send(
            &app,
            admit_request(json!({ "policy": "nope", "path": "/" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Unknown policy: nope");

        let (status, _) = send(
            &app,
            Request::get("/v1/status/nope/1.2.3.4").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_config_and_health() {
        let app = app();

        let (status, json) = send(&app, Request::get("/v1/config").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["policies"].as_array().unwrap().len(), 4);
        assert_eq!(json["policies"][2]["preset"], "auth");

        let (status, json) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "serving");
        assert_eq!(json["policies"], 4);
    }
}
