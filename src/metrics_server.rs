use crate::errors::{Result, WardenError};
use crate::metrics::gather_text;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Router exposing Prometheus metrics at `/metrics`
pub fn metrics_router() -> Router {
    Router::new()
        .route("/metrics", get(serve_metrics))
        .route("/", get(serve_metrics))
}

async fn serve_metrics() -> Response {
    match gather_text() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Start HTTP server for Prometheus metrics endpoint
pub async fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| WardenError::InternalError(format!("Failed to bind metrics server: {}", e)))?;

    info!("Metrics server listening on http://{}/metrics", addr);

    axum::serve(listener, metrics_router())
        .await
        .map_err(|e| WardenError::InternalError(format!("Metrics server error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_metrics_endpoint_serves_text() {
        crate::metrics::record_violation("metrics_server_test");

        let response = metrics_router()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("warden_violations_total"));
    }
}
