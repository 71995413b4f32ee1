//! HTTP handlers for the scrape endpoint.

use crate::web::router::WebState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

/// Render the current gauge values in the Prometheus text format.
pub async fn metrics(State(state): State<WebState>) -> Response {
    match state.publisher.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, state.publisher.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "hwtemp-exporter",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Landing page pointing at the metrics path.
pub async fn index(State(state): State<WebState>) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>Hardware Temperature Exporter</title></head>
<body>
<h1>Hardware Temperature Exporter</h1>
<p>Version {}</p>
<p><a href="{}">Metrics</a></p>
</body>
</html>
"#,
        env!("CARGO_PKG_VERSION"),
        state.metrics_path
    ))
}
