//! Web application router and middleware setup.

use crate::metrics::MetricPublisher;
use crate::web::config::WebConfig;
use crate::web::handlers;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// State shared with every handler.
#[derive(Clone)]
pub struct WebState {
    pub publisher: Arc<MetricPublisher>,
    pub metrics_path: String,
}

/// Create the axum application serving the scrape endpoint.
pub fn create_app(config: &WebConfig, publisher: Arc<MetricPublisher>) -> Router {
    let state = WebState {
        publisher,
        metrics_path: config.metrics_path.clone(),
    };

    Router::new()
        .route("/", get(handlers::index))
        .route(&config.metrics_path, get(handlers::metrics))
        .route("/health", get(handlers::health_check))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExporterConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> (Router, Arc<MetricPublisher>) {
        let publisher = Arc::new(MetricPublisher::new(&ExporterConfig::default()).unwrap());
        (create_app(&WebConfig::default(), publisher.clone()), publisher)
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (app, publisher) = app();
        publisher.publish("cpu_temperature", "k10temp", 48.5).unwrap();

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("cpu_temperature{chip=\"k10temp\"} 48.5"));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::get("/api/snapshot").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
