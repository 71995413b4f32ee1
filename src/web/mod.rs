//! HTTP scrape endpoint.
//!
//! Serves the publisher's gauges in the Prometheus text exposition format.
//! Scrapes only read already published values and never trigger a
//! collection.

pub mod config;
pub mod handlers;
pub mod router;

// Re-export commonly used items
pub use config::WebConfig;
pub use router::create_app;

use crate::error::{ExporterError, Result};
use crate::metrics::MetricPublisher;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Bind the listener and serve scrapes until `shutdown` resolves.
///
/// A metrics path that clashes with the built-in routes is rejected as
/// [`ExporterError::Config`] before anything is bound. Failing to bind is the
/// exporter's only fatal runtime condition and is returned as
/// [`ExporterError::WebServer`].
pub async fn start_web_server<F>(
    config: WebConfig,
    publisher: Arc<MetricPublisher>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;
    let app = create_app(&config, publisher);

    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| ExporterError::config_error(format!("Invalid bind address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        ExporterError::web_server_error(format!("Failed to bind to {}: {}", addr, e))
    })?;

    info!("Serving metrics on http://{}{}", addr, config.metrics_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ExporterError::web_server_error(format!("Server error: {}", e)))?;

    Ok(())
}
