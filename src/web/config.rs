//! Web server configuration.

use crate::error::{ExporterError, Result};
use serde::{Deserialize, Serialize};

/// Paths already served by the router.
const RESERVED_PATHS: [&str; 2] = ["/", "/health"];

/// Configuration for the scrape endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Host to bind the server to
    pub host: String,
    /// Port to bind the server to
    pub port: u16,
    /// Path serving the exposition text
    pub metrics_path: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: crate::DEFAULT_PORT,
            metrics_path: "/metrics".to_string(),
        }
    }
}

impl WebConfig {
    /// Create a new web configuration with custom host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Set the host for the web server.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port for the web server.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the path the metrics are served on. A missing leading slash is added.
    pub fn with_metrics_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.metrics_path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        self
    }

    /// Check that the metrics path can be routed next to the built-in pages.
    pub fn validate(&self) -> Result<()> {
        let path = self.metrics_path.as_str();
        if !path.starts_with('/') {
            return Err(ExporterError::config_error(format!(
                "metrics path '{}' must start with '/'",
                path
            )));
        }
        if RESERVED_PATHS.contains(&path) {
            return Err(ExporterError::config_error(format!(
                "metrics path '{}' is already served",
                path
            )));
        }
        if path.contains(|c| matches!(c, ':' | '*' | '{' | '}')) {
            return Err(ExporterError::config_error(format!(
                "metrics path '{}' must not contain route parameters",
                path
            )));
        }
        Ok(())
    }

    /// Get the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
