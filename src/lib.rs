//! # hwtemp_exporter - Hardware Temperature Exporter
//!
//! Periodically samples hardware temperatures from `sensors -j` (lm-sensors)
//! and `smartctl -j -A` (smartmontools) and exposes the latest readings as
//! Prometheus gauges over HTTP.
//!
//! ## Features
//!
//! - **One snapshot per tick**: a single `sensors` run feeds every sensor metric
//! - **Field paths**: readings are located with dotted paths such as
//!   `k10temp-pci-00c3.Tctl.temp1_input`, configurable per metric
//! - **Resilient acquisition**: tool failures, garbled output and implausible
//!   values cost one reading, never the process
//! - **Explicit missing-value policy**: keep the last value or write a sentinel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hwtemp_exporter::{
//!     start_web_server, ExporterConfig, MetricPublisher, ReadingAcquirer,
//!     SystemCommandRunner, TemperatureCollector, WebConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExporterConfig::default();
//!     let publisher = Arc::new(MetricPublisher::new(&config)?);
//!     let acquirer = ReadingAcquirer::new(SystemCommandRunner::new(), config);
//!     let collector = TemperatureCollector::new(acquirer, publisher.clone());
//!
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     tokio::spawn(collector.run(shutdown_rx));
//!
//!     // Serve on port 9300 until the process is stopped
//!     start_web_server(WebConfig::default(), publisher, std::future::pending()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod web;

// Re-export public API
pub use config::{ExporterConfig, MissingPolicy};
pub use error::{ExporterError, ReadingError, Result};
pub use metrics::{
    acquirer::{extract_field, sanitize_output, ReadingAcquirer},
    collector::{LoopState, TemperatureCollector},
    command::SystemCommandRunner,
    data::{
        DiskDiagnostic, DiskTarget, FieldPath, MetricDefinition, PlausibleRange, SensorSnapshot,
        SensorTarget, TargetOutcome, TickReport,
    },
    publisher::MetricPublisher,
    traits::{CommandOutput, CommandRunner, ToolCommand},
};
pub use web::{start_web_server, WebConfig};

/// The default collection interval in seconds
pub const DEFAULT_INTERVAL_SECS: u64 = 5;

/// The default pause after a failed collection cycle, in seconds
pub const DEFAULT_COOLDOWN_SECS: u64 = 10;

/// The default scrape port
pub const DEFAULT_PORT: u16 = 9300;
