//! Data structures for temperature readings and metric definitions.

use crate::error::{ExporterError, ReadingError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Static description of a gauge family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDefinition {
    /// Metric name as exposed to the scraper
    pub name: &'static str,
    /// Help text
    pub help: &'static str,
    /// Name of the single label dimension
    pub label: &'static str,
}

/// CPU temperature, labelled by sensor chip.
pub const CPU_TEMPERATURE: MetricDefinition = MetricDefinition {
    name: "cpu_temperature",
    help: "CPU temperature (Tctl) in degrees Celsius",
    label: "chip",
};

/// NVMe composite temperature, labelled by device.
pub const NVME_TEMPERATURE: MetricDefinition = MetricDefinition {
    name: "nvme_temperature",
    help: "NVMe composite temperature in degrees Celsius",
    label: "device",
};

/// Wireless adapter temperature, labelled by interface.
pub const NETWORK_TEMPERATURE: MetricDefinition = MetricDefinition {
    name: "network_temperature",
    help: "Wireless adapter temperature in degrees Celsius",
    label: "interface",
};

/// External SSD temperature, labelled by drive model.
pub const SSD_TEMPERATURE: MetricDefinition = MetricDefinition {
    name: "ssd_temperature",
    help: "External SSD temperature in degrees Celsius",
    label: "model",
};

/// Every gauge family the exporter defines at startup.
pub const METRIC_DEFINITIONS: [MetricDefinition; 4] = [
    CPU_TEMPERATURE,
    NVME_TEMPERATURE,
    NETWORK_TEMPERATURE,
    SSD_TEMPERATURE,
];

/// Dot-delimited key sequence locating a scalar inside nested tool output.
///
/// Segments are split on `.` and must be non-empty, so
/// `"k10temp-pci-00c3.Tctl.temp1_input"` has three segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    raw: String,
}

impl FieldPath {
    /// Parse a dotted path.
    pub fn new(path: impl Into<String>) -> Result<Self, ExporterError> {
        let raw = path.into();
        if raw.is_empty() {
            return Err(ExporterError::config_error("field path is empty"));
        }
        if raw.split('.').any(str::is_empty) {
            return Err(ExporterError::config_error(format!(
                "field path '{}' contains an empty segment",
                raw
            )));
        }
        Ok(Self { raw })
    }

    /// Iterate over the path segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.raw.split('.')
    }

    /// The dotted representation.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for FieldPath {
    type Err = ExporterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = ExporterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.raw
    }
}

/// One parsed capture of `sensors -j` output.
///
/// The document is chip → feature → subfeature → value. A chip or feature
/// that is absent simply means the host does not have it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorSnapshot {
    chips: serde_json::Map<String, serde_json::Value>,
}

impl SensorSnapshot {
    /// Wrap an already parsed top-level object.
    pub fn new(chips: serde_json::Map<String, serde_json::Value>) -> Self {
        Self { chips }
    }

    /// Parse a JSON document. The top level must be an object.
    pub fn parse(text: &str) -> Result<Self, String> {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(serde_json::Value::Object(chips)) => Ok(Self { chips }),
            Ok(other) => Err(format!("expected a JSON object, got {}", json_kind(&other))),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Walk `path` and return the numeric value at its end.
    pub fn extract(&self, path: &FieldPath) -> Result<f64, ReadingError> {
        let mut segments = path.segments();
        let missing = || ReadingError::field_missing(path.as_str());

        let first = segments.next().ok_or_else(missing)?;
        let mut value = self.chips.get(first).ok_or_else(missing)?;
        for segment in segments {
            value = value
                .as_object()
                .and_then(|object| object.get(segment))
                .ok_or_else(missing)?;
        }

        value.as_f64().ok_or_else(missing)
    }

    /// Names of the chips present in this capture.
    pub fn chip_names(&self) -> impl Iterator<Item = &str> {
        self.chips.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.chips.is_empty()
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Inclusive range of physically plausible temperatures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlausibleRange {
    pub min: f64,
    pub max: f64,
}

impl PlausibleRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    /// Pass `value` through, or reject it as [`ReadingError::OutOfRange`].
    pub fn check(&self, value: f64) -> Result<f64, ReadingError> {
        if self.contains(value) {
            Ok(value)
        } else {
            Err(ReadingError::OutOfRange {
                value,
                min: self.min,
                max: self.max,
            })
        }
    }
}

impl Default for PlausibleRange {
    fn default() -> Self {
        Self {
            min: -40.0,
            max: 150.0,
        }
    }
}

/// Result of one `smartctl -j -A` invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskDiagnostic {
    /// Value of `temperature.current`, if reported
    pub current: Option<f64>,
    /// Whether `current` is present and plausible
    pub valid: bool,
}

#[derive(Deserialize)]
struct SmartctlReport {
    #[serde(default)]
    temperature: Option<SmartctlTemperature>,
}

#[derive(Deserialize)]
struct SmartctlTemperature {
    #[serde(default)]
    current: Option<f64>,
}

impl DiskDiagnostic {
    /// Parse smartctl JSON output and validate the reported temperature.
    pub fn parse(text: &str, range: &PlausibleRange) -> Result<Self, serde_json::Error> {
        let report: SmartctlReport = serde_json::from_str(text)?;
        let current = report.temperature.and_then(|t| t.current);
        Ok(Self {
            current,
            valid: current.is_some_and(|value| range.contains(value)),
        })
    }
}

/// Binds a field of the sensor snapshot to a gauge series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorTarget {
    pub metric: String,
    pub label_value: String,
    pub path: FieldPath,
}

impl SensorTarget {
    pub fn new(metric: impl Into<String>, label_value: impl Into<String>, path: FieldPath) -> Self {
        Self {
            metric: metric.into(),
            label_value: label_value.into(),
            path,
        }
    }
}

/// Binds a block device's smartctl temperature to a gauge series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskTarget {
    pub metric: String,
    pub label_value: String,
    pub device: String,
}

impl DiskTarget {
    pub fn new(
        metric: impl Into<String>,
        label_value: impl Into<String>,
        device: impl Into<String>,
    ) -> Self {
        Self {
            metric: metric.into(),
            label_value: label_value.into(),
            device: device.into(),
        }
    }
}

/// What happened to one target during a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub metric: String,
    pub label_value: String,
    /// Published value, if the reading succeeded
    pub value: Option<f64>,
    /// Failure kind, if the reading did not succeed
    pub failure: Option<String>,
}

/// Summary of one collection tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickReport {
    /// When the tick started
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the tick in milliseconds
    pub duration_ms: u64,
    /// Per-target results in collection order
    pub outcomes: Vec<TargetOutcome>,
}

impl TickReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            duration_ms: 0,
            outcomes: Vec::new(),
        }
    }

    /// Number of targets that published a fresh value.
    pub fn published(&self) -> usize {
        self.outcomes.iter().filter(|o| o.value.is_some()).count()
    }

    /// Number of targets without a reading this tick.
    pub fn missing(&self) -> usize {
        self.outcomes.len() - self.published()
    }

    /// Outcome for a given series, if it was collected.
    pub fn outcome(&self, metric: &str, label_value: &str) -> Option<&TargetOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.metric == metric && o.label_value == label_value)
    }
}
