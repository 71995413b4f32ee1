//! Collection configuration.
//!
//! There is no configuration file: everything has a compiled-in default that
//! the binary can override from command-line flags or environment variables.

use crate::error::{ExporterError, Result};
use crate::metrics::data::{
    DiskTarget, FieldPath, PlausibleRange, SensorTarget, CPU_TEMPERATURE, METRIC_DEFINITIONS,
    NETWORK_TEMPERATURE, NVME_TEMPERATURE, SSD_TEMPERATURE,
};
use crate::metrics::traits::ToolCommand;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default field path of the AMD Tctl reading.
pub const DEFAULT_CPU_PATH: &str = "k10temp-pci-00c3.Tctl.temp1_input";
/// Default field path of the NVMe composite reading.
pub const DEFAULT_NVME_PATH: &str = "nvme-pci-0400.Composite.temp1_input";
/// Default field path of the MT7921 wireless adapter reading.
pub const DEFAULT_WIFI_PATH: &str = "mt7921_phy0-pci-0300.temp1.temp1_input";
/// Default block device queried with smartctl.
pub const DEFAULT_SSD_DEVICE: &str = "/dev/sda";

/// What to do with a series when a tick produced no reading for it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Leave the previous value standing
    #[default]
    Retain,
    /// Overwrite the series with a fixed value
    Sentinel(f64),
}

impl FromStr for MissingPolicy {
    type Err = ExporterError;

    /// Accepts `retain`, `zero`, or `sentinel:<value>`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "retain" | "keep" => return Ok(Self::Retain),
            "zero" => return Ok(Self::Sentinel(0.0)),
            _ => {}
        }
        if let Some(value) = s.strip_prefix("sentinel:") {
            let value = value.trim().parse::<f64>().map_err(|e| {
                ExporterError::config_error(format!("invalid sentinel value '{}': {}", value, e))
            })?;
            return Ok(Self::Sentinel(value));
        }
        Err(ExporterError::config_error(format!(
            "unknown missing-value policy '{}', expected retain, zero or sentinel:<value>",
            s
        )))
    }
}

impl fmt::Display for MissingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retain => f.write_str("retain"),
            Self::Sentinel(value) => write!(f, "sentinel:{}", value),
        }
    }
}

/// Configuration for acquisition and the collection loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Collection period in seconds
    pub interval_secs: u64,
    /// Pause after a failed tick, in seconds
    pub cooldown_secs: u64,
    /// Sensor tool executable
    pub sensors_bin: String,
    /// Sensor tool timeout in seconds
    pub sensors_timeout_secs: u64,
    /// Disk tool executable
    pub smartctl_bin: String,
    /// Privilege escalation wrapper for the disk tool, if any
    pub privilege_prefix: Option<String>,
    /// Disk tool timeout in seconds
    pub disk_timeout_secs: u64,
    /// Total disk tool attempts per tick
    pub disk_attempts: u32,
    /// Pause between disk tool attempts, in milliseconds
    pub disk_backoff_ms: u64,
    /// Accepted temperature range
    pub plausible_range: PlausibleRange,
    /// Fields extracted from the sensor snapshot
    pub sensor_targets: Vec<SensorTarget>,
    /// Devices queried with the disk tool
    pub disk_targets: Vec<DiskTarget>,
    /// Policy applied to metrics without an override
    pub missing_policy: MissingPolicy,
    /// Per-metric policy overrides
    pub policy_overrides: HashMap<String, MissingPolicy>,
    /// Consecutive misses on one series before a warning is logged
    pub warn_after_misses: u32,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            interval_secs: crate::DEFAULT_INTERVAL_SECS,
            cooldown_secs: crate::DEFAULT_COOLDOWN_SECS,
            sensors_bin: "sensors".to_string(),
            sensors_timeout_secs: 3,
            smartctl_bin: "smartctl".to_string(),
            privilege_prefix: Some("sudo".to_string()),
            disk_timeout_secs: 5,
            disk_attempts: 3,
            disk_backoff_ms: 1000,
            plausible_range: PlausibleRange::default(),
            sensor_targets: default_sensor_targets(),
            disk_targets: vec![DiskTarget::new(
                SSD_TEMPERATURE.name,
                "Samsung_T5",
                DEFAULT_SSD_DEVICE,
            )],
            missing_policy: MissingPolicy::Retain,
            policy_overrides: HashMap::new(),
            warn_after_misses: 5,
        }
    }
}

fn default_sensor_targets() -> Vec<SensorTarget> {
    [
        (CPU_TEMPERATURE.name, "k10temp", DEFAULT_CPU_PATH),
        (NVME_TEMPERATURE.name, "nvme0", DEFAULT_NVME_PATH),
        (NETWORK_TEMPERATURE.name, "wlan0", DEFAULT_WIFI_PATH),
    ]
    .into_iter()
    .filter_map(|(metric, label, path)| {
        FieldPath::new(path)
            .ok()
            .map(|path| SensorTarget::new(metric, label, path))
    })
    .collect()
}

impl ExporterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn disk_backoff(&self) -> Duration {
        Duration::from_millis(self.disk_backoff_ms)
    }

    /// Invocation of the sensor tool in JSON mode.
    pub fn sensors_command(&self) -> ToolCommand {
        ToolCommand::new(
            "sensors",
            &self.sensors_bin,
            Duration::from_secs(self.sensors_timeout_secs),
        )
        .arg("-j")
    }

    /// Invocation of the disk tool for one device, with the privilege
    /// prefix applied when configured.
    pub fn disk_command(&self, device: &str) -> ToolCommand {
        let timeout = Duration::from_secs(self.disk_timeout_secs);
        let command = match &self.privilege_prefix {
            Some(prefix) => {
                ToolCommand::new("smartctl", prefix, timeout).arg(&self.smartctl_bin)
            }
            None => ToolCommand::new("smartctl", &self.smartctl_bin, timeout),
        };
        command.args(["-j", "-A", device])
    }

    /// Check the configuration for values the collection loop cannot use.
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(ExporterError::config_error("interval must be at least 1 second"));
        }
        if self.disk_attempts == 0 {
            return Err(ExporterError::config_error("disk attempts must be at least 1"));
        }
        if self.sensors_timeout_secs == 0 || self.disk_timeout_secs == 0 {
            return Err(ExporterError::config_error("tool timeouts must be non-zero"));
        }
        let range = &self.plausible_range;
        if !(range.min.is_finite() && range.max.is_finite() && range.min < range.max) {
            return Err(ExporterError::config_error(format!(
                "invalid plausible range [{}, {}]",
                range.min, range.max
            )));
        }

        let targets = self
            .sensor_targets
            .iter()
            .map(|t| t.metric.as_str())
            .chain(self.disk_targets.iter().map(|t| t.metric.as_str()))
            .chain(self.policy_overrides.keys().map(String::as_str));
        for metric in targets {
            if !METRIC_DEFINITIONS.iter().any(|d| d.name == metric) {
                return Err(ExporterError::UnknownMetric(metric.to_string()));
            }
        }
        Ok(())
    }

    /// Set the collection interval in seconds.
    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    /// Set the cool-down after a failed tick in seconds.
    pub fn with_cooldown_secs(mut self, secs: u64) -> Self {
        self.cooldown_secs = secs;
        self
    }

    /// Set the sensor tool executable.
    pub fn with_sensors_bin(mut self, bin: impl Into<String>) -> Self {
        self.sensors_bin = bin.into();
        self
    }

    /// Set the disk tool executable.
    pub fn with_smartctl_bin(mut self, bin: impl Into<String>) -> Self {
        self.smartctl_bin = bin.into();
        self
    }

    /// Set or clear the privilege escalation wrapper.
    pub fn with_privilege_prefix(mut self, prefix: Option<String>) -> Self {
        self.privilege_prefix = prefix;
        self
    }

    /// Set the disk retry attempts and the pause between them.
    pub fn with_disk_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.disk_attempts = attempts;
        self.disk_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Replace the sensor targets.
    pub fn with_sensor_targets(mut self, targets: Vec<SensorTarget>) -> Self {
        self.sensor_targets = targets;
        self
    }

    /// Replace the disk targets.
    pub fn with_disk_targets(mut self, targets: Vec<DiskTarget>) -> Self {
        self.disk_targets = targets;
        self
    }

    /// Set the default missing-value policy.
    pub fn with_missing_policy(mut self, policy: MissingPolicy) -> Self {
        self.missing_policy = policy;
        self
    }

    /// Override the missing-value policy of one metric.
    pub fn with_policy_override(mut self, metric: impl Into<String>, policy: MissingPolicy) -> Self {
        self.policy_overrides.insert(metric.into(), policy);
        self
    }

    /// Set how many consecutive misses trigger a warning.
    pub fn with_warn_after_misses(mut self, misses: u32) -> Self {
        self.warn_after_misses = misses;
        self
    }

    /// Redirect the field path of the sensor target for `metric`.
    pub fn with_sensor_path(mut self, metric: &str, path: FieldPath) -> Self {
        for target in self.sensor_targets.iter_mut().filter(|t| t.metric == metric) {
            target.path = path.clone();
        }
        self
    }

    /// Redirect the device of the disk target for `metric`.
    pub fn with_disk_device(mut self, metric: &str, device: impl Into<String>) -> Self {
        let device = device.into();
        for target in self.disk_targets.iter_mut().filter(|t| t.metric == metric) {
            target.device = device.clone();
        }
        self
    }
}
