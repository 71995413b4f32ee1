//! Reading acquisition from `sensors` and `smartctl`.
//!
//! Every function here returns a [`ReadingError`] instead of failing the
//! caller: a missing chip, a broken tool or a garbled line of output only
//! costs one reading for one tick.

use crate::config::ExporterConfig;
use crate::error::ReadingError;
use crate::metrics::data::{DiskDiagnostic, FieldPath, SensorSnapshot, SensorTarget};
use crate::metrics::traits::{CommandOutput, CommandRunner};
use tracing::debug;

/// smartctl exit bits meaning the command line could not be parsed or the
/// device could not be opened. Higher bits only describe disk health.
const SMARTCTL_FATAL_MASK: i32 = 0b11;

/// Field of the smartctl report holding the drive temperature.
const SMARTCTL_TEMPERATURE_FIELD: &str = "temperature.current";

/// Acquires temperature readings through a [`CommandRunner`].
pub struct ReadingAcquirer<R> {
    runner: R,
    config: ExporterConfig,
}

impl<R: CommandRunner> ReadingAcquirer<R> {
    /// Create an acquirer that runs tools as described by `config`.
    pub fn new(runner: R, config: ExporterConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    /// Run the sensor tool once and parse its JSON output.
    pub async fn fetch_sensor_snapshot(&self) -> Result<SensorSnapshot, ReadingError> {
        let command = self.config.sensors_command();
        let output = self.runner.run(&command).await?;

        if !output.is_success() {
            return Err(ReadingError::tool_unavailable(
                &command.name,
                exit_description(&output),
            ));
        }

        let text = sanitize_output(&output.stdout);
        if text.trim().is_empty() {
            return Err(ReadingError::malformed_output(&command.name, "empty output"));
        }

        let snapshot = SensorSnapshot::parse(&text)
            .map_err(|reason| ReadingError::malformed_output(&command.name, reason))?;
        debug!(
            "Sensor snapshot with chips: {:?}",
            snapshot.chip_names().collect::<Vec<_>>()
        );
        Ok(snapshot)
    }

    /// Extract a sensor target from a snapshot and check it is plausible.
    pub fn read_sensor_target(
        &self,
        snapshot: &SensorSnapshot,
        target: &SensorTarget,
    ) -> Result<f64, ReadingError> {
        let value = extract_field(snapshot, &target.path)?;
        self.config.plausible_range.check(value)
    }

    /// Read a drive temperature with smartctl, retrying transient failures.
    ///
    /// Up to `disk_attempts` invocations are made with `disk_backoff`
    /// between them. An implausible value is returned at once since asking
    /// again will not make the sensor saner.
    pub async fn fetch_disk_temperature(&self, device: &str) -> Result<f64, ReadingError> {
        let attempts = self.config.disk_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.query_disk(device).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    debug!(
                        "smartctl attempt {}/{} for {} failed: {}",
                        attempt, attempts, device, e
                    );
                    tokio::time::sleep(self.config.disk_backoff()).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn query_disk(&self, device: &str) -> Result<f64, ReadingError> {
        let command = self.config.disk_command(device);
        let output = self.runner.run(&command).await?;

        match output.status {
            Some(code) if code & SMARTCTL_FATAL_MASK == 0 => {
                if code != 0 {
                    debug!("smartctl reported status {:#x} for {}", code, device);
                }
            }
            _ => {
                return Err(ReadingError::tool_unavailable(
                    &command.name,
                    exit_description(&output),
                ))
            }
        }

        let text = sanitize_output(&output.stdout);
        let range = &self.config.plausible_range;
        let diagnostic = DiskDiagnostic::parse(&text, range)
            .map_err(|e| ReadingError::malformed_output(&command.name, e.to_string()))?;

        match diagnostic.current {
            None => Err(ReadingError::field_missing(SMARTCTL_TEMPERATURE_FIELD)),
            Some(value) if diagnostic.valid => Ok(value),
            Some(value) => range.check(value),
        }
    }
}

/// Walk `path` through the snapshot.
///
/// An absent key anywhere along the path, or a terminal value that is not a
/// number, yields [`ReadingError::FieldMissing`]. Hosts differ in which chips
/// they expose, so this is logged at debug level only.
pub fn extract_field(snapshot: &SensorSnapshot, path: &FieldPath) -> Result<f64, ReadingError> {
    let result = snapshot.extract(path);
    if let Err(e) = &result {
        debug!("{}", e);
    }
    result
}

/// Decode tool output, dropping the stray `Â` and replacement characters
/// that lm-sensors sometimes leaves next to degree signs.
pub fn sanitize_output(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|c| !matches!(c, '\u{00C2}' | '\u{FFFD}'))
        .collect()
}

fn exit_description(output: &CommandOutput) -> String {
    match output.status {
        Some(code) => format!("exited with status {}", code),
        None => "terminated by signal".to_string(),
    }
}
