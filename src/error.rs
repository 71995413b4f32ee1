//! Error handling for the hardware temperature exporter.
//!
//! Two layers of errors exist. [`ReadingError`] describes why a single
//! reading could not be obtained; it is always absorbed by the collection
//! loop and turned into "no reading this tick". [`ExporterError`] covers
//! process-level failures such as an invalid configuration or a port that
//! cannot be bound.

/// A specialized `Result` type for exporter operations.
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Process-level error type.
#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metric registration or encoding failed
    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// A target references a metric that was never defined
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ExporterError {
    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Why a single reading is unavailable for the current tick.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReadingError {
    /// The tool is missing, exited unsuccessfully or timed out
    #[error("{tool} unavailable: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    /// The tool ran but its output could not be parsed
    #[error("{tool} produced malformed output: {reason}")]
    MalformedOutput { tool: String, reason: String },

    /// The requested field is not present in the tool output
    #[error("field {path} not present")]
    FieldMissing { path: String },

    /// The value is outside the physically plausible range
    #[error("value {value} outside plausible range [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
}

impl ReadingError {
    /// Create a new tool-unavailable error
    pub fn tool_unavailable(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ToolUnavailable {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Create a new malformed-output error
    pub fn malformed_output(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedOutput {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Create a new field-missing error
    pub fn field_missing(path: impl Into<String>) -> Self {
        Self::FieldMissing { path: path.into() }
    }

    /// Stable label for this failure, used in logs and the failure counter.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToolUnavailable { .. } => "tool_unavailable",
            Self::MalformedOutput { .. } => "malformed_output",
            Self::FieldMissing { .. } => "field_missing",
            Self::OutOfRange { .. } => "out_of_range",
        }
    }

    /// Whether a fresh invocation of the tool might succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::OutOfRange { .. })
    }
}
