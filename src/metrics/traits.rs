//! Traits for running external diagnostic tools.

use crate::error::ReadingError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A fully specified invocation of an external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Short name used in logs and errors (e.g. "sensors")
    pub name: String,
    /// Executable to spawn
    pub program: String,
    /// Arguments passed to the executable
    pub args: Vec<String>,
    /// Upper bound on how long the invocation may take
    pub timeout: Duration,
}

impl ToolCommand {
    pub fn new(name: impl Into<String>, program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// What a finished tool invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was terminated by a signal
    pub status: Option<i32>,
    /// Captured standard output
    pub stdout: Vec<u8>,
}

impl CommandOutput {
    /// Output of a process that exited with status 0.
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Trait for executing external tools.
///
/// Implementations must bound each invocation by [`ToolCommand::timeout`]
/// and report spawn failures and timeouts as
/// [`ReadingError::ToolUnavailable`]. A process that runs to completion is
/// returned as [`CommandOutput`] whatever its exit status; interpreting the
/// status is left to the caller because tools like smartctl use it as a
/// bitmask.
pub trait CommandRunner: Send + Sync {
    /// Run the command and capture its standard output.
    fn run(
        &self,
        command: &ToolCommand,
    ) -> impl Future<Output = Result<CommandOutput, ReadingError>> + Send;
}

impl<R: CommandRunner> CommandRunner for Arc<R> {
    fn run(
        &self,
        command: &ToolCommand,
    ) -> impl Future<Output = Result<CommandOutput, ReadingError>> + Send {
        (**self).run(command)
    }
}
