//! Subprocess-backed [`CommandRunner`].

use crate::error::ReadingError;
use crate::metrics::traits::{CommandOutput, CommandRunner, ToolCommand};
use std::future::Future;
use std::process::Stdio;
use tokio::process::Command;

/// Runs tools as child processes on the tokio runtime.
///
/// Standard error is discarded so that diagnostic chatter from the tools
/// never reaches the exporter's own output. A child that outlives its
/// timeout is killed when its handle is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(
        &self,
        command: &ToolCommand,
    ) -> impl Future<Output = Result<CommandOutput, ReadingError>> + Send {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let name = command.name.clone();
        let timeout = command.timeout;

        async move {
            match tokio::time::timeout(timeout, cmd.output()).await {
                Ok(Ok(output)) => Ok(CommandOutput {
                    status: output.status.code(),
                    stdout: output.stdout,
                }),
                Ok(Err(e)) => Err(ReadingError::tool_unavailable(
                    name,
                    format!("failed to spawn: {}", e),
                )),
                Err(_) => Err(ReadingError::tool_unavailable(
                    name,
                    format!("timed out after {:?}", timeout),
                )),
            }
        }
    }
}
