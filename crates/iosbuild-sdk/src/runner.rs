//! Execution of external tools.
//!
//! Every CMake and xcodebuild invocation goes through a [`CommandRunner`].
//! [`ProcessRunner`] spawns real processes; tests substitute a recording
//! runner so the pipeline can be exercised without the Apple toolchain.

use std::io;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::types::{BuildError, Result};

/// What happens to a tool's stdout and stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputPolicy {
    /// Inherit the terminal so output appears live.
    Stream,
    /// Buffer output and surface it only when the tool fails.
    #[default]
    Capture,
}

/// Runs one external command to completion.
///
/// Implementations block until the process exits and never retry.
pub trait CommandRunner {
    /// Runs `program` with `args`.
    ///
    /// # Errors
    ///
    /// * [`BuildError::ToolNotFound`] if `program` cannot be located
    /// * [`BuildError::ToolExecution`] if it exits unsuccessfully
    fn run(&self, program: &str, args: &[String], policy: OutputPolicy) -> Result<()>;
}

/// Runs commands as child processes of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &str, args: &[String], policy: OutputPolicy) -> Result<()> {
        let command_line = render_command(program, args);
        let executable = which::which(program).map_err(|_| BuildError::ToolNotFound {
            tool: program.to_string(),
        })?;
        debug!(command = %command_line, executable = %executable.display(), "running");

        let mut cmd = Command::new(&executable);
        cmd.args(args).stdin(Stdio::null());

        let (status, stdout, stderr) = match policy {
            OutputPolicy::Stream => {
                let status = cmd.status().map_err(|e| spawn_error(program, e))?;
                (status, String::new(), String::new())
            }
            OutputPolicy::Capture => {
                let output = cmd.output().map_err(|e| spawn_error(program, e))?;
                (
                    output.status,
                    String::from_utf8_lossy(&output.stdout).into_owned(),
                    String::from_utf8_lossy(&output.stderr).into_owned(),
                )
            }
        };

        if !status.success() {
            return Err(BuildError::ToolExecution {
                tool: program.to_string(),
                command: command_line,
                status: status.code(),
                stdout,
                stderr,
            });
        }
        Ok(())
    }
}

fn spawn_error(program: &str, err: io::Error) -> BuildError {
    if err.kind() == io::ErrorKind::NotFound {
        BuildError::ToolNotFound {
            tool: program.to_string(),
        }
    } else {
        BuildError::io(format!("failed to start {program}"), err)
    }
}

/// Renders a command line for logs and error messages.
pub fn render_command(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            line.push('"');
            line.push_str(arg);
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line
}
