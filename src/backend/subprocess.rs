//! Subprocess runner shared by the storage and deployment collaborators

use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Errors from running an external command
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("'{program}' exited with code {code}: {stderr}")]
    Failed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("'{program}' timed out after {secs} seconds")]
    Timeout { program: String, secs: u64 },

    #[error("Output of '{program}' is not valid UTF-8")]
    Decode { program: String },
}

/// Captured output of a successful command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs with a timeout
#[derive(Debug, Clone)]
pub struct CommandRunner {
    /// Timeout for command execution in seconds
    timeout_secs: u64,
}

impl CommandRunner {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    /// Run `program args...`, optionally from `cwd`, and capture its output.
    ///
    /// The child is killed if the timeout elapses.
    pub async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> Result<CommandOutput, CommandError> {
        debug!("Spawning {} with {} argument(s)", program, args.len());

        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let output = timeout(Duration::from_secs(self.timeout_secs), command.output())
            .await
            .map_err(|_| CommandError::Timeout {
                program: program.to_string(),
                secs: self.timeout_secs,
            })?
            .map_err(|e| CommandError::Spawn {
                program: program.to_string(),
                reason: e.to_string(),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!("{} exited with code {}: {}", program, code, stderr);
            return Err(CommandError::Failed {
                program: program.to_string(),
                code,
                stderr,
            });
        }

        let stdout = String::from_utf8(output.stdout).map_err(|_| CommandError::Decode {
            program: program.to_string(),
        })?;
        debug!("{} returned {} bytes of output", program, stdout.len());

        Ok(CommandOutput { stdout, stderr })
    }
}
