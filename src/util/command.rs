//! Structured invocation of external tools.
//!
//! Every external process goes through a [Runner], so no shell ever
//! interprets database names, file names or credentials.

use std::fmt;
use std::io;
use std::process::{Command, ExitStatus, Output, Stdio};

use derive_more::{Display, Error};

/// Executes external commands to completion.
pub trait Runner {
    /// Runs `command`, blocking until it exits.
    ///
    /// A non-zero exit status is reported as [CommandError::Failed].
    fn run(&self, command: &mut Command) -> Result<Output, CommandError>;
}

/// [Runner] spawning real processes on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, command: &mut Command) -> Result<Output, CommandError> {
        let invocation = Invocation::from(&*command);
        log::trace!(target: "command", "Running: {invocation}");

        let output = match command.stdin(Stdio::null()).output() {
            Ok(output) => output,
            Err(source) => {
                return Err(CommandError::NotRun {
                    command: invocation,
                    source,
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let captured = format!("{stdout}{stderr}");
            let rule = "-".repeat(80);
            log::error!(target: "command", "Command execution failed. Output:\n{rule}\n{}\n{rule}", captured.trim_end());

            return Err(CommandError::Failed {
                command: invocation,
                status: output.status,
                output: captured,
            });
        }

        // relay stderr
        if !stderr.trim().is_empty() {
            log::warn!(target: "command", "{}: {}", invocation.program, stderr.trim_end());
        }
        if !stdout.trim().is_empty() {
            log::debug!(target: "command", "{}: {}", invocation.program, stdout.trim_end());
        }

        Ok(output)
    }
}

/// Snapshot of a [Command] taken before it runs.
///
/// Displays as the command line. Environment values are never displayed,
/// since they carry credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Explicitly set (or removed, [None]) environment variables.
    pub envs: Vec<(String, Option<String>)>,
}

impl Invocation {
    /// Value following `flag` in the argument list.
    #[cfg(test)]
    pub(crate) fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Value of an explicitly set environment variable.
    #[cfg(test)]
    pub(crate) fn env(&self, key: &str) -> Option<&str> {
        self.envs
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }
}

impl From<&Command> for Invocation {
    fn from(command: &Command) -> Self {
        let program = command.get_program().to_string_lossy().into_owned();
        let args = command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        let envs = command
            .get_envs()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.map(|v| v.to_string_lossy().into_owned()),
                )
            })
            .collect();

        Self {
            program,
            args,
            envs,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<_> = self.envs.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("envs", &env_keys)
            .finish()
    }
}

#[derive(Debug, Display, Error)]
/// Failure of an external command.
pub enum CommandError {
    /// The process could not be spawned or waited on.
    #[display("Failed to run `{command}`: {source}")]
    NotRun { command: Invocation, source: io::Error },
    /// The process exited unsuccessfully.
    #[display("`{command}` failed with {status}")]
    Failed {
        command: Invocation,
        status: ExitStatus,
        /// Captured stdout followed by stderr.
        output: String,
    },
}

impl CommandError {
    /// The command that failed.
    #[cfg(test)]
    pub(crate) fn command(&self) -> &Invocation {
        match self {
            Self::NotRun { command, .. } | Self::Failed { command, .. } => command,
        }
    }
}
