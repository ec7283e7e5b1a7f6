//! Shell command execution for lifecycle operations
//!
//! Commands are handed to a POSIX shell (`<shell> -c <command>`) in a
//! caller-supplied working directory, either blocking until the process exits
//! or detached so the caller returns as soon as the command has started.
//!
//! Every call yields an [`ExecutionResult`]: exit code 0 on success, the
//! process's own exit code when it terminated with a nonzero status, or the
//! sentinel [`SPAWN_FAILURE_EXIT_CODE`] when no process exit status exists.
//!
//! ## Detached commands
//!
//! A detached command is backgrounded by the shell itself
//! (`<shell> -c "<command> &"`). The shell exits right after forking the job,
//! and the executor reaps it immediately, so the real command is re-parented
//! to the OS and never lingers as a zombie of the caller. Nothing keeps
//! tracking the command afterwards and its exit status is never observed.

use crate::config::AgentConfig;
use crate::errors::{ExecError, SPAWN_FAILURE_EXIT_CODE};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use tracing::{debug, error, instrument, warn};

/// Shell used when no other is configured
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Whether the caller waits for the command to finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Wait for the process and report its exit status
    Blocking,
    /// Start the process and return without tracking it
    Detached,
}

/// Normalized outcome of a command execution
#[derive(Debug)]
pub struct ExecutionResult {
    /// 0 on success, the process exit code, or 1 when the command never ran
    pub exit_code: i32,
    /// Failure description, `None` on success
    pub error: Option<ExecError>,
}

impl ExecutionResult {
    fn success() -> Self {
        Self {
            exit_code: 0,
            error: None,
        }
    }

    fn failure(error: ExecError) -> Self {
        Self {
            exit_code: error.exit_code(),
            error: Some(error),
        }
    }

    /// Whether the command completed (or, when detached, started) cleanly
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }

    /// Convert into a `Result`, dropping the redundant exit code on success
    pub fn into_result(self) -> Result<(), ExecError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// A single command to run, with its sinks and wait mode
///
/// The invocation is consumed by [`Executor::run`]; sinks are owned by the
/// executor from then on.
#[derive(Debug)]
pub struct CommandInvocation {
    /// Command string interpreted by the shell
    pub command: String,
    /// Directory the shell starts in
    pub working_dir: PathBuf,
    /// Destination of the process's standard output (blocking mode only)
    pub stdout: Stdio,
    /// Destination of the process's standard error (blocking mode only)
    pub stderr: Stdio,
    /// Blocking or detached execution
    pub wait_mode: WaitMode,
}

impl CommandInvocation {
    /// Create a blocking invocation writing into the given sinks
    pub fn blocking(
        command: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        stdout: impl Into<Stdio>,
        stderr: impl Into<Stdio>,
    ) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
            stdout: stdout.into(),
            stderr: stderr.into(),
            wait_mode: WaitMode::Blocking,
        }
    }

    /// Create a detached invocation; output goes to the inherited streams
    pub fn detached(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
            stdout: Stdio::inherit(),
            stderr: Stdio::inherit(),
            wait_mode: WaitMode::Detached,
        }
    }
}

/// Runs commands through a configured shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executor {
    shell: PathBuf,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    /// Executor using [`DEFAULT_SHELL`]
    pub fn new() -> Self {
        Self::with_shell(DEFAULT_SHELL)
    }

    /// Executor using a specific shell binary
    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Executor using the shell named in the agent configuration
    pub fn from_config(config: &AgentConfig) -> Self {
        Self::with_shell(config.shell.clone())
    }

    /// Shell binary used for every command
    pub fn shell(&self) -> &Path {
        &self.shell
    }

    /// Run an invocation according to its wait mode
    pub fn run(&self, invocation: CommandInvocation) -> ExecutionResult {
        let CommandInvocation {
            command,
            working_dir,
            stdout,
            stderr,
            wait_mode,
        } = invocation;

        match wait_mode {
            WaitMode::Blocking => self.run_blocking(&command, &working_dir, stdout, stderr),
            WaitMode::Detached => self.run_detached(&command, &working_dir),
        }
    }

    /// Run `command` and wait for it to terminate
    ///
    /// Output is written straight into `stdout` and `stderr`. Both sinks are
    /// closed before this returns, whatever the outcome.
    #[instrument(skip(self, stdout, stderr), fields(shell = %self.shell.display()))]
    pub fn run_blocking(
        &self,
        command: &str,
        workdir: &Path,
        stdout: impl Into<Stdio>,
        stderr: impl Into<Stdio>,
    ) -> ExecutionResult {
        let mut process = self.shell_command(command, workdir);
        process.stdout(stdout.into());
        process.stderr(stderr.into());

        let status = process.status();
        // Releases the parent's handles on both sinks.
        drop(process);

        match status {
            Ok(status) if status.success() => {
                debug!("Command completed successfully");
                ExecutionResult::success()
            }
            Ok(status) => {
                let code = exit_code(status);
                warn!(exit_code = code, "Command terminated with nonzero status");
                ExecutionResult::failure(ExecError::NonZeroExit { code })
            }
            Err(source) => {
                error!(error = %source, "Failed to execute command");
                ExecutionResult::failure(ExecError::SpawnFailed {
                    command: command.to_string(),
                    source,
                })
            }
        }
    }

    /// Start `command` in the background and return once it has started
    ///
    /// The result never reflects the command's own exit status.
    #[instrument(skip(self), fields(shell = %self.shell.display()))]
    pub fn run_detached(&self, command: &str, workdir: &Path) -> ExecutionResult {
        // The newline keeps a trailing comment in `command` from swallowing the `&`.
        let background = format!("{{ {}\n}} &", command);
        let mut process = self.shell_command(&background, workdir);
        process
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        detach_process_group(&mut process);

        let mut launcher = match process.spawn() {
            Ok(child) => child,
            Err(source) => {
                error!(error = %source, "Failed to start detached command");
                return ExecutionResult::failure(ExecError::SpawnFailed {
                    command: command.to_string(),
                    source,
                });
            }
        };

        let launcher_pid = launcher.id();
        // The launcher shell exits as soon as the job is forked; reap it now.
        match launcher.wait() {
            Ok(status) if status.success() => {
                debug!(launcher_pid, "Detached command started");
            }
            Ok(status) => {
                warn!(
                    launcher_pid,
                    exit_code = exit_code(status),
                    "Launcher shell for detached command exited with nonzero status"
                );
            }
            Err(e) => {
                warn!(launcher_pid, error = %e, "Failed to reap launcher shell");
            }
        }

        ExecutionResult::success()
    }

    fn shell_command(&self, script: &str, workdir: &Path) -> Command {
        let mut process = Command::new(&self.shell);
        process.arg("-c").arg(script).current_dir(workdir);
        process
    }
}

/// Run `command` with the default shell and wait for it
pub fn run_blocking(
    command: &str,
    workdir: &Path,
    stdout: impl Into<Stdio>,
    stderr: impl Into<Stdio>,
) -> ExecutionResult {
    Executor::new().run_blocking(command, workdir, stdout, stderr)
}

/// Start `command` detached with the default shell
pub fn run_detached(command: &str, workdir: &Path) -> ExecutionResult {
    Executor::new().run_detached(command, workdir)
}

/// Numeric exit code of a finished process
///
/// Signal terminations have no exit code and are reported as `128 + signal`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    signal_exit_code(status).unwrap_or(SPAWN_FAILURE_EXIT_CODE)
}

#[cfg(unix)]
fn signal_exit_code(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|signal| 128 + signal)
}

#[cfg(not(unix))]
fn signal_exit_code(_status: ExitStatus) -> Option<i32> {
    None
}

#[cfg(unix)]
fn detach_process_group(process: &mut Command) {
    use std::os::unix::process::CommandExt;
    process.process_group(0);
}

#[cfg(not(unix))]
fn detach_process_group(_process: &mut Command) {}
