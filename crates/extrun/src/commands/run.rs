//! Run command implementation
//!
//! Implements `extrun run`: executes one lifecycle command through the
//! configured shell and, when asked, records the sequence number it applied.

use anyhow::{Context, Result};
use extrun_core::diagnostics::{self, DiagnosticResultExt};
use extrun_core::{AgentConfig, ExecError, Executor, SequenceStore};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{info, instrument};

/// Exit code requested by a command that ran but did not succeed
#[derive(Debug)]
pub struct CommandExitCode(pub i32);

impl std::fmt::Display for CommandExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "command exited with code {}", self.0)
    }
}

impl std::error::Error for CommandExitCode {}

/// Sequence number to record for an extension after a successful run
#[derive(Debug, Clone)]
pub struct SequenceTarget {
    pub extension: String,
    pub version: String,
    pub seq_no: u64,
}

/// Run command arguments
#[derive(Debug, Clone)]
pub struct RunArgs {
    /// Shell command line
    pub command: String,
    /// Working directory for the command
    pub workdir: PathBuf,
    /// Start in the background instead of waiting
    pub detach: bool,
    /// Standard output file; inherited when absent
    pub stdout: Option<PathBuf>,
    /// Standard error file; inherited when absent
    pub stderr: Option<PathBuf>,
    pub sequence: Option<SequenceTarget>,
}

/// Execute the run command
#[instrument(skip(args, config), fields(detach = args.detach))]
pub fn execute_run(args: RunArgs, config: &AgentConfig) -> Result<()> {
    let executor = Executor::from_config(config);
    let store = SequenceStore::from_config(config);

    if let Some(target) = &args.sequence {
        let current = store
            .get_sequence_number(&target.extension, &target.version)
            .wrap_err("reading sequence number")?;
        info!(
            extension = %target.extension,
            current,
            requested = target.seq_no,
            "Recorded sequence number"
        );
    }

    let result = if args.detach {
        executor.run_detached(&args.command, &args.workdir)
    } else {
        let stdout = open_sink(args.stdout.as_deref())?;
        let stderr = open_sink(args.stderr.as_deref())?;
        executor.run_blocking(&args.command, &args.workdir, stdout, stderr)
    };

    match result.error {
        None => {}
        Some(err @ ExecError::SpawnFailed { .. }) => {
            return Err(diagnostics::wrap_with_stack(err, "lifecycle command failed").into());
        }
        Some(ExecError::NonZeroExit { code }) => {
            return Err(CommandExitCode(code).into());
        }
    }

    if let Some(target) = &args.sequence {
        store
            .set_sequence_number(&target.extension, &target.version, target.seq_no)
            .wrap_err("recording sequence number")?;
        info!(
            extension = %target.extension,
            seq_no = target.seq_no,
            "Sequence number recorded"
        );
    }

    Ok(())
}

fn open_sink(path: Option<&Path>) -> Result<Stdio> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create output file {}", path.display()))?;
            Ok(file.into())
        }
        None => Ok(Stdio::inherit()),
    }
}
