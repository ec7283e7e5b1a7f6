//! Error types and handling
//!
//! Each component has its own error enum (command execution, sequence
//! persistence, configuration). They are wrapped in the top-level
//! [`ExtrunError`] for callers that want a single error type.
//!
//! Stack-carrying diagnostics live in [`crate::diagnostics`]; any of these
//! errors can be wrapped there without changing its exit-code semantics.

use std::path::PathBuf;
use thiserror::Error;

/// Exit code reported when a command failed before producing an exit status.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 1;

/// Command execution errors
#[derive(Error, Debug)]
pub enum ExecError {
    /// The shell could not be started (missing shell, bad workdir, permissions)
    #[error("failed to execute command: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and terminated with a nonzero status
    #[error("command terminated with exit status={code}")]
    NonZeroExit { code: i32 },
}

impl ExecError {
    /// Exit code that accompanies this error in an execution result.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecError::SpawnFailed { .. } => SPAWN_FAILURE_EXIT_CODE,
            ExecError::NonZeroExit { code } => *code,
        }
    }
}

/// Sequence file persistence errors
#[derive(Error, Debug)]
pub enum SequenceError {
    /// The sequence file exists but could not be read
    #[error("failed to read sequence file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The sequence file could not be written
    #[error("could not write sequence number file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The sequence file does not hold a non-negative integer
    #[error(transparent)]
    Parse(#[from] std::num::ParseIntError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file I/O error
    #[error("Failed to read configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file parsing error
    #[error("Failed to parse configuration file: {message}")]
    Parsing { message: String },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    Validation { message: String },
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum ExtrunError {
    /// Command execution errors
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Sequence store errors
    #[error("Sequence error: {0}")]
    Sequence(#[from] SequenceError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors escalated with diagnostic context
    #[error(transparent)]
    Diagnostic(#[from] crate::diagnostics::DiagnosticError),
}

/// Convenience type alias for Results with ExtrunError
pub type Result<T> = std::result::Result<T, ExtrunError>;
