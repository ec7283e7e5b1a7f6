//! Core library for the extension lifecycle runner
//!
//! This crate runs lifecycle commands (install, enable, disable, update)
//! through a shell, records the most recent sequence number applied, and
//! builds diagnostic errors that can carry a captured call stack.

pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod executor;
pub mod logging;
pub mod seqno;

pub use config::AgentConfig;
pub use diagnostics::{capture_stack, wrap, wrap_with_stack, DiagnosticError};
pub use errors::{ExecError, ExtrunError, Result, SequenceError};
pub use executor::{CommandInvocation, ExecutionResult, Executor, WaitMode};
pub use seqno::SequenceStore;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
