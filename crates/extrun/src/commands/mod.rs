//! Command implementations
//!
//! This module contains implementations for all CLI subcommands.

pub mod run;
pub mod seqno;
