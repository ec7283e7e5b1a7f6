//! Seqno command implementation
//!
//! Implements `extrun seqno get` and `extrun seqno set` on the configured
//! sequence store.

use anyhow::Result;
use extrun_core::diagnostics::DiagnosticResultExt;
use extrun_core::{AgentConfig, SequenceStore};
use tracing::{info, instrument};

/// Extension identity the sequence number belongs to
#[derive(Debug, Clone)]
pub struct SeqnoArgs {
    pub extension: String,
    pub version: String,
}

/// Print the recorded sequence number on stdout
#[instrument(skip(config))]
pub fn execute_seqno_get(args: SeqnoArgs, config: &AgentConfig) -> Result<()> {
    let store = SequenceStore::from_config(config);
    let seq_no = store
        .get_sequence_number(&args.extension, &args.version)
        .wrap_err("reading sequence number")?;
    println!("{}", seq_no);
    Ok(())
}

/// Record `seq_no` for the extension
#[instrument(skip(config))]
pub fn execute_seqno_set(args: SeqnoArgs, seq_no: u64, config: &AgentConfig) -> Result<()> {
    let store = SequenceStore::from_config(config);
    store
        .set_sequence_number(&args.extension, &args.version, seq_no)
        .wrap_err("recording sequence number")?;
    info!(extension = %args.extension, seq_no, "Sequence number recorded");
    Ok(())
}
