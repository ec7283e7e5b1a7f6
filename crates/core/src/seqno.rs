//! Most-recent sequence number persistence
//!
//! The sequence number identifies the last lifecycle invocation applied to an
//! extension. It is stored as plain decimal text (e.g. `3`) in a single file
//! readable and writable by the owner only. A missing file means no sequence
//! has been recorded yet and reads as 0.
//!
//! The store performs no locking: at most one writer per extension instance
//! is assumed.

use crate::config::AgentConfig;
use crate::errors::SequenceError;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Default name of the sequence file
pub const DEFAULT_SEQUENCE_FILE: &str = "mrseq";

/// Permission bits of the sequence file (owner read/write)
pub const SEQUENCE_FILE_MODE: u32 = 0o600;

/// Reads and writes the sequence file in a configured directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceStore {
    dir: PathBuf,
    file_name: String,
    namespaced: bool,
}

impl SequenceStore {
    /// Store using [`DEFAULT_SEQUENCE_FILE`] inside `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file_name: DEFAULT_SEQUENCE_FILE.to_string(),
            namespaced: false,
        }
    }

    /// Store described by the agent configuration
    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.state_dir.clone())
            .with_file_name(config.sequence_file.clone())
            .namespaced(config.namespace_sequence_files)
    }

    /// Use a different file name
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Keep a separate file per extension name and version
    ///
    /// When disabled (the default) every extension shares the one file and
    /// the name and version arguments only appear in logs.
    pub fn namespaced(mut self, namespaced: bool) -> Self {
        self.namespaced = namespaced;
        self
    }

    /// Path of the file backing `name`/`version`
    pub fn path_for(&self, name: &str, version: &str) -> PathBuf {
        if self.namespaced {
            self.dir
                .join(format!("{}.{}.{}", name, version, self.file_name))
        } else {
            self.dir.join(&self.file_name)
        }
    }

    /// Read the recorded sequence number, 0 when none was recorded
    #[instrument(skip(self))]
    pub fn get_sequence_number(&self, name: &str, version: &str) -> Result<u64, SequenceError> {
        let path = self.path_for(name, version);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No sequence file, treating as 0");
                return Ok(0);
            }
            Err(source) => return Err(SequenceError::Read { path, source }),
        };

        let seq_no = content.trim().parse::<u64>()?;
        debug!(path = %path.display(), seq_no, "Read sequence number");
        Ok(seq_no)
    }

    /// Record `seq_no`, replacing any previous value
    #[instrument(skip(self))]
    pub fn set_sequence_number(
        &self,
        name: &str,
        version: &str,
        seq_no: u64,
    ) -> Result<(), SequenceError> {
        let path = self.path_for(name, version);
        write_owner_only(&path, seq_no.to_string().as_bytes())
            .map_err(|source| SequenceError::Write {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "Wrote sequence number");
        Ok(())
    }
}

fn write_owner_only(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(SEQUENCE_FILE_MODE);
    }

    let mut file = options.open(path)?;
    restrict_permissions(&file)?;
    file.write_all(content)?;
    file.flush()
}

/// Creation mode only applies to new files; tighten pre-existing ones too.
#[cfg(unix)]
fn restrict_permissions(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(SEQUENCE_FILE_MODE))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File) -> std::io::Result<()> {
    Ok(())
}
