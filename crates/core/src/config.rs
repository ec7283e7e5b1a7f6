//! Agent configuration
//!
//! Settings are resolved in three layers, lowest precedence first:
//!
//! 1. built-in defaults ([`AgentConfig::default`]);
//! 2. an optional TOML file;
//! 3. `EXTRUN_*` environment variables.
//!
//! The CLI applies its own flags on top of the result.
//!
//! ```toml
//! shell = "/bin/bash"
//! state_dir = "/var/lib/waagent/my-extension"
//! sequence_file = "mrseq"
//! namespace_sequence_files = false
//! log_format = "json"
//! ```

use crate::errors::ConfigError;
use crate::executor::DEFAULT_SHELL;
use crate::seqno::DEFAULT_SEQUENCE_FILE;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the shell binary
pub const ENV_SHELL: &str = "EXTRUN_SHELL";
/// Environment variable overriding the state directory
pub const ENV_STATE_DIR: &str = "EXTRUN_STATE_DIR";
/// Environment variable overriding the sequence file name
pub const ENV_SEQUENCE_FILE: &str = "EXTRUN_SEQUENCE_FILE";

/// Resolved agent settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Shell used to interpret commands
    pub shell: PathBuf,
    /// Directory holding the sequence file
    pub state_dir: PathBuf,
    /// Name of the sequence file inside `state_dir`
    pub sequence_file: String,
    /// Derive the sequence file name from the extension name and version
    pub namespace_sequence_files: bool,
    /// Log format ("text" or "json"); `None` defers to the environment
    pub log_format: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            shell: PathBuf::from(DEFAULT_SHELL),
            state_dir: PathBuf::from("."),
            sequence_file: DEFAULT_SEQUENCE_FILE.to_string(),
            namespace_sequence_files: false,
            log_format: None,
        }
    }
}

impl AgentConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parsing {
            message: e.to_string(),
        })
    }

    /// Read and parse a TOML configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded configuration file");
        Self::from_toml_str(&content)
    }

    /// Resolve file (if any) and environment layers, then validate
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides looked up by environment variable name
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(shell) = lookup(ENV_SHELL) {
            self.shell = PathBuf::from(shell);
        }
        if let Some(dir) = lookup(ENV_STATE_DIR) {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup(ENV_SEQUENCE_FILE) {
            self.sequence_file = file;
        }
    }

    /// Reject settings the executor or sequence store cannot use
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shell.as_os_str().is_empty() {
            return Err(ConfigError::Validation {
                message: "shell must not be empty".to_string(),
            });
        }
        if self.sequence_file.is_empty() {
            return Err(ConfigError::Validation {
                message: "sequence_file must not be empty".to_string(),
            });
        }
        if Path::new(&self.sequence_file).file_name()
            != Some(std::ffi::OsStr::new(&self.sequence_file))
        {
            return Err(ConfigError::Validation {
                message: format!(
                    "sequence_file must be a bare file name, got '{}'",
                    self.sequence_file
                ),
            });
        }
        if let Some(format) = &self.log_format {
            if format != "text" && format != "json" {
                return Err(ConfigError::Validation {
                    message: format!("log_format must be 'text' or 'json', got '{}'", format),
                });
            }
        }
        Ok(())
    }
}
