use crate::commands::run::{execute_run, RunArgs, SequenceTarget};
use crate::commands::seqno::{execute_seqno_get, execute_seqno_set, SeqnoArgs};
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use extrun_core::AgentConfig;
use std::path::PathBuf;

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Extension lifecycle runner subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a lifecycle command through the configured shell
    #[command(long_about = "Run a lifecycle command through the configured shell\n\n\
        The command exits with the child's exit code. When --sequence is given, the \
        recorded sequence number is read first and the new one is written only if the \
        command succeeds.")]
    Run {
        /// Working directory for the command
        #[arg(long, value_name = "DIR", default_value = ".")]
        workdir: PathBuf,
        /// Start the command in the background and return immediately
        #[arg(long, conflicts_with_all = ["stdout", "stderr"])]
        detach: bool,
        /// Write the command's standard output to this file
        #[arg(long, value_name = "FILE")]
        stdout: Option<PathBuf>,
        /// Write the command's standard error to this file
        #[arg(long, value_name = "FILE")]
        stderr: Option<PathBuf>,
        /// Extension name the sequence number belongs to
        #[arg(long, value_name = "NAME", requires = "sequence")]
        extension: Option<String>,
        /// Extension version the sequence number belongs to
        #[arg(long, value_name = "VERSION", requires = "sequence")]
        extension_version: Option<String>,
        /// Sequence number to record once the command succeeds
        #[arg(long, value_name = "SEQ", requires_all = ["extension", "extension_version"])]
        sequence: Option<u64>,
        /// Command to run
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Read or write recorded sequence numbers
    Seqno {
        #[command(subcommand)]
        command: SeqnoCommands,
    },
}

/// Sequence number subcommands
#[derive(Debug, Subcommand)]
pub enum SeqnoCommands {
    /// Print the recorded sequence number (0 when none is recorded)
    Get {
        /// Extension name
        #[arg(long, value_name = "NAME")]
        extension: String,
        /// Extension version
        #[arg(long, value_name = "VERSION")]
        extension_version: String,
    },
    /// Record a sequence number
    Set {
        /// Extension name
        #[arg(long, value_name = "NAME")]
        extension: String,
        /// Extension version
        #[arg(long, value_name = "VERSION")]
        extension_version: String,
        /// Sequence number to record
        #[arg(value_name = "SEQ")]
        seq_no: u64,
    },
}

#[derive(Debug, Parser)]
#[command(
    name = "extrun",
    version,
    about = "Extension lifecycle runner",
    long_about = "Extension lifecycle runner\n\nRuns extension lifecycle commands through a shell and tracks the last applied sequence number.",
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via EXTRUN_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Configuration file path (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding sequence files (overrides config and EXTRUN_STATE_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Render captured call stacks when a command fails
    #[arg(long, global = true)]
    pub verbose_errors: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Resolve configuration from the config file, environment and flags.
    ///
    /// Flags win over environment variables, which win over the file.
    pub fn resolve_config(&self) -> Result<AgentConfig> {
        let mut config = AgentConfig::resolve(self.config.as_deref())?;
        if let Some(dir) = &self.state_dir {
            config.state_dir = dir.clone();
        }
        if let Some(format) = &self.log_format {
            config.log_format = Some(
                match format {
                    LogFormat::Text => "text",
                    LogFormat::Json => "json",
                }
                .to_string(),
            );
        }
        Ok(config)
    }

    /// Initialize logging and run the selected subcommand.
    pub fn dispatch(self) -> Result<()> {
        let config = self.resolve_config()?;

        let log_level = self.log_level.as_str();
        if std::env::var_os(extrun_core::logging::ENV_LOG).is_none()
            && std::env::var_os("RUST_LOG").is_none()
        {
            std::env::set_var(
                "RUST_LOG",
                format!("extrun={},extrun_core={}", log_level, log_level),
            );
        }
        extrun_core::logging::init(config.log_format.as_deref())?;
        tracing::debug!("CLI initialized with log level: {}", log_level);

        match self.command {
            Commands::Run {
                workdir,
                detach,
                stdout,
                stderr,
                extension,
                extension_version,
                sequence,
                command,
            } => {
                let sequence = match (extension, extension_version, sequence) {
                    (Some(extension), Some(version), Some(seq_no)) => Some(SequenceTarget {
                        extension,
                        version,
                        seq_no,
                    }),
                    _ => None,
                };
                let args = RunArgs {
                    command: command.join(" "),
                    workdir,
                    detach,
                    stdout,
                    stderr,
                    sequence,
                };
                execute_run(args, &config)
            }
            Commands::Seqno { command } => match command {
                SeqnoCommands::Get {
                    extension,
                    extension_version,
                } => execute_seqno_get(
                    SeqnoArgs {
                        extension,
                        version: extension_version,
                    },
                    &config,
                ),
                SeqnoCommands::Set {
                    extension,
                    extension_version,
                    seq_no,
                } => execute_seqno_set(
                    SeqnoArgs {
                        extension,
                        version: extension_version,
                    },
                    seq_no,
                    &config,
                ),
            },
        }
    }
}
