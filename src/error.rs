//! Error types for imap-sweep.

use std::path::PathBuf;

use crate::message::SeqId;
use crate::processor::RunReport;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Sweep error: {0}")]
    Sweep(#[from] SweepError),
}

/// Configuration-related errors. Always fatal, and always raised before
/// any mailbox session is opened.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration key '{0}' not found in any source")]
    MissingKey(String),

    #[error("Invalid value for key '{key}': '{value}' (expected {expected})")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("Failed to read config file {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    FileParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unknown parser strategy '{name}' (available: {available})")]
    UnknownStrategy { name: String, available: String },
}

/// Mailbox session errors.
///
/// `Connection` and `Auth` are fatal for the run. `Protocol` is
/// per-operation and a candidate for the retry wrapper. `NotFound` is
/// per-message.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Protocol error during {op}: {detail}")]
    Protocol { op: &'static str, detail: String },

    #[error("No message with sequence id {0}")]
    NotFound(SeqId),
}

/// Parser strategy errors. Per-message; recovered by quarantine.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Message could not be classified: {0}")]
    Unparseable(String),
}

/// Raised after a complete sweep in which one or more messages failed.
///
/// The report inside is complete and accurate; the error only signals
/// that some messages were quarantined instead of archived.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error(
        "{} of {} message(s) could not be processed; raw copies kept in {}",
        .report.failed,
        .report.examined,
        .error_dir.display()
    )]
    Partial {
        report: RunReport,
        error_dir: PathBuf,
    },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
