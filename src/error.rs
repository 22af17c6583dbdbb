//! Error types for pdf-inbox.
//!
//! Every error is fatal. Operations propagate with `?` up to `main`, which
//! logs the terminal [`Error`] and exits non-zero.

use std::path::PathBuf;

/// Top-level error type for a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    #[error("Failed to relocate {from} to {to}: {source}")]
    Relocate {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Background fetch task failed: {0}")]
    Task(String),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be provided")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load .env file: {0}")]
    DotEnv(String),

    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install log subscriber: {0}")]
    Subscriber(String),
}

/// Mailbox protocol and message parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Connection to {server} failed: {reason}")]
    Connect { server: String, reason: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Authentication failed for {user}: {reason}")]
    AuthFailed { user: String, reason: String },

    #[error("IMAP command {command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("IMAP connection closed by server")]
    Closed,

    #[error("FETCH abandoned before the server finished responding")]
    Abandoned,

    #[error("Failed to parse message {seq}")]
    Parse { seq: u32 },

    #[error("PDF attachment in message {seq} has no name")]
    MissingAttachmentName { seq: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Staging directory errors.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("Refusing attachment name that escapes the staging directory: {0:?}")]
    UnsafeName(String),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk staging directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// OCR subprocess errors.
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {code:?} for {input}: {stderr}")]
    Failed {
        program: String,
        input: PathBuf,
        code: Option<i32>,
        stderr: String,
    },
}

/// Result type alias for a run.
pub type Result<T> = std::result::Result<T, Error>;
