//! Configuration types.
//!
//! Mailbox credentials come from the environment (optionally seeded from a
//! `.env` file); the destination directory comes from the command line.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default IMAPS port when `SMTP_SERVER` carries no explicit port.
pub const DEFAULT_IMAP_PORT: u16 = 993;

pub const DEFAULT_STAGING_DIR: &str = "tmp";
pub const DEFAULT_LOG_FILE: &str = "info.log";
pub const DEFAULT_OCR_COMMAND: &str = "ocrmypdf";
pub const DEFAULT_MAILBOX: &str = "INBOX";
pub const DEFAULT_PROCESSED_MAILBOX: &str = "processed";

/// Mailbox connection settings.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Folder the attachments are read from.
    pub mailbox: String,
    /// Folder messages are moved to once their attachments are staged.
    pub processed_mailbox: String,
}

impl MailConfig {
    /// `host:port` form used in log lines and errors.
    pub fn server(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Full run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub mail: MailConfig,
    pub staging_dir: PathBuf,
    pub log_file: PathBuf,
    pub ocr_command: String,
}

impl Config {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    ///
    /// Required variables that are unset or empty are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };
        let optional = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let server = required("SMTP_SERVER")?;
        let username = required("SMTP_USER")?;
        let password = required("SMTP_PASSWORD")?;
        let (host, port) = parse_server(&server)?;

        Ok(Self {
            mail: MailConfig {
                host,
                port,
                username,
                password: SecretString::from(password),
                mailbox: optional("PDF_INBOX_MAILBOX", DEFAULT_MAILBOX),
                processed_mailbox: optional(
                    "PDF_INBOX_PROCESSED_MAILBOX",
                    DEFAULT_PROCESSED_MAILBOX,
                ),
            },
            staging_dir: PathBuf::from(optional("PDF_INBOX_STAGING_DIR", DEFAULT_STAGING_DIR)),
            log_file: PathBuf::from(optional("PDF_INBOX_LOG_FILE", DEFAULT_LOG_FILE)),
            ocr_command: optional("PDF_INBOX_OCR_COMMAND", DEFAULT_OCR_COMMAND),
        })
    }
}

/// Split `host[:port]` into its parts, defaulting to the IMAPS port.
pub fn parse_server(server: &str) -> Result<(String, u16), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: "SMTP_SERVER".into(),
        message,
    };

    let (host, port) = match server.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|e| invalid(format!("bad port {port:?}: {e}")))?;
            (host, port)
        }
        None => (server, DEFAULT_IMAP_PORT),
    };

    if host.is_empty() {
        return Err(invalid("host is empty".into()));
    }
    Ok((host.to_string(), port))
}

/// Load `.env` from the working directory.
///
/// A missing file is fine; a file that exists but cannot be parsed is not.
pub fn load_dotenv() -> Result<(), ConfigError> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(ConfigError::DotEnv(e.to_string())),
    }
}
