//! Error types for the approval relay.

use std::path::PathBuf;

/// Top-level error type. Anything surfacing here aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),
}

/// Configuration-related errors. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox transport errors (IMAP connect, login, select, fetch, store).
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Authentication failed for {username}")]
    AuthFailed { username: String },

    #[error("IMAP command {command} failed: {response}")]
    CommandFailed { command: String, response: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("Could not parse message {uid}")]
    Parse { uid: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound mail errors.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP send failed: {0}")]
    Smtp(String),
}

/// Remote file transfer errors.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("SSH error: {0}")]
    Ssh(String),

    #[error("Local file {} unreadable: {source}", path.display())]
    LocalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Remote write to {remote} failed: {reason}")]
    RemoteWrite { remote: String, reason: String },
}

/// Artifact storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Artifact already exists at {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-message pipeline failures. Recorded in the batch summary, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Fetch failed: {0}")]
    Fetch(#[source] MailboxError),

    #[error("Artifact storage failed: {0}")]
    Store(#[from] StorageError),

    #[error("Artifact lookup failed: {0}")]
    Resolve(#[source] StorageError),

    #[error("Notification failed: {0}")]
    Notify(#[from] SendError),

    #[error("Upload failed: {0}")]
    Transfer(#[from] TransferError),
}

impl PipelineError {
    /// Short stage label for logging and summaries.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Store(_) => "store",
            Self::Resolve(_) => "resolve",
            Self::Notify(_) => "notify",
            Self::Transfer(_) => "upload",
        }
    }
}
