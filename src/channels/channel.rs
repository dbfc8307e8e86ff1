//! Capability traits the workflow coordinator calls through.
//!
//! Each trait is one narrow seam around an external system: the inbound
//! mailbox, outbound mail, and remote file transfer. Implementations live in
//! `email.rs` and `sftp.rs`; tests substitute in-memory fakes.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::channels::email_types::MessageBody;
use crate::error::{MailboxError, SendError, TransferError};
use crate::pipeline::types::ThreadHeaders;

/// Mailbox-native handle for one message (an IMAP UID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHandle(String);

impl MessageHandle {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully fetched inbound email.
#[derive(Debug, Clone)]
pub struct FetchedEmail {
    pub handle: MessageHandle,
    pub message_id: Option<String>,
    pub sender: String,
    pub subject: String,
    pub thread: ThreadHeaders,
    pub body: MessageBody,
}

/// A file carried alongside a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAttachment {
    pub file_name: String,
    pub content_type: String,
    pub content: String,
}

/// An outbound approval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    /// Ordered, de-duplicated recipient addresses.
    pub recipients: Vec<String>,
    pub attachment: Option<NotificationAttachment>,
}

/// Inbound mailbox: list, fetch, mark processed.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Handles of every currently unread message.
    async fn list_unread(&self) -> Result<Vec<MessageHandle>, MailboxError>;

    /// Fetch and parse one message without changing its flags.
    async fn fetch(&self, handle: &MessageHandle) -> Result<FetchedEmail, MailboxError>;

    /// Flag a message so it is never listed as unread again.
    async fn mark_processed(&self, handle: &MessageHandle) -> Result<(), MailboxError>;
}

/// Outbound mail.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), SendError>;
}

/// Remote file transfer.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// Upload `local` into `remote_dir`, keeping its file name.
    /// Returns the remote path written.
    async fn upload(&self, local: &Path, remote_dir: &str) -> Result<String, TransferError>;
}

/// Join a remote directory and file name with exactly one `/`.
pub fn remote_path(remote_dir: &str, file_name: &str) -> String {
    let dir = remote_dir.trim_end_matches('/');
    if dir.is_empty() {
        if remote_dir.starts_with('/') {
            format!("/{file_name}")
        } else {
            file_name.to_string()
        }
    } else {
        format!("{dir}/{file_name}")
    }
}
