//! External transports behind the coordinator's capability traits.

pub mod channel;
pub mod email;
pub mod email_types;
pub mod imap;
pub mod sftp;

pub use channel::*;
pub use email::{ImapMailbox, SmtpNotifier};
pub use email_types::MessageBody;
pub use sftp::SftpTransfer;
