//! Email transports — IMAP mailbox for inbound, SMTP via lettre for outbound.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::channels::channel::{FetchedEmail, Mailbox, MessageHandle, Notification, Notifier};
use crate::channels::email_types::parse_raw_email;
use crate::channels::imap::ImapSession;
use crate::config::{MailboxConfig, SmtpConfig};
use crate::error::{MailboxError, SendError};

type TlsSession = ImapSession<rustls::StreamOwned<rustls::ClientConnection, std::net::TcpStream>>;

// ── Inbound ─────────────────────────────────────────────────────────

/// IMAP mailbox holding one logged-in session for the whole batch.
pub struct ImapMailbox {
    session: Arc<Mutex<TlsSession>>,
}

impl ImapMailbox {
    /// Connect, log in and select the configured folder.
    ///
    /// Any failure here is a transport error and aborts the run.
    pub async fn open(config: &MailboxConfig) -> Result<Self, MailboxError> {
        let host = config.host.clone();
        let port = config.port;
        let username = config.username.clone();
        let password = config.password.clone();
        let folder = config.folder.clone();

        let session = tokio::task::spawn_blocking(move || -> Result<TlsSession, MailboxError> {
            let mut session = ImapSession::connect(&host, port)?;
            session.login(&username, password.expose_secret())?;
            session.select(&folder)?;
            info!(host = %host, folder = %folder, "Mailbox session opened");
            Ok(session)
        })
        .await
        .map_err(join_error)??;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
        })
    }

    /// Log out. Errors are logged, never returned; the batch is already done.
    pub async fn close(&self) {
        let result = self.with_session(|s| s.logout()).await;
        if let Err(e) = result {
            warn!(error = %e, "IMAP logout failed");
        }
    }

    async fn with_session<T, F>(&self, op: F) -> Result<T, MailboxError>
    where
        T: Send + 'static,
        F: FnOnce(&mut TlsSession) -> Result<T, MailboxError> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || {
            let mut guard = session
                .lock()
                .map_err(|_| MailboxError::Protocol("IMAP session lock poisoned".into()))?;
            op(&mut *guard)
        })
        .await
        .map_err(join_error)?
    }
}

fn join_error(e: tokio::task::JoinError) -> MailboxError {
    MailboxError::Protocol(format!("IMAP task failed: {e}"))
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn list_unread(&self) -> Result<Vec<MessageHandle>, MailboxError> {
        let uids = self.with_session(|s| s.search_unseen()).await?;
        debug!("Found {} unseen message(s)", uids.len());
        Ok(uids.into_iter().map(MessageHandle::new).collect())
    }

    async fn fetch(&self, handle: &MessageHandle) -> Result<FetchedEmail, MailboxError> {
        let uid = handle.as_str().to_string();
        let raw = self.with_session(move |s| s.fetch_raw(&uid)).await?;
        parse_raw_email(handle, &raw)
    }

    async fn mark_processed(&self, handle: &MessageHandle) -> Result<(), MailboxError> {
        let uid = handle.as_str().to_string();
        self.with_session(move |s| s.mark_seen(&uid)).await
    }
}

// ── Outbound ────────────────────────────────────────────────────────

/// SMTP notifier.
pub struct SmtpNotifier {
    transport: SmtpTransport,
    from: lettre::message::Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, SendError> {
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&config.host)
            .map_err(|e| SendError::Smtp(format!("SMTP relay error: {e}")))?
            .port(config.port)
            .credentials(creds)
            .build();

        let from = config
            .from_address
            .parse()
            .map_err(|e: lettre::address::AddressError| SendError::InvalidAddress {
                address: config.from_address.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self { transport, from })
    }
}

/// Build the MIME message for a notification.
pub fn build_message(
    from: &lettre::message::Mailbox,
    notification: &Notification,
) -> Result<Message, SendError> {
    let mut builder = Message::builder()
        .from(from.clone())
        .subject(notification.subject.as_str());

    for address in &notification.recipients {
        let to = address.parse().map_err(|e: lettre::address::AddressError| {
            SendError::InvalidAddress {
                address: address.clone(),
                reason: e.to_string(),
            }
        })?;
        builder = builder.to(to);
    }

    let text = SinglePart::plain(notification.body.clone());
    let built = match &notification.attachment {
        Some(att) => {
            let content_type = ContentType::parse(&att.content_type)
                .map_err(|e| SendError::Build(format!("invalid content type: {e}")))?;
            builder.multipart(
                MultiPart::mixed()
                    .singlepart(text)
                    .singlepart(
                        Attachment::new(att.file_name.clone())
                            .body(att.content.clone(), content_type),
                    ),
            )
        }
        None => builder.singlepart(text),
    };

    built.map_err(|e| SendError::Build(e.to_string()))
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), SendError> {
        let email = build_message(&self.from, notification)?;
        let transport = self.transport.clone();

        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| SendError::Smtp(format!("send task failed: {e}")))?
            .map_err(|e| SendError::Smtp(e.to_string()))?;

        info!(
            recipients = notification.recipients.len(),
            subject = %notification.subject,
            "Email sent"
        );
        Ok(())
    }
}

// ── Sender checks (public for testing) ──────────────────────────────

/// Check if a sender email is in the allowlist.
///
/// - Empty list → deny all
/// - `*` in list → allow all
/// - `@domain.com` or `domain.com` → domain match
/// - `user@domain.com` → exact email match
pub fn is_sender_allowed(allowed: &[String], email: &str) -> bool {
    if allowed.is_empty() {
        return false;
    }
    if allowed.iter().any(|a| a == "*") {
        return true;
    }
    let email_lower = email.to_lowercase();
    allowed.iter().any(|a| {
        if a.starts_with('@') {
            email_lower.ends_with(&a.to_lowercase())
        } else if a.contains('@') {
            a.eq_ignore_ascii_case(email)
        } else {
            email_lower.ends_with(&format!("@{}", a.to_lowercase()))
        }
    })
}

/// True when the relay itself sent this message.
pub fn is_self_sent(sender: &str, from_address: &str) -> bool {
    sender.eq_ignore_ascii_case(from_address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::channel::NotificationAttachment;

    // ── Sender allowlist tests ──────────────────────────────────────

    #[test]
    fn allowlist_empty_denies_all() {
        assert!(!is_sender_allowed(&[], "anyone@example.com"));
    }

    #[test]
    fn allowlist_wildcard_allows_all() {
        let allowed = vec!["*".to_string()];
        assert!(is_sender_allowed(&allowed, "anyone@example.com"));
    }

    #[test]
    fn allowlist_exact_and_domain_entries() {
        let allowed = vec![
            "buyer@vendor.com".to_string(),
            "@reviewers.org".to_string(),
            "partner.io".to_string(),
        ];
        assert!(is_sender_allowed(&allowed, "Buyer@Vendor.com"));
        assert!(is_sender_allowed(&allowed, "anyone@reviewers.org"));
        assert!(is_sender_allowed(&allowed, "ops@partner.io"));
        assert!(!is_sender_allowed(&allowed, "other@vendor.com"));
        assert!(!is_sender_allowed(&allowed, "ops@notpartner.io"));
    }

    #[test]
    fn self_sent_is_case_insensitive() {
        assert!(is_self_sent("Relay@Example.com", "relay@example.com"));
        assert!(!is_self_sent("buyer@example.com", "relay@example.com"));
    }

    // ── Message building tests ──────────────────────────────────────

    fn from() -> lettre::message::Mailbox {
        "relay@example.com".parse().unwrap()
    }

    fn notification(recipients: &[&str]) -> Notification {
        Notification {
            subject: "NORDSVCP approval request: [nordsvcp_20260314093005]".into(),
            body: "SKU,UPC,EAN,QUANTITY_AVAILABLE,STATUS,\n".into(),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            attachment: None,
        }
    }

    #[test]
    fn build_plain_message_with_all_recipients() {
        let msg = build_message(&from(), &notification(&["a@example.com", "b@example.com"])).unwrap();
        let formatted = String::from_utf8(msg.formatted()).unwrap();
        assert!(formatted.contains("a@example.com"));
        assert!(formatted.contains("b@example.com"));
        assert!(formatted.contains("[nordsvcp_20260314093005]"));
        assert_eq!(msg.envelope().to().len(), 2);
    }

    #[test]
    fn build_message_with_csv_attachment() {
        let mut n = notification(&["a@example.com"]);
        n.attachment = Some(NotificationAttachment {
            file_name: "nordsvcp_20260314093005.csv".into(),
            content_type: "text/csv".into(),
            content: "SKU,UPC,EAN,QUANTITY_AVAILABLE,STATUS,\n".into(),
        });
        let msg = build_message(&from(), &n).unwrap();
        let formatted = String::from_utf8(msg.formatted()).unwrap();
        assert!(formatted.contains("multipart/mixed"));
        assert!(formatted.contains("nordsvcp_20260314093005.csv"));
    }

    #[test]
    fn build_message_rejects_bad_recipient() {
        let err = build_message(&from(), &notification(&["not an address"])).unwrap_err();
        assert!(matches!(err, SendError::InvalidAddress { .. }));
    }
}
