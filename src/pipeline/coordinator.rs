//! Workflow coordinator — one pass over the unread batch.
//!
//! Per message:
//! 1. `Mailbox::fetch()` — parse subject, sender, thread headers, body
//! 2. Sender checks — self-sent and allowlist
//! 3. `classify()` — original report or reviewer reply
//! 4. Original: extract → build → store → notify reviewers
//!    Reply: resolve `[identifier]` → upload stored artifact
//! 5. `Mailbox::mark_processed()` per the mark policy
//!
//! The mailbox seen flag is the only record of what has been handled. There
//! is no retry: a message left unread is simply seen again on the next run.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::channels::channel::{
    FetchedEmail, FileTransfer, Mailbox, MessageHandle, Notification, NotificationAttachment,
    Notifier,
};
use crate::channels::email::{is_self_sent, is_sender_allowed};
use crate::config::WorkflowConfig;
use crate::error::{Error, PipelineError, StorageError};
use crate::pipeline::artifact::build_artifact;
use crate::pipeline::classifier::classify;
use crate::pipeline::extractor::extract_records;
use crate::pipeline::types::{
    ArtifactDocument, ArtifactId, Classification, Clock, InboundMessage, InventoryRecord,
};
use crate::store::traits::ArtifactStore;

/// Seconds an identifier may be pushed forward before a store gives up.
const MAX_IDENTIFIER_BUMPS: u32 = 60;

// ── Outcomes ────────────────────────────────────────────────────────

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Report turned into an artifact and sent for approval.
    Notified {
        artifact: ArtifactId,
        records: usize,
        path: PathBuf,
    },
    /// Approval reply; stored artifact uploaded.
    Uploaded {
        artifact: ArtifactId,
        remote_path: String,
    },
    /// Reply without a bracketed identifier.
    NoReference,
    /// Reply whose bracketed text is not an artifact identifier.
    UnusableReference { reference: String },
    /// Reply naming an artifact that is not in local storage.
    ArtifactMissing { artifact: ArtifactId },
    /// Our own outbound mail.
    SelfSent,
    SenderBlocked { sender: String },
    Failed { stage: String, reason: String },
}

impl Outcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Notified { .. } => "notified",
            Self::Uploaded { .. } => "uploaded",
            Self::NoReference => "no_reference",
            Self::UnusableReference { .. } => "unusable_reference",
            Self::ArtifactMissing { .. } => "artifact_missing",
            Self::SelfSent => "self_sent",
            Self::SenderBlocked { .. } => "sender_blocked",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Result of processing one message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageReport {
    pub handle: MessageHandle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub marked: bool,
    /// Set when marking was attempted and the mailbox refused it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark_error: Option<String>,
}

impl MessageReport {
    /// Failed outcome, or left unread although marking was due.
    pub fn is_failure(&self) -> bool {
        self.outcome.is_failure() || self.mark_error.is_some()
    }
}

/// Result of one run over the unread batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub reports: Vec<MessageReport>,
}

impl BatchSummary {
    pub fn has_failures(&self) -> bool {
        self.reports.iter().any(MessageReport::is_failure)
    }

    pub fn failures(&self) -> impl Iterator<Item = &MessageReport> {
        self.reports.iter().filter(|r| r.is_failure())
    }

    /// Reports whose mark-processed call failed.
    pub fn mark_failures(&self) -> usize {
        self.reports.iter().filter(|r| r.mark_error.is_some()).count()
    }

    /// Number of reports with the given outcome label.
    pub fn count(&self, label: &str) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome.label() == label)
            .count()
    }
}

// ── Coordinator ─────────────────────────────────────────────────────

/// External capabilities the coordinator drives.
#[derive(Clone)]
pub struct WorkflowDeps {
    pub mailbox: Arc<dyn Mailbox>,
    pub store: Arc<dyn ArtifactStore>,
    pub notifier: Arc<dyn Notifier>,
    pub transfer: Arc<dyn FileTransfer>,
    pub clock: Arc<dyn Clock>,
}

pub struct WorkflowCoordinator<'c> {
    config: &'c WorkflowConfig,
    deps: WorkflowDeps,
}

impl<'c> WorkflowCoordinator<'c> {
    pub fn new(config: &'c WorkflowConfig, deps: WorkflowDeps) -> Self {
        Self { config, deps }
    }

    /// Process every message unread at call time, one at a time.
    ///
    /// Only a failure to list the batch is returned as an error. Everything
    /// after that is reported per message in the summary.
    pub async fn run_batch(&self) -> Result<BatchSummary, Error> {
        let run_id = Uuid::new_v4();
        let span = info_span!("batch", %run_id);

        async move {
            let started_at = Utc::now();
            let handles = self.deps.mailbox.list_unread().await?;
            info!("Processing {} unread message(s)", handles.len());

            let mut reports = Vec::with_capacity(handles.len());
            for handle in &handles {
                reports.push(self.process_message(handle).await);
            }

            let summary = BatchSummary {
                run_id,
                started_at,
                reports,
            };
            info!(
                total = summary.reports.len(),
                notified = summary.count("notified"),
                uploaded = summary.count("uploaded"),
                failed = summary.count("failed"),
                mark_failed = summary.mark_failures(),
                "Batch complete"
            );
            Ok::<_, Error>(summary)
        }
        .instrument(span)
        .await
    }

    /// Run one message through its branch and mark it.
    pub async fn process_message(&self, handle: &MessageHandle) -> MessageReport {
        let email = match self.deps.mailbox.fetch(handle).await {
            Ok(email) => email,
            Err(e) => return self.finish(handle, None, None, Err(PipelineError::Fetch(e))).await,
        };

        if let Some(outcome) = self.screen_sender(&email) {
            return self
                .finish(handle, Some(email.subject), None, Ok(outcome))
                .await;
        }

        let message = inbound(&email);
        debug!(uid = %handle, kind = message.classification.label(), "Message classified");

        let result = match &message.classification {
            Classification::Original => self.handle_report(&message).await,
            Classification::Reply { .. } => self.handle_approval(&message).await,
        };

        self.finish(
            handle,
            Some(message.subject),
            Some(message.classification),
            result,
        )
        .await
    }

    fn screen_sender(&self, email: &FetchedEmail) -> Option<Outcome> {
        if is_self_sent(&email.sender, &self.config.from_address) {
            debug!(uid = %email.handle, "Skipping self-sent email");
            return Some(Outcome::SelfSent);
        }
        if !is_sender_allowed(&self.config.allowed_senders, &email.sender) {
            warn!(uid = %email.handle, sender = %email.sender, "Blocked email from sender");
            return Some(Outcome::SenderBlocked {
                sender: email.sender.clone(),
            });
        }
        None
    }

    /// Original branch: extract → build → store → notify.
    async fn handle_report(&self, message: &InboundMessage) -> Result<Outcome, PipelineError> {
        let records = extract_records(&message.body_text);
        if records.is_empty() {
            warn!(subject = %message.subject, "Report matched no records; sending empty approval request");
        }

        let (document, path) = self.store_unique(records).await?;

        let notification = approval_request(self.config, &document);
        self.deps.notifier.send(&notification).await?;

        info!(
            artifact = %document.id,
            records = document.records.len(),
            "Approval request sent"
        );
        Ok(Outcome::Notified {
            artifact: document.id,
            records: document.records.len(),
            path,
        })
    }

    /// Store a new artifact, moving its identifier forward one second at a
    /// time while the name is already taken. Existing files are never touched.
    async fn store_unique(
        &self,
        records: Vec<InventoryRecord>,
    ) -> Result<(ArtifactDocument, PathBuf), PipelineError> {
        let mut at = self.deps.clock.now();
        let mut document = build_artifact(records, at);

        for _ in 0..MAX_IDENTIFIER_BUMPS {
            match self.deps.store.store(&document).await {
                Ok(path) => return Ok((document, path)),
                Err(StorageError::AlreadyExists(taken)) => {
                    debug!(path = %taken.display(), "Artifact identifier taken; trying next second");
                    at += TimeDelta::seconds(1);
                    document.id = ArtifactId::from_timestamp(at);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let path = self.deps.store.store(&document).await?;
        Ok((document, path))
    }

    /// Reply branch: resolve the referenced artifact and upload it.
    async fn handle_approval(&self, message: &InboundMessage) -> Result<Outcome, PipelineError> {
        let Some(reference) = message.referenced_identifier() else {
            warn!(subject = %message.subject, "Reply carries no artifact reference; skipping");
            return Ok(Outcome::NoReference);
        };

        let Some(artifact) = ArtifactId::parse(reference) else {
            warn!(reference = %reference, "Reply reference is not an artifact identifier; skipping");
            return Ok(Outcome::UnusableReference {
                reference: reference.to_string(),
            });
        };

        let stored = self
            .deps
            .store
            .exists(&artifact)
            .await
            .map_err(PipelineError::Resolve)?;
        if !stored {
            warn!(artifact = %artifact, "Approved artifact not found locally; skipping");
            return Ok(Outcome::ArtifactMissing { artifact });
        }

        let local = self.deps.store.resolve(&artifact);
        let remote_path = self
            .deps
            .transfer
            .upload(&local, &self.config.remote_dir)
            .await?;

        info!(artifact = %artifact, remote = %remote_path, "Approved artifact uploaded");
        Ok(Outcome::Uploaded {
            artifact,
            remote_path,
        })
    }

    /// Apply the mark policy and build the report.
    async fn finish(
        &self,
        handle: &MessageHandle,
        subject: Option<String>,
        classification: Option<Classification>,
        result: Result<Outcome, PipelineError>,
    ) -> MessageReport {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(uid = %handle, stage = e.stage(), error = %e, "Message processing failed");
                Outcome::Failed {
                    stage: e.stage().to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let mut mark_error = None;
        let marked = if !outcome.is_failure() || self.config.mark_on_failure {
            match self.deps.mailbox.mark_processed(handle).await {
                Ok(()) => true,
                Err(e) => {
                    error!(uid = %handle, error = %e, "Failed to mark message processed");
                    mark_error = Some(e.to_string());
                    false
                }
            }
        } else {
            debug!(uid = %handle, "Leaving failed message unread");
            false
        };

        info!(uid = %handle, outcome = outcome.label(), marked, "Message done");
        MessageReport {
            handle: handle.clone(),
            subject,
            classification,
            outcome,
            marked,
            mark_error,
        }
    }
}

/// Classified view of a fetched email. An undecodable body reads as empty.
pub fn inbound(email: &FetchedEmail) -> InboundMessage {
    let classification = classify(&email.subject, &email.thread);
    let body_text = match email.body.extract_text() {
        Ok(text) => text,
        Err(e) => {
            if !classification.is_reply() {
                warn!(uid = %email.handle, error = %e, "Treating report body as empty");
            }
            String::new()
        }
    };
    InboundMessage {
        subject: email.subject.clone(),
        body_text,
        classification,
    }
}

/// Approval request for a freshly built artifact.
///
/// The subject carries `[identifier]`; a reply keeping it is the approval.
pub fn approval_request(config: &WorkflowConfig, document: &ArtifactDocument) -> Notification {
    let file_name = document.id.file_name();
    let body = format!(
        "{count} discontinued item(s) extracted into {file_name}.\n\
         \n\
         Reply to this email to approve upload. Keep [{id}] in the subject line.\n\
         \n\
         {csv}",
        count = document.records.len(),
        id = document.id,
        csv = document.body,
    );

    Notification {
        subject: format!("{}: [{}]", config.subject_tag, document.id),
        body,
        recipients: config.recipients.clone(),
        attachment: Some(NotificationAttachment {
            file_name,
            content_type: "text/csv".into(),
            content: document.body.clone(),
        }),
    }
}
