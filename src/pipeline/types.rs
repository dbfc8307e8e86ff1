//! Shared types for the approval pipeline.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Constant prefix for every artifact identifier.
pub const ARTIFACT_PREFIX: &str = "nordsvcp_";

/// File extension used when an artifact is written to storage.
pub const ARTIFACT_EXTENSION: &str = "csv";

/// Timestamp layout embedded in artifact identifiers.
pub const ARTIFACT_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

// ── Records ─────────────────────────────────────────────────────────

/// One extracted inventory line item.
///
/// `code` is the digit string used as both SKU and UPC in the CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub code: String,
}

impl InventoryRecord {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

// ── Artifacts ───────────────────────────────────────────────────────

/// Identifier of a generated CSV artifact, e.g. `nordsvcp_20260314093000`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Derive an identifier from a generation time (second resolution).
    pub fn from_timestamp(at: NaiveDateTime) -> Self {
        Self(format!(
            "{ARTIFACT_PREFIX}{}",
            at.format(ARTIFACT_TIMESTAMP_FORMAT)
        ))
    }

    /// Parse an identifier taken from a subject line.
    ///
    /// Accepts the bare identifier or the storage file name (with `.csv`).
    /// Anything else yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let stem = raw
            .strip_suffix(&format!(".{ARTIFACT_EXTENSION}"))
            .unwrap_or(raw);
        let digits = stem.strip_prefix(ARTIFACT_PREFIX)?;
        if digits.len() == 14 && digits.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(stem.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage file name: `<identifier>.csv`.
    pub fn file_name(&self) -> String {
        format!("{}.{ARTIFACT_EXTENSION}", self.0)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The CSV payload for one original report.
///
/// `body` is always `render_csv(&records)`; see `pipeline::artifact`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDocument {
    pub id: ArtifactId,
    pub records: Vec<InventoryRecord>,
    pub body: String,
}

// ── Classification ──────────────────────────────────────────────────

/// Threading headers of an inbound email. Values are kept but never validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadHeaders {
    pub in_reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

impl ThreadHeaders {
    /// True when either header carries a non-blank value.
    pub fn is_threaded(&self) -> bool {
        self.in_reply_to
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty())
            || self.references.iter().any(|r| !r.trim().is_empty())
    }
}

/// Whether an inbound email is a new report or a reviewer's reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    Original,
    Reply { referenced: Option<String> },
}

impl Classification {
    pub fn is_reply(&self) -> bool {
        matches!(self, Self::Reply { .. })
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Reply { .. } => "reply",
        }
    }
}

/// Classified view of one fetched email.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub subject: String,
    pub body_text: String,
    pub classification: Classification,
}

impl InboundMessage {
    pub fn is_reply(&self) -> bool {
        self.classification.is_reply()
    }

    pub fn referenced_identifier(&self) -> Option<&str> {
        match &self.classification {
            Classification::Reply { referenced } => referenced.as_deref(),
            Classification::Original => None,
        }
    }
}

// ── Clock ───────────────────────────────────────────────────────────

/// Source of generation timestamps for artifact identifiers.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn artifact_id_from_timestamp() {
        let id = ArtifactId::from_timestamp(at(9, 30, 5));
        assert_eq!(id.as_str(), "nordsvcp_20260314093005");
        assert_eq!(id.file_name(), "nordsvcp_20260314093005.csv");
    }

    #[test]
    fn artifact_id_parse_accepts_bare_and_file_name() {
        let bare = ArtifactId::parse("nordsvcp_20260314093005").unwrap();
        let file = ArtifactId::parse("nordsvcp_20260314093005.csv").unwrap();
        assert_eq!(bare, file);
        assert_eq!(bare.to_string(), "nordsvcp_20260314093005");
    }

    #[test]
    fn artifact_id_parse_rejects_foreign_text() {
        assert!(ArtifactId::parse("EXTERNAL").is_none());
        assert!(ArtifactId::parse("nordsvcp_2026").is_none());
        assert!(ArtifactId::parse("nordsvcp_2026031409300x").is_none());
        assert!(ArtifactId::parse("../nordsvcp_20260314093005").is_none());
        assert!(ArtifactId::parse("").is_none());
    }

    #[test]
    fn inbound_message_reference_only_for_replies() {
        let reply = InboundMessage {
            subject: "Re: x [nordsvcp_20260314093005]".into(),
            body_text: String::new(),
            classification: Classification::Reply {
                referenced: Some("nordsvcp_20260314093005".into()),
            },
        };
        assert!(reply.is_reply());
        assert_eq!(
            reply.referenced_identifier(),
            Some("nordsvcp_20260314093005")
        );

        let original = InboundMessage {
            subject: "report".into(),
            body_text: String::new(),
            classification: Classification::Original,
        };
        assert!(!original.is_reply());
        assert_eq!(original.referenced_identifier(), None);
    }

    #[test]
    fn classification_serializes_with_kind_tag() {
        let json = serde_json::to_value(Classification::Reply { referenced: None }).unwrap();
        assert_eq!(json["kind"], "reply");
        assert_eq!(Classification::Original.label(), "original");
    }
}
