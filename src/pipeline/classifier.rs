//! Original-vs-reply classification.
//!
//! Pure string inspection of the subject and threading headers. The
//! bracketed identifier in a reply subject is the only link back to the
//! artifact the reviewer is approving.

use crate::pipeline::types::{Classification, ThreadHeaders};

/// Literal subject prefix that marks a reply.
pub const REPLY_PREFIX: &str = "Re:";

/// Classify a message from its subject line and threading headers.
pub fn classify(subject: &str, thread: &ThreadHeaders) -> Classification {
    if subject.starts_with(REPLY_PREFIX) || thread.is_threaded() {
        Classification::Reply {
            referenced: bracketed_reference(subject).map(str::to_string),
        }
    } else {
        Classification::Original
    }
}

/// Interior of the first `[...]` span, verbatim. Empty brackets count as absent.
pub fn bracketed_reference(subject: &str) -> Option<&str> {
    let open = subject.find('[')?;
    let rest = &subject[open + 1..];
    let close = rest.find(']')?;
    let inner = &rest[..close];
    (!inner.is_empty()).then_some(inner)
}
