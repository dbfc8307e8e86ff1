//! Email body types and raw message parsing.

use mail_parser::{HeaderValue, MessageParser, MimeHeaders, PartType};
use serde::{Deserialize, Serialize};

use crate::channels::channel::{FetchedEmail, MessageHandle};
use crate::error::MailboxError;
use crate::pipeline::types::ThreadHeaders;

/// One leaf MIME part, reduced to what text selection needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyPart {
    /// Lower-cased `type/subtype`, e.g. `text/plain`.
    pub mime_type: String,
    /// Content-Disposition is `attachment`.
    pub attachment: bool,
    /// Decoded text for textual parts; `None` for binary parts.
    pub text: Option<String>,
}

impl BodyPart {
    pub fn text(mime_type: &str, text: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            attachment: false,
            text: Some(text.to_string()),
        }
    }

    pub fn as_attachment(mut self) -> Self {
        self.attachment = true;
        self
    }

    fn is_plain(&self) -> bool {
        self.mime_type == "text/plain"
    }

    fn is_html(&self) -> bool {
        self.mime_type == "text/html"
    }
}

/// Shape of a message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum MessageBody {
    SinglePart(BodyPart),
    MultiPart(Vec<BodyPart>),
}

/// No usable text part in a message body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("message has no readable text part")]
pub struct NoTextPart;

impl MessageBody {
    /// Readable text of the body.
    ///
    /// Multipart bodies pick the first non-attachment `text/plain` part, then
    /// the first non-attachment `text/html` part. HTML is flattened with line
    /// breaks preserved.
    pub fn extract_text(&self) -> Result<String, NoTextPart> {
        match self {
            Self::SinglePart(part) => match &part.text {
                Some(text) if part.is_html() => Ok(html_to_text(text)),
                Some(text) if part.mime_type.starts_with("text/") => Ok(text.clone()),
                _ => Err(NoTextPart),
            },
            Self::MultiPart(parts) => {
                let inline = || parts.iter().filter(|p| !p.attachment);
                if let Some(text) = inline().find(|p| p.is_plain()).and_then(|p| p.text.as_ref()) {
                    return Ok(text.clone());
                }
                if let Some(html) = inline().find(|p| p.is_html()).and_then(|p| p.text.as_ref()) {
                    return Ok(html_to_text(html));
                }
                Err(NoTextPart)
            }
        }
    }
}

/// Flatten HTML to text, keeping one output line per `<br>`, paragraph,
/// div, table row or list item. Table cells are separated by a space and
/// `<style>`/`<script>` contents are dropped.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut tag = String::new();
    let mut in_tag = false;
    let mut hidden = false;

    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let self_closing = tag.trim_end().ends_with('/');
                match tag_name(&tag).as_str() {
                    "style" | "script" if !self_closing => hidden = true,
                    "/style" | "/script" => hidden = false,
                    "/td" | "/th" if !hidden => out.push(' '),
                    name if !hidden && breaks_line(name) => out.push('\n'),
                    _ => {}
                }
            }
            _ if in_tag => tag.push(ch),
            _ if hidden => {}
            _ => out.push(ch),
        }
    }

    out.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

/// Lower-cased tag name, with a leading `/` kept for end tags.
fn tag_name(tag: &str) -> String {
    tag.trim()
        .trim_end_matches('/')
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn breaks_line(name: &str) -> bool {
    matches!(
        name,
        "br" | "/p" | "/div" | "/tr" | "/li" | "/h1" | "/h2" | "/h3" | "/pre"
    )
}

/// Parse fetched RFC 822 bytes into a `FetchedEmail`.
pub fn parse_raw_email(handle: &MessageHandle, raw: &[u8]) -> Result<FetchedEmail, MailboxError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailboxError::Parse {
            uid: handle.to_string(),
        })?;

    let subject = parsed.subject().unwrap_or_default().to_string();
    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into());
    let message_id = parsed.message_id().map(|s| s.to_string());

    let thread = ThreadHeaders {
        in_reply_to: header_texts(parsed.in_reply_to()).into_iter().next(),
        references: header_texts(parsed.references()),
    };

    Ok(FetchedEmail {
        handle: handle.clone(),
        message_id,
        sender,
        subject,
        thread,
        body: body_shape(&parsed),
    })
}

fn header_texts(value: &HeaderValue<'_>) -> Vec<String> {
    match value {
        HeaderValue::Text(text) => vec![text.to_string()],
        HeaderValue::TextList(list) => list.iter().map(|t| t.to_string()).collect(),
        _ => Vec::new(),
    }
}

fn body_shape(parsed: &mail_parser::Message<'_>) -> MessageBody {
    let is_container = |part: &mail_parser::MessagePart<'_>| matches!(part.body, PartType::Multipart(_));

    // Leaves in depth-first order, the same order a MIME walk visits them.
    let mut leaves = parsed
        .parts
        .iter()
        .filter(|part| !is_container(part))
        .map(to_body_part);

    if parsed.parts.first().is_some_and(|root| is_container(root)) {
        MessageBody::MultiPart(leaves.collect())
    } else {
        match leaves.next() {
            Some(single) => MessageBody::SinglePart(single),
            None => MessageBody::MultiPart(Vec::new()),
        }
    }
}

fn to_body_part(part: &mail_parser::MessagePart<'_>) -> BodyPart {
    let (default_type, text) = match &part.body {
        PartType::Text(text) => ("text/plain", Some(text.to_string())),
        PartType::Html(html) => ("text/html", Some(html.to_string())),
        _ => ("application/octet-stream", None),
    };

    let mime_type = MimeHeaders::content_type(part)
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .unwrap_or_else(|| default_type.to_string())
        .to_ascii_lowercase();

    let attachment = MimeHeaders::content_disposition(part)
        .is_some_and(|cd| cd.ctype().eq_ignore_ascii_case("attachment"));

    BodyPart {
        mime_type,
        attachment,
        text,
    }
}
