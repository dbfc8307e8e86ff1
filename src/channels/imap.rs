//! Minimal blocking IMAP4rev1 session over TLS.
//!
//! Only the commands the relay needs: LOGIN, SELECT, UID SEARCH UNSEEN,
//! UID FETCH (BODY.PEEK[]), UID STORE +FLAGS (\Seen), LOGOUT. Run from
//! `spawn_blocking`.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use rustls_pki_types::ServerName;
use tracing::debug;

use crate::error::MailboxError;

/// Read timeout applied to the mailbox socket.
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Response to one tagged command.
#[derive(Debug, Default)]
pub struct Response {
    /// Untagged and continuation lines, CRLF stripped.
    pub lines: Vec<String>,
    /// Literal payloads (`{n}` blocks) in arrival order.
    pub literals: Vec<Vec<u8>>,
    /// The tagged completion line.
    pub status: String,
}

/// An authenticated-or-not IMAP connection generic over its stream, so the
/// protocol handling can be exercised against in-memory buffers.
pub struct ImapSession<S: Read + Write> {
    stream: BufReader<S>,
    next_tag: u32,
}

impl ImapSession<TlsStream> {
    /// Open a TLS connection and consume the server greeting.
    pub fn connect(host: &str, port: u16) -> Result<Self, MailboxError> {
        let tcp = TcpStream::connect((host, port)).map_err(|e| MailboxError::Connect {
            host: host.to_string(),
            port,
            reason: e.to_string(),
        })?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| MailboxError::Tls(format!("invalid server name {host}: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailboxError::Tls(e.to_string()))?;

        Self::with_stream(rustls::StreamOwned::new(conn, tcp))
    }
}

impl<S: Read + Write> ImapSession<S> {
    /// Wrap an already-open stream and read the greeting.
    pub fn with_stream(stream: S) -> Result<Self, MailboxError> {
        let mut session = Self {
            stream: BufReader::new(stream),
            next_tag: 1,
        };
        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(MailboxError::Protocol(format!(
                "unexpected greeting: {greeting}"
            )));
        }
        Ok(session)
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<(), MailboxError> {
        let cmd = format!("LOGIN {} {}", quote(username), quote(password));
        match self.command(&cmd) {
            Ok(_) => Ok(()),
            Err(MailboxError::CommandFailed { .. }) => Err(MailboxError::AuthFailed {
                username: username.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    pub fn select(&mut self, mailbox: &str) -> Result<(), MailboxError> {
        self.command(&format!("SELECT {}", quote(mailbox)))?;
        Ok(())
    }

    /// UIDs of unseen messages, in server order.
    pub fn search_unseen(&mut self) -> Result<Vec<String>, MailboxError> {
        let resp = self.command("UID SEARCH UNSEEN")?;
        Ok(parse_search(&resp.lines))
    }

    /// Full RFC 822 bytes of one message. PEEK leaves `\Seen` untouched.
    pub fn fetch_raw(&mut self, uid: &str) -> Result<Vec<u8>, MailboxError> {
        let resp = self.command(&format!("UID FETCH {uid} (BODY.PEEK[])"))?;
        resp.literals
            .into_iter()
            .next()
            .ok_or_else(|| MailboxError::Protocol(format!("no message body returned for UID {uid}")))
    }

    pub fn mark_seen(&mut self, uid: &str) -> Result<(), MailboxError> {
        self.command(&format!("UID STORE {uid} +FLAGS (\\Seen)"))?;
        Ok(())
    }

    pub fn logout(&mut self) -> Result<(), MailboxError> {
        self.command("LOGOUT")?;
        Ok(())
    }

    /// Send one tagged command and collect its response.
    pub fn command(&mut self, cmd: &str) -> Result<Response, MailboxError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        let stream = self.stream.get_mut();
        stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        stream.flush()?;

        let verb = command_verb(cmd);
        debug!(tag = %tag, command = %verb, "IMAP command sent");

        let mut resp = Response::default();
        loop {
            let line = self.read_line()?;
            if let Some(rest) = line.strip_prefix(&tag).and_then(|r| r.strip_prefix(' ')) {
                resp.status = rest.to_string();
                break;
            }
            if let Some(len) = literal_length(&line) {
                let mut buf = vec![0u8; len];
                self.stream.read_exact(&mut buf)?;
                resp.literals.push(buf);
            }
            resp.lines.push(line);
        }

        if resp.status.starts_with("OK") {
            Ok(resp)
        } else {
            Err(MailboxError::CommandFailed {
                command: verb,
                response: resp.status,
            })
        }
    }

    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(MailboxError::Protocol("IMAP connection closed".into()));
        }
        while buf.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
            buf.pop();
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Quote an IMAP string argument.
pub fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Byte count of a trailing `{n}` literal marker, if present.
pub fn literal_length(line: &str) -> Option<usize> {
    let inner = line.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].trim_end_matches('+').parse().ok()
}

/// UIDs from `* SEARCH` lines.
pub fn parse_search(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().map(str::to_string))
        .collect()
}

// LOGIN arguments never reach the logs.
fn command_verb(cmd: &str) -> String {
    let mut words = cmd.split_whitespace();
    match (words.next(), words.next()) {
        (Some("UID"), Some(sub)) => format!("UID {sub}"),
        (Some(verb), _) => verb.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Scripted server: reads come from `input`, writes are captured.
    struct Scripted {
        input: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Scripted {
        fn new(server: &str) -> Self {
            Self {
                input: Cursor::new(server.as_bytes().to_vec()),
                written: Vec::new(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn session(server: &str) -> ImapSession<Scripted> {
        ImapSession::with_stream(Scripted::new(server)).unwrap()
    }

    fn written(s: &ImapSession<Scripted>) -> String {
        String::from_utf8(s.stream.get_ref().written.clone()).unwrap()
    }

    #[test]
    fn quote_escapes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote(r#"p"w\d"#), r#""p\"w\\d""#);
    }

    #[test]
    fn literal_length_parses_marker() {
        assert_eq!(literal_length("* 1 FETCH (UID 7 BODY[] {342}"), Some(342));
        assert_eq!(literal_length("* 1 FETCH (FLAGS (\\Seen))"), None);
        assert_eq!(literal_length("{12+}"), Some(12));
    }

    #[test]
    fn parse_search_collects_uids() {
        let lines = vec!["* SEARCH 4 9 12".to_string(), "* OK done".to_string()];
        assert_eq!(parse_search(&lines), vec!["4", "9", "12"]);
        assert!(parse_search(&["* SEARCH".to_string()]).is_empty());
    }

    #[test]
    fn greeting_must_be_ok() {
        let result = ImapSession::with_stream(Scripted::new("* BYE go away\r\n"));
        assert!(matches!(result, Err(MailboxError::Protocol(_))));
    }

    #[test]
    fn login_select_search_flow() {
        let mut s = session(
            "* OK ready\r\n\
             A1 OK logged in\r\n\
             * 3 EXISTS\r\nA2 OK [READ-WRITE] selected\r\n\
             * SEARCH 5 8\r\nA3 OK search done\r\n",
        );
        s.login("relay@example.com", "secret").unwrap();
        s.select("INBOX").unwrap();
        assert_eq!(s.search_unseen().unwrap(), vec!["5", "8"]);

        let sent = written(&s);
        assert!(sent.contains("A1 LOGIN \"relay@example.com\" \"secret\"\r\n"));
        assert!(sent.contains("A2 SELECT \"INBOX\"\r\n"));
        assert!(sent.contains("A3 UID SEARCH UNSEEN\r\n"));
    }

    #[test]
    fn failed_login_is_auth_error() {
        let mut s = session("* OK ready\r\nA1 NO [AUTHENTICATIONFAILED] bad\r\n");
        let err = s.login("relay", "wrong").unwrap_err();
        assert!(matches!(err, MailboxError::AuthFailed { username } if username == "relay"));
    }

    #[test]
    fn fetch_reads_literal_by_length() {
        let body = "Subject: hi\r\n\r\nline with ) paren\r\n";
        let server = format!(
            "* OK ready\r\n* 1 FETCH (UID 5 BODY[] {{{}}}\r\n{})\r\nA1 OK fetched\r\n",
            body.len(),
            body
        );
        let mut s = session(&server);
        let raw = s.fetch_raw("5").unwrap();
        assert_eq!(raw, body.as_bytes());
        assert!(written(&s).contains("A1 UID FETCH 5 (BODY.PEEK[])\r\n"));
    }

    #[test]
    fn fetch_without_literal_is_protocol_error() {
        let mut s = session("* OK ready\r\nA1 OK nothing\r\n");
        assert!(matches!(s.fetch_raw("5"), Err(MailboxError::Protocol(_))));
    }

    #[test]
    fn store_failure_surfaces_command() {
        let mut s = session("* OK ready\r\nA1 NO read-only\r\n");
        let err = s.mark_seen("5").unwrap_err();
        assert!(
            matches!(err, MailboxError::CommandFailed { ref command, .. } if command == "UID STORE")
        );
    }

    #[test]
    fn closed_connection_is_protocol_error() {
        let mut s = session("* OK ready\r\n");
        assert!(matches!(s.logout(), Err(MailboxError::Protocol(_))));
    }
}
