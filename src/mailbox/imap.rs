//! IMAP over TLS, hand-rolled on rustls.
//!
//! Tagged commands over a line-framed stream, with `{N}` literal handling
//! for FETCH payloads. Covers exactly the operations the sweep and the
//! CLI modes need: LOGIN, SELECT, SEARCH, FETCH, UID SEARCH by
//! Message-ID, and UID COPY / UID STORE / EXPUNGE for archival.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tracing::{debug, info};

use crate::config::Configuration;
use crate::error::{ConfigError, MailboxError};
use crate::mailbox::Mailbox;
use crate::message::{MailMessage, SeqId, Uid};

const READ_TIMEOUT: Duration = Duration::from_secs(30);

// ── Configuration ───────────────────────────────────────────────────

/// Connection settings for one IMAP session, resolved once from the
/// configuration resolver.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub inbox_folder: String,
    pub archive_folder: String,
}

impl ImapConfig {
    pub fn resolve(config: &Configuration) -> Result<Self, ConfigError> {
        let port = config.get_int("imap_port")?;
        let port = u16::try_from(port).map_err(|_| ConfigError::InvalidValue {
            key: "imap_port".to_string(),
            value: port.to_string(),
            expected: "a TCP port",
        })?;

        Ok(Self {
            host: config.get("imap_server")?,
            port,
            username: config.get("username")?,
            password: config.get("password")?,
            inbox_folder: config.get("inbox_folder")?,
            archive_folder: config.get("archive_folder")?,
        })
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// A live IMAP session over TLS.
pub struct ImapMailbox {
    stream: rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
    config: ImapConfig,
    tag_counter: u32,
}

/// Server response to one command: all response lines plus the payload of
/// the last `{N}` literal, if the response carried one.
struct Reply {
    lines: Vec<String>,
    literal: Option<Vec<u8>>,
}

impl Reply {
    fn tagged(&self) -> &str {
        self.lines.last().map(String::as_str).unwrap_or("")
    }

    fn untagged(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(String::as_str)
            .filter(|line| line.starts_with("* "))
    }
}

impl ImapMailbox {
    /// Open a TLS connection and consume the server greeting. Does not
    /// authenticate; call [`Mailbox::login`] next.
    pub fn dial(config: ImapConfig) -> Result<Self, MailboxError> {
        let tcp = TcpStream::connect((config.host.as_str(), config.port)).map_err(|e| {
            MailboxError::Connection(format!("{}:{}: {e}", config.host, config.port))
        })?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|e| MailboxError::Connection(e.to_string()))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name: ServerName<'static> = ServerName::try_from(config.host.clone())
            .map_err(|e| MailboxError::Connection(format!("invalid server name: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailboxError::Connection(e.to_string()))?;
        let stream = rustls::StreamOwned::new(conn, tcp);

        let mut mailbox = Self {
            stream,
            config,
            tag_counter: 0,
        };
        let greeting = mailbox.read_line()?;
        debug!(greeting = %greeting.trim_end(), "Connected");
        Ok(mailbox)
    }

    /// Pending messages with their Subject/From/Date header block, for the
    /// `--list` mode. Uses BODY.PEEK so nothing is marked seen.
    pub fn list_overview(&mut self) -> Result<Vec<(SeqId, String)>, MailboxError> {
        let pending = self.list_pending()?;
        let mut overview = Vec::with_capacity(pending.len());
        for seq in pending {
            let reply = self.run(
                "fetch headers",
                &format!("FETCH {seq} (BODY.PEEK[HEADER.FIELDS (SUBJECT FROM DATE)])"),
            )?;
            let headers = reply
                .literal
                .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
                .unwrap_or_else(|| "(no headers)".to_string());
            overview.push((seq, headers));
        }
        Ok(overview)
    }

    // ── Wire plumbing ───────────────────────────────────────────────

    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.stream.read(&mut byte) {
                Ok(0) => return Err(MailboxError::Connection("connection closed".to_string())),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).into_owned());
                    }
                }
                Err(e) => return Err(MailboxError::Connection(e.to_string())),
            }
        }
    }

    /// Send one tagged command and collect lines until the tagged
    /// completion. A line announcing a `{N}` literal is followed by
    /// exactly N raw payload bytes, captured separately.
    fn command(&mut self, cmd: &str) -> Result<Reply, MailboxError> {
        self.tag_counter += 1;
        let tag = format!("A{}", self.tag_counter);
        let full = format!("{tag} {cmd}\r\n");
        self.stream
            .write_all(full.as_bytes())
            .and_then(|()| self.stream.flush())
            .map_err(|e| MailboxError::Connection(e.to_string()))?;

        let mut lines = Vec::new();
        let mut literal = None;
        loop {
            let line = self.read_line()?;
            if let Some(len) = literal_len(&line) {
                let mut payload = vec![0u8; len];
                self.stream
                    .read_exact(&mut payload)
                    .map_err(|e| MailboxError::Connection(e.to_string()))?;
                literal = Some(payload);
                lines.push(line);
                continue;
            }
            let done = line.starts_with(&tag);
            lines.push(line);
            if done {
                break;
            }
        }
        Ok(Reply { lines, literal })
    }

    /// `command` plus an OK check on the tagged completion.
    fn run(&mut self, op: &'static str, cmd: &str) -> Result<Reply, MailboxError> {
        let reply = self.command(cmd)?;
        if is_ok(reply.tagged()) {
            Ok(reply)
        } else {
            Err(MailboxError::Protocol {
                op,
                detail: reply.tagged().trim_end().to_string(),
            })
        }
    }
}

impl Mailbox for ImapMailbox {
    fn login(&mut self) -> Result<(), MailboxError> {
        info!(server = %self.config.host, user = %self.config.username, "Logging in");
        let cmd = format!(
            "LOGIN \"{}\" \"{}\"",
            self.config.username, self.config.password
        );
        let reply = self.command(&cmd)?;
        if is_ok(reply.tagged()) {
            debug!("Login accepted");
            Ok(())
        } else {
            Err(MailboxError::Auth(reply.tagged().trim_end().to_string()))
        }
    }

    fn select_inbox(&mut self) -> Result<(), MailboxError> {
        self.run("select", &format!("SELECT \"{}\"", self.config.inbox_folder))?;
        debug!(folder = %self.config.inbox_folder, "Folder selected");
        Ok(())
    }

    fn list_pending(&mut self) -> Result<Vec<SeqId>, MailboxError> {
        let reply = self.run("search", "SEARCH ALL")?;
        Ok(parse_search_ids(&reply.lines)
            .into_iter()
            .map(SeqId)
            .collect())
    }

    fn fetch(&mut self, seq: SeqId) -> Result<MailMessage, MailboxError> {
        let reply = self.run("fetch", &format!("FETCH {seq} (UID BODY.PEEK[])"))?;
        let uid = reply
            .untagged()
            .find(|line| line.contains("FETCH"))
            .and_then(parse_uid)
            .map(Uid);
        let raw = reply.literal.ok_or(MailboxError::NotFound(seq))?;
        Ok(MailMessage::new(seq, uid, raw))
    }

    fn resolve_uid(&mut self, stable_id: &str) -> Result<Option<Uid>, MailboxError> {
        let needle = stable_id.trim_start_matches('<').trim_end_matches('>');
        let reply = self.run(
            "uid search",
            &format!("UID SEARCH HEADER Message-ID \"{needle}\""),
        )?;
        let hits = parse_search_ids(&reply.lines);
        if hits.len() > 1 {
            debug!(stable_id = %stable_id, hits = hits.len(), "Multiple UID matches, using the first");
        }
        Ok(hits.first().copied().map(Uid))
    }

    fn archive_by_uid(&mut self, uid: Uid) -> Result<(), MailboxError> {
        self.run(
            "copy",
            &format!("UID COPY {uid} \"{}\"", self.config.archive_folder),
        )?;
        self.run("store", &format!("UID STORE {uid} +FLAGS (\\Deleted)"))?;
        self.run("expunge", "EXPUNGE")?;
        debug!(uid = %uid, folder = %self.config.archive_folder, "Message archived");
        Ok(())
    }

    fn disconnect(&mut self) {
        match self.command("LOGOUT") {
            Ok(_) => debug!("Disconnected"),
            Err(e) => debug!(error = %e, "Logout failed"),
        }
    }
}

// ── Response parsing ────────────────────────────────────────────────

/// `A3 OK ...` → true; NO/BAD/garbage → false.
fn is_ok(tagged: &str) -> bool {
    tagged.split_whitespace().nth(1) == Some("OK")
}

/// Length of the `{N}` literal a line announces, if it does.
fn literal_len(line: &str) -> Option<usize> {
    let trimmed = line.trim_end();
    if !trimmed.ends_with('}') {
        return None;
    }
    let open = trimmed.rfind('{')?;
    trimmed[open + 1..trimmed.len() - 1].parse().ok()
}

/// Ids from any `* SEARCH n n n` lines in a response.
fn parse_search_ids(lines: &[String]) -> Vec<u32> {
    let mut ids = Vec::new();
    for line in lines {
        if let Some(rest) = line.strip_prefix("* SEARCH") {
            ids.extend(rest.split_whitespace().filter_map(|t| t.parse::<u32>().ok()));
        }
    }
    ids
}

/// The number following a `UID` token in a FETCH response line.
fn parse_uid(line: &str) -> Option<u32> {
    let mut tokens = line.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "UID" {
            return tokens
                .next()?
                .trim_matches(|c: char| !c.is_ascii_digit())
                .parse()
                .ok();
        }
    }
    None
}
