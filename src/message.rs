//! Message identity and raw payload.

use std::fmt;

use mail_parser::MessageParser;

/// Session-scoped ordinal assigned by the server at enumeration time.
///
/// The server renumbers these after any expunge in the same session, so a
/// `SeqId` is only valid for reads that happen before the first mutation.
/// Never use it for archival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeqId(pub u32);

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned handle, stable within a mailbox. The only identifier
/// valid for mutating operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uid(pub u32);

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One fetched mailbox item: raw RFC 822 bytes plus the identity it was
/// fetched under.
///
/// `uid` is filled when the FETCH response reported one, sparing a
/// `UID SEARCH` round trip later. Header values are parsed from `raw` on
/// demand rather than cached; messages are transient and read at most a
/// handful of times.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub seq: SeqId,
    pub uid: Option<Uid>,
    pub raw: Vec<u8>,
}

impl MailMessage {
    pub fn new(seq: SeqId, uid: Option<Uid>, raw: Vec<u8>) -> Self {
        Self { seq, uid, raw }
    }

    /// The content-derived stable identifier (Message-ID header, without
    /// angle brackets). `None` when the header is missing or the message
    /// does not parse.
    pub fn stable_id(&self) -> Option<String> {
        MessageParser::default()
            .parse(&self.raw)
            .and_then(|m| m.message_id().map(str::to_string))
    }

    /// Subject header, if any.
    pub fn subject(&self) -> Option<String> {
        MessageParser::default()
            .parse(&self.raw)
            .and_then(|m| m.subject().map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &[u8] = b"Message-ID: <abc123@example.com>\r\n\
        Subject: Quarterly report\r\n\
        From: alice@example.com\r\n\
        \r\n\
        Attached.\r\n";

    #[test]
    fn stable_id_strips_angle_brackets() {
        let msg = MailMessage::new(SeqId(1), None, RAW.to_vec());
        assert_eq!(msg.stable_id().as_deref(), Some("abc123@example.com"));
    }

    #[test]
    fn subject_extracted() {
        let msg = MailMessage::new(SeqId(1), Some(Uid(40)), RAW.to_vec());
        assert_eq!(msg.subject().as_deref(), Some("Quarterly report"));
    }

    #[test]
    fn missing_message_id_yields_none() {
        let msg = MailMessage::new(SeqId(2), None, b"Subject: x\r\n\r\nbody".to_vec());
        assert_eq!(msg.stable_id(), None);
    }

    #[test]
    fn ids_display_as_bare_numbers() {
        assert_eq!(SeqId(7).to_string(), "7");
        assert_eq!(Uid(1042).to_string(), "1042");
    }
}
