//! Strategy emitting one JSON object of extracted fields per message.

use mail_parser::MessageParser;

use crate::error::ParseError;
use crate::message::MailMessage;
use crate::parser::ParserStrategy;

/// Extracts identity, headers and body into a single JSON object on
/// stdout, one line per message. Meant for piping into downstream
/// tooling.
#[derive(Debug, Default)]
pub struct JsonParser;

impl JsonParser {
    fn extract(&self, msg: &MailMessage) -> Result<serde_json::Value, ParseError> {
        let parsed = MessageParser::default()
            .parse(&msg.raw)
            .ok_or_else(|| ParseError::Unparseable("not a valid RFC 822 message".to_string()))?;

        Ok(serde_json::json!({
            "seq": msg.seq.0,
            "uid": msg.uid.map(|u| u.0),
            "message_id": parsed.message_id(),
            "subject": parsed.subject(),
            "from": parsed.from().and_then(|a| a.first()).and_then(|a| a.address()),
            "date": parsed.date().map(|d| d.to_rfc3339()),
            "body": parsed.body_text(0),
        }))
    }
}

impl ParserStrategy for JsonParser {
    fn name(&self) -> &str {
        "json"
    }

    fn parse(&self, msg: &MailMessage) -> Result<(), ParseError> {
        let record = self.extract(msg)?;
        println!("{record}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{SeqId, Uid};

    #[test]
    fn extracts_identity_and_headers() {
        let raw = b"Message-ID: <rec-1@example.com>\r\n\
            Subject: Invoice 42\r\n\
            From: billing@example.com\r\n\
            \r\n\
            Amount due: 100\r\n";
        let msg = MailMessage::new(SeqId(3), Some(Uid(21)), raw.to_vec());

        let record = JsonParser.extract(&msg).unwrap();
        assert_eq!(record["seq"], 3);
        assert_eq!(record["uid"], 21);
        assert_eq!(record["message_id"], "rec-1@example.com");
        assert_eq!(record["subject"], "Invoice 42");
        assert_eq!(record["from"], "billing@example.com");
        assert!(record["body"].as_str().unwrap().contains("Amount due"));
    }

    #[test]
    fn unresolved_uid_serializes_as_null() {
        let raw = b"Subject: x\r\n\r\nbody";
        let msg = MailMessage::new(SeqId(1), None, raw.to_vec());
        let record = JsonParser.extract(&msg).unwrap();
        assert!(record["uid"].is_null());
    }

    #[test]
    fn empty_payload_is_unparseable() {
        let msg = MailMessage::new(SeqId(1), None, Vec::new());
        assert!(JsonParser.parse(&msg).is_err());
    }
}
