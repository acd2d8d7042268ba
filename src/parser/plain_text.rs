//! Default strategy: print identity, key headers and the plain-text body.

use mail_parser::MessageParser;

use crate::error::ParseError;
use crate::message::MailMessage;
use crate::parser::ParserStrategy;

/// Prints the message identity, Subject/From/Date and the first
/// text/plain body part to stdout. A message without a text body cannot
/// be classified by this strategy.
#[derive(Debug, Default)]
pub struct PlainTextParser;

impl ParserStrategy for PlainTextParser {
    fn name(&self) -> &str {
        "plain_text"
    }

    fn parse(&self, msg: &MailMessage) -> Result<(), ParseError> {
        let parsed = MessageParser::default()
            .parse(&msg.raw)
            .ok_or_else(|| ParseError::Unparseable("not a valid RFC 822 message".to_string()))?;

        let body = parsed
            .body_text(0)
            .ok_or_else(|| ParseError::Unparseable("no text/plain part".to_string()))?;

        println!("Sequence: {}", msg.seq);
        match msg.uid {
            Some(uid) => println!("Uid: {uid}"),
            None => println!("Uid: (unresolved)"),
        }
        println!("Subject: {}", parsed.subject().unwrap_or("(no subject)"));
        println!("From: {}", sender_address(&parsed));
        println!(
            "Date: {}",
            parsed
                .date()
                .map(|d| d.to_rfc3339())
                .unwrap_or_else(|| "(no date)".to_string())
        );
        println!("\n{body}");
        Ok(())
    }
}

/// First From address, or a placeholder.
fn sender_address(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "(unknown sender)".to_string())
}
