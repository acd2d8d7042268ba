//! Mailbox session contract and the IMAP implementation.

pub mod imap;

pub use imap::{ImapConfig, ImapMailbox};

use crate::error::MailboxError;
use crate::message::{MailMessage, SeqId, Uid};

/// One remote mailbox session.
///
/// Sessions are stateful and strictly sequential; the caller owns the
/// session exclusively for the duration of a run. Sequence ids handed out
/// by [`list_pending`](Mailbox::list_pending) are only stable until the
/// first mutation — anything that changes the mailbox goes through a
/// [`Uid`].
pub trait Mailbox {
    /// Authenticate the session.
    fn login(&mut self) -> Result<(), MailboxError>;

    /// Open the inbox folder for the operations below.
    fn select_inbox(&mut self) -> Result<(), MailboxError>;

    /// All pending sequence ids, in server order.
    fn list_pending(&mut self) -> Result<Vec<SeqId>, MailboxError>;

    /// Fetch one raw message. The result carries the sequence id it was
    /// fetched under and, when the server reported one, its UID.
    fn fetch(&mut self, seq: SeqId) -> Result<MailMessage, MailboxError>;

    /// Look up the UID for a stable message id. `Ok(None)` means the
    /// server found no match.
    fn resolve_uid(&mut self, stable_id: &str) -> Result<Option<Uid>, MailboxError>;

    /// Copy the message to the archive folder, mark it deleted and
    /// expunge, as one logical operation. Sequence ids may be renumbered
    /// afterwards.
    fn archive_by_uid(&mut self, uid: Uid) -> Result<(), MailboxError>;

    /// Close the session. Best-effort; failures are logged, never raised.
    fn disconnect(&mut self);
}
