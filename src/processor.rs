//! The batch sweep: enumerate → fetch → classify → archive or quarantine.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::error::{Error, MailboxError, ParseError, SweepError};
use crate::mailbox::Mailbox;
use crate::message::{MailMessage, Uid};
use crate::parser::ParserStrategy;

/// Outcome counts for one sweep. Complete and accurate even when the
/// sweep ends in an aggregate failure; produced once per run, never
/// persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub examined: usize,
    pub archived: usize,
    pub failed: usize,
}

/// Why one message failed. Per-message failures are recovered by
/// quarantine and never abort the sweep.
#[derive(Debug, thiserror::Error)]
enum MessageFailure {
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("message has no Message-ID header")]
    MissingStableId,

    #[error("no UID found for stable id '{stable_id}'")]
    UidUnresolved { stable_id: String },

    #[error("UID lookup failed: {0}")]
    Resolve(MailboxError),

    #[error("archive failed: {0}")]
    Archive(MailboxError),
}

/// Drives one batch run over a mailbox session it owns exclusively.
pub struct MailProcessor<'a> {
    mailbox: &'a mut dyn Mailbox,
    parser: &'a dyn ParserStrategy,
    error_dir: PathBuf,
}

impl<'a> MailProcessor<'a> {
    pub fn new(
        mailbox: &'a mut dyn Mailbox,
        parser: &'a dyn ParserStrategy,
        error_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            mailbox,
            parser,
            error_dir: error_dir.into(),
        }
    }

    /// Sweep the inbox once.
    ///
    /// Every raw message is fetched before the first archive: archival
    /// expunges, which renumbers the remaining sequence ids, so no fetch
    /// may happen after a mutation. Mutations themselves go through UIDs
    /// only. Each message then passes through classify → archive, with
    /// failures quarantined to the error directory.
    ///
    /// Returns the report when every message archived. When any failed,
    /// returns [`SweepError::Partial`] carrying the complete report —
    /// success-with-exceptions, as opposed to the session-level errors
    /// that mean no sweep happened at all. Re-running after a partial
    /// failure is safe: archived messages no longer enumerate, and
    /// quarantined ones are still in the inbox to be retried.
    pub fn process_all(&mut self) -> Result<RunReport, Error> {
        self.mailbox.select_inbox()?;
        let pending = self.mailbox.list_pending()?;
        if pending.is_empty() {
            info!("No pending messages");
            return Ok(RunReport::default());
        }
        info!("Found {} message(s) to process", pending.len());

        let mut report = RunReport::default();

        let mut fetched: Vec<MailMessage> = Vec::with_capacity(pending.len());
        for seq in pending {
            report.examined += 1;
            match self.mailbox.fetch(seq) {
                Ok(message) => {
                    debug!(seq = %seq, stable_id = ?message.stable_id(), "Fetched message");
                    fetched.push(message);
                }
                // Nothing was fetched, so there is nothing to quarantine.
                Err(e) => {
                    report.failed += 1;
                    warn!(seq = %seq, error = %e, "Fetch failed");
                }
            }
        }

        for message in fetched {
            match self.classify_and_archive(&message) {
                Ok(uid) => {
                    report.archived += 1;
                    debug!(seq = %message.seq, uid = %uid, "Message archived");
                }
                Err(failure) => {
                    report.failed += 1;
                    warn!(seq = %message.seq, error = %failure, "Message quarantined");
                    self.quarantine(&message);
                }
            }
        }

        info!(
            examined = report.examined,
            archived = report.archived,
            failed = report.failed,
            "Sweep finished"
        );

        if report.failed > 0 {
            return Err(SweepError::Partial {
                report,
                error_dir: self.error_dir.clone(),
            }
            .into());
        }
        Ok(report)
    }

    fn classify_and_archive(&mut self, message: &MailMessage) -> Result<Uid, MessageFailure> {
        self.parser.parse(message)?;
        let uid = self.resolve_uid(message)?;
        self.mailbox
            .archive_by_uid(uid)
            .map_err(MessageFailure::Archive)?;
        Ok(uid)
    }

    /// The fetch-annotated UID when the server reported one, otherwise a
    /// lookup by stable id. A message whose UID cannot be established is
    /// a failure, never a silent skip.
    fn resolve_uid(&mut self, message: &MailMessage) -> Result<Uid, MessageFailure> {
        if let Some(uid) = message.uid {
            return Ok(uid);
        }
        let stable_id = message.stable_id().ok_or(MessageFailure::MissingStableId)?;
        match self.mailbox.resolve_uid(&stable_id) {
            Ok(Some(uid)) => Ok(uid),
            Ok(None) => Err(MessageFailure::UidUnresolved { stable_id }),
            Err(e) => Err(MessageFailure::Resolve(e)),
        }
    }

    /// Persist the raw bytes for manual remediation. Artifact names are
    /// unique per sequence id within a run; a later run reusing the same
    /// sequence id overwrites, which is accepted.
    fn quarantine(&self, message: &MailMessage) {
        if let Err(e) = self.write_artifact(message) {
            error!(seq = %message.seq, error = %e, "Failed to write error artifact");
        }
    }

    fn write_artifact(&self, message: &MailMessage) -> std::io::Result<()> {
        fs::create_dir_all(&self.error_dir)?;
        let path = self.error_dir.join(format!("email_{}.eml", message.seq));
        fs::write(&path, &message.raw)?;
        info!(seq = %message.seq, path = %path.display(), "Saved raw message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SeqId;

    // ── Mock collaborators ──────────────────────────────────────────

    /// In-memory mailbox. Messages live in a Vec; sequence ids are the
    /// 1-based positions at call time, so every archive renumbers the
    /// rest, exactly like a server expunge.
    struct MockMailbox {
        messages: Vec<StoredMail>,
        annotate_uid_on_fetch: bool,
        fail_fetch_for: Vec<u32>,
        resolve_always_misses: bool,
        archived_uids: Vec<Uid>,
        mutations: usize,
    }

    struct StoredMail {
        uid: u32,
        raw: Vec<u8>,
    }

    impl MockMailbox {
        fn new(messages: Vec<StoredMail>) -> Self {
            Self {
                messages,
                annotate_uid_on_fetch: true,
                fail_fetch_for: Vec::new(),
                resolve_always_misses: false,
                archived_uids: Vec::new(),
                mutations: 0,
            }
        }

        fn raw_mail(uid: u32, message_id: &str, subject: &str) -> StoredMail {
            let raw = format!(
                "Message-ID: <{message_id}>\r\nSubject: {subject}\r\n\r\nbody of {message_id}\r\n"
            );
            StoredMail {
                uid,
                raw: raw.into_bytes(),
            }
        }
    }

    impl Mailbox for MockMailbox {
        fn login(&mut self) -> Result<(), MailboxError> {
            Ok(())
        }

        fn select_inbox(&mut self) -> Result<(), MailboxError> {
            Ok(())
        }

        fn list_pending(&mut self) -> Result<Vec<SeqId>, MailboxError> {
            Ok((1..=self.messages.len() as u32).map(SeqId).collect())
        }

        fn fetch(&mut self, seq: SeqId) -> Result<MailMessage, MailboxError> {
            if self.fail_fetch_for.contains(&seq.0) {
                return Err(MailboxError::Protocol {
                    op: "fetch",
                    detail: "simulated failure".to_string(),
                });
            }
            let stored = self
                .messages
                .get(seq.0 as usize - 1)
                .ok_or(MailboxError::NotFound(seq))?;
            let uid = self.annotate_uid_on_fetch.then_some(Uid(stored.uid));
            Ok(MailMessage::new(seq, uid, stored.raw.clone()))
        }

        fn resolve_uid(&mut self, stable_id: &str) -> Result<Option<Uid>, MailboxError> {
            if self.resolve_always_misses {
                return Ok(None);
            }
            let needle = format!("<{stable_id}>");
            Ok(self
                .messages
                .iter()
                .find(|m| String::from_utf8_lossy(&m.raw).contains(&needle))
                .map(|m| Uid(m.uid)))
        }

        fn archive_by_uid(&mut self, uid: Uid) -> Result<(), MailboxError> {
            let pos = self
                .messages
                .iter()
                .position(|m| m.uid == uid.0)
                .ok_or_else(|| MailboxError::Protocol {
                    op: "copy",
                    detail: format!("no message with uid {uid}"),
                })?;
            // Expunge: later messages shift down one sequence position.
            self.messages.remove(pos);
            self.archived_uids.push(uid);
            self.mutations += 1;
            Ok(())
        }

        fn disconnect(&mut self) {}
    }

    #[derive(Debug)]
    struct AcceptAll;
    impl ParserStrategy for AcceptAll {
        fn name(&self) -> &str {
            "accept_all"
        }
        fn parse(&self, _msg: &MailMessage) -> Result<(), ParseError> {
            Ok(())
        }
    }

    /// Rejects messages whose subject contains the given marker.
    #[derive(Debug)]
    struct RejectMarked(&'static str);
    impl ParserStrategy for RejectMarked {
        fn name(&self) -> &str {
            "reject_marked"
        }
        fn parse(&self, msg: &MailMessage) -> Result<(), ParseError> {
            match msg.subject() {
                Some(s) if s.contains(self.0) => {
                    Err(ParseError::Unparseable(format!("marked subject: {s}")))
                }
                _ => Ok(()),
            }
        }
    }

    fn three_mails() -> Vec<StoredMail> {
        vec![
            MockMailbox::raw_mail(101, "m1@example.com", "first"),
            MockMailbox::raw_mail(102, "m2@example.com", "second BAD"),
            MockMailbox::raw_mail(103, "m3@example.com", "third"),
        ]
    }

    // ── Sweep behavior ──────────────────────────────────────────────

    #[test]
    fn empty_mailbox_yields_zero_report_without_mutation() {
        let mut mailbox = MockMailbox::new(Vec::new());
        let errors = tempfile::tempdir().unwrap();
        let report = MailProcessor::new(&mut mailbox, &AcceptAll, errors.path())
            .process_all()
            .unwrap();

        assert_eq!(report, RunReport::default());
        assert_eq!(mailbox.mutations, 0);
    }

    #[test]
    fn clean_sweep_archives_everything() {
        let mut mailbox = MockMailbox::new(three_mails());
        let errors = tempfile::tempdir().unwrap();
        let report = MailProcessor::new(&mut mailbox, &AcceptAll, errors.path())
            .process_all()
            .unwrap();

        assert_eq!(
            report,
            RunReport {
                examined: 3,
                archived: 3,
                failed: 0
            }
        );
        assert_eq!(
            mailbox.archived_uids,
            vec![Uid(101), Uid(102), Uid(103)]
        );
        // Nothing quarantined.
        assert_eq!(std::fs::read_dir(errors.path()).unwrap().count(), 0);
    }

    #[test]
    fn one_bad_message_is_isolated() {
        let mut mailbox = MockMailbox::new(three_mails());
        let errors = tempfile::tempdir().unwrap();
        let result = MailProcessor::new(&mut mailbox, &RejectMarked("BAD"), errors.path())
            .process_all();

        let (report, error_dir) = match result {
            Err(Error::Sweep(SweepError::Partial { report, error_dir })) => (report, error_dir),
            other => panic!("expected partial failure, got {other:?}"),
        };
        assert_eq!(
            report,
            RunReport {
                examined: 3,
                archived: 2,
                failed: 1
            }
        );
        assert_eq!(error_dir, errors.path());

        // Messages 1 and 3 archived; message 2 quarantined with its raw bytes.
        assert_eq!(mailbox.archived_uids, vec![Uid(101), Uid(103)]);
        let artifact = std::fs::read(errors.path().join("email_2.eml")).unwrap();
        assert_eq!(
            artifact,
            MockMailbox::raw_mail(102, "m2@example.com", "second BAD").raw
        );

        // The failed message is still pending for the next run.
        assert_eq!(mailbox.list_pending().unwrap(), vec![SeqId(1)]);
    }

    #[test]
    fn rerun_after_clean_sweep_is_a_zero_report() {
        let mut mailbox = MockMailbox::new(three_mails());
        let errors = tempfile::tempdir().unwrap();

        MailProcessor::new(&mut mailbox, &AcceptAll, errors.path())
            .process_all()
            .unwrap();
        let second = MailProcessor::new(&mut mailbox, &AcceptAll, errors.path())
            .process_all()
            .unwrap();

        assert_eq!(second, RunReport::default());
    }

    #[test]
    fn archival_uses_uids_across_renumbering() {
        // No UID annotation on fetch, forcing the stable-id lookup path.
        // Archiving message 1 renumbers the rest; UIDs must stay correct.
        let mut mailbox = MockMailbox::new(three_mails());
        mailbox.annotate_uid_on_fetch = false;
        let errors = tempfile::tempdir().unwrap();

        MailProcessor::new(&mut mailbox, &AcceptAll, errors.path())
            .process_all()
            .unwrap();

        assert_eq!(
            mailbox.archived_uids,
            vec![Uid(101), Uid(102), Uid(103)]
        );
    }

    #[test]
    fn unresolvable_uid_quarantines_instead_of_archiving() {
        let mut mailbox = MockMailbox::new(vec![MockMailbox::raw_mail(
            201,
            "gone@example.com",
            "orphan",
        )]);
        mailbox.annotate_uid_on_fetch = false;
        mailbox.resolve_always_misses = true;
        let errors = tempfile::tempdir().unwrap();

        let result = MailProcessor::new(&mut mailbox, &AcceptAll, errors.path()).process_all();

        assert!(matches!(
            result,
            Err(Error::Sweep(SweepError::Partial { report, .. }))
                if report.failed == 1 && report.archived == 0
        ));
        assert!(mailbox.archived_uids.is_empty());
        assert!(errors.path().join("email_1.eml").exists());
    }

    #[test]
    fn fetch_failure_counts_without_artifact() {
        let mut mailbox = MockMailbox::new(three_mails());
        mailbox.fail_fetch_for = vec![2];
        let errors = tempfile::tempdir().unwrap();

        let result = MailProcessor::new(&mut mailbox, &AcceptAll, errors.path()).process_all();

        assert!(matches!(
            result,
            Err(Error::Sweep(SweepError::Partial { report, .. }))
                if report == (RunReport { examined: 3, archived: 2, failed: 1 })
        ));
        // Nothing was fetched for message 2, so nothing was written.
        assert!(!errors.path().join("email_2.eml").exists());
    }

    #[test]
    fn session_error_on_enumeration_aborts_with_no_report() {
        struct BrokenList;
        impl Mailbox for BrokenList {
            fn login(&mut self) -> Result<(), MailboxError> {
                Ok(())
            }
            fn select_inbox(&mut self) -> Result<(), MailboxError> {
                Ok(())
            }
            fn list_pending(&mut self) -> Result<Vec<SeqId>, MailboxError> {
                Err(MailboxError::Protocol {
                    op: "search",
                    detail: "simulated".to_string(),
                })
            }
            fn fetch(&mut self, seq: SeqId) -> Result<MailMessage, MailboxError> {
                Err(MailboxError::NotFound(seq))
            }
            fn resolve_uid(&mut self, _: &str) -> Result<Option<Uid>, MailboxError> {
                Ok(None)
            }
            fn archive_by_uid(&mut self, _: Uid) -> Result<(), MailboxError> {
                panic!("must not mutate after a failed enumeration");
            }
            fn disconnect(&mut self) {}
        }

        let mut mailbox = BrokenList;
        let errors = tempfile::tempdir().unwrap();
        let result = MailProcessor::new(&mut mailbox, &AcceptAll, errors.path()).process_all();
        assert!(matches!(result, Err(Error::Mailbox(_))));
    }

    #[test]
    fn missing_stable_id_without_annotation_is_a_failure() {
        let mut mailbox = MockMailbox::new(vec![StoredMail {
            uid: 301,
            raw: b"Subject: no id here\r\n\r\nbody".to_vec(),
        }]);
        mailbox.annotate_uid_on_fetch = false;
        let errors = tempfile::tempdir().unwrap();

        let result = MailProcessor::new(&mut mailbox, &AcceptAll, errors.path()).process_all();
        assert!(matches!(
            result,
            Err(Error::Sweep(SweepError::Partial { report, .. })) if report.failed == 1
        ));
    }
}
