// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Optimistic update dispatcher for the participant sheet.
//!
//! Edits are applied to the local [`SheetState`] first and handed back to the
//! caller as [`WriteRequest`]s to persist. The caller reports each outcome
//! through [`ParticipantSheet::complete`]; failures roll back exactly the
//! fields that write changed.
//!
//! Writes touching the same `(row, field)` are sequenced by ticket. Only the
//! newest in-flight write for a field may roll it back; an older write that
//! fails hands its pre-mutation value down to the next write in line, and a
//! write that succeeds retires every older write for the same field, so a
//! late failure can never clobber a newer value.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::bulk::{BulkReport, MergeMode};
use crate::errors::{CommitError, WriteFailure};
use crate::sheet::{DEFAULT_HISTORY_DEPTH, SheetState};
use crate::{FieldValue, Participant, ParticipantField, ParticipantId, ParticipantPatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WriteTicket(u64);

impl WriteTicket {
    pub const fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchId(u64);

impl BatchId {
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// One persistence call: only the changed fields of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub ticket: WriteTicket,
    pub batch: Option<BatchId>,
    pub patch: ParticipantPatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Result of resolving one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub ticket: WriteTicket,
    pub participant_id: ParticipantId,
    pub rolled_back: Vec<ParticipantField>,
    pub notice: Option<Notice>,
    pub report: Option<BulkReport>,
}

#[derive(Debug, Clone, PartialEq)]
struct PendingWrite {
    batch: Option<BatchId>,
    previous: ParticipantPatch,
    sent: ParticipantPatch,
}

#[derive(Debug, Clone, PartialEq)]
struct BatchProgress {
    field: ParticipantField,
    mode: MergeMode,
    outstanding: usize,
    succeeded: Vec<ParticipantId>,
    failed: Vec<(ParticipantId, WriteFailure)>,
    reverted: Vec<ParticipantId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantSheet {
    state: SheetState<Participant>,
    pending: BTreeMap<WriteTicket, PendingWrite>,
    in_flight: BTreeMap<(ParticipantId, ParticipantField), Vec<WriteTicket>>,
    batches: BTreeMap<BatchId, BatchProgress>,
    next_ticket: u64,
    next_batch: u64,
}

impl ParticipantSheet {
    pub fn new(rows: Vec<Participant>) -> Self {
        Self::with_depth(rows, DEFAULT_HISTORY_DEPTH)
    }

    pub fn with_depth(rows: Vec<Participant>, depth: usize) -> Self {
        Self {
            state: SheetState::with_depth(rows, depth),
            pending: BTreeMap::new(),
            in_flight: BTreeMap::new(),
            batches: BTreeMap::new(),
            next_ticket: 0,
            next_batch: 0,
        }
    }

    pub fn rows(&self) -> &[Participant] {
        self.state.data()
    }

    pub fn row(&self, id: ParticipantId) -> Option<&Participant> {
        self.rows().iter().find(|row| row.id == id)
    }

    pub fn history_len(&self) -> usize {
        self.state.history_len()
    }

    pub fn can_undo(&self) -> bool {
        self.state.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.state.can_redo()
    }

    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    pub fn is_saving(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn commit(
        &mut self,
        id: ParticipantId,
        field: ParticipantField,
        value: FieldValue,
    ) -> Result<Option<WriteRequest>, CommitError> {
        self.commit_patch(ParticipantPatch::new(id).with(field, value))
    }

    /// Applies a multi-field change to one row. Returns `None` when every
    /// field already holds the requested value.
    pub fn commit_patch(
        &mut self,
        patch: ParticipantPatch,
    ) -> Result<Option<WriteRequest>, CommitError> {
        let id = patch.participant_id;
        let index = self.position(id).ok_or(CommitError::UnknownRow(id))?;
        for (field, value) in &patch.changes {
            validate_value(*field, value)?;
        }

        let current = &self.rows()[index];
        let mut previous = ParticipantPatch::new(id);
        let mut sent = ParticipantPatch::new(id);
        for (field, value) in patch.changes {
            let old = current.value(field);
            if old != value {
                previous.changes.insert(field, old);
                sent.changes.insert(field, value);
            }
        }
        if sent.is_empty() {
            debug!(participant = %id, "commit elided; values unchanged");
            return Ok(None);
        }

        let mut rows = self.rows().to_vec();
        apply_patch(&mut rows[index], &sent)?;
        self.state.replace(rows);

        let request = self.issue(None, previous, sent);
        debug!(
            participant = %id,
            ticket = request.ticket.get(),
            fields = ?request.patch.fields().map(ParticipantField::as_str).collect::<Vec<_>>(),
            "optimistic update applied"
        );
        Ok(Some(request))
    }

    /// Resolves a write. Unknown tickets (already resolved) yield `None`.
    pub fn complete(
        &mut self,
        ticket: WriteTicket,
        result: Result<(), WriteFailure>,
    ) -> Option<Completion> {
        let pending = self.pending.remove(&ticket)?;
        let id = pending.sent.participant_id;

        let mut owned = Vec::new();
        for field in pending.sent.fields() {
            let key = (id, field);
            let Some(tickets) = self.in_flight.get_mut(&key) else {
                continue;
            };
            let Some(position) = tickets.iter().position(|entry| *entry == ticket) else {
                continue;
            };
            let is_newest = position + 1 == tickets.len();
            if result.is_ok() {
                // Older writes still in flight are superseded by this one and
                // may no longer roll the field back.
                tickets.retain(|entry| *entry > ticket);
            } else {
                if !is_newest {
                    // This value never landed; the next write must fall back past it.
                    let successor = tickets[position + 1];
                    if let (Some(next), Some(old)) = (
                        self.pending.get_mut(&successor),
                        pending.previous.changes.get(&field),
                    ) {
                        next.previous.changes.insert(field, old.clone());
                    }
                }
                tickets.remove(position);
            }
            if tickets.is_empty() {
                self.in_flight.remove(&key);
            }
            if is_newest {
                owned.push(field);
            }
        }

        let mut completion = Completion {
            ticket,
            participant_id: id,
            rolled_back: Vec::new(),
            notice: None,
            report: None,
        };

        match result {
            Ok(()) => {
                debug!(participant = %id, ticket = ticket.get(), "write persisted");
                if let Some(batch) = pending.batch {
                    completion.report = self.record_batch_outcome(batch, id, None, false);
                }
            }
            Err(failure) => {
                let mut rollback = ParticipantPatch::new(id);
                for field in owned {
                    if let Some(old) = pending.previous.changes.get(&field) {
                        rollback.changes.insert(field, old.clone());
                    }
                }
                completion.rolled_back = self.apply_rollback(&rollback);
                warn!(
                    participant = %id,
                    ticket = ticket.get(),
                    error = %failure,
                    rolled_back = completion.rolled_back.len(),
                    "write failed; rolled back"
                );
                let reverted = !completion.rolled_back.is_empty();
                match pending.batch {
                    Some(batch) => {
                        completion.report =
                            self.record_batch_outcome(batch, id, Some(failure), reverted);
                    }
                    None if reverted => {
                        completion.notice = Some(Notice::error(failure.user_message()));
                    }
                    None => {
                        completion.notice =
                            Some(Notice::error(format!("{failure}; newer value kept")));
                    }
                }
            }
        }

        if let Some(report) = &completion.report {
            completion.notice = Some(report.notice());
        }
        Some(completion)
    }

    /// Steps back one history entry and returns the writes that persist it.
    pub fn undo(&mut self) -> Option<Vec<WriteRequest>> {
        let before = self.rows().to_vec();
        if !self.state.undo() {
            return None;
        }
        Some(self.persist_transition(&before))
    }

    pub fn redo(&mut self) -> Option<Vec<WriteRequest>> {
        let before = self.rows().to_vec();
        if !self.state.redo() {
            return None;
        }
        Some(self.persist_transition(&before))
    }

    /// Takes an authoritative collection from the change feed. Fields with a
    /// write still in flight keep their optimistic value.
    pub fn apply_refresh(&mut self, mut rows: Vec<Participant>) -> bool {
        for ((id, field), tickets) in &self.in_flight {
            let Some(newest) = tickets.last() else {
                continue;
            };
            let Some(value) = self
                .pending
                .get(newest)
                .and_then(|pending| pending.sent.changes.get(field))
            else {
                continue;
            };
            if let Some(row) = rows.iter_mut().find(|row| row.id == *id)
                && let Err(error) = row.apply(*field, value.clone())
            {
                warn!(participant = %id, %error, "skip in-flight overlay");
            }
        }
        let changed = self.state.replace_external(rows);
        if changed {
            info!(rows = self.rows().len(), "sheet refreshed from store");
        }
        changed
    }

    pub(crate) fn position(&self, id: ParticipantId) -> Option<usize> {
        self.rows().iter().position(|row| row.id == id)
    }

    /// Swaps in a locally computed collection as one undoable step.
    pub(crate) fn replace_rows(&mut self, rows: Vec<Participant>) -> bool {
        self.state.replace(rows)
    }

    pub(crate) fn open_batch(
        &mut self,
        field: ParticipantField,
        mode: MergeMode,
        outstanding: usize,
    ) -> BatchId {
        self.next_batch += 1;
        let batch = BatchId(self.next_batch);
        self.batches.insert(
            batch,
            BatchProgress {
                field,
                mode,
                outstanding,
                succeeded: Vec::new(),
                failed: Vec::new(),
                reverted: Vec::new(),
            },
        );
        batch
    }

    pub(crate) fn issue(
        &mut self,
        batch: Option<BatchId>,
        previous: ParticipantPatch,
        sent: ParticipantPatch,
    ) -> WriteRequest {
        self.next_ticket += 1;
        let ticket = WriteTicket(self.next_ticket);
        for field in sent.fields() {
            self.in_flight
                .entry((sent.participant_id, field))
                .or_default()
                .push(ticket);
        }
        self.pending.insert(
            ticket,
            PendingWrite {
                batch,
                previous,
                sent: sent.clone(),
            },
        );
        WriteRequest {
            ticket,
            batch,
            patch: sent,
        }
    }

    fn persist_transition(&mut self, before: &[Participant]) -> Vec<WriteRequest> {
        let after = self.rows().to_vec();
        let mut writes = Vec::new();
        for row in &after {
            let Some(old) = before.iter().find(|candidate| candidate.id == row.id) else {
                continue;
            };
            let sent = ParticipantPatch::diff(old, row);
            if sent.is_empty() {
                continue;
            }
            let mut previous = ParticipantPatch::new(row.id);
            for field in sent.fields() {
                previous.changes.insert(field, old.value(field));
            }
            writes.push(self.issue(None, previous, sent));
        }
        writes
    }

    fn apply_rollback(&mut self, rollback: &ParticipantPatch) -> Vec<ParticipantField> {
        let Some(index) = self.position(rollback.participant_id) else {
            return Vec::new();
        };
        let mut rows = self.rows().to_vec();
        let mut restored = Vec::new();
        for (field, value) in &rollback.changes {
            if rows[index].value(*field) == *value {
                continue;
            }
            if rows[index].apply(*field, value.clone()).is_ok() {
                restored.push(*field);
            }
        }
        if !restored.is_empty() {
            self.state.replace(rows);
        }
        restored
    }

    fn record_batch_outcome(
        &mut self,
        batch: BatchId,
        id: ParticipantId,
        failure: Option<WriteFailure>,
        reverted: bool,
    ) -> Option<BulkReport> {
        let progress = self.batches.get_mut(&batch)?;
        match failure {
            Some(failure) => progress.failed.push((id, failure)),
            None => progress.succeeded.push(id),
        }
        if reverted {
            progress.reverted.push(id);
        }
        progress.outstanding = progress.outstanding.saturating_sub(1);
        if progress.outstanding > 0 {
            return None;
        }

        let progress = self.batches.remove(&batch)?;
        let report = BulkReport {
            batch,
            field: progress.field,
            mode: progress.mode,
            succeeded: progress.succeeded,
            failed: progress.failed,
            reverted: progress.reverted,
        };
        info!(
            batch = batch.get(),
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "bulk write finished"
        );
        Some(report)
    }
}

pub(crate) fn validate_value(field: ParticipantField, value: &FieldValue) -> Result<(), CommitError> {
    if !field.accepts(value) {
        return Err(CommitError::WrongKind(field));
    }
    if field == ParticipantField::Name
        && let FieldValue::Text(name) = value
        && name.trim().is_empty()
    {
        return Err(CommitError::NameRequired);
    }
    Ok(())
}

pub(crate) fn apply_patch(row: &mut Participant, patch: &ParticipantPatch) -> Result<(), CommitError> {
    for (field, value) in &patch.changes {
        row.apply(*field, value.clone())
            .map_err(|_| CommitError::WrongKind(*field))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{NoticeLevel, ParticipantSheet};
    use crate::errors::{CommitError, WriteFailure};
    use crate::testing::sample_rows;
    use crate::{FieldValue, ParticipantField, ParticipantId, ParticipantPatch, PaymentStatus};

    fn text(value: &str) -> FieldValue {
        FieldValue::Text(value.to_owned())
    }

    fn notes_of(sheet: &ParticipantSheet, id: i64) -> String {
        sheet
            .row(ParticipantId::new(id))
            .map(|row| row.notes.clone())
            .unwrap_or_default()
    }

    fn unavailable() -> WriteFailure {
        WriteFailure::Unavailable("connection reset".to_owned())
    }

    #[test]
    fn commit_applies_optimistically_and_sends_only_changed_field() {
        let mut sheet = ParticipantSheet::new(sample_rows(&["Ana", "Ben"]));
        let request = sheet
            .commit(ParticipantId::new(2), ParticipantField::Notes, text("vip"))
            .expect("valid commit")
            .expect("write issued");

        assert_eq!(notes_of(&sheet, 2), "vip");
        assert_eq!(sheet.history_len(), 1);
        assert_eq!(sheet.pending_writes(), 1);
        assert_eq!(
            request.patch,
            ParticipantPatch::new(ParticipantId::new(2))
                .with(ParticipantField::Notes, text("vip"))
        );
        assert_eq!(request.batch, None);
    }

    #[test]
    fn equal_value_produces_no_history_and_no_write() {
        let mut sheet = ParticipantSheet::new(sample_rows(&["Ana"]));
        let outcome = sheet
            .commit(
                ParticipantId::new(1),
                ParticipantField::PaymentStatus,
                FieldValue::Payment(PaymentStatus::Unpaid),
            )
            .expect("valid commit");
        assert!(outcome.is_none());
        assert_eq!(sheet.history_len(), 0);
        assert!(!sheet.is_saving());
    }

    #[test]
    fn validation_errors_leave_state_untouched() {
        let mut sheet = ParticipantSheet::new(sample_rows(&["Ana"]));
        let id = ParticipantId::new(1);

        assert_eq!(
            sheet.commit(id, ParticipantField::Name, text("   ")),
            Err(CommitError::NameRequired)
        );
        assert_eq!(
            sheet.commit(id, ParticipantField::Tags, text("x")),
            Err(CommitError::WrongKind(ParticipantField::Tags))
        );
        assert_eq!(
            sheet.commit(ParticipantId::new(42), ParticipantField::Notes, text("x")),
            Err(CommitError::UnknownRow(ParticipantId::new(42)))
        );
        assert_eq!(sheet.history_len(), 0);
        assert_eq!(sheet.pending_writes(), 0);
    }

    #[test]
    fn success_keeps_optimistic_state() {
        let mut sheet = ParticipantSheet::new(sample_rows(&["Ana"]));
        let request = sheet
            .commit(ParticipantId::new(1), ParticipantField::Notes, text("ok"))
            .expect("valid")
            .expect("issued");
        let completion = sheet.complete(request.ticket, Ok(())).expect("known ticket");

        assert!(completion.rolled_back.is_empty());
        assert!(completion.notice.is_none());
        assert_eq!(notes_of(&sheet, 1), "ok");
        assert_eq!(sheet.history_len(), 1);
        assert!(sheet.complete(request.ticket, Ok(())).is_none());
    }

    #[test]
    fn failure_restores_only_the_failed_field() {
        let mut rows = sample_rows(&["Ana"]);
        rows[0].notes = "1".to_owned();
        rows[0].phone = "2".to_owned();
        let mut sheet = ParticipantSheet::new(rows);
        let id = ParticipantId::new(1);

        let failing = sheet
            .commit(id, ParticipantField::Notes, text("5"))
            .expect("valid")
            .expect("issued");
        let other = sheet
            .commit(id, ParticipantField::Phone, text("3"))
            .expect("valid")
            .expect("issued");

        let completion = sheet
            .complete(failing.ticket, Err(unavailable()))
            .expect("known ticket");
        assert_eq!(completion.rolled_back, vec![ParticipantField::Notes]);
        let notice = completion.notice.expect("failure notice");
        assert_eq!(notice.level, NoticeLevel::Error);

        let row = sheet.row(id).expect("row");
        assert_eq!(row.notes, "1");
        assert_eq!(row.phone, "3");
        assert_eq!(sheet.history_len(), 3);

        sheet.complete(other.ticket, Ok(()));
        assert!(!sheet.is_saving());
    }

    #[test]
    fn stale_failure_does_not_clobber_newer_edit() {
        let mut sheet = ParticipantSheet::new(sample_rows(&["Ana"]));
        let id = ParticipantId::new(1);
        let first = sheet
            .commit(id, ParticipantField::Notes, text("first"))
            .expect("valid")
            .expect("issued");
        let second = sheet
            .commit(id, ParticipantField::Notes, text("second"))
            .expect("valid")
            .expect("issued");

        let completion = sheet
            .complete(first.ticket, Err(unavailable()))
            .expect("known");
        assert!(completion.rolled_back.is_empty());
        assert_eq!(notes_of(&sheet, 1), "second");

        // The first value never landed, so the second falls back to the original.
        let completion = sheet
            .complete(second.ticket, Err(unavailable()))
            .expect("known");
        assert_eq!(completion.rolled_back, vec![ParticipantField::Notes]);
        assert_eq!(notes_of(&sheet, 1), "");
    }

    #[test]
    fn late_failure_after_newer_success_keeps_saved_value() {
        let mut sheet = ParticipantSheet::new(sample_rows(&["Ana"]));
        let id = ParticipantId::new(1);
        let first = sheet
            .commit(id, ParticipantField::Notes, text("first"))
            .expect("valid")
            .expect("issued");
        let second = sheet
            .commit(id, ParticipantField::Notes, text("second"))
            .expect("valid")
            .expect("issued");

        sheet.complete(second.ticket, Ok(())).expect("known");
        let completion = sheet
            .complete(first.ticket, Err(unavailable()))
            .expect("known");

        assert!(completion.rolled_back.is_empty());
        assert_eq!(notes_of(&sheet, 1), "second");
        let notice = completion.notice.expect("failure notice");
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.contains("newer value kept"));
        assert!(!sheet.is_saving());
    }

    #[test]
    fn success_in_the_middle_bounds_later_rollbacks() {
        let mut sheet = ParticipantSheet::new(sample_rows(&["Ana"]));
        let id = ParticipantId::new(1);
        let mut issue = |value: &str| {
            sheet
                .commit(id, ParticipantField::Notes, text(value))
                .expect("valid")
                .expect("issued")
        };
        let first = issue("first");
        let second = issue("second");
        let third = issue("third");

        sheet.complete(second.ticket, Ok(()));
        let stale = sheet
            .complete(first.ticket, Err(unavailable()))
            .expect("known");
        assert!(stale.rolled_back.is_empty());
        assert_eq!(notes_of(&sheet, 1), "third");

        // The saved second value is the floor for the newest write.
        let newest = sheet
            .complete(third.ticket, Err(unavailable()))
            .expect("known");
        assert_eq!(newest.rolled_back, vec![ParticipantField::Notes]);
        assert_eq!(notes_of(&sheet, 1), "second");
    }

    #[test]
    fn newest_failure_falls_back_to_value_of_successful_predecessor() {
        let mut sheet = ParticipantSheet::new(sample_rows(&["Ana"]));
        let id = ParticipantId::new(1);
        let first = sheet
            .commit(id, ParticipantField::Notes, text("first"))
            .expect("valid")
            .expect("issued");
        let second = sheet
            .commit(id, ParticipantField::Notes, text("second"))
            .expect("valid")
            .expect("issued");

        sheet.complete(first.ticket, Ok(()));
        sheet.complete(second.ticket, Err(unavailable()));
        assert_eq!(notes_of(&sheet, 1), "first");
    }

    #[test]
    fn duplicate_failure_gets_distinct_notice() {
        let mut sheet = ParticipantSheet::new(sample_rows(&["Ana", "Ben"]));
        let request = sheet
            .commit(
                ParticipantId::new(2),
                ParticipantField::Email,
                text("ana@example.com"),
            )
            .expect("valid")
            .expect("issued");
        let completion = sheet
            .complete(
                request.ticket,
                Err(WriteFailure::Duplicate("ana@example.com".to_owned())),
            )
            .expect("known");
        let notice = completion.notice.expect("notice");
        assert!(notice.message.contains("already registered"));
        assert_eq!(
            sheet.row(ParticipantId::new(2)).map(|row| row.email.as_str()),
            Some("ben@example.com")
        );
    }

    #[test]
    fn undo_and_redo_issue_persisting_writes() {
        let mut sheet = ParticipantSheet::new(sample_rows(&["Ana"]));
        let id = ParticipantId::new(1);
        let first = sheet
            .commit(id, ParticipantField::Notes, text("hello"))
            .expect("valid")
            .expect("issued");
        let second = sheet
            .commit(id, ParticipantField::Notes, text("hello world"))
            .expect("valid")
            .expect("issued");
        sheet.complete(first.ticket, Ok(()));
        sheet.complete(second.ticket, Ok(()));

        let writes = sheet.undo().expect("undo available");
        assert_eq!(notes_of(&sheet, 1), "hello");
        assert_eq!(writes.len(), 1);
        assert_eq!(
            writes[0].patch.changes.get(&ParticipantField::Notes),
            Some(&text("hello"))
        );

        sheet.undo().expect("undo available");
        assert_eq!(notes_of(&sheet, 1), "");
        sheet.redo().expect("redo available");
        assert_eq!(notes_of(&sheet, 1), "hello");
        assert!(sheet.redo().is_some());
        assert!(sheet.redo().is_none());
    }

    #[test]
    fn refresh_keeps_in_flight_values_and_clears_history() {
        let rows = sample_rows(&["Ana", "Ben"]);
        let mut sheet = ParticipantSheet::new(rows.clone());
        let request = sheet
            .commit(ParticipantId::new(1), ParticipantField::Notes, text("draft"))
            .expect("valid")
            .expect("issued");

        let mut server = rows;
        server[1].phone = "555-0100".to_owned();
        assert!(sheet.apply_refresh(server));

        assert_eq!(notes_of(&sheet, 1), "draft");
        assert_eq!(
            sheet.row(ParticipantId::new(2)).map(|row| row.phone.as_str()),
            Some("555-0100")
        );
        assert!(!sheet.can_undo());

        sheet.complete(request.ticket, Err(unavailable()));
        assert_eq!(notes_of(&sheet, 1), "");
    }

    #[test]
    fn rollback_for_row_removed_by_refresh_is_skipped() {
        let mut sheet = ParticipantSheet::new(sample_rows(&["Ana", "Ben"]));
        let request = sheet
            .commit(ParticipantId::new(2), ParticipantField::Notes, text("x"))
            .expect("valid")
            .expect("issued");
        sheet.apply_refresh(sample_rows(&["Ana"]));

        let completion = sheet
            .complete(request.ticket, Err(unavailable()))
            .expect("known");
        assert!(completion.rolled_back.is_empty());
        assert_eq!(sheet.rows().len(), 1);
    }

    #[test]
    fn multi_field_patch_is_one_history_entry() {
        let mut sheet = ParticipantSheet::new(sample_rows(&["Ana"]));
        let id = ParticipantId::new(1);
        let request = sheet
            .commit_patch(
                ParticipantPatch::new(id)
                    .with(ParticipantField::Phone, text("555"))
                    .with(ParticipantField::Name, text("Ana")),
            )
            .expect("valid")
            .expect("issued");
        assert_eq!(sheet.history_len(), 1);
        assert_eq!(
            request.patch.fields().collect::<Vec<_>>(),
            vec![ParticipantField::Phone]
        );
    }
}
