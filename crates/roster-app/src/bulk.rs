// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dietary::DietarySelection;
use crate::dispatch::{BatchId, Notice, ParticipantSheet, WriteRequest, apply_patch, validate_value};
use crate::errors::{CommitError, WriteFailure};
use crate::{FieldValue, ParticipantField, ParticipantId, ParticipantPatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeMode {
    Set,
    Append,
    Prepend,
}

impl MergeMode {
    pub const ALL: [Self; 3] = [Self::Set, Self::Append, Self::Prepend];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Append => "append",
            Self::Prepend => "prepend",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::Set => Self::Append,
            Self::Append => Self::Prepend,
            Self::Prepend => Self::Set,
        }
    }
}

/// Combines a row's existing value with the bulk input.
pub fn merge_value(
    field: ParticipantField,
    mode: MergeMode,
    current: &FieldValue,
    incoming: &FieldValue,
) -> Result<FieldValue, CommitError> {
    validate_value(field, incoming)?;
    if mode == MergeMode::Set {
        return Ok(incoming.clone());
    }
    if !field.accumulates() {
        return Err(CommitError::MergeUnsupported { field, mode });
    }

    match (field, current, incoming) {
        (ParticipantField::Tags, FieldValue::Tags(existing), FieldValue::Tags(added)) => {
            let (first, second) = ordered(mode, existing, added);
            let mut merged: Vec<String> = Vec::with_capacity(first.len() + second.len());
            for tag in first.iter().chain(second) {
                let tag = tag.trim();
                if !tag.is_empty() && !merged.iter().any(|seen| seen == tag) {
                    merged.push(tag.to_owned());
                }
            }
            Ok(FieldValue::Tags(merged))
        }
        (ParticipantField::Dietary, FieldValue::Text(existing), FieldValue::Text(added)) => {
            let existing = DietarySelection::parse(existing);
            let added = DietarySelection::parse(added);
            let (first, second) = ordered(mode, &existing, &added);
            Ok(FieldValue::Text(first.union(second).format()))
        }
        (ParticipantField::Notes, FieldValue::Text(existing), FieldValue::Text(added)) => {
            let (first, second) = ordered(mode, existing, added);
            Ok(FieldValue::Text(join_text(first, second)))
        }
        _ => Err(CommitError::WrongKind(field)),
    }
}

fn ordered<'a, T: ?Sized>(mode: MergeMode, existing: &'a T, added: &'a T) -> (&'a T, &'a T) {
    match mode {
        MergeMode::Prepend => (added, existing),
        MergeMode::Set | MergeMode::Append => (existing, added),
    }
}

fn join_text(first: &str, second: &str) -> String {
    let first = first.trim();
    let second = second.trim();
    match (first.is_empty(), second.is_empty()) {
        (true, _) => second.to_owned(),
        (_, true) => first.to_owned(),
        _ => format!("{first} {second}"),
    }
}

/// Writes issued for one bulk edit. `batch` is `None` when nothing changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkDispatch {
    pub batch: Option<BatchId>,
    pub writes: Vec<WriteRequest>,
}

/// Outcome of every write in a batch, available once the last one resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkReport {
    pub batch: BatchId,
    pub field: ParticipantField,
    pub mode: MergeMode,
    pub succeeded: Vec<ParticipantId>,
    pub failed: Vec<(ParticipantId, WriteFailure)>,
    /// Failed rows whose local value was actually rolled back. A failed row
    /// whose field was taken over by a newer write keeps that value.
    pub reverted: Vec<ParticipantId>,
}

impl BulkReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        let total = self.succeeded.len() + self.failed.len();
        if self.is_clean() {
            return format!(
                "{} {} on {total} row{}",
                self.mode.label(),
                self.field.label(),
                plural(total)
            );
        }
        let duplicates = self
            .failed
            .iter()
            .filter(|(_, failure)| matches!(failure, WriteFailure::Duplicate(_)))
            .count();
        let failed = self.failed.len();
        let reverted = self.reverted.len();
        let mut message = format!("{failed} of {total} rows failed to save");
        if reverted == failed {
            message.push_str(" and were reverted");
        } else {
            message.push_str(&format!(", {reverted} reverted"));
        }
        if duplicates > 0 {
            message.push_str(&format!(" ({duplicates} already registered)"));
        }
        message
    }

    pub(crate) fn notice(&self) -> Notice {
        if self.is_clean() {
            Notice::info(self.summary())
        } else {
            Notice::error(self.summary())
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

impl ParticipantSheet {
    /// Applies one field change across `ids` as a single history entry and
    /// returns one write per row whose value actually changed.
    pub fn apply_bulk(
        &mut self,
        ids: &[ParticipantId],
        field: ParticipantField,
        mode: MergeMode,
        value: FieldValue,
    ) -> Result<BulkDispatch, CommitError> {
        if ids.is_empty() {
            return Err(CommitError::EmptySelection);
        }
        validate_value(field, &value)?;
        if mode != MergeMode::Set && !field.accumulates() {
            return Err(CommitError::MergeUnsupported { field, mode });
        }

        let mut rows = self.rows().to_vec();
        let mut changed = Vec::new();
        for id in ids {
            let index = self.position(*id).ok_or(CommitError::UnknownRow(*id))?;
            let current = rows[index].value(field);
            let next = merge_value(field, mode, &current, &value)?;
            if next == current {
                continue;
            }
            let sent = ParticipantPatch::new(*id).with(field, next);
            apply_patch(&mut rows[index], &sent)?;
            let previous = ParticipantPatch::new(*id).with(field, current);
            changed.push((previous, sent));
        }

        if changed.is_empty() {
            debug!(field = field.as_str(), "bulk edit changed nothing");
            return Ok(BulkDispatch {
                batch: None,
                writes: Vec::new(),
            });
        }

        self.replace_rows(rows);
        let batch = self.open_batch(field, mode, changed.len());
        let writes: Vec<WriteRequest> = changed
            .into_iter()
            .map(|(previous, sent)| self.issue(Some(batch), previous, sent))
            .collect();
        debug!(
            batch = batch.get(),
            field = field.as_str(),
            mode = mode.label(),
            rows = writes.len(),
            "bulk edit applied"
        );
        Ok(BulkDispatch {
            batch: Some(batch),
            writes,
        })
    }
}
