// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Editable grid cells. A cell only produces a [`CellOutcome`]; it never
//! sees whether the resulting write succeeds.

use crate::dietary::{DietarySelection, DietaryToken};
use crate::{FieldKind, FieldValue, ParticipantField, ParticipantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub participant_id: ParticipantId,
    pub field: ParticipantField,
}

impl CellRef {
    pub const fn new(participant_id: ParticipantId, field: ParticipantField) -> Self {
        Self {
            participant_id,
            field,
        }
    }
}

/// At most one cell per grid is in edit mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditFocus {
    active: Option<CellRef>,
}

impl EditFocus {
    /// Focuses `cell`, returning the cell that was displaced, if any.
    pub fn enter(&mut self, cell: CellRef) -> Option<CellRef> {
        self.active.replace(cell).filter(|previous| *previous != cell)
    }

    pub fn exit(&mut self) -> Option<CellRef> {
        self.active.take()
    }

    pub fn active(&self) -> Option<CellRef> {
        self.active
    }

    pub fn is_editing(&self, cell: CellRef) -> bool {
        self.active == Some(cell)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellOutcome {
    Commit(FieldValue),
    Unchanged,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCell {
    original: String,
    buffer: String,
}

impl TextCell {
    pub fn new(original: &str) -> Self {
        Self {
            original: original.to_owned(),
            buffer: original.to_owned(),
        }
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn insert(&mut self, ch: char) {
        self.buffer.push(ch);
    }

    pub fn backspace(&mut self) {
        self.buffer.pop();
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn commit(&self) -> CellOutcome {
        let trimmed = self.buffer.trim();
        if trimmed == self.original {
            CellOutcome::Unchanged
        } else {
            CellOutcome::Commit(FieldValue::Text(trimmed.to_owned()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceCell {
    options: Vec<FieldValue>,
    highlighted: usize,
}

impl ChoiceCell {
    pub fn new(field: ParticipantField, current: &FieldValue) -> Self {
        let options = field.choices();
        let highlighted = options
            .iter()
            .position(|option| option == current)
            .unwrap_or(0);
        Self {
            options,
            highlighted,
        }
    }

    pub fn options(&self) -> &[FieldValue] {
        &self.options
    }

    pub fn highlighted(&self) -> usize {
        self.highlighted
    }

    pub fn move_by(&mut self, delta: isize) {
        if self.options.is_empty() {
            return;
        }
        let last = self.options.len() - 1;
        self.highlighted = self.highlighted.saturating_add_signed(delta).min(last);
    }

    /// Always commits, even the current value.
    pub fn select(&self) -> CellOutcome {
        match self.options.get(self.highlighted) {
            Some(value) => CellOutcome::Commit(value.clone()),
            None => CellOutcome::Cancelled,
        }
    }
}

/// Parses a comma-delimited buffer into an ordered, de-duplicated tag list.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim) {
        if !tag.is_empty() && !tags.iter().any(|seen| seen == tag) {
            tags.push(tag.to_owned());
        }
    }
    tags
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagsCell {
    original: Vec<String>,
    buffer: String,
}

impl TagsCell {
    pub fn new(original: &[String]) -> Self {
        Self {
            original: original.to_vec(),
            buffer: original.join(", "),
        }
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn insert(&mut self, ch: char) {
        self.buffer.push(ch);
    }

    pub fn backspace(&mut self) {
        self.buffer.pop();
    }

    pub fn commit(&self) -> CellOutcome {
        let tags = parse_tags(&self.buffer);
        if tags == self.original {
            CellOutcome::Unchanged
        } else {
            CellOutcome::Commit(FieldValue::Tags(tags))
        }
    }
}

/// Token checklist plus the `other` free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DietaryCell {
    original: String,
    selection: DietarySelection,
    other_buffer: String,
    highlighted: usize,
}

impl DietaryCell {
    pub fn new(original: &str) -> Self {
        let selection = DietarySelection::parse(original);
        let other_buffer = selection.other_text().unwrap_or_default().to_owned();
        Self {
            original: original.trim().to_owned(),
            selection,
            other_buffer,
            highlighted: 0,
        }
    }

    pub fn selection(&self) -> &DietarySelection {
        &self.selection
    }

    pub fn other_buffer(&self) -> &str {
        &self.other_buffer
    }

    pub fn highlighted(&self) -> DietaryToken {
        DietaryToken::ALL[self.highlighted]
    }

    pub fn move_by(&mut self, delta: isize) {
        let last = DietaryToken::ALL.len() - 1;
        self.highlighted = self.highlighted.saturating_add_signed(delta).min(last);
    }

    pub fn toggle_highlighted(&mut self) {
        self.toggle(self.highlighted());
    }

    pub fn toggle(&mut self, token: DietaryToken) {
        self.selection.toggle(token);
        if token == DietaryToken::Other {
            if self.selection.contains(DietaryToken::Other) {
                self.selection.set_other_text(&self.other_buffer);
            } else {
                self.other_buffer.clear();
            }
        }
    }

    /// Typing free text selects `other`.
    pub fn insert_other(&mut self, ch: char) {
        self.other_buffer.push(ch);
        self.selection.set_other_text(&self.other_buffer);
    }

    pub fn backspace_other(&mut self) {
        self.other_buffer.pop();
        self.selection.set_other_text(&self.other_buffer);
    }

    pub fn commit(&self) -> CellOutcome {
        let formatted = self.selection.format();
        if formatted == self.original {
            CellOutcome::Unchanged
        } else {
            CellOutcome::Commit(FieldValue::Text(formatted))
        }
    }
}

/// The control for one field, chosen by its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCell {
    Text(TextCell),
    Choice(ChoiceCell),
    Tags(TagsCell),
    Dietary(DietaryCell),
}

impl EditCell {
    pub fn open(field: ParticipantField, current: &FieldValue) -> Self {
        match (field.kind(), current) {
            (FieldKind::Choice, value) => Self::Choice(ChoiceCell::new(field, value)),
            (FieldKind::Tags, FieldValue::Tags(tags)) => Self::Tags(TagsCell::new(tags)),
            (FieldKind::Dietary, FieldValue::Text(raw)) => Self::Dietary(DietaryCell::new(raw)),
            (_, value) => Self::Text(TextCell::new(&value.display())),
        }
    }

    /// Enter or blur.
    pub fn commit(&self) -> CellOutcome {
        match self {
            Self::Text(cell) => cell.commit(),
            Self::Choice(cell) => cell.select(),
            Self::Tags(cell) => cell.commit(),
            Self::Dietary(cell) => cell.commit(),
        }
    }

    /// Escape: revert and exit.
    pub fn cancel(&self) -> CellOutcome {
        CellOutcome::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CellOutcome, CellRef, ChoiceCell, DietaryCell, EditCell, EditFocus, TagsCell, TextCell,
        parse_tags,
    };
    use crate::dietary::DietaryToken;
    use crate::{FieldValue, ParticipantField, ParticipantId, PaymentStatus};

    #[test]
    fn focus_holds_one_cell() {
        let first = CellRef::new(ParticipantId::new(1), ParticipantField::Notes);
        let second = CellRef::new(ParticipantId::new(2), ParticipantField::Name);
        let mut focus = EditFocus::default();
        assert_eq!(focus.enter(first), None);
        assert_eq!(focus.enter(second), Some(first));
        assert!(!focus.is_editing(first));
        assert!(focus.is_editing(second));
        assert_eq!(focus.exit(), Some(second));
        assert_eq!(focus.active(), None);
    }

    #[test]
    fn text_commit_trims_and_skips_unchanged() {
        let mut cell = TextCell::new("Ana");
        cell.insert(' ');
        assert_eq!(cell.commit(), CellOutcome::Unchanged);

        cell.clear();
        for ch in "  Ana B ".chars() {
            cell.insert(ch);
        }
        assert_eq!(
            cell.commit(),
            CellOutcome::Commit(FieldValue::Text("Ana B".to_owned()))
        );
    }

    #[test]
    fn choice_select_commits_even_current_value() {
        let mut cell = ChoiceCell::new(
            ParticipantField::PaymentStatus,
            &FieldValue::Payment(PaymentStatus::Paid),
        );
        assert_eq!(
            cell.select(),
            CellOutcome::Commit(FieldValue::Payment(PaymentStatus::Paid))
        );
        cell.move_by(-10);
        assert_eq!(
            cell.select(),
            CellOutcome::Commit(FieldValue::Payment(PaymentStatus::Unpaid))
        );
        cell.move_by(10);
        assert_eq!(cell.highlighted(), cell.options().len() - 1);
    }

    #[test]
    fn tags_buffer_dedupes() {
        assert_eq!(parse_tags("staff, driver,,staff "), vec!["staff", "driver"]);
        let mut cell = TagsCell::new(&["staff".to_owned()]);
        assert_eq!(cell.commit(), CellOutcome::Unchanged);
        for ch in ", speaker".chars() {
            cell.insert(ch);
        }
        assert_eq!(
            cell.commit(),
            CellOutcome::Commit(FieldValue::Tags(vec![
                "staff".to_owned(),
                "speaker".to_owned()
            ]))
        );
    }

    #[test]
    fn dietary_cell_edits_tokens_and_other_text() {
        let mut cell = DietaryCell::new("vegan");
        assert_eq!(cell.commit(), CellOutcome::Unchanged);

        cell.toggle(DietaryToken::Halal);
        for ch in "no nuts".chars() {
            cell.insert_other(ch);
        }
        assert_eq!(
            cell.commit(),
            CellOutcome::Commit(FieldValue::Text("vegan, halal, other: no nuts".to_owned()))
        );

        cell.toggle(DietaryToken::Other);
        assert_eq!(cell.other_buffer(), "");
        assert_eq!(
            cell.commit(),
            CellOutcome::Commit(FieldValue::Text("vegan, halal".to_owned()))
        );
    }

    #[test]
    fn open_picks_control_by_field_kind() {
        assert!(matches!(
            EditCell::open(ParticipantField::Notes, &FieldValue::Text(String::new())),
            EditCell::Text(_)
        ));
        assert!(matches!(
            EditCell::open(ParticipantField::Tags, &FieldValue::Tags(Vec::new())),
            EditCell::Tags(_)
        ));
        assert!(matches!(
            EditCell::open(ParticipantField::Dietary, &FieldValue::Text(String::new())),
            EditCell::Dietary(_)
        ));
        let choice = EditCell::open(
            ParticipantField::PaymentStatus,
            &FieldValue::Payment(PaymentStatus::Unpaid),
        );
        assert!(matches!(choice, EditCell::Choice(_)));
        assert_eq!(choice.cancel(), CellOutcome::Cancelled);
    }
}
