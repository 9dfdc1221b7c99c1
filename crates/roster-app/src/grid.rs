// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::bulk::{BulkDispatch, MergeMode};
use crate::dispatch::{Completion, ParticipantSheet, WriteRequest, WriteTicket};
use crate::edit_cell::{CellOutcome, CellRef, EditCell, EditFocus};
use crate::errors::{CommitError, WriteFailure};
use crate::selection::SelectionManager;
use crate::{
    FieldValue, Participant, ParticipantField, ParticipantId, RegistrationStatus, RetreatId,
    SortDirection,
};

/// Filter and sort settings that define the visible order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GridView {
    pub filter: String,
    pub sort: Option<(ParticipantField, SortDirection)>,
    pub hide_cancelled: bool,
}

impl GridView {
    pub fn matches(&self, participant: &Participant) -> bool {
        if self.hide_cancelled
            && participant.registration_status == RegistrationStatus::Cancelled
        {
            return false;
        }
        let needle = self.filter.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        [&participant.name, &participant.email, &participant.notes]
            .into_iter()
            .any(|text| text.to_lowercase().contains(&needle))
            || participant
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Rank(usize),
    Text(String),
}

fn sort_key(participant: &Participant, field: ParticipantField) -> SortKey {
    let value = participant.value(field);
    match value {
        FieldValue::Text(text) => SortKey::Text(text.to_lowercase()),
        FieldValue::Tags(tags) => SortKey::Text(tags.join(",").to_lowercase()),
        choice => SortKey::Rank(
            field
                .choices()
                .iter()
                .position(|option| *option == choice)
                .unwrap_or(usize::MAX),
        ),
    }
}

/// The participant grid for one retreat.
#[derive(Debug, Clone)]
pub struct ParticipantGrid {
    retreat_id: RetreatId,
    sheet: ParticipantSheet,
    selection: SelectionManager,
    focus: EditFocus,
    editor: Option<EditCell>,
    view: GridView,
    visible: Vec<ParticipantId>,
    cursor_row: usize,
    cursor_col: usize,
}

impl ParticipantGrid {
    pub const COLUMNS: [ParticipantField; 12] = ParticipantField::ALL;

    pub fn new(retreat_id: RetreatId, rows: Vec<Participant>, history_depth: usize) -> Self {
        let mut grid = Self {
            retreat_id,
            sheet: ParticipantSheet::with_depth(rows, history_depth),
            selection: SelectionManager::new(),
            focus: EditFocus::default(),
            editor: None,
            view: GridView::default(),
            visible: Vec::new(),
            cursor_row: 0,
            cursor_col: 0,
        };
        grid.recompute(None);
        grid
    }

    pub fn retreat_id(&self) -> RetreatId {
        self.retreat_id
    }

    pub fn sheet(&self) -> &ParticipantSheet {
        &self.sheet
    }

    pub fn selection(&self) -> &SelectionManager {
        &self.selection
    }

    pub fn focus(&self) -> EditFocus {
        self.focus
    }

    pub fn editor(&self) -> Option<&EditCell> {
        self.editor.as_ref()
    }

    pub fn editor_mut(&mut self) -> Option<&mut EditCell> {
        self.editor.as_mut()
    }

    pub fn view(&self) -> &GridView {
        &self.view
    }

    pub fn visible_ids(&self) -> &[ParticipantId] {
        &self.visible
    }

    pub fn visible_rows(&self) -> Vec<&Participant> {
        self.visible
            .iter()
            .filter_map(|id| self.sheet.row(*id))
            .collect()
    }

    pub fn cursor_position(&self) -> (usize, usize) {
        (self.cursor_row, self.cursor_col)
    }

    pub fn cursor(&self) -> Option<CellRef> {
        let id = self.visible.get(self.cursor_row)?;
        Some(CellRef::new(*id, Self::COLUMNS[self.cursor_col]))
    }

    pub fn move_cursor(&mut self, rows: isize, cols: isize) {
        if !self.visible.is_empty() {
            self.cursor_row = self
                .cursor_row
                .saturating_add_signed(rows)
                .min(self.visible.len() - 1);
        }
        self.cursor_col = self
            .cursor_col
            .saturating_add_signed(cols)
            .min(Self::COLUMNS.len() - 1);
    }

    pub fn set_filter(&mut self, filter: &str) {
        self.view.filter = filter.to_owned();
        self.recompute(self.cursor_id());
    }

    /// Sorting the same column again flips the direction; a third press clears.
    pub fn cycle_sort(&mut self, field: ParticipantField) {
        self.view.sort = match self.view.sort {
            Some((current, SortDirection::Asc)) if current == field => {
                Some((field, SortDirection::Desc))
            }
            Some((current, SortDirection::Desc)) if current == field => None,
            _ => Some((field, SortDirection::Asc)),
        };
        self.recompute(self.cursor_id());
    }

    pub fn toggle_hide_cancelled(&mut self) -> bool {
        self.view.hide_cancelled = !self.view.hide_cancelled;
        self.recompute(self.cursor_id());
        self.view.hide_cancelled
    }

    pub fn set_hide_cancelled(&mut self, hide: bool) {
        if self.view.hide_cancelled != hide {
            self.toggle_hide_cancelled();
        }
    }

    /// Opens the editor on the cursor cell.
    pub fn begin_edit(&mut self) -> bool {
        let Some(cell) = self.cursor() else {
            return false;
        };
        let Some(row) = self.sheet.row(cell.participant_id) else {
            return false;
        };
        self.editor = Some(EditCell::open(cell.field, &row.value(cell.field)));
        self.focus.enter(cell);
        true
    }

    /// Commits the open editor, if any, through the dispatcher.
    pub fn commit_edit(&mut self) -> Result<Option<WriteRequest>, CommitError> {
        let outcome = match &self.editor {
            Some(editor) => editor.commit(),
            None => return Ok(None),
        };
        self.editor = None;
        let Some(cell) = self.focus.exit() else {
            return Ok(None);
        };
        match outcome {
            CellOutcome::Commit(value) => {
                let request = self.sheet.commit(cell.participant_id, cell.field, value);
                self.recompute(self.cursor_id());
                request
            }
            CellOutcome::Unchanged | CellOutcome::Cancelled => Ok(None),
        }
    }

    pub fn cancel_edit(&mut self) {
        self.editor = None;
        self.focus.exit();
    }

    pub fn commit_value(
        &mut self,
        id: ParticipantId,
        field: ParticipantField,
        value: FieldValue,
    ) -> Result<Option<WriteRequest>, CommitError> {
        let request = self.sheet.commit(id, field, value);
        self.recompute(self.cursor_id());
        request
    }

    pub fn toggle_selection(&mut self) {
        if let Some(id) = self.cursor_id() {
            self.selection.toggle(id);
        }
    }

    pub fn range_selection(&mut self) {
        if let Some(id) = self.cursor_id() {
            self.selection.range(id, &self.visible);
        }
    }

    pub fn select_all_visible(&mut self) {
        self.selection.select_all_visible(&self.visible);
    }

    pub fn clear_visible_selection(&mut self) {
        self.selection.clear_visible(&self.visible);
    }

    /// Selected ids in data order, including rows hidden by the filter.
    pub fn selected_ids(&self) -> Vec<ParticipantId> {
        self.sheet
            .rows()
            .iter()
            .map(|row| row.id)
            .filter(|id| self.selection.is_selected(*id))
            .collect()
    }

    pub fn apply_bulk(
        &mut self,
        field: ParticipantField,
        mode: MergeMode,
        value: FieldValue,
    ) -> Result<BulkDispatch, CommitError> {
        let dispatch = self
            .sheet
            .apply_bulk(&self.selected_ids(), field, mode, value)?;
        if dispatch.batch.is_none() {
            self.selection.clear();
        }
        self.recompute(self.cursor_id());
        Ok(dispatch)
    }

    pub fn complete(
        &mut self,
        ticket: WriteTicket,
        result: Result<(), WriteFailure>,
    ) -> Option<Completion> {
        let completion = self.sheet.complete(ticket, result)?;
        if completion.report.is_some() {
            self.selection.clear();
        }
        if !completion.rolled_back.is_empty() {
            self.recompute(self.cursor_id());
        }
        Some(completion)
    }

    pub fn undo(&mut self) -> Option<Vec<WriteRequest>> {
        let writes = self.sheet.undo()?;
        self.recompute(self.cursor_id());
        Some(writes)
    }

    pub fn redo(&mut self) -> Option<Vec<WriteRequest>> {
        let writes = self.sheet.redo()?;
        self.recompute(self.cursor_id());
        Some(writes)
    }

    pub fn apply_refresh(&mut self, rows: Vec<Participant>) -> bool {
        let cursor = self.cursor_id();
        let changed = self.sheet.apply_refresh(rows);
        let existing: Vec<ParticipantId> = self.sheet.rows().iter().map(|row| row.id).collect();
        self.selection.prune(&existing);
        if let Some(cell) = self.focus.active()
            && !existing.contains(&cell.participant_id)
        {
            self.cancel_edit();
        }
        self.recompute(cursor);
        changed
    }

    fn cursor_id(&self) -> Option<ParticipantId> {
        self.visible.get(self.cursor_row).copied()
    }

    fn recompute(&mut self, keep: Option<ParticipantId>) {
        let mut rows: Vec<&Participant> = self
            .sheet
            .rows()
            .iter()
            .filter(|row| self.view.matches(row))
            .collect();
        if let Some((field, direction)) = self.view.sort {
            rows.sort_by(|a, b| {
                let ordering = sort_key(a, field)
                    .cmp(&sort_key(b, field))
                    .then_with(|| a.id.cmp(&b.id));
                match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }
        self.visible = rows.into_iter().map(|row| row.id).collect();

        if let Some(index) = keep.and_then(|id| self.visible.iter().position(|row| *row == id)) {
            self.cursor_row = index;
        } else if self.visible.is_empty() {
            self.cursor_row = 0;
        } else {
            self.cursor_row = self.cursor_row.min(self.visible.len() - 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ParticipantGrid;
    use crate::bulk::MergeMode;
    use crate::errors::WriteFailure;
    use crate::testing::sample_rows;
    use crate::{
        FieldValue, ParticipantField, ParticipantId, RegistrationStatus, RetreatId, SortDirection,
    };

    fn grid(names: &[&str]) -> ParticipantGrid {
        ParticipantGrid::new(RetreatId::new(1), sample_rows(names), 10)
    }

    fn ids(values: &[i64]) -> Vec<ParticipantId> {
        values.iter().copied().map(ParticipantId::new).collect()
    }

    #[test]
    fn filter_matches_name_email_notes_and_tags() {
        let mut rows = sample_rows(&["Ana", "Ben", "Cy"]);
        rows[1].notes = "needs ride".to_owned();
        rows[2].tags = vec!["Speaker".to_owned()];
        let mut grid = ParticipantGrid::new(RetreatId::new(1), rows, 10);

        grid.set_filter("RIDE");
        assert_eq!(grid.visible_ids(), ids(&[2]).as_slice());
        grid.set_filter("speak");
        assert_eq!(grid.visible_ids(), ids(&[3]).as_slice());
        grid.set_filter("ana@");
        assert_eq!(grid.visible_ids(), ids(&[1]).as_slice());
        grid.set_filter("");
        assert_eq!(grid.visible_ids().len(), 3);
    }

    #[test]
    fn sort_cycles_direction_and_keeps_cursor_row() {
        let mut grid = grid(&["Cy", "ana", "Ben"]);
        grid.move_cursor(2, 0);
        grid.cycle_sort(ParticipantField::Name);
        assert_eq!(grid.visible_ids(), ids(&[2, 3, 1]).as_slice());
        assert_eq!(grid.cursor().map(|cell| cell.participant_id), Some(ParticipantId::new(3)));

        grid.cycle_sort(ParticipantField::Name);
        assert_eq!(grid.view().sort, Some((ParticipantField::Name, SortDirection::Desc)));
        assert_eq!(grid.visible_ids(), ids(&[1, 3, 2]).as_slice());

        grid.cycle_sort(ParticipantField::Name);
        assert_eq!(grid.visible_ids(), ids(&[1, 2, 3]).as_slice());
    }

    #[test]
    fn hide_cancelled_removes_rows_from_visible_order() {
        let mut rows = sample_rows(&["Ana", "Ben"]);
        rows[0].registration_status = RegistrationStatus::Cancelled;
        let mut grid = ParticipantGrid::new(RetreatId::new(1), rows, 10);
        assert!(grid.toggle_hide_cancelled());
        assert_eq!(grid.visible_ids(), ids(&[2]).as_slice());
    }

    #[test]
    fn edit_round_trip_commits_through_dispatcher() -> anyhow::Result<()> {
        let mut grid = grid(&["Ana"]);
        grid.move_cursor(0, 11);
        assert!(grid.begin_edit());
        if let Some(crate::edit_cell::EditCell::Text(cell)) = grid.editor_mut() {
            for ch in "late arrival".chars() {
                cell.insert(ch);
            }
        }
        let request = grid.commit_edit()?.expect("write issued");
        assert_eq!(request.patch.participant_id, ParticipantId::new(1));
        assert_eq!(grid.sheet().rows()[0].notes, "late arrival");
        assert!(grid.focus().active().is_none());
        Ok(())
    }

    #[test]
    fn range_select_uses_sorted_order() {
        let mut grid = grid(&["Cy", "Ana", "Ben"]);
        grid.cycle_sort(ParticipantField::Name);
        assert_eq!(grid.cursor_position().0, 2);
        grid.toggle_selection();
        grid.move_cursor(-1, 0);
        grid.range_selection();
        assert_eq!(
            grid.selection().ordered(grid.visible_ids()),
            ids(&[3, 1])
        );
        assert_eq!(grid.selected_ids(), ids(&[1, 3]));
    }

    #[test]
    fn bulk_completion_clears_selection() -> anyhow::Result<()> {
        let mut grid = grid(&["Ana", "Ben"]);
        grid.select_all_visible();
        let dispatch = grid.apply_bulk(
            ParticipantField::Notes,
            MergeMode::Append,
            FieldValue::Text("vip".to_owned()),
        )?;
        assert_eq!(grid.selection().len(), 2);

        let mut tickets = dispatch.writes.iter().map(|write| write.ticket);
        let first = tickets.next().expect("first write");
        let second = tickets.next().expect("second write");
        grid.complete(first, Ok(()));
        assert_eq!(grid.selection().len(), 2);
        grid.complete(second, Err(WriteFailure::Unavailable("offline".to_owned())));
        assert!(grid.selection().is_empty());
        assert_eq!(grid.sheet().rows()[0].notes, "vip");
        assert_eq!(grid.sheet().rows()[1].notes, "");
        Ok(())
    }

    #[test]
    fn refresh_prunes_selection_and_clamps_cursor() {
        let mut grid = grid(&["Ana", "Ben", "Cy"]);
        grid.move_cursor(2, 0);
        grid.toggle_selection();
        grid.apply_refresh(sample_rows(&["Ana", "Ben"]));
        assert!(grid.selection().is_empty());
        assert_eq!(grid.cursor_position().0, 1);
    }
}
