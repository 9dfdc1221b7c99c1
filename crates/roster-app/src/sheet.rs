// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::VecDeque;

pub const DEFAULT_HISTORY_DEPTH: usize = 10;

/// Working copy of a row collection with bounded undo/redo.
///
/// Every mutation of `data` goes through [`SheetState::replace`] (local edits)
/// or [`SheetState::replace_external`] (authoritative refreshes). A refresh is
/// an undo barrier: it clears both stacks so undo never resurrects rows the
/// server has since replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetState<T> {
    data: Vec<T>,
    history: VecDeque<Vec<T>>,
    redo: Vec<Vec<T>>,
    depth: usize,
}

impl<T: Clone + PartialEq> SheetState<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self::with_depth(data, DEFAULT_HISTORY_DEPTH)
    }

    pub fn with_depth(data: Vec<T>, depth: usize) -> Self {
        Self {
            data,
            history: VecDeque::new(),
            redo: Vec::new(),
            depth: depth.max(1),
        }
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Returns `false` when `next` equals the current data.
    pub fn replace(&mut self, next: Vec<T>) -> bool {
        if next == self.data {
            return false;
        }
        let previous = std::mem::replace(&mut self.data, next);
        self.history.push_back(previous);
        while self.history.len() > self.depth {
            self.history.pop_front();
        }
        self.redo.clear();
        true
    }

    pub fn replace_external(&mut self, next: Vec<T>) -> bool {
        if next == self.data {
            return false;
        }
        self.data = next;
        self.history.clear();
        self.redo.clear();
        true
    }

    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.pop_back() else {
            return false;
        };
        let current = std::mem::replace(&mut self.data, snapshot);
        self.redo.push(current);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(snapshot) = self.redo.pop() else {
            return false;
        };
        let current = std::mem::replace(&mut self.data, snapshot);
        self.history.push_back(current);
        while self.history.len() > self.depth {
            self.history.pop_front();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::SheetState;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: i64,
        notes: String,
    }

    fn notes(sheet: &SheetState<Row>) -> &str {
        &sheet.data()[0].notes
    }

    fn with_notes(value: &str) -> Vec<Row> {
        vec![Row {
            id: 1,
            notes: value.to_owned(),
        }]
    }

    #[test]
    fn undo_redo_scenario() {
        let mut sheet = SheetState::new(with_notes(""));

        assert!(sheet.replace(with_notes("hello")));
        assert_eq!(sheet.history_len(), 1);
        assert!(sheet.replace(with_notes("hello world")));
        assert_eq!(sheet.history_len(), 2);

        assert!(sheet.undo());
        assert_eq!(notes(&sheet), "hello");
        assert!(sheet.undo());
        assert_eq!(notes(&sheet), "");
        assert!(sheet.redo());
        assert_eq!(notes(&sheet), "hello");
        assert_eq!(sheet.data()[0].id, 1);
    }

    #[test]
    fn equal_replace_is_a_no_op() {
        let mut sheet = SheetState::new(with_notes("same"));
        assert!(!sheet.replace(with_notes("same")));
        assert_eq!(sheet.history_len(), 0);
    }

    #[test]
    fn history_is_bounded_and_undo_stops_at_oldest_retained() {
        let mut sheet = SheetState::new(with_notes("v0"));
        for version in 1..=15 {
            sheet.replace(with_notes(&format!("v{version}")));
            assert!(sheet.history_len() <= 10);
        }
        assert_eq!(sheet.history_len(), 10);

        let mut undone = 0;
        while sheet.undo() {
            undone += 1;
        }
        assert_eq!(undone, 10);
        assert_eq!(notes(&sheet), "v5");
        assert!(!sheet.undo());
        assert_eq!(notes(&sheet), "v5");
    }

    #[test]
    fn undo_and_redo_are_no_ops_at_the_ends() {
        let mut sheet = SheetState::new(with_notes("a"));
        assert!(!sheet.undo());
        assert!(!sheet.redo());
        sheet.replace(with_notes("b"));
        assert!(!sheet.redo());
        assert!(sheet.undo());
        assert!(!sheet.undo());
        assert_eq!(notes(&sheet), "a");
    }

    #[test]
    fn new_edit_discards_redo() {
        let mut sheet = SheetState::new(with_notes("a"));
        sheet.replace(with_notes("b"));
        sheet.undo();
        assert!(sheet.can_redo());
        sheet.replace(with_notes("c"));
        assert!(!sheet.can_redo());
        assert!(sheet.undo());
        assert_eq!(notes(&sheet), "a");
    }

    #[test]
    fn redo_after_full_history_keeps_bound() {
        let mut sheet = SheetState::with_depth(with_notes("v0"), 3);
        for version in 1..=3 {
            sheet.replace(with_notes(&format!("v{version}")));
        }
        sheet.undo();
        sheet.redo();
        assert_eq!(sheet.history_len(), 3);
        assert_eq!(notes(&sheet), "v3");
    }

    #[test]
    fn external_refresh_is_an_undo_barrier() {
        let mut sheet = SheetState::new(with_notes("a"));
        sheet.replace(with_notes("b"));
        sheet.replace(with_notes("c"));
        sheet.undo();

        assert!(sheet.replace_external(with_notes("server")));
        assert!(!sheet.can_undo());
        assert!(!sheet.can_redo());
        assert!(!sheet.undo());
        assert_eq!(notes(&sheet), "server");

        sheet.replace(with_notes("local"));
        assert!(sheet.undo());
        assert_eq!(notes(&sheet), "server");
    }

    #[test]
    fn identical_external_refresh_keeps_history() {
        let mut sheet = SheetState::new(with_notes("a"));
        sheet.replace(with_notes("b"));
        assert!(!sheet.replace_external(with_notes("b")));
        assert!(sheet.can_undo());
    }
}
