// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeSet;

use crate::ParticipantId;

/// Multi-row selection keyed by participant id, so it survives sorting and
/// filtering. The range anchor is the last row toggled individually.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionManager {
    selected: BTreeSet<ParticipantId>,
    anchor: Option<ParticipantId>,
}

impl SelectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_selected(&self, id: ParticipantId) -> bool {
        self.selected.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn anchor(&self) -> Option<ParticipantId> {
        self.anchor
    }

    /// Selected ids in display order.
    pub fn ordered(&self, visible: &[ParticipantId]) -> Vec<ParticipantId> {
        visible
            .iter()
            .copied()
            .filter(|id| self.selected.contains(id))
            .collect()
    }

    pub fn toggle(&mut self, id: ParticipantId) {
        if !self.selected.remove(&id) {
            self.selected.insert(id);
        }
        self.anchor = Some(id);
    }

    /// Extends from the anchor to `target` across the visible order. The range
    /// takes the state `target` would get from a plain toggle. Without a
    /// visible anchor this is a toggle.
    pub fn range(&mut self, target: ParticipantId, visible: &[ParticipantId]) {
        let anchor_index = self
            .anchor
            .and_then(|anchor| visible.iter().position(|id| *id == anchor));
        let target_index = visible.iter().position(|id| *id == target);
        let (Some(start), Some(end)) = (anchor_index, target_index) else {
            self.toggle(target);
            return;
        };

        let select = !self.selected.contains(&target);
        let (low, high) = if start <= end { (start, end) } else { (end, start) };
        for id in &visible[low..=high] {
            if select {
                self.selected.insert(*id);
            } else {
                self.selected.remove(id);
            }
        }
        self.anchor = Some(target);
    }

    pub fn select_all_visible(&mut self, visible: &[ParticipantId]) {
        self.selected.extend(visible.iter().copied());
    }

    /// Deselects visible rows; selections hidden by a filter stay.
    pub fn clear_visible(&mut self, visible: &[ParticipantId]) {
        for id in visible {
            self.selected.remove(id);
        }
        if self.anchor.is_some_and(|anchor| visible.contains(&anchor)) {
            self.anchor = None;
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.anchor = None;
    }

    /// Drops ids that no longer exist after a refresh.
    pub fn prune(&mut self, existing: &[ParticipantId]) {
        self.selected.retain(|id| existing.contains(id));
        if self.anchor.is_some_and(|anchor| !existing.contains(&anchor)) {
            self.anchor = None;
        }
    }
}
