// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{AppMode, FormKind, RetreatId, ViewKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub mode: AppMode,
    pub active_view: ViewKind,
    pub active_retreat: Option<RetreatId>,
    pub hide_cancelled: bool,
    pub status_line: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            mode: AppMode::Nav,
            active_view: ViewKind::Retreats,
            active_retreat: None,
            hide_cancelled: false,
            status_line: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    NextView,
    PrevView,
    OpenRetreat(RetreatId),
    EnterEditMode,
    EnterBulkMode,
    ExitToNav,
    OpenForm(FormKind),
    ToggleCancelled,
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ModeChanged(AppMode),
    ViewChanged(ViewKind),
    RetreatOpened(RetreatId),
    CancelledFilterChanged(bool),
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::NextView => self.rotate_view(1),
            AppCommand::PrevView => self.rotate_view(-1),
            AppCommand::OpenRetreat(id) => {
                self.active_retreat = Some(id);
                self.active_view = ViewKind::Participants;
                self.mode = AppMode::Nav;
                vec![
                    AppEvent::RetreatOpened(id),
                    AppEvent::ViewChanged(self.active_view),
                ]
            }
            AppCommand::EnterEditMode => {
                if self.active_view != ViewKind::Participants {
                    return vec![self.set_status("open a retreat to edit participants")];
                }
                self.mode = AppMode::Edit;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::EnterBulkMode => {
                if self.active_view != ViewKind::Participants {
                    return vec![self.set_status("open a retreat to bulk edit")];
                }
                self.mode = AppMode::Bulk;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::ExitToNav => {
                self.mode = AppMode::Nav;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::OpenForm(kind) => {
                self.mode = AppMode::Form(kind);
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::ToggleCancelled => {
                self.hide_cancelled = !self.hide_cancelled;
                let label = if self.hide_cancelled {
                    "cancelled hidden"
                } else {
                    "cancelled shown"
                };
                vec![
                    AppEvent::CancelledFilterChanged(self.hide_cancelled),
                    self.set_status(label),
                ]
            }
            AppCommand::SetStatus(message) => vec![self.set_status(&message)],
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    fn rotate_view(&mut self, delta: isize) -> Vec<AppEvent> {
        let views = ViewKind::ALL;
        let current = views
            .iter()
            .position(|view| *view == self.active_view)
            .unwrap_or(0) as isize;
        let len = views.len() as isize;
        let next = (current + delta).rem_euclid(len) as usize;
        if views[next] == ViewKind::Participants && self.active_retreat.is_none() {
            return vec![self.set_status("pick a retreat first -- press enter on a retreat")];
        }
        self.active_view = views[next];
        self.mode = AppMode::Nav;
        vec![AppEvent::ViewChanged(self.active_view)]
    }

    fn set_status(&mut self, message: &str) -> AppEvent {
        self.status_line = Some(message.to_owned());
        AppEvent::StatusUpdated(message.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::{AppCommand, AppEvent, AppState};
    use crate::{AppMode, FormKind, RetreatId, ViewKind};

    #[test]
    fn view_rotation_wraps_once_a_retreat_is_open() {
        let mut state = AppState::default();
        state.dispatch(AppCommand::OpenRetreat(RetreatId::new(3)));
        assert_eq!(state.active_view, ViewKind::Participants);

        let events = state.dispatch(AppCommand::NextView);
        assert_eq!(state.active_view, ViewKind::Retreats);
        assert_eq!(events, vec![AppEvent::ViewChanged(ViewKind::Retreats)]);

        state.dispatch(AppCommand::PrevView);
        assert_eq!(state.active_view, ViewKind::Participants);
    }

    #[test]
    fn participants_view_needs_a_retreat() {
        let mut state = AppState::default();
        let events = state.dispatch(AppCommand::NextView);
        assert_eq!(state.active_view, ViewKind::Retreats);
        assert!(matches!(events.as_slice(), [AppEvent::StatusUpdated(_)]));
    }

    #[test]
    fn toggle_cancelled_updates_status() {
        let mut state = AppState::default();
        let events = state.dispatch(AppCommand::ToggleCancelled);
        assert!(state.hide_cancelled);
        assert_eq!(
            events,
            vec![
                AppEvent::CancelledFilterChanged(true),
                AppEvent::StatusUpdated("cancelled hidden".to_owned()),
            ],
        );
    }

    #[test]
    fn status_set_and_clear() {
        let mut state = AppState::default();
        state.dispatch(AppCommand::SetStatus("saved".to_owned()));
        assert_eq!(state.status_line.as_deref(), Some("saved"));
        assert_eq!(
            state.dispatch(AppCommand::ClearStatus),
            vec![AppEvent::StatusCleared]
        );
        assert_eq!(state.status_line, None);
    }

    #[test]
    fn mode_transitions() {
        let mut state = AppState::default();
        state.dispatch(AppCommand::EnterEditMode);
        assert_eq!(state.mode, AppMode::Nav);

        state.dispatch(AppCommand::OpenRetreat(RetreatId::new(1)));
        state.dispatch(AppCommand::EnterEditMode);
        assert_eq!(state.mode, AppMode::Edit);

        state.dispatch(AppCommand::EnterBulkMode);
        assert_eq!(state.mode, AppMode::Bulk);

        state.dispatch(AppCommand::OpenForm(FormKind::Participant));
        assert_eq!(state.mode, AppMode::Form(FormKind::Participant));

        state.dispatch(AppCommand::ExitToNav);
        assert_eq!(state.mode, AppMode::Nav);
    }
}
