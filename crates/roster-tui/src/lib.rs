// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs};
use roster_app::{
    AppCommand, AppEvent, AppMode, AppState, CellRef, DietarySelection, DietaryToken, EditCell,
    FieldKind, FieldValue, FormKind, FormPayload, MergeMode, NoticeLevel, Participant,
    ParticipantField, ParticipantFormInput, ParticipantGrid, ParticipantPatch, Retreat,
    RetreatCounts, RetreatFormInput, RetreatId, RetreatStatus, SortDirection, ViewKind,
    WriteFailure, WriteRequest, WriteTicket, edit_cell::parse_tags,
};
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const HALF_PAGE_ROWS: isize = 10;
const EDIT_CARET: &str = "▏";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetreatSummary {
    pub retreat: Retreat,
    pub counts: RetreatCounts,
}

/// Everything the grid needs from persistence and change notification.
pub trait AppRuntime {
    fn load_retreats(&mut self) -> Result<Vec<RetreatSummary>>;
    fn load_participants(&mut self, retreat_id: RetreatId) -> Result<Vec<Participant>>;
    fn submit_form(&mut self, payload: &FormPayload) -> Result<()>;
    fn update_retreat(&mut self, retreat_id: RetreatId, input: &RetreatFormInput) -> Result<()>;
    fn set_retreat_status(&mut self, retreat_id: RetreatId, status: RetreatStatus) -> Result<()>;
    fn write_participant(&mut self, patch: &ParticipantPatch) -> Result<(), WriteFailure>;
    fn spawn_participant_write(
        &mut self,
        request: WriteRequest,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let result = self.write_participant(&request.patch);
        tx.send(InternalEvent::WriteCompleted {
            ticket: request.ticket,
            result,
        })
        .map_err(|_| anyhow::anyhow!("write event channel closed"))?;
        Ok(())
    }
    /// Starts delivering `RemoteChanged` for `retreat_id`, replacing any
    /// previous subscription.
    fn watch_retreat(&mut self, _retreat_id: RetreatId, _tx: Sender<InternalEvent>) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus {
        token: u64,
    },
    WriteCompleted {
        ticket: WriteTicket,
        result: Result<(), WriteFailure>,
    },
    RemoteChanged {
        retreat_id: RetreatId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BulkUiState {
    mode: MergeMode,
    input: String,
    choice_index: usize,
}

impl Default for BulkUiState {
    fn default() -> Self {
        Self {
            mode: MergeMode::Set,
            input: String::new(),
            choice_index: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FormUiState {
    base: FormPayload,
    editing: Option<RetreatId>,
    values: Vec<String>,
    field_index: usize,
}

impl FormUiState {
    fn new(base: FormPayload, editing: Option<RetreatId>) -> Self {
        let values = form_values(&base);
        Self {
            base,
            editing,
            values,
            field_index: 0,
        }
    }

    fn kind(&self) -> FormKind {
        self.base.kind()
    }

    fn value(&self, index: usize) -> String {
        self.values.get(index).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
struct ViewData {
    history_depth: usize,
    retreats: Vec<RetreatSummary>,
    retreat_cursor: usize,
    grid: Option<ParticipantGrid>,
    filter_input: Option<String>,
    bulk: BulkUiState,
    form: Option<FormUiState>,
    help_visible: bool,
    status_token: u64,
    status_is_error: bool,
}

impl ViewData {
    fn new(history_depth: usize) -> Self {
        Self {
            history_depth,
            retreats: Vec::new(),
            retreat_cursor: 0,
            grid: None,
            filter_input: None,
            bulk: BulkUiState::default(),
            form: None,
            help_visible: false,
            status_token: 0,
            status_is_error: false,
        }
    }

    fn active_retreat_name(&self) -> Option<&str> {
        let grid = self.grid.as_ref()?;
        self.retreats
            .iter()
            .find(|summary| summary.retreat.id == grid.retreat_id())
            .map(|summary| summary.retreat.name.as_str())
    }
}

pub fn run_app<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    history_depth: usize,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::new(history_depth);
    let (internal_tx, internal_rx) = mpsc::channel();

    if let Err(error) = refresh_view_data(state, runtime, &mut view_data, &internal_tx) {
        state.dispatch(AppCommand::SetStatus(format!("load failed: {error:#}")));
    }

    let mut result = Ok(());
    loop {
        process_internal_events(state, runtime, &mut view_data, &internal_tx, &internal_rx);

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event
            && let Event::Key(key) = event::read().context("read event")?
            && handle_key_event(state, runtime, &mut view_data, &internal_tx, key)
        {
            break;
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
                view_data.status_is_error = false;
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::WriteCompleted { ticket, result } => {
                let Some(grid) = view_data.grid.as_mut() else {
                    continue;
                };
                let Some(completion) = grid.complete(ticket, result) else {
                    continue;
                };
                if let Some(notice) = completion.notice {
                    match notice.level {
                        NoticeLevel::Info => emit_status(state, view_data, tx, notice.message),
                        NoticeLevel::Error => emit_error(state, view_data, tx, notice.message),
                    }
                }
            }
            InternalEvent::RemoteChanged { retreat_id } => {
                if let Err(error) = reload_participants(runtime, view_data, retreat_id) {
                    emit_error(
                        state,
                        view_data,
                        tx,
                        format!("refresh failed: {error:#}"),
                    );
                }
            }
        }
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(4));
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.dispatch(AppCommand::SetStatus(message.into()));
    view_data.status_is_error = false;
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn emit_error(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    emit_status(state, view_data, internal_tx, message);
    view_data.status_is_error = true;
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char('q') | KeyCode::Char('c'))
    {
        return true;
    }

    if view_data.help_visible {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?')) {
            view_data.help_visible = false;
        }
        return false;
    }

    if view_data.filter_input.is_some() {
        handle_filter_key(view_data, key);
        return false;
    }

    match state.mode {
        AppMode::Form(_) => {
            handle_form_key(state, runtime, view_data, internal_tx, key);
            false
        }
        AppMode::Edit => {
            handle_edit_key(state, runtime, view_data, internal_tx, key);
            false
        }
        AppMode::Bulk => {
            handle_bulk_key(state, runtime, view_data, internal_tx, key);
            false
        }
        AppMode::Nav => handle_nav_key(state, runtime, view_data, internal_tx, key),
    }
}

fn handle_nav_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Tab => {
            dispatch_and_refresh(state, runtime, view_data, AppCommand::NextView, internal_tx);
            return false;
        }
        KeyCode::BackTab => {
            dispatch_and_refresh(state, runtime, view_data, AppCommand::PrevView, internal_tx);
            return false;
        }
        KeyCode::Char('?') => {
            view_data.help_visible = true;
            return false;
        }
        _ => {}
    }

    match state.active_view {
        ViewKind::Retreats => handle_retreat_nav_key(state, runtime, view_data, internal_tx, key),
        ViewKind::Participants => {
            handle_participant_nav_key(state, runtime, view_data, internal_tx, key);
        }
    }
    false
}

fn handle_retreat_nav_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let last = view_data.retreats.len().saturating_sub(1);
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            view_data.retreat_cursor = (view_data.retreat_cursor + 1).min(last);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view_data.retreat_cursor = view_data.retreat_cursor.saturating_sub(1);
        }
        KeyCode::Char('g') => view_data.retreat_cursor = 0,
        KeyCode::Char('G') => view_data.retreat_cursor = last,
        KeyCode::Enter => {
            let Some(summary) = view_data.retreats.get(view_data.retreat_cursor) else {
                emit_status(state, view_data, internal_tx, "no retreats yet -- press n to add one");
                return;
            };
            let retreat_id = summary.retreat.id;
            dispatch_and_refresh(
                state,
                runtime,
                view_data,
                AppCommand::OpenRetreat(retreat_id),
                internal_tx,
            );
        }
        KeyCode::Char('n') => open_form(state, runtime, view_data, internal_tx, FormKind::Retreat),
        KeyCode::Char('e') => {
            let Some(summary) = view_data.retreats.get(view_data.retreat_cursor) else {
                return;
            };
            let base = FormPayload::Retreat(RetreatFormInput::from_retreat(&summary.retreat));
            view_data.form = Some(FormUiState::new(base, Some(summary.retreat.id)));
            dispatch_and_refresh(
                state,
                runtime,
                view_data,
                AppCommand::OpenForm(FormKind::Retreat),
                internal_tx,
            );
        }
        KeyCode::Char('o') => {
            let Some(summary) = view_data.retreats.get(view_data.retreat_cursor) else {
                return;
            };
            let retreat_id = summary.retreat.id;
            let name = summary.retreat.name.clone();
            let next = next_retreat_status(summary.retreat.status);
            match runtime.set_retreat_status(retreat_id, next) {
                Ok(()) => {
                    if let Err(error) = refresh_view_data(state, runtime, view_data, internal_tx) {
                        emit_error(state, view_data, internal_tx, format!("load failed: {error:#}"));
                        return;
                    }
                    emit_status(
                        state,
                        view_data,
                        internal_tx,
                        format!("{name} is now {}", next.label()),
                    );
                }
                Err(error) => emit_error(
                    state,
                    view_data,
                    internal_tx,
                    format!("status change failed: {error:#}"),
                ),
            }
        }
        KeyCode::Char('r') => {
            if let Err(error) = refresh_view_data(state, runtime, view_data, internal_tx) {
                emit_error(state, view_data, internal_tx, format!("load failed: {error:#}"));
            }
        }
        _ => {}
    }
}

fn handle_participant_nav_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(grid) = view_data.grid.as_mut() else {
        emit_status(state, view_data, internal_tx, "no roster loaded -- press r to reload");
        return;
    };

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('r') if ctrl => step_history(state, runtime, view_data, internal_tx, true),
        KeyCode::Char('d') if ctrl => grid.move_cursor(HALF_PAGE_ROWS, 0),
        KeyCode::Char('u') if ctrl => grid.move_cursor(-HALF_PAGE_ROWS, 0),
        KeyCode::Char('j') | KeyCode::Down => grid.move_cursor(1, 0),
        KeyCode::Char('k') | KeyCode::Up => grid.move_cursor(-1, 0),
        KeyCode::Char('h') | KeyCode::Left => grid.move_cursor(0, -1),
        KeyCode::Char('l') | KeyCode::Right => grid.move_cursor(0, 1),
        KeyCode::Char('g') => grid.move_cursor(isize::MIN / 2, 0),
        KeyCode::Char('G') => grid.move_cursor(isize::MAX / 2, 0),
        KeyCode::Char('^') => grid.move_cursor(0, isize::MIN / 2),
        KeyCode::Char('$') => grid.move_cursor(0, isize::MAX / 2),
        KeyCode::Enter | KeyCode::Char('i') => {
            if grid.begin_edit() {
                dispatch_and_refresh(
                    state,
                    runtime,
                    view_data,
                    AppCommand::EnterEditMode,
                    internal_tx,
                );
            } else {
                emit_status(state, view_data, internal_tx, "no row to edit");
            }
        }
        KeyCode::Char('x') => grid.toggle_selection(),
        KeyCode::Char('X') => grid.range_selection(),
        KeyCode::Char('a') => grid.select_all_visible(),
        KeyCode::Char('A') => grid.clear_visible_selection(),
        KeyCode::Char('u') => step_history(state, runtime, view_data, internal_tx, false),
        KeyCode::Char('s') => {
            let field = cursor_field(grid);
            grid.cycle_sort(field);
        }
        KeyCode::Char('/') => {
            view_data.filter_input = Some(grid.view().filter.clone());
        }
        KeyCode::Char('b') => {
            if grid.selection().is_empty() {
                emit_status(
                    state,
                    view_data,
                    internal_tx,
                    "select rows first (x, X, a) and retry",
                );
                return;
            }
            view_data.bulk = BulkUiState::default();
            dispatch_and_refresh(
                state,
                runtime,
                view_data,
                AppCommand::EnterBulkMode,
                internal_tx,
            );
        }
        KeyCode::Char('n') => {
            open_form(state, runtime, view_data, internal_tx, FormKind::Participant);
        }
        KeyCode::Char('c') => dispatch_and_refresh(
            state,
            runtime,
            view_data,
            AppCommand::ToggleCancelled,
            internal_tx,
        ),
        KeyCode::Char('r') => {
            let retreat_id = grid.retreat_id();
            if let Err(error) = reload_participants(runtime, view_data, retreat_id) {
                emit_error(state, view_data, internal_tx, format!("refresh failed: {error:#}"));
            }
        }
        _ => {}
    }
}

fn step_history<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    redo: bool,
) {
    let Some(grid) = view_data.grid.as_mut() else {
        return;
    };
    let writes = if redo { grid.redo() } else { grid.undo() };
    match (writes, redo) {
        (Some(writes), true) => {
            send_writes(runtime, internal_tx, writes);
            emit_status(state, view_data, internal_tx, "redone");
        }
        (Some(writes), false) => {
            send_writes(runtime, internal_tx, writes);
            emit_status(state, view_data, internal_tx, "undone");
        }
        (None, true) => emit_status(state, view_data, internal_tx, "nothing to redo"),
        (None, false) => emit_status(state, view_data, internal_tx, "nothing to undo"),
    }
}

fn send_writes<R: AppRuntime>(
    runtime: &mut R,
    internal_tx: &Sender<InternalEvent>,
    writes: Vec<WriteRequest>,
) {
    for request in writes {
        let ticket = request.ticket;
        debug!(ticket = ticket.get(), participant = %request.patch.participant_id, "sending write");
        if let Err(error) = runtime.spawn_participant_write(request, internal_tx.clone()) {
            warn!(ticket = ticket.get(), error = %error, "write could not be started");
            let _ = internal_tx.send(InternalEvent::WriteCompleted {
                ticket,
                result: Err(WriteFailure::Unavailable(format!("{error:#}"))),
            });
        }
    }
}

fn handle_filter_key(view_data: &mut ViewData, key: KeyEvent) {
    let (Some(input), Some(grid)) = (view_data.filter_input.as_mut(), view_data.grid.as_mut())
    else {
        view_data.filter_input = None;
        return;
    };
    match key.code {
        KeyCode::Esc => {
            grid.set_filter("");
            view_data.filter_input = None;
        }
        KeyCode::Enter => view_data.filter_input = None,
        KeyCode::Backspace => {
            input.pop();
            grid.set_filter(input.as_str());
        }
        KeyCode::Char(ch) => {
            input.push(ch);
            grid.set_filter(input.as_str());
        }
        _ => {}
    }
}

fn handle_edit_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(grid) = view_data.grid.as_mut() else {
        dispatch_and_refresh(state, runtime, view_data, AppCommand::ExitToNav, internal_tx);
        return;
    };
    match key.code {
        KeyCode::Esc => {
            grid.cancel_edit();
            dispatch_and_refresh(state, runtime, view_data, AppCommand::ExitToNav, internal_tx);
        }
        KeyCode::Enter => commit_active_edit(state, runtime, view_data, internal_tx, 0),
        KeyCode::Tab => commit_active_edit(state, runtime, view_data, internal_tx, 1),
        KeyCode::BackTab => commit_active_edit(state, runtime, view_data, internal_tx, -1),
        _ => {
            if let Some(editor) = grid.editor_mut() {
                apply_editor_key(editor, key);
            }
        }
    }
}

fn apply_editor_key(editor: &mut EditCell, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match editor {
        EditCell::Text(cell) => match key.code {
            KeyCode::Char('u') if ctrl => cell.clear(),
            KeyCode::Char(ch) => cell.insert(ch),
            KeyCode::Backspace => cell.backspace(),
            _ => {}
        },
        EditCell::Tags(cell) => match key.code {
            KeyCode::Char(ch) => cell.insert(ch),
            KeyCode::Backspace => cell.backspace(),
            _ => {}
        },
        EditCell::Choice(cell) => match key.code {
            KeyCode::Char('j') | KeyCode::Down => cell.move_by(1),
            KeyCode::Char('k') | KeyCode::Up => cell.move_by(-1),
            _ => {}
        },
        EditCell::Dietary(cell) => match key.code {
            KeyCode::Down => cell.move_by(1),
            KeyCode::Up => cell.move_by(-1),
            KeyCode::Delete => cell.toggle_highlighted(),
            KeyCode::Char(' ') if cell.highlighted() != DietaryToken::Other => {
                cell.toggle_highlighted();
            }
            KeyCode::Char(ch) => cell.insert_other(ch),
            KeyCode::Backspace => cell.backspace_other(),
            _ => {}
        },
    }
}

fn commit_active_edit<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    advance: isize,
) {
    let Some(grid) = view_data.grid.as_mut() else {
        return;
    };
    let outcome = grid.commit_edit();
    if advance != 0 {
        grid.move_cursor(0, advance);
    }
    match outcome {
        Ok(Some(request)) => send_writes(runtime, internal_tx, vec![request]),
        Ok(None) => {}
        Err(error) => emit_error(state, view_data, internal_tx, error.to_string()),
    }
    dispatch_and_refresh(state, runtime, view_data, AppCommand::ExitToNav, internal_tx);
}

fn handle_bulk_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(grid) = view_data.grid.as_mut() else {
        dispatch_and_refresh(state, runtime, view_data, AppCommand::ExitToNav, internal_tx);
        return;
    };
    let field = cursor_field(grid);
    let bulk = &mut view_data.bulk;
    match key.code {
        KeyCode::Esc => {
            dispatch_and_refresh(state, runtime, view_data, AppCommand::ExitToNav, internal_tx);
        }
        KeyCode::Left | KeyCode::Right => {
            let delta = if key.code == KeyCode::Left { -1 } else { 1 };
            grid.move_cursor(0, delta);
            *bulk = BulkUiState::default();
        }
        KeyCode::Tab => bulk.mode = bulk.mode.next(),
        KeyCode::Down if field.kind() == FieldKind::Choice => {
            let last = field.choices().len().saturating_sub(1);
            bulk.choice_index = (bulk.choice_index + 1).min(last);
        }
        KeyCode::Up if field.kind() == FieldKind::Choice => {
            bulk.choice_index = bulk.choice_index.saturating_sub(1);
        }
        KeyCode::Backspace => {
            bulk.input.pop();
        }
        KeyCode::Char(ch) if field.kind() != FieldKind::Choice => bulk.input.push(ch),
        KeyCode::Enter => apply_bulk_edit(state, runtime, view_data, internal_tx),
        _ => {}
    }
}

fn bulk_value(field: ParticipantField, bulk: &BulkUiState) -> Option<FieldValue> {
    match field.kind() {
        FieldKind::Choice => field.choices().get(bulk.choice_index).cloned(),
        FieldKind::Tags => Some(FieldValue::Tags(parse_tags(&bulk.input))),
        FieldKind::Dietary => Some(FieldValue::Text(
            DietarySelection::parse(&bulk.input).format(),
        )),
        FieldKind::Text => Some(FieldValue::Text(bulk.input.clone())),
    }
}

fn apply_bulk_edit<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(grid) = view_data.grid.as_mut() else {
        return;
    };
    let field = cursor_field(grid);
    let Some(value) = bulk_value(field, &view_data.bulk) else {
        emit_status(state, view_data, internal_tx, "pick a value and retry");
        return;
    };
    match grid.apply_bulk(field, view_data.bulk.mode, value) {
        Ok(dispatch) if dispatch.writes.is_empty() => {
            dispatch_and_refresh(state, runtime, view_data, AppCommand::ExitToNav, internal_tx);
            emit_status(state, view_data, internal_tx, "no rows changed");
        }
        Ok(dispatch) => {
            let count = dispatch.writes.len();
            send_writes(runtime, internal_tx, dispatch.writes);
            dispatch_and_refresh(state, runtime, view_data, AppCommand::ExitToNav, internal_tx);
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("saving {count} row{}", if count == 1 { "" } else { "s" }),
            );
        }
        Err(error) => emit_error(state, view_data, internal_tx, error.to_string()),
    }
}

fn open_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    kind: FormKind,
) {
    let Some(base) = FormPayload::blank_for(kind, state.active_retreat) else {
        emit_status(state, view_data, internal_tx, "open a retreat first");
        return;
    };
    view_data.form = Some(FormUiState::new(base, None));
    dispatch_and_refresh(state, runtime, view_data, AppCommand::OpenForm(kind), internal_tx);
}

fn handle_form_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(form) = view_data.form.as_mut() else {
        dispatch_and_refresh(state, runtime, view_data, AppCommand::ExitToNav, internal_tx);
        return;
    };
    let last = form.values.len().saturating_sub(1);
    match key.code {
        KeyCode::Esc => {
            view_data.form = None;
            dispatch_and_refresh(state, runtime, view_data, AppCommand::ExitToNav, internal_tx);
            emit_status(state, view_data, internal_tx, "form cancelled");
        }
        KeyCode::Tab | KeyCode::Down => form.field_index = (form.field_index + 1).min(last),
        KeyCode::BackTab | KeyCode::Up => form.field_index = form.field_index.saturating_sub(1),
        KeyCode::Backspace => {
            if let Some(value) = form.values.get_mut(form.field_index) {
                value.pop();
            }
        }
        KeyCode::Char(ch) => {
            if let Some(value) = form.values.get_mut(form.field_index) {
                value.push(ch);
            }
        }
        KeyCode::Enter => submit_form(state, runtime, view_data, internal_tx),
        _ => {}
    }
}

fn submit_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(form) = view_data.form.clone() else {
        return;
    };
    let payload = match form_payload(&form).and_then(|payload| {
        payload.validate()?;
        Ok(payload)
    }) {
        Ok(payload) => payload,
        Err(error) => {
            emit_error(state, view_data, internal_tx, error.to_string());
            return;
        }
    };

    let saved = match (&payload, form.editing) {
        (FormPayload::Retreat(input), Some(retreat_id)) => {
            runtime.update_retreat(retreat_id, input)
        }
        _ => runtime.submit_form(&payload),
    };
    if let Err(error) = saved {
        emit_error(
            state,
            view_data,
            internal_tx,
            format!("save failed: {error:#}"),
        );
        return;
    }

    view_data.form = None;
    dispatch_and_refresh(state, runtime, view_data, AppCommand::ExitToNav, internal_tx);
    if let Err(error) = refresh_view_data(state, runtime, view_data, internal_tx) {
        emit_error(state, view_data, internal_tx, format!("load failed: {error:#}"));
        return;
    }
    let message = match payload {
        FormPayload::Retreat(input) => format!("saved retreat {}", input.name.trim()),
        FormPayload::Participant(input) => format!("added {}", input.name.trim()),
    };
    emit_status(state, view_data, internal_tx, message);
}

fn form_labels(kind: FormKind) -> &'static [&'static str] {
    match kind {
        FormKind::Retreat => &["name", "dates", "location", "capacity", "chat link"],
        FormKind::Participant => &["name", "email", "phone", "dietary", "tags", "notes"],
    }
}

fn form_values(payload: &FormPayload) -> Vec<String> {
    match payload {
        FormPayload::Retreat(input) => vec![
            input.name.clone(),
            input.date_range.clone(),
            input.location.clone(),
            input.capacity.to_string(),
            input.chat_link.clone(),
        ],
        FormPayload::Participant(input) => vec![
            input.name.clone(),
            input.email.clone(),
            input.phone.clone(),
            input.dietary.clone(),
            input.tags.clone(),
            input.notes.clone(),
        ],
    }
}

fn form_payload(form: &FormUiState) -> Result<FormPayload> {
    match &form.base {
        FormPayload::Retreat(base) => {
            let raw_capacity = form.value(3);
            let capacity = match raw_capacity.trim() {
                "" => 0,
                raw => raw.parse::<i64>().with_context(|| {
                    format!("capacity {raw:?} is not a whole number -- enter digits and retry")
                })?,
            };
            Ok(FormPayload::Retreat(RetreatFormInput {
                name: form.value(0),
                date_range: form.value(1),
                location: form.value(2),
                capacity,
                chat_link: form.value(4),
                status: base.status,
            }))
        }
        FormPayload::Participant(base) => Ok(FormPayload::Participant(ParticipantFormInput {
            retreat_id: base.retreat_id,
            name: form.value(0),
            email: form.value(1),
            phone: form.value(2),
            dietary: form.value(3),
            registration_status: base.registration_status,
            accommodation: base.accommodation,
            transportation: base.transportation,
            tags: form.value(4),
            notes: form.value(5),
        })),
    }
}

fn next_retreat_status(status: RetreatStatus) -> RetreatStatus {
    match status {
        RetreatStatus::Open => RetreatStatus::Closed,
        RetreatStatus::Closed => RetreatStatus::Archived,
        RetreatStatus::Archived => RetreatStatus::Open,
    }
}

fn cursor_field(grid: &ParticipantGrid) -> ParticipantField {
    ParticipantGrid::COLUMNS[grid.cursor_position().1]
}

fn dispatch_and_refresh<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    command: AppCommand,
    internal_tx: &Sender<InternalEvent>,
) {
    let events = state.dispatch(command);
    for event in &events {
        if let AppEvent::CancelledFilterChanged(hide) = event
            && let Some(grid) = view_data.grid.as_mut()
        {
            grid.set_hide_cancelled(*hide);
        }
    }
    if should_refresh_view(&events)
        && let Err(error) = refresh_view_data(state, runtime, view_data, internal_tx)
    {
        emit_error(
            state,
            view_data,
            internal_tx,
            format!("load failed: {error:#}"),
        );
    }
    if events
        .iter()
        .any(|event| matches!(event, AppEvent::StatusUpdated(_)))
    {
        view_data.status_is_error = false;
        view_data.status_token = view_data.status_token.saturating_add(1);
        schedule_status_clear(internal_tx, view_data.status_token);
    }
}

fn should_refresh_view(events: &[AppEvent]) -> bool {
    events.iter().any(|event| {
        matches!(
            event,
            AppEvent::ViewChanged(_) | AppEvent::RetreatOpened(_)
        )
    })
}

fn refresh_view_data<R: AppRuntime>(
    state: &AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) -> Result<()> {
    view_data.retreats = runtime.load_retreats()?;
    view_data.retreat_cursor = view_data
        .retreat_cursor
        .min(view_data.retreats.len().saturating_sub(1));

    let Some(retreat_id) = state.active_retreat else {
        view_data.grid = None;
        return Ok(());
    };
    if state.active_view != ViewKind::Participants {
        return Ok(());
    }

    let rows = runtime.load_participants(retreat_id)?;
    if let Some(grid) = view_data.grid.as_mut()
        && grid.retreat_id() == retreat_id
    {
        grid.apply_refresh(rows);
        return Ok(());
    }

    let mut grid = ParticipantGrid::new(retreat_id, rows, view_data.history_depth);
    grid.set_hide_cancelled(state.hide_cancelled);
    view_data.grid = Some(grid);
    view_data.filter_input = None;
    runtime.watch_retreat(retreat_id, internal_tx.clone())?;
    debug!(retreat = %retreat_id, "participant grid opened");
    Ok(())
}

fn reload_participants<R: AppRuntime>(
    runtime: &mut R,
    view_data: &mut ViewData,
    retreat_id: RetreatId,
) -> Result<bool> {
    let Some(grid) = view_data.grid.as_mut() else {
        return Ok(false);
    };
    if grid.retreat_id() != retreat_id {
        return Ok(false);
    }
    let rows = runtime.load_participants(retreat_id)?;
    Ok(grid.apply_refresh(rows))
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let selected = ViewKind::ALL
        .iter()
        .position(|view| *view == state.active_view)
        .unwrap_or(0);
    let titles = ViewKind::ALL
        .iter()
        .map(|view| view_title(*view, view_data))
        .collect::<Vec<String>>();
    let tabs = Tabs::new(titles)
        .block(Block::default().title("roster").borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(selected);
    frame.render_widget(tabs, layout[0]);

    match state.active_view {
        ViewKind::Retreats => render_retreats(frame, layout[1], view_data),
        ViewKind::Participants => render_participants(frame, layout[1], view_data),
    }

    let status_color = if view_data.status_is_error {
        Color::Red
    } else {
        Color::Yellow
    };
    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(status_color))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout[2]);

    if state.mode == AppMode::Edit
        && let Some(text) = view_data
            .grid
            .as_ref()
            .and_then(|grid| grid.editor())
            .and_then(render_editor_overlay_text)
    {
        let area = centered_rect(40, 50, frame.area());
        frame.render_widget(Clear, area);
        let overlay =
            Paragraph::new(text).block(Block::default().title("choose").borders(Borders::ALL));
        frame.render_widget(overlay, area);
    }

    if state.mode == AppMode::Bulk
        && let Some(grid) = &view_data.grid
    {
        let area = centered_rect(56, 50, frame.area());
        frame.render_widget(Clear, area);
        let overlay = Paragraph::new(render_bulk_overlay_text(grid, &view_data.bulk)).block(
            Block::default()
                .title("bulk edit")
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Cyan)),
        );
        frame.render_widget(overlay, area);
    }

    if let Some(form) = &view_data.form {
        let area = centered_rect(60, 50, frame.area());
        frame.render_widget(Clear, area);
        let title = match (form.kind(), form.editing) {
            (FormKind::Retreat, Some(_)) => "edit retreat",
            (FormKind::Retreat, None) => "new retreat",
            (FormKind::Participant, _) => "add participant",
        };
        let overlay = Paragraph::new(render_form_overlay_text(form))
            .block(Block::default().title(title).borders(Borders::ALL));
        frame.render_widget(overlay, area);
    }

    if view_data.help_visible {
        let area = centered_rect(80, 70, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn view_title(view: ViewKind, view_data: &ViewData) -> String {
    match (view, view_data.active_retreat_name()) {
        (ViewKind::Participants, Some(name)) => format!("{} · {name}", view.label()),
        _ => view.label().to_owned(),
    }
}

fn render_retreats(frame: &mut ratatui::Frame<'_>, area: Rect, view_data: &ViewData) {
    let header = Row::new(
        [
            "name", "dates", "location", "status", "cap", "reg", "conf", "wait", "paid", "in",
        ]
        .into_iter()
        .map(|label| {
            Cell::from(label).style(
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            )
        }),
    );
    let rows = view_data
        .retreats
        .iter()
        .enumerate()
        .map(|(index, summary)| {
            let style = if index == view_data.retreat_cursor {
                Style::default().fg(Color::Black).bg(Color::Cyan)
            } else if summary.retreat.status == RetreatStatus::Archived {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default()
            };
            Row::new(retreat_cells(summary)).style(style)
        });
    let widths = [
        Constraint::Min(16),
        Constraint::Min(10),
        Constraint::Min(10),
        Constraint::Length(8),
        Constraint::Length(5),
        Constraint::Length(5),
        Constraint::Length(5),
        Constraint::Length(5),
        Constraint::Length(5),
        Constraint::Length(5),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(format!("retreats ({})", view_data.retreats.len()))
                .borders(Borders::ALL),
        );
    frame.render_widget(table, area);
}

fn retreat_cells(summary: &RetreatSummary) -> Vec<String> {
    let retreat = &summary.retreat;
    let counts = summary.counts;
    vec![
        retreat.name.clone(),
        retreat.date_range.clone(),
        retreat.location.clone(),
        retreat.status.label().to_owned(),
        retreat.capacity.to_string(),
        counts.total.to_string(),
        counts.confirmed.to_string(),
        counts.waitlisted.to_string(),
        counts.paid.to_string(),
        counts.checked_in.to_string(),
    ]
}

fn render_participants(frame: &mut ratatui::Frame<'_>, area: Rect, view_data: &ViewData) {
    let Some(grid) = &view_data.grid else {
        let empty = Paragraph::new("press enter on a retreat to open its roster")
            .block(Block::default().borders(Borders::ALL).title("participants"));
        frame.render_widget(empty, area);
        return;
    };

    let (cursor_row, cursor_col) = grid.cursor_position();
    let header_cells = std::iter::once(Cell::from(" ")).chain(
        ParticipantGrid::COLUMNS.iter().map(|field| {
            Cell::from(header_label(grid, *field)).style(
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            )
        }),
    );
    let header = Row::new(header_cells);

    let rows = grid
        .visible_rows()
        .into_iter()
        .enumerate()
        .map(|(row_index, participant)| {
            let selected = grid.selection().is_selected(participant.id);
            let marker = if selected { "●" } else { " " };
            let cells = std::iter::once(
                Cell::from(marker).style(Style::default().fg(Color::Yellow)),
            )
            .chain(
                ParticipantGrid::COLUMNS
                    .iter()
                    .enumerate()
                    .map(|(column_index, field)| {
                        let mut style = Style::default();
                        if selected {
                            style = style.fg(Color::Yellow);
                        }
                        if row_index == cursor_row {
                            style = style.bg(Color::DarkGray);
                            if column_index == cursor_col {
                                style = Style::default()
                                    .fg(Color::Black)
                                    .bg(Color::Cyan)
                                    .add_modifier(Modifier::BOLD);
                            }
                        }
                        Cell::from(cell_text(grid, participant, *field)).style(style)
                    }),
            )
            .collect::<Vec<_>>();
            Row::new(cells)
        });

    let widths = std::iter::once(Constraint::Length(1))
        .chain(ParticipantGrid::COLUMNS.iter().map(|_| Constraint::Min(6)))
        .collect::<Vec<_>>();
    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(participants_title(view_data))
                .borders(Borders::ALL),
        );
    frame.render_widget(table, area);
}

fn header_label(grid: &ParticipantGrid, field: ParticipantField) -> String {
    match grid.view().sort {
        Some((sorted, SortDirection::Asc)) if sorted == field => format!("{} ↑", field.label()),
        Some((sorted, SortDirection::Desc)) if sorted == field => format!("{} ↓", field.label()),
        _ => field.label().to_owned(),
    }
}

fn cell_text(grid: &ParticipantGrid, participant: &Participant, field: ParticipantField) -> String {
    if grid
        .focus()
        .is_editing(CellRef::new(participant.id, field))
        && let Some(editor) = grid.editor()
    {
        return match editor {
            EditCell::Text(cell) => format!("{}{EDIT_CARET}", cell.buffer()),
            EditCell::Tags(cell) => format!("{}{EDIT_CARET}", cell.buffer()),
            EditCell::Choice(cell) => cell
                .options()
                .get(cell.highlighted())
                .map(FieldValue::display)
                .unwrap_or_default(),
            EditCell::Dietary(cell) => cell.selection().format(),
        };
    }
    participant.value(field).display()
}

fn participants_title(view_data: &ViewData) -> String {
    let Some(grid) = &view_data.grid else {
        return "participants".to_owned();
    };
    let mut title = format!(
        "participants ({}/{})",
        grid.visible_ids().len(),
        grid.sheet().rows().len()
    );
    if !grid.selection().is_empty() {
        title.push_str(&format!(" · {} selected", grid.selection().len()));
    }
    let filter = grid.view().filter.trim();
    if !filter.is_empty() {
        title.push_str(&format!(" · filter {filter:?}"));
    }
    if grid.view().hide_cancelled {
        title.push_str(" · cancelled hidden");
    }
    if grid.sheet().is_saving() {
        title.push_str(&format!(" · saving {}", grid.sheet().pending_writes()));
    }
    title
}

fn render_editor_overlay_text(editor: &EditCell) -> Option<String> {
    match editor {
        EditCell::Choice(cell) => Some(
            cell.options()
                .iter()
                .enumerate()
                .map(|(index, option)| {
                    let marker = if index == cell.highlighted() { ">" } else { " " };
                    format!("{marker} {}", option.display())
                })
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        EditCell::Dietary(cell) => {
            let mut lines = DietaryToken::ALL
                .iter()
                .map(|token| {
                    let marker = if *token == cell.highlighted() { ">" } else { " " };
                    let check = if cell.selection().contains(*token) {
                        "x"
                    } else {
                        " "
                    };
                    format!("{marker} [{check}] {}", token.as_str())
                })
                .collect::<Vec<_>>();
            lines.push(format!("other: {}{EDIT_CARET}", cell.other_buffer()));
            lines.push("space toggle | type for other | del toggle other | enter save".to_owned());
            Some(lines.join("\n"))
        }
        EditCell::Text(_) | EditCell::Tags(_) => None,
    }
}

fn render_bulk_overlay_text(grid: &ParticipantGrid, bulk: &BulkUiState) -> String {
    let field = cursor_field(grid);
    let mut lines = vec![
        format!("field: {}  (←/→ to change)", field.label()),
        format!("mode: {}  (tab to cycle)", bulk.mode.label()),
        format!("rows: {} selected", grid.selection().len()),
    ];
    if field.kind() == FieldKind::Choice {
        lines.push("value:".to_owned());
        for (index, option) in field.choices().iter().enumerate() {
            let marker = if index == bulk.choice_index { ">" } else { " " };
            lines.push(format!("{marker} {}", option.display()));
        }
    } else {
        lines.push(format!("value: {}{EDIT_CARET}", bulk.input));
    }
    lines.push("enter apply | esc cancel".to_owned());
    lines.join("\n")
}

fn render_form_overlay_text(form: &FormUiState) -> String {
    form_labels(form.kind())
        .iter()
        .enumerate()
        .map(|(index, label)| {
            let value = form.value(index);
            if index == form.field_index {
                format!("> {label}: {value}{EDIT_CARET}")
            } else {
                format!("  {label}: {value}")
            }
        })
        .chain(std::iter::once(
            "tab/shift+tab field | enter save | esc cancel".to_owned(),
        ))
        .collect::<Vec<_>>()
        .join("\n")
}

fn help_overlay_text() -> &'static str {
    "global: ctrl+q quit | tab/shift+tab view | ? help\n\
retreats: j/k move | enter open roster | n new | e edit | o cycle status | r reload\n\
roster: h/j/k/l move | g/G ^/$ ends | ctrl+d/ctrl+u page | enter or i edit cell\n\
roster: x toggle row | X range from anchor | a select visible | A clear visible\n\
roster: b bulk edit selection | u undo | ctrl+r redo | s sort column | / filter\n\
roster: c hide cancelled | n add participant | r reload\n\
edit: type to change | enter save | tab save and move | esc revert\n\
bulk: ←/→ field | tab merge mode | enter apply | esc cancel\n\
form: tab/shift+tab field | enter save | esc cancel"
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    if let Some(filter) = &view_data.filter_input {
        return format!("filter: {filter}{EDIT_CARET} | enter keep | esc clear");
    }

    let mode = match state.mode {
        AppMode::Nav => "NAV",
        AppMode::Edit => "EDIT",
        AppMode::Bulk => "BULK",
        AppMode::Form(_) => "FORM",
    };
    let hints = match (state.mode, state.active_view) {
        (AppMode::Nav, ViewKind::Retreats) => "enter open | n new | e edit | o status | ? help",
        (AppMode::Nav, ViewKind::Participants) => {
            "enter edit | x/X/a select | b bulk | u undo ^r redo | / filter | ? help"
        }
        (AppMode::Edit, _) => "enter save | esc revert",
        (AppMode::Bulk, _) => "tab mode | enter apply | esc cancel",
        (AppMode::Form(_), _) => "enter save | esc cancel",
    };
    match &state.status_line {
        Some(status) => format!("{mode} | {status} | {hints}"),
        None => format!("{mode} | {hints}"),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
