// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod bulk;
pub mod dietary;
pub mod dispatch;
pub mod edit_cell;
pub mod errors;
pub mod forms;
pub mod grid;
pub mod ids;
pub mod model;
pub mod selection;
pub mod sheet;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use bulk::{BulkDispatch, BulkReport, MergeMode, merge_value};
pub use dietary::{DietarySelection, DietaryToken};
pub use dispatch::{
    BatchId, Completion, Notice, NoticeLevel, ParticipantSheet, WriteRequest, WriteTicket,
};
pub use edit_cell::{CellOutcome, CellRef, EditCell, EditFocus};
pub use errors::{CommitError, WriteFailure};
pub use forms::*;
pub use grid::{GridView, ParticipantGrid};
pub use ids::*;
pub use model::*;
pub use selection::SelectionManager;
pub use sheet::{DEFAULT_HISTORY_DEPTH, SheetState};
pub use state::*;
