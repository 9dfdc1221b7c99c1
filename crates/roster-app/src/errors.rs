// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{ParticipantField, ParticipantId};
use crate::bulk::MergeMode;

/// Rejections raised before any local state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    UnknownRow(ParticipantId),
    WrongKind(ParticipantField),
    NameRequired,
    MergeUnsupported {
        field: ParticipantField,
        mode: MergeMode,
    },
    EmptySelection,
}

impl std::fmt::Display for CommitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownRow(id) => write!(f, "participant {id} is not in this sheet"),
            Self::WrongKind(field) => {
                write!(f, "{} cannot hold that kind of value", field.label())
            }
            Self::NameRequired => f.write_str("name is required -- enter a name and retry"),
            Self::MergeUnsupported { field, mode } => write!(
                f,
                "{} only supports set; {} works on notes, tags, and dietary",
                field.label(),
                mode.label()
            ),
            Self::EmptySelection => f.write_str("no rows selected -- select rows and retry"),
        }
    }
}

impl std::error::Error for CommitError {}

/// Why a persistence call failed, as far as the user needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteFailure {
    Duplicate(String),
    NotFound(ParticipantId),
    Rejected(String),
    Unavailable(String),
}

impl WriteFailure {
    pub fn user_message(&self) -> String {
        match self {
            Self::Duplicate(detail) => {
                format!("already registered: {detail} -- use a different email")
            }
            Self::NotFound(id) => {
                format!("participant {id} no longer exists -- refresh and retry")
            }
            Self::Rejected(detail) => format!("save rejected: {detail}"),
            Self::Unavailable(detail) => format!("save failed: {detail}; change reverted"),
        }
    }
}

impl std::fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate(detail) => write!(f, "duplicate registration: {detail}"),
            Self::NotFound(id) => write!(f, "participant {id} not found"),
            Self::Rejected(detail) => write!(f, "write rejected: {detail}"),
            Self::Unavailable(detail) => write!(f, "write failed: {detail}"),
        }
    }
}

impl std::error::Error for WriteFailure {}
