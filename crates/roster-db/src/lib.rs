// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use roster_app::{
    AccommodationPlan, AttendanceStatus, FieldValue, Participant, ParticipantField,
    ParticipantFormInput, ParticipantId, ParticipantPatch, ParticipantSource, PaymentStatus,
    RegistrationFormInput, RegistrationStatus, Retreat, RetreatCounts, RetreatFormInput,
    RetreatId, RetreatStatus, TransportationPlan, WriteFailure,
};
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params, params_from_iter};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tracing::{debug, info};

pub const APP_NAME: &str = "roster";

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    (
        "retreats",
        &[
            "id",
            "name",
            "date_range",
            "location",
            "capacity",
            "chat_link",
            "status",
            "owner_id",
            "created_at",
            "updated_at",
        ],
    ),
    (
        "participants",
        &[
            "id",
            "retreat_id",
            "name",
            "email",
            "phone",
            "dietary",
            "registration_status",
            "payment_status",
            "attendance_status",
            "accommodation",
            "transportation",
            "arrival_time",
            "tags",
            "notes",
            "source",
            "added_by",
            "created_at",
            "updated_at",
        ],
    ),
    ("retreat_revisions", &["retreat_id", "revision"]),
];

struct RequiredIndex {
    name: &'static str,
    create_sql: &'static str,
}

const REQUIRED_INDEXES: &[RequiredIndex] = &[
    RequiredIndex {
        name: "idx_participants_retreat_id",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_participants_retreat_id ON participants (retreat_id);",
    },
    RequiredIndex {
        name: "idx_participants_retreat_email",
        create_sql: "CREATE UNIQUE INDEX IF NOT EXISTS idx_participants_retreat_email ON participants (retreat_id, lower(email)) WHERE email <> '';",
    },
];

const REQUIRED_TRIGGERS: [&str; 3] = [
    "trg_participants_insert_revision",
    "trg_participants_update_revision",
    "trg_participants_delete_revision",
];

const PARTICIPANT_COLUMNS: &str = "
    id, retreat_id, name, email, phone, dietary,
    registration_status, payment_status, attendance_status,
    accommodation, transportation, arrival_time, tags, notes,
    source, added_by, created_at, updated_at
";

const RETREAT_COLUMNS: &str = "
    id, name, date_range, location, capacity, chat_link,
    status, owner_id, created_at, updated_at
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRetreat {
    pub name: String,
    pub date_range: String,
    pub location: String,
    pub capacity: i64,
    pub chat_link: Option<String>,
    pub status: RetreatStatus,
    pub owner_id: String,
}

impl NewRetreat {
    pub fn from_form(form: &RetreatFormInput, owner_id: &str) -> Self {
        Self {
            name: form.name.trim().to_owned(),
            date_range: form.date_range.trim().to_owned(),
            location: form.location.trim().to_owned(),
            capacity: form.capacity,
            chat_link: form.chat_link(),
            status: form.status,
            owner_id: owner_id.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRetreat {
    pub name: String,
    pub date_range: String,
    pub location: String,
    pub capacity: i64,
    pub chat_link: Option<String>,
    pub status: RetreatStatus,
}

impl From<&RetreatFormInput> for UpdateRetreat {
    fn from(form: &RetreatFormInput) -> Self {
        Self {
            name: form.name.trim().to_owned(),
            date_range: form.date_range.trim().to_owned(),
            location: form.location.trim().to_owned(),
            capacity: form.capacity,
            chat_link: form.chat_link(),
            status: form.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParticipant {
    pub retreat_id: RetreatId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub dietary: String,
    pub registration_status: RegistrationStatus,
    pub payment_status: PaymentStatus,
    pub attendance_status: AttendanceStatus,
    pub accommodation: AccommodationPlan,
    pub transportation: TransportationPlan,
    pub arrival_time: String,
    pub tags: Vec<String>,
    pub notes: String,
    pub source: ParticipantSource,
    pub added_by: String,
}

impl NewParticipant {
    /// A manual add from the admin grid, attributed to `added_by`.
    pub fn from_form(form: &ParticipantFormInput, added_by: &str) -> Self {
        Self {
            retreat_id: form.retreat_id,
            name: form.name.trim().to_owned(),
            email: form.email.trim().to_owned(),
            phone: form.phone.trim().to_owned(),
            dietary: form.normalized_dietary(),
            registration_status: form.registration_status,
            payment_status: PaymentStatus::Unpaid,
            attendance_status: AttendanceStatus::Unknown,
            accommodation: form.accommodation,
            transportation: form.transportation,
            arrival_time: String::new(),
            tags: form.tag_list(),
            notes: form.notes.trim().to_owned(),
            source: ParticipantSource::Manual,
            added_by: added_by.to_owned(),
        }
    }
}

/// Result of a public self-service registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub participant_id: ParticipantId,
    pub status: RegistrationStatus,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")?;
            info!("created roster schema");
        }

        ensure_required_indexes(&self.conn)?;
        Ok(())
    }

    pub fn create_retreat(&self, retreat: &NewRetreat) -> Result<RetreatId> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO retreats (
                  name, date_range, location, capacity, chat_link,
                  status, owner_id, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
                params![
                    retreat.name,
                    retreat.date_range,
                    retreat.location,
                    retreat.capacity,
                    retreat.chat_link,
                    retreat.status.as_str(),
                    retreat.owner_id,
                    now,
                    now,
                ],
            )
            .context("insert retreat")?;

        let id = RetreatId::new(self.conn.last_insert_rowid());
        debug!(retreat = %id, "retreat created");
        Ok(id)
    }

    pub fn update_retreat(&self, retreat_id: RetreatId, update: &UpdateRetreat) -> Result<()> {
        let now = now_rfc3339()?;
        let rows_affected = self
            .conn
            .execute(
                "
                UPDATE retreats
                SET
                  name = ?,
                  date_range = ?,
                  location = ?,
                  capacity = ?,
                  chat_link = ?,
                  status = ?,
                  updated_at = ?
                WHERE id = ?
                ",
                params![
                    update.name,
                    update.date_range,
                    update.location,
                    update.capacity,
                    update.chat_link,
                    update.status.as_str(),
                    now,
                    retreat_id.get(),
                ],
            )
            .context("update retreat")?;
        if rows_affected == 0 {
            bail!("retreat {retreat_id} not found -- choose an existing retreat and retry");
        }
        Ok(())
    }

    pub fn set_retreat_status(&self, retreat_id: RetreatId, status: RetreatStatus) -> Result<()> {
        let now = now_rfc3339()?;
        let rows_affected = self
            .conn
            .execute(
                "UPDATE retreats SET status = ?, updated_at = ? WHERE id = ?",
                params![status.as_str(), now, retreat_id.get()],
            )
            .with_context(|| format!("set retreat {retreat_id} status"))?;
        if rows_affected == 0 {
            bail!("retreat {retreat_id} not found -- choose an existing retreat and retry");
        }
        info!(retreat = %retreat_id, status = status.as_str(), "retreat status changed");
        Ok(())
    }

    pub fn get_retreat(&self, retreat_id: RetreatId) -> Result<Retreat> {
        self.conn
            .query_row(
                &format!("SELECT {RETREAT_COLUMNS} FROM retreats WHERE id = ?"),
                params![retreat_id.get()],
                retreat_from_row,
            )
            .optional()
            .with_context(|| format!("load retreat {retreat_id}"))?
            .ok_or_else(|| anyhow!("retreat {retreat_id} not found -- choose an existing retreat"))
    }

    pub fn list_retreats(&self) -> Result<Vec<Retreat>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {RETREAT_COLUMNS} FROM retreats ORDER BY created_at DESC, id DESC"
            ))
            .context("prepare retreats query")?;
        let rows = stmt
            .query_map([], retreat_from_row)
            .context("query retreats")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect retreats")
    }

    pub fn list_participants(&self, retreat_id: RetreatId) -> Result<Vec<Participant>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE retreat_id = ? ORDER BY id ASC"
            ))
            .context("prepare participants query")?;
        let rows = stmt
            .query_map(params![retreat_id.get()], participant_from_row)
            .context("query participants")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("collect participants for retreat {retreat_id}"))
    }

    pub fn get_participant(&self, participant_id: ParticipantId) -> Result<Participant> {
        self.conn
            .query_row(
                &format!("SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE id = ?"),
                params![participant_id.get()],
                participant_from_row,
            )
            .optional()
            .with_context(|| format!("load participant {participant_id}"))?
            .ok_or_else(|| anyhow::Error::new(WriteFailure::NotFound(participant_id)))
    }

    pub fn insert_participant(&self, participant: &NewParticipant) -> Result<ParticipantId> {
        if participant.name.trim().is_empty() {
            bail!("participant name is required -- enter a name and retry");
        }
        let now = now_rfc3339()?;
        let tags = encode_tags(&participant.tags)?;
        let result = self.conn.execute(
            "
            INSERT INTO participants (
              retreat_id, name, email, phone, dietary,
              registration_status, payment_status, attendance_status,
              accommodation, transportation, arrival_time, tags, notes,
              source, added_by, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                participant.retreat_id.get(),
                participant.name,
                participant.email,
                participant.phone,
                participant.dietary,
                participant.registration_status.as_str(),
                participant.payment_status.as_str(),
                participant.attendance_status.as_str(),
                participant.accommodation.as_str(),
                participant.transportation.as_str(),
                participant.arrival_time,
                tags,
                participant.notes,
                participant.source.as_str(),
                participant.added_by,
                now,
                now,
            ],
        );
        match result {
            Ok(_) => {}
            Err(error) if is_unique_violation(&error) => {
                return Err(anyhow::Error::new(WriteFailure::Duplicate(
                    participant.email.clone(),
                )));
            }
            Err(error) => return Err(error).context("insert participant"),
        }

        let id = ParticipantId::new(self.conn.last_insert_rowid());
        debug!(participant = %id, retreat = %participant.retreat_id, "participant inserted");
        Ok(id)
    }

    /// Writes only the fields present in `patch`. Failures a caller may want
    /// to branch on carry a [`WriteFailure`]; see [`classify_write_error`].
    pub fn update_participant(&self, patch: &ParticipantPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let participant_id = patch.participant_id;

        let mut assignments = Vec::with_capacity(patch.changes.len() + 1);
        let mut values: Vec<Value> = Vec::with_capacity(patch.changes.len() + 2);
        for (field, value) in &patch.changes {
            if !field.accepts(value) {
                bail!(
                    "field {} cannot hold {} -- pick a value of the right kind",
                    field.as_str(),
                    value.display()
                );
            }
            assignments.push(format!("{} = ?", field.as_str()));
            values.push(Value::Text(storage_value(value)?));
        }
        assignments.push("updated_at = ?".to_owned());
        values.push(Value::Text(now_rfc3339()?));
        values.push(Value::Integer(participant_id.get()));

        let sql = format!(
            "UPDATE participants SET {} WHERE id = ?",
            assignments.join(", ")
        );
        let rows_affected = match self.conn.execute(&sql, params_from_iter(values)) {
            Ok(rows) => rows,
            Err(error) if is_unique_violation(&error) => {
                let email = match patch.changes.get(&ParticipantField::Email) {
                    Some(FieldValue::Text(email)) => email.clone(),
                    _ => "that email".to_owned(),
                };
                return Err(anyhow::Error::new(WriteFailure::Duplicate(email)));
            }
            Err(error) => {
                return Err(error).with_context(|| format!("update participant {participant_id}"));
            }
        };
        if rows_affected == 0 {
            return Err(anyhow::Error::new(WriteFailure::NotFound(participant_id)));
        }
        debug!(
            participant = %participant_id,
            fields = patch.changes.len(),
            "participant updated"
        );
        Ok(())
    }

    pub fn delete_participant(&self, participant_id: ParticipantId) -> Result<()> {
        let rows_affected = self
            .conn
            .execute(
                "DELETE FROM participants WHERE id = ?",
                params![participant_id.get()],
            )
            .with_context(|| format!("delete participant {participant_id}"))?;
        if rows_affected == 0 {
            return Err(anyhow::Error::new(WriteFailure::NotFound(participant_id)));
        }
        info!(participant = %participant_id, "participant deleted");
        Ok(())
    }

    /// Public self-service registration. Only open retreats accept it; once
    /// pending plus confirmed registrations reach capacity, new registrants
    /// are waitlisted.
    pub fn register_participant(&self, form: &RegistrationFormInput) -> Result<Registration> {
        form.validate()?;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin registration transaction")?;

        let retreat = self.get_retreat(form.retreat_id)?;
        if retreat.status != RetreatStatus::Open {
            bail!(
                "retreat {:?} is {} and not accepting registrations",
                retreat.name,
                retreat.status.label()
            );
        }

        let held_seats: i64 = tx
            .query_row(
                "
                SELECT COUNT(*)
                FROM participants
                WHERE retreat_id = ?
                  AND registration_status IN ('pending', 'confirmed')
                ",
                params![form.retreat_id.get()],
                |row| row.get(0),
            )
            .context("count held seats")?;
        let status = if held_seats >= retreat.capacity {
            RegistrationStatus::Waitlisted
        } else {
            RegistrationStatus::Pending
        };

        let participant_id = self.insert_participant(&NewParticipant {
            retreat_id: form.retreat_id,
            name: form.name.trim().to_owned(),
            email: form.email.trim().to_owned(),
            phone: form.phone.trim().to_owned(),
            dietary: form.normalized_dietary(),
            registration_status: status,
            payment_status: PaymentStatus::Unpaid,
            attendance_status: AttendanceStatus::Unknown,
            accommodation: AccommodationPlan::Undecided,
            transportation: TransportationPlan::Undecided,
            arrival_time: String::new(),
            tags: Vec::new(),
            notes: String::new(),
            source: ParticipantSource::PublicForm,
            added_by: String::new(),
        })?;
        tx.commit().context("commit registration")?;

        info!(
            participant = %participant_id,
            retreat = %form.retreat_id,
            status = status.as_str(),
            "public registration accepted"
        );
        Ok(Registration {
            participant_id,
            status,
        })
    }

    /// Monotonic change counter for one retreat's roster.
    pub fn retreat_revision(&self, retreat_id: RetreatId) -> Result<i64> {
        self.conn
            .query_row(
                "
                SELECT COALESCE(
                  (SELECT revision FROM retreat_revisions WHERE retreat_id = ?),
                  0
                )
                ",
                params![retreat_id.get()],
                |row| row.get(0),
            )
            .with_context(|| format!("read revision for retreat {retreat_id}"))
    }

    pub fn retreat_counts(&self, retreat_id: RetreatId) -> Result<RetreatCounts> {
        let (total, confirmed, waitlisted, paid, checked_in): (i64, i64, i64, i64, i64) = self
            .conn
            .query_row(
                "
                SELECT
                  COUNT(*),
                  COALESCE(SUM(registration_status = 'confirmed'), 0),
                  COALESCE(SUM(registration_status = 'waitlisted'), 0),
                  COALESCE(SUM(payment_status = 'paid'), 0),
                  COALESCE(SUM(attendance_status = 'checked_in'), 0)
                FROM participants
                WHERE retreat_id = ?
                ",
                params![retreat_id.get()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .with_context(|| format!("count participants for retreat {retreat_id}"))?;

        Ok(RetreatCounts {
            total: usize::try_from(total).unwrap_or(0),
            confirmed: usize::try_from(confirmed).unwrap_or(0),
            waitlisted: usize::try_from(waitlisted).unwrap_or(0),
            paid: usize::try_from(paid).unwrap_or(0),
            checked_in: usize::try_from(checked_in).unwrap_or(0),
        })
    }
}

/// Maps a persistence error onto what the edit engine needs to know.
pub fn classify_write_error(error: &anyhow::Error) -> WriteFailure {
    for cause in error.chain() {
        if let Some(failure) = cause.downcast_ref::<WriteFailure>() {
            return failure.clone();
        }
        if let Some(rusqlite::Error::SqliteFailure(sqlite, message)) =
            cause.downcast_ref::<rusqlite::Error>()
        {
            let detail = message.clone().unwrap_or_else(|| sqlite.to_string());
            return match sqlite.code {
                ErrorCode::ConstraintViolation
                    if sqlite.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    WriteFailure::Duplicate(detail)
                }
                ErrorCode::ConstraintViolation => WriteFailure::Rejected(detail),
                _ => WriteFailure::Unavailable(detail),
            };
        }
    }
    WriteFailure::Unavailable(format!("{error:#}"))
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("ROSTER_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set ROSTER_DB_PATH to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("roster.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(sqlite, _)
            if sqlite.code == ErrorCode::ConstraintViolation
                && sqlite.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn storage_value(value: &FieldValue) -> Result<String> {
    match value {
        FieldValue::Tags(tags) => encode_tags(tags),
        other => other
            .storage_text()
            .map(str::to_owned)
            .ok_or_else(|| anyhow!("value {} has no storage form", other.display())),
    }
}

fn encode_tags(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags).context("encode tags")
}

fn retreat_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Retreat> {
    let status_raw: String = row.get(6)?;
    let created_at_raw: String = row.get(8)?;
    let updated_at_raw: String = row.get(9)?;
    Ok(Retreat {
        id: RetreatId::new(row.get(0)?),
        name: row.get(1)?,
        date_range: row.get(2)?,
        location: row.get(3)?,
        capacity: row.get(4)?,
        chat_link: row.get(5)?,
        status: parse_stored(6, &status_raw, "retreat status", RetreatStatus::parse)?,
        owner_id: row.get(7)?,
        created_at: parse_datetime(&created_at_raw).map_err(to_sql_error)?,
        updated_at: parse_datetime(&updated_at_raw).map_err(to_sql_error)?,
    })
}

fn participant_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
    let registration_raw: String = row.get(6)?;
    let payment_raw: String = row.get(7)?;
    let attendance_raw: String = row.get(8)?;
    let accommodation_raw: String = row.get(9)?;
    let transportation_raw: String = row.get(10)?;
    let tags_raw: String = row.get(12)?;
    let source_raw: String = row.get(14)?;
    let created_at_raw: String = row.get(16)?;
    let updated_at_raw: String = row.get(17)?;

    let tags: Vec<String> = serde_json::from_str(&tags_raw)
        .with_context(|| format!("decode tags {tags_raw:?}"))
        .map_err(to_sql_error)?;

    Ok(Participant {
        id: ParticipantId::new(row.get(0)?),
        retreat_id: RetreatId::new(row.get(1)?),
        name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        dietary: row.get(5)?,
        registration_status: parse_stored(
            6,
            &registration_raw,
            "registration status",
            RegistrationStatus::parse,
        )?,
        payment_status: parse_stored(7, &payment_raw, "payment status", PaymentStatus::parse)?,
        attendance_status: parse_stored(
            8,
            &attendance_raw,
            "attendance status",
            AttendanceStatus::parse,
        )?,
        accommodation: parse_stored(
            9,
            &accommodation_raw,
            "accommodation",
            AccommodationPlan::parse,
        )?,
        transportation: parse_stored(
            10,
            &transportation_raw,
            "transportation",
            TransportationPlan::parse,
        )?,
        arrival_time: row.get(11)?,
        tags,
        notes: row.get(13)?,
        source: parse_stored(14, &source_raw, "participant source", ParticipantSource::parse)?,
        added_by: row.get(15)?,
        created_at: parse_datetime(&created_at_raw).map_err(to_sql_error)?,
        updated_at: parse_datetime(&updated_at_raw).map_err(to_sql_error)?,
    })
}

fn parse_stored<T>(
    column: usize,
    raw: &str,
    what: &str,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown {what} {raw}"),
            )),
        )
    })
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        if !table_exists(conn, table)? {
            bail!(
                "database is missing required table `{table}`; use a roster database or migrate first"
            );
        }

        let columns = table_columns(conn, table)?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();

        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}; run migration before launching",
                missing.join(", ")
            );
        }
    }

    let triggers = schema_object_names(conn, "trigger")?;
    let missing: Vec<&str> = REQUIRED_TRIGGERS
        .into_iter()
        .filter(|name| !triggers.contains(*name))
        .collect();
    if !missing.is_empty() {
        bail!(
            "database is missing change-feed triggers: {}; run migration before launching",
            missing.join(", ")
        );
    }

    Ok(())
}

fn ensure_required_indexes(conn: &Connection) -> Result<()> {
    for index in REQUIRED_INDEXES {
        conn.execute_batch(index.create_sql)
            .with_context(|| format!("ensure required index `{}`", index.name))?;
    }

    let existing_indexes = schema_object_names(conn, "index")?;
    let missing = REQUIRED_INDEXES
        .iter()
        .filter(|index| !existing_indexes.contains(index.name))
        .map(|index| index.name)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        bail!(
            "database is missing required indexes: {}; run migration before launching",
            missing.join(", ")
        );
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            )
            ",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    let names = rows
        .collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))?;
    Ok(names)
}

fn schema_object_names(conn: &Connection, kind: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(
            "
            SELECT name
            FROM sqlite_master
            WHERE type = ?
              AND name NOT LIKE 'sqlite_%'
            ORDER BY name ASC
            ",
        )
        .with_context(|| format!("prepare {kind} names query"))?;
    let rows = stmt
        .query_map(params![kind], |row| row.get::<_, String>(0))
        .with_context(|| format!("query {kind} names"))?;
    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect {kind} names"))
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}

fn parse_datetime(raw: &str) -> Result<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(value);
    }

    if let Ok(value) = time::PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    ) {
        return Ok(value.assume_utc());
    }

    bail!("unsupported datetime format {raw:?}")
}

fn to_sql_error(error: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            error.to_string(),
        )),
    )
}
