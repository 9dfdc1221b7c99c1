// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

use crate::ids::*;

/// Declares a closed set of stored values. Every variant has a storage token
/// (`as_str`/`parse`) and a short display label.
macro_rules! choice_enum {
    ($name:ident { $($variant:ident => ($stored:literal, $label:literal)),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $stored),+
                }
            }

            pub const fn label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($stored => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

choice_enum!(RegistrationStatus {
    Pending => ("pending", "pending"),
    Confirmed => ("confirmed", "confirmed"),
    Waitlisted => ("waitlisted", "waitlist"),
    Cancelled => ("cancelled", "cancelled"),
});

choice_enum!(PaymentStatus {
    Unpaid => ("unpaid", "unpaid"),
    Partial => ("partial", "partial"),
    Paid => ("paid", "paid"),
    Refunded => ("refunded", "refunded"),
    Waived => ("waived", "waived"),
});

choice_enum!(AttendanceStatus {
    Unknown => ("unknown", "-"),
    Expected => ("expected", "expected"),
    CheckedIn => ("checked_in", "checked in"),
    NoShow => ("no_show", "no show"),
});

choice_enum!(AccommodationPlan {
    Undecided => ("undecided", "-"),
    Onsite => ("onsite", "onsite"),
    Offsite => ("offsite", "offsite"),
    Commuting => ("commuting", "commuting"),
});

choice_enum!(TransportationPlan {
    Undecided => ("undecided", "-"),
    SelfDrive => ("self_drive", "driving"),
    Carpool => ("carpool", "carpool"),
    Shuttle => ("shuttle", "shuttle"),
    Transit => ("transit", "transit"),
});

choice_enum!(RetreatStatus {
    Open => ("open", "open"),
    Closed => ("closed", "closed"),
    Archived => ("archived", "archived"),
});

choice_enum!(ParticipantSource {
    Manual => ("manual", "manual"),
    PublicForm => ("public_form", "form"),
    Import => ("import", "import"),
});

impl RegistrationStatus {
    /// Registrations that hold a seat against the retreat capacity.
    pub const fn holds_seat(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retreat {
    pub id: RetreatId,
    pub name: String,
    pub date_range: String,
    pub location: String,
    pub capacity: i64,
    pub chat_link: Option<String>,
    pub status: RetreatStatus,
    pub owner_id: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
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
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Current user as reported by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub is_admin: bool,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            user_id: "local".to_owned(),
            display_name: "admin".to_owned(),
            is_admin: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RetreatCounts {
    pub total: usize,
    pub confirmed: usize,
    pub waitlisted: usize,
    pub paid: usize,
    pub checked_in: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Text,
    Choice,
    Dietary,
    Tags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ParticipantField {
    Name,
    Email,
    Phone,
    Dietary,
    RegistrationStatus,
    PaymentStatus,
    AttendanceStatus,
    Accommodation,
    Transportation,
    ArrivalTime,
    Tags,
    Notes,
}

impl ParticipantField {
    pub const ALL: [Self; 12] = [
        Self::Name,
        Self::Email,
        Self::Phone,
        Self::Dietary,
        Self::RegistrationStatus,
        Self::PaymentStatus,
        Self::AttendanceStatus,
        Self::Accommodation,
        Self::Transportation,
        Self::ArrivalTime,
        Self::Tags,
        Self::Notes,
    ];

    /// Column name in storage and in write payloads.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Dietary => "dietary",
            Self::RegistrationStatus => "registration_status",
            Self::PaymentStatus => "payment_status",
            Self::AttendanceStatus => "attendance_status",
            Self::Accommodation => "accommodation",
            Self::Transportation => "transportation",
            Self::ArrivalTime => "arrival_time",
            Self::Tags => "tags",
            Self::Notes => "notes",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == value)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Dietary => "dietary",
            Self::RegistrationStatus => "reg",
            Self::PaymentStatus => "payment",
            Self::AttendanceStatus => "attendance",
            Self::Accommodation => "lodging",
            Self::Transportation => "travel",
            Self::ArrivalTime => "arrival",
            Self::Tags => "tags",
            Self::Notes => "notes",
        }
    }

    pub const fn kind(self) -> FieldKind {
        match self {
            Self::Name | Self::Email | Self::Phone | Self::ArrivalTime | Self::Notes => {
                FieldKind::Text
            }
            Self::Dietary => FieldKind::Dietary,
            Self::Tags => FieldKind::Tags,
            Self::RegistrationStatus
            | Self::PaymentStatus
            | Self::AttendanceStatus
            | Self::Accommodation
            | Self::Transportation => FieldKind::Choice,
        }
    }

    /// Fields that accept append/prepend in bulk edits.
    pub const fn accumulates(self) -> bool {
        matches!(self, Self::Notes | Self::Tags | Self::Dietary)
    }

    /// Every selectable value for enumerated fields, in display order.
    pub fn choices(self) -> Vec<FieldValue> {
        match self {
            Self::RegistrationStatus => RegistrationStatus::ALL
                .iter()
                .copied()
                .map(FieldValue::Registration)
                .collect(),
            Self::PaymentStatus => PaymentStatus::ALL
                .iter()
                .copied()
                .map(FieldValue::Payment)
                .collect(),
            Self::AttendanceStatus => AttendanceStatus::ALL
                .iter()
                .copied()
                .map(FieldValue::Attendance)
                .collect(),
            Self::Accommodation => AccommodationPlan::ALL
                .iter()
                .copied()
                .map(FieldValue::Accommodation)
                .collect(),
            Self::Transportation => TransportationPlan::ALL
                .iter()
                .copied()
                .map(FieldValue::Transportation)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether `value` has the shape this field stores.
    pub fn accepts(self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (
                Self::Name
                    | Self::Email
                    | Self::Phone
                    | Self::Dietary
                    | Self::ArrivalTime
                    | Self::Notes,
                FieldValue::Text(_)
            ) | (Self::RegistrationStatus, FieldValue::Registration(_))
                | (Self::PaymentStatus, FieldValue::Payment(_))
                | (Self::AttendanceStatus, FieldValue::Attendance(_))
                | (Self::Accommodation, FieldValue::Accommodation(_))
                | (Self::Transportation, FieldValue::Transportation(_))
                | (Self::Tags, FieldValue::Tags(_))
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Registration(RegistrationStatus),
    Payment(PaymentStatus),
    Attendance(AttendanceStatus),
    Accommodation(AccommodationPlan),
    Transportation(TransportationPlan),
    Tags(Vec<String>),
}

impl FieldValue {
    pub fn display(&self) -> String {
        match self {
            Self::Text(value) => value.clone(),
            Self::Registration(status) => status.label().to_owned(),
            Self::Payment(status) => status.label().to_owned(),
            Self::Attendance(status) => status.label().to_owned(),
            Self::Accommodation(plan) => plan.label().to_owned(),
            Self::Transportation(plan) => plan.label().to_owned(),
            Self::Tags(tags) => tags.join(", "),
        }
    }

    /// Value as written to storage; tags are handled by the store itself.
    pub fn storage_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Registration(status) => Some(status.as_str()),
            Self::Payment(status) => Some(status.as_str()),
            Self::Attendance(status) => Some(status.as_str()),
            Self::Accommodation(plan) => Some(plan.as_str()),
            Self::Transportation(plan) => Some(plan.as_str()),
            Self::Tags(_) => None,
        }
    }
}

impl Participant {
    pub fn value(&self, field: ParticipantField) -> FieldValue {
        match field {
            ParticipantField::Name => FieldValue::Text(self.name.clone()),
            ParticipantField::Email => FieldValue::Text(self.email.clone()),
            ParticipantField::Phone => FieldValue::Text(self.phone.clone()),
            ParticipantField::Dietary => FieldValue::Text(self.dietary.clone()),
            ParticipantField::RegistrationStatus => {
                FieldValue::Registration(self.registration_status)
            }
            ParticipantField::PaymentStatus => FieldValue::Payment(self.payment_status),
            ParticipantField::AttendanceStatus => FieldValue::Attendance(self.attendance_status),
            ParticipantField::Accommodation => FieldValue::Accommodation(self.accommodation),
            ParticipantField::Transportation => FieldValue::Transportation(self.transportation),
            ParticipantField::ArrivalTime => FieldValue::Text(self.arrival_time.clone()),
            ParticipantField::Tags => FieldValue::Tags(self.tags.clone()),
            ParticipantField::Notes => FieldValue::Text(self.notes.clone()),
        }
    }

    pub fn apply(&mut self, field: ParticipantField, value: FieldValue) -> Result<()> {
        match (field, value) {
            (ParticipantField::Name, FieldValue::Text(value)) => self.name = value,
            (ParticipantField::Email, FieldValue::Text(value)) => self.email = value,
            (ParticipantField::Phone, FieldValue::Text(value)) => self.phone = value,
            (ParticipantField::Dietary, FieldValue::Text(value)) => self.dietary = value,
            (ParticipantField::RegistrationStatus, FieldValue::Registration(status)) => {
                self.registration_status = status;
            }
            (ParticipantField::PaymentStatus, FieldValue::Payment(status)) => {
                self.payment_status = status;
            }
            (ParticipantField::AttendanceStatus, FieldValue::Attendance(status)) => {
                self.attendance_status = status;
            }
            (ParticipantField::Accommodation, FieldValue::Accommodation(plan)) => {
                self.accommodation = plan;
            }
            (ParticipantField::Transportation, FieldValue::Transportation(plan)) => {
                self.transportation = plan;
            }
            (ParticipantField::ArrivalTime, FieldValue::Text(value)) => self.arrival_time = value,
            (ParticipantField::Tags, FieldValue::Tags(tags)) => self.tags = tags,
            (ParticipantField::Notes, FieldValue::Text(value)) => self.notes = value,
            (field, value) => bail!(
                "field {} cannot hold {:?} -- pick a value of the right kind",
                field.as_str(),
                value
            ),
        }
        Ok(())
    }
}

/// The changed fields of one participant row, keyed by column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantPatch {
    pub participant_id: ParticipantId,
    pub changes: BTreeMap<ParticipantField, FieldValue>,
}

impl ParticipantPatch {
    pub fn new(participant_id: ParticipantId) -> Self {
        Self {
            participant_id,
            changes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: ParticipantField, value: FieldValue) -> Self {
        self.changes.insert(field, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = ParticipantField> + '_ {
        self.changes.keys().copied()
    }

    pub fn apply_to(&self, participant: &mut Participant) -> Result<()> {
        for (field, value) in &self.changes {
            participant.apply(*field, value.clone())?;
        }
        Ok(())
    }

    /// Field-level difference between two versions of the same row.
    pub fn diff(before: &Participant, after: &Participant) -> Self {
        let mut patch = Self::new(after.id);
        for field in ParticipantField::ALL {
            let value = after.value(field);
            if before.value(field) != value {
                patch.changes.insert(field, value);
            }
        }
        patch
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewKind {
    Retreats,
    Participants,
}

impl ViewKind {
    pub const ALL: [Self; 2] = [Self::Retreats, Self::Participants];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Retreats => "retreats",
            Self::Participants => "participants",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormKind {
    Retreat,
    Participant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppMode {
    Nav,
    Edit,
    Bulk,
    Form(FormKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[cfg(test)]
mod tests {
    use super::{
        AccommodationPlan, FieldValue, ParticipantField, ParticipantPatch, PaymentStatus,
        RegistrationStatus,
    };
    use crate::testing::sample_participant;

    #[test]
    fn choice_values_round_trip_through_storage_tokens() {
        for status in RegistrationStatus::ALL {
            assert_eq!(RegistrationStatus::parse(status.as_str()), Some(*status));
        }
        assert_eq!(PaymentStatus::parse("bogus"), None);
        assert_eq!(AccommodationPlan::parse("onsite"), Some(AccommodationPlan::Onsite));
    }

    #[test]
    fn field_names_parse_back() {
        for field in ParticipantField::ALL {
            assert_eq!(ParticipantField::parse(field.as_str()), Some(field));
        }
        assert_eq!(ParticipantField::parse("id"), None);
    }

    #[test]
    fn apply_rejects_wrong_value_kind() {
        let mut participant = sample_participant(1, "Ana");
        let error = participant
            .apply(
                ParticipantField::PaymentStatus,
                FieldValue::Text("paid".to_owned()),
            )
            .expect_err("text is not a payment status");
        assert!(error.to_string().contains("payment_status"));
        assert_eq!(participant.payment_status, PaymentStatus::Unpaid);
    }

    #[test]
    fn accepts_matches_apply() {
        let participant = sample_participant(1, "Ana");
        for field in ParticipantField::ALL {
            assert!(field.accepts(&participant.value(field)), "{field:?}");
        }
        assert!(!ParticipantField::Tags.accepts(&FieldValue::Text("a".to_owned())));
    }

    #[test]
    fn diff_lists_only_changed_fields() {
        let before = sample_participant(3, "Ana");
        let mut after = before.clone();
        after.notes = "late".to_owned();
        after.payment_status = PaymentStatus::Paid;

        let patch = ParticipantPatch::diff(&before, &after);
        assert_eq!(
            patch.fields().collect::<Vec<_>>(),
            vec![ParticipantField::PaymentStatus, ParticipantField::Notes]
        );

        let mut replayed = before.clone();
        patch.apply_to(&mut replayed).expect("apply diff");
        assert_eq!(replayed, after);
    }

    #[test]
    fn only_notes_tags_and_dietary_accumulate() {
        let accumulating = ParticipantField::ALL
            .into_iter()
            .filter(|field| field.accumulates())
            .collect::<Vec<_>>();
        assert_eq!(
            accumulating,
            vec![
                ParticipantField::Dietary,
                ParticipantField::Tags,
                ParticipantField::Notes
            ]
        );
    }
}
