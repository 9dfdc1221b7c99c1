// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{
    AccommodationPlan, AttendanceStatus, Participant, ParticipantId, ParticipantSource,
    PaymentStatus, RegistrationStatus, RetreatId, TransportationPlan,
};
use time::OffsetDateTime;

pub(crate) fn sample_participant(id: i64, name: &str) -> Participant {
    Participant {
        id: ParticipantId::new(id),
        retreat_id: RetreatId::new(1),
        name: name.to_owned(),
        email: format!("{}@example.com", name.to_ascii_lowercase()),
        phone: String::new(),
        dietary: String::new(),
        registration_status: RegistrationStatus::Pending,
        payment_status: PaymentStatus::Unpaid,
        attendance_status: AttendanceStatus::Unknown,
        accommodation: AccommodationPlan::Undecided,
        transportation: TransportationPlan::Undecided,
        arrival_time: String::new(),
        tags: Vec::new(),
        notes: String::new(),
        source: ParticipantSource::Manual,
        added_by: "tester".to_owned(),
        created_at: OffsetDateTime::UNIX_EPOCH,
        updated_at: OffsetDateTime::UNIX_EPOCH,
    }
}

pub(crate) fn sample_rows(names: &[&str]) -> Vec<Participant> {
    names
        .iter()
        .enumerate()
        .map(|(index, name)| sample_participant(index as i64 + 1, name))
        .collect()
}
