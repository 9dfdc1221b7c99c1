// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};

use crate::dietary::DietarySelection;
use crate::edit_cell::parse_tags;
use crate::{
    AccommodationPlan, FormKind, RegistrationStatus, Retreat, RetreatId, RetreatStatus,
    TransportationPlan,
};

/// Manual add from the admin grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantFormInput {
    pub retreat_id: RetreatId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub dietary: String,
    pub registration_status: RegistrationStatus,
    pub accommodation: AccommodationPlan,
    pub transportation: TransportationPlan,
    pub tags: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetreatFormInput {
    pub name: String,
    pub date_range: String,
    pub location: String,
    pub capacity: i64,
    pub chat_link: String,
    pub status: RetreatStatus,
}

/// Public self-service registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationFormInput {
    pub retreat_id: RetreatId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub dietary: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPayload {
    Retreat(RetreatFormInput),
    Participant(ParticipantFormInput),
}

impl FormPayload {
    pub fn kind(&self) -> FormKind {
        match self {
            Self::Retreat(_) => FormKind::Retreat,
            Self::Participant(_) => FormKind::Participant,
        }
    }

    /// Participant forms need the retreat they add to.
    pub fn blank_for(kind: FormKind, retreat_id: Option<RetreatId>) -> Option<Self> {
        match kind {
            FormKind::Retreat => Some(Self::Retreat(RetreatFormInput {
                name: String::new(),
                date_range: String::new(),
                location: String::new(),
                capacity: 0,
                chat_link: String::new(),
                status: RetreatStatus::Open,
            })),
            FormKind::Participant => retreat_id.map(|retreat_id| {
                Self::Participant(ParticipantFormInput {
                    retreat_id,
                    name: String::new(),
                    email: String::new(),
                    phone: String::new(),
                    dietary: String::new(),
                    registration_status: RegistrationStatus::Pending,
                    accommodation: AccommodationPlan::Undecided,
                    transportation: TransportationPlan::Undecided,
                    tags: String::new(),
                    notes: String::new(),
                })
            }),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Retreat(retreat) => retreat.validate(),
            Self::Participant(participant) => participant.validate(),
        }
    }
}

fn validate_email(email: &str, required: bool) -> Result<()> {
    let email = email.trim();
    if email.is_empty() {
        if required {
            bail!("email is required -- enter an email address and retry");
        }
        return Ok(());
    }
    if !email.contains('@') {
        bail!("email {email:?} is not an address -- include an @ and retry");
    }
    Ok(())
}

impl ParticipantFormInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("participant name is required -- enter a name and retry");
        }
        validate_email(&self.email, false)?;
        Ok(())
    }

    pub fn tag_list(&self) -> Vec<String> {
        parse_tags(&self.tags)
    }

    pub fn normalized_dietary(&self) -> String {
        DietarySelection::parse(&self.dietary).format()
    }
}

impl RetreatFormInput {
    pub fn from_retreat(retreat: &Retreat) -> Self {
        Self {
            name: retreat.name.clone(),
            date_range: retreat.date_range.clone(),
            location: retreat.location.clone(),
            capacity: retreat.capacity,
            chat_link: retreat.chat_link.clone().unwrap_or_default(),
            status: retreat.status,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("retreat name is required -- enter a name and retry");
        }
        if self.capacity < 0 {
            bail!("retreat capacity cannot be negative -- enter 0 or more");
        }
        let link = self.chat_link.trim();
        if !link.is_empty() && !(link.starts_with("https://") || link.starts_with("http://")) {
            bail!("chat link {link:?} must start with http:// or https://");
        }
        Ok(())
    }

    pub fn chat_link(&self) -> Option<String> {
        let link = self.chat_link.trim();
        (!link.is_empty()).then(|| link.to_owned())
    }
}

impl RegistrationFormInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("name is required -- enter your name and retry");
        }
        validate_email(&self.email, true)?;
        Ok(())
    }

    pub fn normalized_dietary(&self) -> String {
        DietarySelection::parse(&self.dietary).format()
    }
}

#[cfg(test)]
mod tests {
    use super::{FormPayload, RegistrationFormInput, RetreatFormInput};
    use crate::{FormKind, RetreatId, RetreatStatus};

    fn retreat_form() -> RetreatFormInput {
        RetreatFormInput {
            name: "Spring Silent Retreat".to_owned(),
            date_range: "Apr 4-6".to_owned(),
            location: "Lake House".to_owned(),
            capacity: 20,
            chat_link: String::new(),
            status: RetreatStatus::Open,
        }
    }

    fn registration() -> RegistrationFormInput {
        RegistrationFormInput {
            retreat_id: RetreatId::new(1),
            name: "Ana".to_owned(),
            email: "ana@example.com".to_owned(),
            phone: String::new(),
            dietary: "VEGAN, other: no garlic".to_owned(),
        }
    }

    #[test]
    fn participant_form_needs_a_retreat() {
        assert!(FormPayload::blank_for(FormKind::Participant, None).is_none());
        assert!(FormPayload::blank_for(FormKind::Participant, Some(RetreatId::new(1))).is_some());
        assert!(FormPayload::blank_for(FormKind::Retreat, None).is_some());
    }

    #[test]
    fn blank_participant_form_rejects_missing_name() {
        let payload = FormPayload::blank_for(FormKind::Participant, Some(RetreatId::new(1)))
            .expect("participant form");
        let error = payload.validate().expect_err("name is required");
        assert!(error.to_string().contains("name is required"));
    }

    #[test]
    fn retreat_validation() {
        assert!(retreat_form().validate().is_ok());

        let mut negative = retreat_form();
        negative.capacity = -1;
        assert!(negative.validate().is_err());

        let mut bad_link = retreat_form();
        bad_link.chat_link = "ftp://chat".to_owned();
        assert!(bad_link.validate().is_err());

        let mut good_link = retreat_form();
        good_link.chat_link = " https://chat.example.com/r/1 ".to_owned();
        assert_eq!(
            good_link.chat_link().as_deref(),
            Some("https://chat.example.com/r/1")
        );
    }

    #[test]
    fn registration_requires_email_and_normalizes_dietary() {
        let form = registration();
        assert!(form.validate().is_ok());
        assert_eq!(form.normalized_dietary(), "vegan, other: no garlic");

        let mut missing = registration();
        missing.email = "  ".to_owned();
        let error = missing.validate().expect_err("email is required");
        assert!(error.to_string().contains("email is required"));

        let mut malformed = registration();
        malformed.email = "ana.example.com".to_owned();
        assert!(malformed.validate().is_err());
    }
}
