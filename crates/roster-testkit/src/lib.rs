// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use roster_app::{
    AccommodationPlan, AttendanceStatus, DietarySelection, DietaryToken, PaymentStatus,
    RegistrationStatus, TransportationPlan,
};
use std::path::PathBuf;
use time::{Date, Duration, Month};

const RETREAT_THEMES: [&str; 10] = [
    "Silent",
    "Mindfulness",
    "Yoga",
    "Writing",
    "Leadership",
    "Forest",
    "Renewal",
    "Contemplative",
    "Breathwork",
    "Seasonal",
];
const RETREAT_KINDS: [&str; 4] = ["Retreat", "Weekend", "Gathering", "Intensive"];
const SEASONS: [&str; 4] = ["Spring", "Summer", "Autumn", "Winter"];
const VENUES: [&str; 10] = [
    "Cedar Lodge",
    "Lakeside Center",
    "Hillcrest Farm",
    "Willow Abbey",
    "Juniper Ranch",
    "Meadow House",
    "Aspen Camp",
    "Canyon Retreat Center",
    "Brookside Hall",
    "Ridge Sanctuary",
];

const FIRST_NAMES: [&str; 16] = [
    "Avery", "Jordan", "Taylor", "Riley", "Morgan", "Casey", "Alex", "Quinn", "Parker", "Drew",
    "Kai", "Elliot", "Robin", "Cameron", "Hayden", "Rowan",
];
const LAST_NAMES: [&str; 18] = [
    "Walker", "Martin", "Hill", "Evans", "Lopez", "Gray", "Ward", "Young", "Diaz", "Reed",
    "Campbell", "Turner", "Flores", "Bennett", "Price", "Morris", "Foster", "Brooks",
];
const EMAIL_DOMAINS: [&str; 4] = ["example.com", "example.org", "mail.test", "inbox.test"];
const TAGS: [&str; 8] = [
    "staff",
    "volunteer",
    "speaker",
    "first-time",
    "returning",
    "driver",
    "scholarship",
    "musician",
];
const OTHER_DIETARY: [&str; 5] = [
    "no mushrooms",
    "low sodium",
    "shellfish allergy",
    "no raw onion",
    "pescatarian",
];
const ARRIVAL_TIMES: [&str; 5] = ["Fri 3pm", "Fri 6pm", "Sat 9am", "late Fri", ""];
const NOTE_WORDS: [&str; 16] = [
    "needs",
    "ride",
    "from",
    "station",
    "prefers",
    "quiet",
    "room",
    "arriving",
    "late",
    "bringing",
    "guitar",
    "paid",
    "cash",
    "at",
    "door",
    "confirmed",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retreat {
    pub name: String,
    pub date_range: String,
    pub location: String,
    pub capacity: i64,
    pub chat_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
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
}

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Seeded generator for demo rosters. The same seed always yields the same
/// retreats and participants.
#[derive(Debug, Clone)]
pub struct RosterFaker {
    rng: DeterministicRng,
    seed: u64,
    issued_emails: Vec<String>,
}

impl RosterFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            seed: normalized,
            issued_emails: Vec::new(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn retreat(&mut self) -> Retreat {
        let season = self.pick(&SEASONS);
        let theme = self.pick(&RETREAT_THEMES);
        let kind = self.pick(&RETREAT_KINDS);
        let start = self.start_date();
        let end = start + Duration::days(self.int_range(1, 4));
        let date_range = if end.month() == start.month() {
            format!("{} {}-{}", short_month(start.month()), start.day(), end.day())
        } else {
            format!(
                "{} {}-{} {}",
                short_month(start.month()),
                start.day(),
                short_month(end.month()),
                end.day()
            )
        };
        let location = self.pick(&VENUES).to_owned();
        let capacity = self.int_range(8, 40);
        let chat_link = if self.rng.int_n(3) > 0 {
            Some(format!(
                "https://chat.example.com/r/{}",
                self.int_range(1000, 9999)
            ))
        } else {
            None
        };

        Retreat {
            name: format!("{season} {theme} {kind}"),
            date_range,
            location,
            capacity,
            chat_link,
        }
    }

    pub fn participant(&mut self) -> Participant {
        let first = self.pick(&FIRST_NAMES);
        let last = self.pick(&LAST_NAMES);
        let email = self.unique_email(first, last);
        let registration_status = self.pick_choice(RegistrationStatus::ALL);
        let payment_status = match registration_status {
            RegistrationStatus::Cancelled => {
                self.pick_choice(&[PaymentStatus::Unpaid, PaymentStatus::Refunded])
            }
            _ => self.pick_choice(&[
                PaymentStatus::Unpaid,
                PaymentStatus::Partial,
                PaymentStatus::Paid,
                PaymentStatus::Paid,
                PaymentStatus::Waived,
            ]),
        };

        Participant {
            name: format!("{first} {last}"),
            email,
            phone: format!("555-{:04}", self.int_range(0, 9999)),
            dietary: self.dietary(),
            registration_status,
            payment_status,
            attendance_status: if registration_status == RegistrationStatus::Confirmed {
                self.pick_choice(AttendanceStatus::ALL)
            } else {
                AttendanceStatus::Unknown
            },
            accommodation: self.pick_choice(AccommodationPlan::ALL),
            transportation: self.pick_choice(TransportationPlan::ALL),
            arrival_time: self.pick(&ARRIVAL_TIMES).to_owned(),
            tags: self.tags(),
            notes: self.sentence(0, 6),
        }
    }

    pub fn participants(&mut self, count: usize) -> Vec<Participant> {
        (0..count).map(|_| self.participant()).collect()
    }

    /// A formatted dietary string, empty for roughly half the roster.
    pub fn dietary(&mut self) -> String {
        let mut selection = DietarySelection::default();
        if self.rng.int_n(2) == 0 {
            return String::new();
        }
        let count = self.int_range(1, 3);
        for _ in 0..count {
            let token = DietaryToken::ALL[self.rng.int_n(DietaryToken::ALL.len() - 1)];
            if !selection.contains(token) {
                selection.toggle(token);
            }
        }
        if self.rng.int_n(4) == 0 {
            let text = self.pick(&OTHER_DIETARY);
            selection.set_other_text(text);
        }
        selection.format()
    }

    fn tags(&mut self) -> Vec<String> {
        let count = self.rng.int_n(3);
        let mut tags: Vec<String> = Vec::with_capacity(count);
        for _ in 0..count {
            let tag = self.pick(&TAGS);
            if !tags.iter().any(|seen| seen == tag) {
                tags.push(tag.to_owned());
            }
        }
        tags
    }

    fn unique_email(&mut self, first: &str, last: &str) -> String {
        let domain = self.pick(&EMAIL_DOMAINS);
        let base = format!("{}.{}", first.to_lowercase(), last.to_lowercase());
        let mut candidate = format!("{base}@{domain}");
        let mut suffix = 2;
        while self.issued_emails.contains(&candidate) {
            candidate = format!("{base}{suffix}@{domain}");
            suffix += 1;
        }
        self.issued_emails.push(candidate.clone());
        candidate
    }

    fn start_date(&mut self) -> Date {
        let base = Date::from_calendar_date(REFERENCE_YEAR, Month::January, 1)
            .unwrap_or(Date::MIN);
        base + Duration::days(self.int_range(0, 364))
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn pick_choice<T: Copy>(&mut self, items: &[T]) -> T {
        items[self.rng.int_n(items.len())]
    }

    fn int_range(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = max - min + 1;
        min + (self.rng.next_u64() % (span as u64)) as i64
    }

    fn sentence(&mut self, min_words: usize, max_words: usize) -> String {
        let count = self.int_range(min_words as i64, max_words as i64) as usize;
        let parts: Vec<&str> = (0..count).map(|_| self.pick(&NOTE_WORDS)).collect();
        parts.join(" ")
    }
}

const REFERENCE_YEAR: i32 = 2026;

fn short_month(month: Month) -> &'static str {
    match month {
        Month::January => "Jan",
        Month::February => "Feb",
        Month::March => "Mar",
        Month::April => "Apr",
        Month::May => "May",
        Month::June => "Jun",
        Month::July => "Jul",
        Month::August => "Aug",
        Month::September => "Sep",
        Month::October => "Oct",
        Month::November => "Nov",
        Month::December => "Dec",
    }
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("roster.db");
    Ok((dir, db_path))
}

pub fn fixture_datetime() -> &'static str {
    "2026-02-19T12:34:56Z"
}
