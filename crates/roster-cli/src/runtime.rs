// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use roster_app::{
    FormPayload, Identity, Participant, ParticipantPatch, ParticipantSource, RetreatFormInput,
    RetreatId, RetreatStatus, WriteFailure, WriteRequest,
};
use roster_db::{NewParticipant, NewRetreat, Store, UpdateRetreat, classify_write_error};
use roster_testkit::RosterFaker;
use roster_tui::{AppRuntime, InternalEvent, RetreatSummary};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEMO_RETREATS: usize = 4;

pub struct DbRuntime<'a> {
    store: &'a Store,
    identity: Identity,
    background: Option<Background>,
    writer: Option<Sender<WriteJob>>,
    watcher: Option<WatchHandle>,
    own_writes: Arc<AtomicI64>,
}

/// Where worker threads open their own connections.
struct Background {
    db_path: PathBuf,
    poll_interval: Duration,
}

struct WriteJob {
    request: WriteRequest,
    reply: Sender<InternalEvent>,
}

struct WatchHandle {
    retreat_id: RetreatId,
    stop: Arc<AtomicBool>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl<'a> DbRuntime<'a> {
    /// Writes run inline on `store` and no change feed is polled.
    pub fn new(store: &'a Store, identity: Identity) -> Self {
        Self {
            store,
            identity,
            background: None,
            writer: None,
            watcher: None,
            own_writes: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Moves participant writes onto a worker thread and polls the retreat
    /// revision for changes made by other sessions.
    pub fn with_background(mut self, db_path: PathBuf, poll_interval: Duration) -> Self {
        self.background = Some(Background {
            db_path,
            poll_interval,
        });
        self
    }

    fn writer(&mut self) -> Result<Option<Sender<WriteJob>>> {
        let Some(background) = &self.background else {
            return Ok(None);
        };
        if self.writer.is_none() {
            self.writer = Some(spawn_writer(
                background.db_path.clone(),
                Arc::clone(&self.own_writes),
            )?);
        }
        Ok(self.writer.clone())
    }
}

impl AppRuntime for DbRuntime<'_> {
    fn load_retreats(&mut self) -> Result<Vec<RetreatSummary>> {
        self.store
            .list_retreats()?
            .into_iter()
            .map(|retreat| {
                let counts = self.store.retreat_counts(retreat.id)?;
                Ok(RetreatSummary { retreat, counts })
            })
            .collect()
    }

    fn load_participants(&mut self, retreat_id: RetreatId) -> Result<Vec<Participant>> {
        self.store.list_participants(retreat_id)
    }

    fn submit_form(&mut self, payload: &FormPayload) -> Result<()> {
        match payload {
            FormPayload::Retreat(input) => {
                let retreat_id = self
                    .store
                    .create_retreat(&NewRetreat::from_form(input, &self.identity.user_id))?;
                info!(retreat = %retreat_id, "retreat created");
            }
            FormPayload::Participant(input) => {
                let participant =
                    NewParticipant::from_form(input, &self.identity.display_name);
                let participant_id = self
                    .store
                    .insert_participant(&participant)
                    .map_err(|error| anyhow!(classify_write_error(&error).user_message()))?;
                info!(participant = %participant_id, retreat = %input.retreat_id, "participant added");
            }
        }
        Ok(())
    }

    fn update_retreat(&mut self, retreat_id: RetreatId, input: &RetreatFormInput) -> Result<()> {
        self.store
            .update_retreat(retreat_id, &UpdateRetreat::from(input))
    }

    fn set_retreat_status(&mut self, retreat_id: RetreatId, status: RetreatStatus) -> Result<()> {
        self.store.set_retreat_status(retreat_id, status)
    }

    fn write_participant(&mut self, patch: &ParticipantPatch) -> Result<(), WriteFailure> {
        self.store
            .update_participant(patch)
            .map_err(|error| classify_write_error(&error))
    }

    fn spawn_participant_write(
        &mut self,
        request: WriteRequest,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let Some(writer) = self.writer()? else {
            let result = self.write_participant(&request.patch);
            tx.send(InternalEvent::WriteCompleted {
                ticket: request.ticket,
                result,
            })
            .map_err(|_| anyhow!("write event channel closed"))?;
            return Ok(());
        };
        writer
            .send(WriteJob { request, reply: tx })
            .map_err(|_| anyhow!("write worker stopped -- restart roster and retry"))
    }

    fn watch_retreat(&mut self, retreat_id: RetreatId, tx: Sender<InternalEvent>) -> Result<()> {
        let Some(background) = &self.background else {
            return Ok(());
        };
        if self
            .watcher
            .as_ref()
            .is_some_and(|watcher| watcher.retreat_id == retreat_id)
        {
            return Ok(());
        }

        self.watcher = None;
        self.own_writes.store(0, Ordering::SeqCst);
        let stop = Arc::new(AtomicBool::new(false));
        let poller = RevisionPoller {
            db_path: background.db_path.clone(),
            retreat_id,
            interval: background.poll_interval,
            seen: self.store.retreat_revision(retreat_id)?,
            own_writes: Arc::clone(&self.own_writes),
            stop: Arc::clone(&stop),
        };
        thread::Builder::new()
            .name("roster-watch".to_owned())
            .spawn(move || poller.run(&tx))
            .context("spawn change watcher thread")?;
        self.watcher = Some(WatchHandle { retreat_id, stop });
        debug!(retreat = %retreat_id, "watching retreat revision");
        Ok(())
    }
}

fn spawn_writer(db_path: PathBuf, own_writes: Arc<AtomicI64>) -> Result<Sender<WriteJob>> {
    let (jobs_tx, jobs_rx) = mpsc::channel::<WriteJob>();
    thread::Builder::new()
        .name("roster-writer".to_owned())
        .spawn(move || {
            let store = Store::open(&db_path);
            if let Err(error) = &store {
                warn!(path = %db_path.display(), error = %format!("{error:#}"), "write worker cannot open database");
            }
            for job in jobs_rx {
                let ticket = job.request.ticket;
                let result = match &store {
                    Ok(store) => persist_patch(store, &job.request.patch, &own_writes),
                    Err(error) => Err(WriteFailure::Unavailable(format!("{error:#}"))),
                };
                let event = InternalEvent::WriteCompleted { ticket, result };
                if job.reply.send(event).is_err() {
                    debug!("write reply channel closed; stopping worker");
                    break;
                }
            }
        })
        .context("spawn write worker thread")?;
    Ok(jobs_tx)
}

/// Persists one patch, crediting the revision bump it causes so the watcher
/// does not report it as a foreign change.
fn persist_patch(
    store: &Store,
    patch: &ParticipantPatch,
    own_writes: &AtomicI64,
) -> Result<(), WriteFailure> {
    if patch.is_empty() {
        return Ok(());
    }
    own_writes.fetch_add(1, Ordering::SeqCst);
    store.update_participant(patch).map_err(|error| {
        own_writes.fetch_sub(1, Ordering::SeqCst);
        classify_write_error(&error)
    })
}

/// Consumes up to `wanted` credits and returns how many were available.
fn take_credits(own_writes: &AtomicI64, wanted: i64) -> i64 {
    let previous = own_writes
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |available| {
            Some(available - available.clamp(0, wanted))
        })
        .unwrap_or_else(|current| current);
    previous.clamp(0, wanted)
}

struct RevisionPoller {
    db_path: PathBuf,
    retreat_id: RetreatId,
    interval: Duration,
    seen: i64,
    own_writes: Arc<AtomicI64>,
    stop: Arc<AtomicBool>,
}

impl RevisionPoller {
    fn run(mut self, tx: &Sender<InternalEvent>) {
        let store = match Store::open(&self.db_path) {
            Ok(store) => store,
            Err(error) => {
                warn!(error = %format!("{error:#}"), "change watcher cannot open database");
                return;
            }
        };
        while !self.stop.load(Ordering::Relaxed) {
            thread::sleep(self.interval);
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            match store.retreat_revision(self.retreat_id) {
                Ok(revision) => {
                    if self.observe(revision)
                        && tx
                            .send(InternalEvent::RemoteChanged {
                                retreat_id: self.retreat_id,
                            })
                            .is_err()
                    {
                        break;
                    }
                }
                Err(error) => warn!(error = %format!("{error:#}"), "revision poll failed"),
            }
        }
        debug!(retreat = %self.retreat_id, "change watcher stopped");
    }

    /// True when `revision` carries changes beyond this session's own writes.
    fn observe(&mut self, revision: i64) -> bool {
        if revision == self.seen {
            return false;
        }
        let delta = revision - self.seen;
        self.seen = revision;
        if delta < 0 {
            return true;
        }
        delta > take_credits(&self.own_writes, delta)
    }
}

/// Fills `store` with seeded retreats and rosters for `--demo`.
pub fn seed_demo_data(store: &Store, identity: &Identity, seed: u64) -> Result<usize> {
    let mut faker = RosterFaker::new(seed);
    let mut inserted = 0;
    for index in 0..DEMO_RETREATS {
        let fake = faker.retreat();
        let status = if index + 1 == DEMO_RETREATS {
            RetreatStatus::Closed
        } else {
            RetreatStatus::Open
        };
        let retreat_id = store.create_retreat(&NewRetreat {
            name: fake.name,
            date_range: fake.date_range,
            location: fake.location,
            capacity: fake.capacity,
            chat_link: fake.chat_link,
            status,
            owner_id: identity.user_id.clone(),
        })?;

        let roster_size = 8 + faker.int_n(12);
        for person in faker.participants(roster_size) {
            let source = if faker.int_n(3) == 0 {
                ParticipantSource::PublicForm
            } else {
                ParticipantSource::Manual
            };
            store
                .insert_participant(&NewParticipant {
                    retreat_id,
                    name: person.name,
                    email: person.email,
                    phone: person.phone,
                    dietary: person.dietary,
                    registration_status: person.registration_status,
                    payment_status: person.payment_status,
                    attendance_status: person.attendance_status,
                    accommodation: person.accommodation,
                    transportation: person.transportation,
                    arrival_time: person.arrival_time,
                    tags: person.tags,
                    notes: person.notes,
                    source,
                    added_by: identity.display_name.clone(),
                })
                .with_context(|| format!("seed demo participant for retreat {retreat_id}"))?;
            inserted += 1;
        }
    }
    info!(participants = inserted, seed, "seeded demo data");
    Ok(inserted)
}
