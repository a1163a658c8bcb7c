//! Alarm repository: store and scheduler reconciliation.
//!
//! # Responsibility
//! - Keep persisted alarm records and registered wake-ups consistent.
//! - Publish the full alarm collection as a replay-latest feed.
//!
//! # Invariants
//! - Every active record has at most one registration under its id; an
//!   inactive record has none.
//! - Mutations touching one id run inside that id's critical section, so
//!   the persisted record and its registration change together.
//! - The feed is only written by `update_alarms`, which always re-reads the
//!   full store; publishes are serialized so the latest value is the latest
//!   completed read.
//! - Store and scheduler calls block; run these methods on a blocking
//!   worker, never on an async executor thread.

use crate::model::alarm::{AlarmId, AlarmRecord};
use crate::repo::alarm_store::{AlarmStore, StoreError};
use crate::schedule::{Clock, SchedulingError, SystemClock, WakeScheduler, SCHEDULE_ATTEMPTS};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::watch;

pub type AlarmResult<T> = Result<T, AlarmError>;

/// Repository-level error surfaced to command callers.
#[derive(Debug)]
pub enum AlarmError {
    /// Store read/write failure.
    Store(StoreError),
    /// Scheduler refused or failed a registration/cancellation.
    Scheduling(SchedulingError),
    /// Operation targeted an unknown alarm id.
    NotFound(AlarmId),
    /// Record cannot be used for the requested operation.
    InvalidRecord(String),
}

impl AlarmError {
    /// Stable code used in structured log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Store(_) => "store_failed",
            Self::Scheduling(_) => "scheduling_failed",
            Self::NotFound(_) => "not_found",
            Self::InvalidRecord(_) => "invalid_record",
        }
    }
}

impl Display for AlarmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Scheduling(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "alarm not found: {id}"),
            Self::InvalidRecord(message) => write!(f, "invalid alarm record: {message}"),
        }
    }
}

impl Error for AlarmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Scheduling(err) => Some(err),
            Self::NotFound(_) | Self::InvalidRecord(_) => None,
        }
    }
}

impl From<StoreError> for AlarmError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

impl From<SchedulingError> for AlarmError {
    fn from(value: SchedulingError) -> Self {
        Self::Scheduling(value)
    }
}

/// Single source of truth for alarm records and their wake-ups.
pub struct AlarmRepository {
    store: Arc<dyn AlarmStore>,
    scheduler: Arc<dyn WakeScheduler>,
    clock: Arc<dyn Clock>,
    feed: watch::Sender<Vec<AlarmRecord>>,
    publish_lock: Mutex<()>,
    id_locks: Mutex<HashMap<AlarmId, Arc<Mutex<()>>>>,
}

impl AlarmRepository {
    /// Creates a repository using the system local clock.
    pub fn new(store: Arc<dyn AlarmStore>, scheduler: Arc<dyn WakeScheduler>) -> Self {
        Self::with_clock(store, scheduler, Arc::new(SystemClock))
    }

    /// Creates a repository with an injected clock.
    ///
    /// The feed starts empty; call `update_alarms` to load the store.
    pub fn with_clock(
        store: Arc<dyn AlarmStore>,
        scheduler: Arc<dyn WakeScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (feed, _) = watch::channel(Vec::new());
        Self {
            store,
            scheduler,
            clock,
            feed,
            publish_lock: Mutex::new(()),
            id_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a feed receiver that immediately observes the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Vec<AlarmRecord>> {
        self.feed.subscribe()
    }

    /// Returns the last published snapshot.
    pub fn snapshot(&self) -> Vec<AlarmRecord> {
        self.feed.borrow().clone()
    }

    /// Inserts a record, schedules it when active and republishes.
    ///
    /// A scheduling failure after a successful insert leaves the record
    /// persisted and published but unscheduled, and is returned as
    /// `AlarmError::Scheduling`.
    pub fn add_alarm(&self, alarm: AlarmRecord) -> AlarmResult<AlarmRecord> {
        let started_at = Instant::now();
        let id = match self.store.insert(&alarm) {
            Ok(id) => id,
            Err(err) => {
                let outcome = Err(AlarmError::from(err));
                log_outcome("alarm_add", alarm.id, started_at, &outcome);
                return outcome;
            }
        };

        let alarm = AlarmRecord { id, ..alarm };
        let scheduled = self.with_id_lock(id, || {
            if alarm.is_active {
                self.schedule_start(&alarm)?;
            }
            Ok(())
        });
        let published = self.update_alarms();

        let outcome = scheduled.and(published).map(|()| alarm);
        log_outcome("alarm_add", id, started_at, &outcome);
        outcome
    }

    /// Persists field changes of an already stored record and reconciles
    /// its wake-up with the new state.
    pub fn update_alarm(&self, alarm: &AlarmRecord) -> AlarmResult<()> {
        let started_at = Instant::now();
        if !alarm.is_persisted() {
            let outcome = Err(AlarmError::InvalidRecord(
                "update requires a store-assigned id".to_string(),
            ));
            log_outcome("alarm_update", alarm.id, started_at, &outcome);
            return outcome;
        }

        let reconciled = self.with_id_lock(alarm.id, || self.persist_and_reconcile(alarm));
        let outcome = self.publish_after(reconciled);
        log_outcome("alarm_update", alarm.id, started_at, &outcome);
        outcome
    }

    /// Sets activity and optionally time of day in one critical section.
    ///
    /// Active records are rescheduled at the freshly computed trigger;
    /// inactive ones have their wake-up cancelled.
    pub fn set_alarm_state(
        &self,
        id: AlarmId,
        desired_active: bool,
        desired_time: Option<(u32, u32)>,
    ) -> AlarmResult<AlarmRecord> {
        self.modify("alarm_set_state", id, |alarm| {
            alarm.is_active = desired_active;
            if let Some((hour, minute)) = desired_time {
                alarm.hour = hour;
                alarm.minute = minute;
            }
        })
    }

    /// Flips `is_active` and schedules or cancels accordingly.
    pub fn toggle_alarm(&self, id: AlarmId) -> AlarmResult<AlarmRecord> {
        self.modify("alarm_toggle", id, |alarm| alarm.is_active = !alarm.is_active)
    }

    /// Replaces title and time of day, rescheduling when active.
    pub fn edit_alarm(
        &self,
        id: AlarmId,
        title: impl Into<String>,
        hour: u32,
        minute: u32,
    ) -> AlarmResult<AlarmRecord> {
        let title = title.into();
        self.modify("alarm_edit", id, move |alarm| {
            alarm.title = title;
            alarm.hour = hour;
            alarm.minute = minute;
        })
    }

    /// Cancels the record's wake-up, removes it from the store and
    /// republishes.
    pub fn delete_alarm(&self, alarm: &AlarmRecord) -> AlarmResult<()> {
        let started_at = Instant::now();
        let deleted = self.with_id_lock(alarm.id, || {
            alarm.cancel_alarm(self.scheduler.as_ref())?;
            self.store.delete(alarm.id)?;
            Ok(())
        });
        if deleted.is_ok() {
            self.release_id_lock(alarm.id);
        }

        let outcome = self.publish_after(deleted);
        log_outcome("alarm_delete", alarm.id, started_at, &outcome);
        outcome
    }

    /// One-shot read of all persisted records in store order.
    pub fn get_all_alarms(&self) -> AlarmResult<Vec<AlarmRecord>> {
        Ok(self.store.get_all()?)
    }

    /// One-shot lookup by id.
    pub fn get_alarm_by_id(&self, id: AlarmId) -> AlarmResult<Option<AlarmRecord>> {
        Ok(self.store.get_by_id(id)?)
    }

    /// Deactivates an alarm whose wake-up fired and was dismissed.
    ///
    /// The fired registration already consumed itself; the cancel issued
    /// here only clears a leftover snooze registration.
    pub fn cancel_alarm_after_set_off(&self, id: AlarmId) -> AlarmResult<()> {
        self.modify("alarm_dismiss", id, |alarm| alarm.is_active = false)
            .map(|_| ())
    }

    /// Re-registers a fired alarm at the snooze deadline.
    ///
    /// Persisted `hour`, `minute` and `is_active` stay untouched. Snoozing
    /// an inactive record is refused so it never regains a registration.
    pub fn snooze_alarm_after_set_off(&self, id: AlarmId) -> AlarmResult<DateTime<Utc>> {
        let started_at = Instant::now();
        let outcome = self.with_id_lock(id, || {
            let alarm = self.store.get_by_id(id)?.ok_or(AlarmError::NotFound(id))?;
            if !alarm.is_active {
                return Err(AlarmError::InvalidRecord(format!(
                    "alarm {id} is inactive and cannot be snoozed"
                )));
            }
            self.retry_schedule(id, "snooze", || {
                alarm.snooze_alarm(self.scheduler.as_ref(), self.clock.as_ref())
            })
        });
        log_outcome("alarm_snooze", id, started_at, &outcome);
        outcome
    }

    /// Re-reads the store and publishes the result to every subscriber.
    pub fn update_alarms(&self) -> AlarmResult<()> {
        let _publishing = self
            .publish_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let alarms = self.store.get_all()?;
        let count = alarms.len();
        self.feed.send_replace(alarms);
        debug!("event=feed_publish module=repository status=ok count={count}");
        Ok(())
    }

    /// Cancels and re-registers every active alarm at its recomputed
    /// trigger; used after a clock, date or timezone change.
    ///
    /// Returns the number of rescheduled alarms. Every alarm is attempted;
    /// the first failure is returned after the pass completes.
    pub fn cancel_alarms_and_set(&self) -> AlarmResult<usize> {
        self.resync_active("alarm_resync", true)
    }

    /// Registers every active alarm without cancelling first; used after
    /// boot, when no registrations survive.
    pub fn restart_all_active_alarms(&self) -> AlarmResult<usize> {
        self.resync_active("alarm_restart", false)
    }

    fn modify(
        &self,
        event: &'static str,
        id: AlarmId,
        change: impl FnOnce(&mut AlarmRecord),
    ) -> AlarmResult<AlarmRecord> {
        let started_at = Instant::now();
        let modified = self.with_id_lock(id, || {
            let mut alarm = self.store.get_by_id(id)?.ok_or(AlarmError::NotFound(id))?;
            change(&mut alarm);
            self.persist_and_reconcile(&alarm)?;
            Ok(alarm)
        });

        let outcome = match modified {
            Ok(alarm) => self.update_alarms().map(|()| alarm),
            Err(err @ AlarmError::NotFound(_)) => Err(err),
            Err(err) => self.publish_after(Err(err)),
        };
        log_outcome(event, id, started_at, &outcome);
        outcome
    }

    fn persist_and_reconcile(&self, alarm: &AlarmRecord) -> AlarmResult<()> {
        self.store.update(alarm)?;
        if alarm.is_active {
            self.schedule_start(alarm)?;
        } else {
            alarm.cancel_alarm(self.scheduler.as_ref())?;
        }
        Ok(())
    }

    fn schedule_start(&self, alarm: &AlarmRecord) -> AlarmResult<DateTime<Utc>> {
        self.retry_schedule(alarm.id, "start", || {
            alarm.start_alarm(self.scheduler.as_ref(), self.clock.as_ref())
        })
    }

    fn retry_schedule(
        &self,
        id: AlarmId,
        action: &'static str,
        mut attempt: impl FnMut() -> Result<DateTime<Utc>, SchedulingError>,
    ) -> AlarmResult<DateTime<Utc>> {
        let mut last_error = SchedulingError::Unavailable("no attempt made".to_string());
        for attempt_no in 1..=SCHEDULE_ATTEMPTS {
            match attempt() {
                Ok(at) => {
                    debug!(
                        "event=alarm_schedule module=repository status=ok action={action} alarm_id={id} at={at} attempt={attempt_no}"
                    );
                    return Ok(at);
                }
                Err(err) => {
                    warn!(
                        "event=alarm_schedule module=repository status=error action={action} alarm_id={id} attempt={attempt_no} error={err}"
                    );
                    last_error = err;
                }
            }
        }
        Err(AlarmError::Scheduling(last_error))
    }

    fn resync_active(&self, event: &'static str, cancel_first: bool) -> AlarmResult<usize> {
        let started_at = Instant::now();
        let candidates = self.store.get_all()?;
        let mut rescheduled = 0;
        let mut first_error = None;

        for candidate in candidates.iter().filter(|alarm| alarm.is_active) {
            let synced = self.with_id_lock(candidate.id, || {
                // Re-read under the lock; a concurrent toggle may have won.
                let Some(alarm) = self.store.get_by_id(candidate.id)? else {
                    return Ok(false);
                };
                if !alarm.is_active {
                    return Ok(false);
                }
                if cancel_first {
                    alarm.cancel_alarm(self.scheduler.as_ref())?;
                }
                self.schedule_start(&alarm)?;
                Ok(true)
            });

            match synced {
                Ok(true) => rescheduled += 1,
                Ok(false) => {}
                Err(err) => {
                    error!(
                        "event={event} module=repository status=error alarm_id={} error_code={} error={err}",
                        candidate.id,
                        err.code()
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        info!(
            "event={event} module=repository status={} rescheduled={rescheduled} duration_ms={}",
            if first_error.is_some() { "error" } else { "ok" },
            started_at.elapsed().as_millis()
        );
        match first_error {
            Some(err) => Err(err),
            None => Ok(rescheduled),
        }
    }

    fn publish_after<T>(&self, outcome: AlarmResult<T>) -> AlarmResult<T> {
        let published = self.update_alarms();
        let value = outcome?;
        published.map(|()| value)
    }

    fn with_id_lock<T>(&self, id: AlarmId, f: impl FnOnce() -> AlarmResult<T>) -> AlarmResult<T> {
        let lock = {
            let mut locks = self.id_locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(id).or_default())
        };
        let _held = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    fn release_id_lock(&self, id: AlarmId) {
        let mut locks = self.id_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.remove(&id);
    }
}

fn log_outcome<T>(event: &str, alarm_id: AlarmId, started_at: Instant, outcome: &AlarmResult<T>) {
    match outcome {
        Ok(_) => info!(
            "event={event} module=repository status=ok alarm_id={alarm_id} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event={event} module=repository status=error alarm_id={alarm_id} duration_ms={} error_code={} error={err}",
            started_at.elapsed().as_millis(),
            err.code()
        ),
    }
}
