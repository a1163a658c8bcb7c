//! Wake-up scheduling contracts and trigger-time computation.
//!
//! # Responsibility
//! - Define the scheduler capability consumed by the repository.
//! - Compute next-trigger and snooze instants as pure functions.
//!
//! # Invariants
//! - A registration is keyed by alarm id; registering again replaces it.
//! - Cancelling an id without a registration is not an error.
//! - Trigger instants are second-truncated wall-clock times and always lie
//!   strictly after `now`.

use crate::model::alarm::{AlarmId, AlarmPayload};
use chrono::offset::LocalResult;
use chrono::{DateTime, Duration, Local, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod timer;

pub use timer::TimerWakeScheduler;

/// Fixed snooze interval in minutes.
pub const SNOOZE_MINUTES: i64 = 5;

/// Total registration attempts before a scheduling failure is surfaced.
pub const SCHEDULE_ATTEMPTS: usize = 2;

// Widest DST gap observed in tz data is two hours; a day bounds the walk.
const MAX_GAP_MINUTES: u32 = 24 * 60;

/// Scheduler-level failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    /// Scheduler refused the request for one alarm.
    Rejected { id: AlarmId, reason: String },
    /// Scheduler backend is not reachable.
    Unavailable(String),
}

impl Display for SchedulingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected { id, reason } => {
                write!(f, "scheduler rejected alarm {id}: {reason}")
            }
            Self::Unavailable(reason) => write!(f, "scheduler unavailable: {reason}"),
        }
    }
}

impl Error for SchedulingError {}

/// Exact one-shot wake-up capability keyed by alarm id.
pub trait WakeScheduler: Send + Sync {
    /// Registers a wake-up at `at`, replacing any registration held by `id`.
    fn register_exact_one_shot(
        &self,
        id: AlarmId,
        at: DateTime<Utc>,
        payload: AlarmPayload,
    ) -> Result<(), SchedulingError>;

    /// Cancels the registration held by `id`, if any.
    fn cancel(&self, id: AlarmId) -> Result<(), SchedulingError>;
}

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Clock backed by the system local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Computes the next instant at which an alarm set for `hour:minute` fires.
///
/// Builds today's date at `hour:minute:00` in `now`'s timezone. When that
/// instant is not after `now`, the same wall-clock time on the next calendar
/// day is used instead, so the interval is 23 or 25 hours across DST
/// transitions.
///
/// Local times inside a DST gap resolve to the first valid minute after the
/// gap; ambiguous local times resolve to the earlier instant. Out-of-range
/// inputs are clamped to `23:59`.
pub fn next_trigger<Tz: TimeZone>(hour: u32, minute: u32, now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let time = NaiveTime::from_hms_opt(hour.min(23), minute.min(59), 0).unwrap_or_default();
    let today = now.date_naive();

    let candidate = resolve_local(&tz, today.and_time(time));
    if candidate > *now {
        return candidate;
    }

    match today.succ_opt() {
        Some(tomorrow) => resolve_local(&tz, tomorrow.and_time(time)),
        None => candidate + Duration::days(1),
    }
}

/// Returns the snooze deadline relative to `now`.
pub fn snooze_deadline<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    now.clone() + Duration::minutes(SNOOZE_MINUTES)
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> DateTime<Tz> {
    let mut candidate = local;
    for _ in 0..MAX_GAP_MINUTES {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(resolved) => return resolved,
            LocalResult::Ambiguous(earliest, _) => return earliest,
            LocalResult::None => candidate += Duration::minutes(1),
        }
    }
    tz.from_utc_datetime(&local)
}
