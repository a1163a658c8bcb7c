//! Alarm domain model.
//!
//! # Responsibility
//! - Define the persisted alarm record and its fired-event payload.
//! - Translate one record into concrete scheduler actions.
//!
//! # Invariants
//! - `id == UNSET_ALARM_ID` only before the first persist.
//! - `hour` is within `0..=23` and `minute` within `0..=59`.
//! - The next trigger instant is derived on every schedule, never stored.

use crate::schedule::{
    next_trigger, snooze_deadline, Clock, SchedulingError, WakeScheduler,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned alarm identifier.
pub type AlarmId = i64;

/// Sentinel id carried by records that were never persisted.
pub const UNSET_ALARM_ID: AlarmId = 0;

/// Record-level validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmValidationError {
    HourOutOfRange(u32),
    MinuteOutOfRange(u32),
}

impl Display for AlarmValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HourOutOfRange(hour) => write!(f, "alarm hour out of range: {hour}"),
            Self::MinuteOutOfRange(minute) => write!(f, "alarm minute out of range: {minute}"),
        }
    }
}

impl Error for AlarmValidationError {}

/// Persisted alarm record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRecord {
    /// Store-assigned id, `UNSET_ALARM_ID` before insert.
    pub id: AlarmId,
    /// Display title shown in the list and the fired alert.
    pub title: String,
    /// Wall-clock hour, 0-23.
    pub hour: u32,
    /// Wall-clock minute, 0-59.
    pub minute: u32,
    /// Whether a wake-up is expected to be registered for this record.
    pub is_active: bool,
}

/// Opaque data attached to a wake-up registration and handed back on fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmPayload {
    pub id: AlarmId,
    pub title: String,
    pub hour: u32,
    pub minute: u32,
}

impl AlarmRecord {
    /// Creates a new, not yet persisted, active alarm.
    pub fn new(title: impl Into<String>, hour: u32, minute: u32) -> Self {
        Self {
            id: UNSET_ALARM_ID,
            title: title.into(),
            hour,
            minute,
            is_active: true,
        }
    }

    /// Returns whether the store already assigned an id.
    pub fn is_persisted(&self) -> bool {
        self.id != UNSET_ALARM_ID
    }

    /// Validates time-of-day fields.
    ///
    /// Blank titles are accepted; the UI layer is expected to reject them.
    pub fn validate(&self) -> Result<(), AlarmValidationError> {
        if self.hour > 23 {
            return Err(AlarmValidationError::HourOutOfRange(self.hour));
        }
        if self.minute > 59 {
            return Err(AlarmValidationError::MinuteOutOfRange(self.minute));
        }
        Ok(())
    }

    /// Builds the payload delivered when this record's wake-up fires.
    pub fn payload(&self) -> AlarmPayload {
        AlarmPayload {
            id: self.id,
            title: self.title.clone(),
            hour: self.hour,
            minute: self.minute,
        }
    }

    /// Computes the next wall-clock trigger relative to `clock`.
    pub fn next_trigger_at(&self, clock: &dyn Clock) -> DateTime<Utc> {
        next_trigger(self.hour, self.minute, &clock.now()).with_timezone(&Utc)
    }

    /// Registers an exact one-shot wake-up at the next trigger instant.
    ///
    /// Replaces any registration already held under this record's id.
    pub fn start_alarm(
        &self,
        scheduler: &dyn WakeScheduler,
        clock: &dyn Clock,
    ) -> Result<DateTime<Utc>, SchedulingError> {
        let at = self.next_trigger_at(clock);
        scheduler.register_exact_one_shot(self.id, at, self.payload())?;
        Ok(at)
    }

    /// Cancels any wake-up registered under this record's id.
    pub fn cancel_alarm(&self, scheduler: &dyn WakeScheduler) -> Result<(), SchedulingError> {
        scheduler.cancel(self.id)
    }

    /// Registers a wake-up at the snooze deadline under the same id.
    pub fn snooze_alarm(
        &self,
        scheduler: &dyn WakeScheduler,
        clock: &dyn Clock,
    ) -> Result<DateTime<Utc>, SchedulingError> {
        let at = snooze_deadline(&clock.now()).with_timezone(&Utc);
        scheduler.register_exact_one_shot(self.id, at, self.payload())?;
        Ok(at)
    }
}

impl Display for AlarmRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AlarmRecord(id={}, title={}, hour={}, minute={}, is_active={})",
            self.id, self.title, self.hour, self.minute, self.is_active
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{AlarmRecord, AlarmValidationError, UNSET_ALARM_ID};

    #[test]
    fn new_record_is_active_and_unpersisted() {
        let alarm = AlarmRecord::new("Wake", 7, 0);
        assert_eq!(alarm.id, UNSET_ALARM_ID);
        assert!(alarm.is_active);
        assert!(!alarm.is_persisted());
    }

    #[test]
    fn validate_rejects_out_of_range_time() {
        assert_eq!(
            AlarmRecord::new("x", 24, 0).validate(),
            Err(AlarmValidationError::HourOutOfRange(24))
        );
        assert_eq!(
            AlarmRecord::new("x", 23, 60).validate(),
            Err(AlarmValidationError::MinuteOutOfRange(60))
        );
        assert!(AlarmRecord::new("", 23, 59).validate().is_ok());
    }

    #[test]
    fn payload_carries_display_fields() {
        let mut alarm = AlarmRecord::new("Gym", 18, 30);
        alarm.id = 4;
        let payload = alarm.payload();
        assert_eq!(payload.id, 4);
        assert_eq!(payload.title, "Gym");
        assert_eq!((payload.hour, payload.minute), (18, 30));
    }
}
