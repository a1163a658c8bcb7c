//! Fired-alarm alert contract.
//!
//! # Responsibility
//! - Define how a fired wake-up is surfaced to the user.
//! - Format the short time string shown in alert content.
//!
//! # Invariants
//! - At most one alert is shown per alarm id; showing again replaces it.
//! - Dismissing an id without an alert is not an error.

use crate::model::alarm::{AlarmId, AlarmPayload};
use chrono::NaiveTime;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Alert content for one fired alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmAlert {
    pub id: AlarmId,
    pub title: String,
    /// Short time string, e.g. `7:05 AM`.
    pub content: String,
}

impl From<&AlarmPayload> for AlarmAlert {
    fn from(payload: &AlarmPayload) -> Self {
        Self {
            id: payload.id,
            title: payload.title.clone(),
            content: format_alarm_time(payload.hour, payload.minute),
        }
    }
}

/// Notification backend failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyError(pub String);

impl Display for NotifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification failed: {}", self.0)
    }
}

impl Error for NotifyError {}

/// Alert surface offering cancel and snooze actions.
pub trait AlarmNotifier: Send + Sync {
    fn show_alarm(&self, alert: &AlarmAlert) -> Result<(), NotifyError>;
    fn dismiss(&self, id: AlarmId) -> Result<(), NotifyError>;
}

/// Notifier that only writes alerts to the log; used by headless hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl AlarmNotifier for LogNotifier {
    fn show_alarm(&self, alert: &AlarmAlert) -> Result<(), NotifyError> {
        info!(
            "event=alert_show module=notify status=ok alarm_id={} title={:?} time={}",
            alert.id, alert.title, alert.content
        );
        Ok(())
    }

    fn dismiss(&self, id: AlarmId) -> Result<(), NotifyError> {
        info!("event=alert_dismiss module=notify status=ok alarm_id={id}");
        Ok(())
    }
}

/// Formats a time of day as a short 12-hour string.
pub fn format_alarm_time(hour: u32, minute: u32) -> String {
    NaiveTime::from_hms_opt(hour.min(23), minute.min(59), 0)
        .unwrap_or_default()
        .format("%-I:%M %p")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{format_alarm_time, AlarmAlert};
    use crate::model::alarm::AlarmPayload;

    #[test]
    fn formats_short_twelve_hour_time() {
        assert_eq!(format_alarm_time(7, 5), "7:05 AM");
        assert_eq!(format_alarm_time(0, 0), "12:00 AM");
        assert_eq!(format_alarm_time(23, 59), "11:59 PM");
    }

    #[test]
    fn alert_is_built_from_payload() {
        let payload = AlarmPayload {
            id: 2,
            title: "Meds".to_string(),
            hour: 13,
            minute: 30,
        };
        let alert = AlarmAlert::from(&payload);
        assert_eq!(alert.id, 2);
        assert_eq!(alert.title, "Meds");
        assert_eq!(alert.content, "1:30 PM");
    }
}
