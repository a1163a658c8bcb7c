//! Core alarm lifecycle logic for alarmclock.
//! This crate owns alarm persistence, wake-up scheduling and the alarm feed.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod notify;
pub mod repo;
pub mod schedule;
pub mod service;

pub use config::{ConfigError, CoreConfig, DB_FILE_NAME};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::alarm::{AlarmId, AlarmPayload, AlarmRecord, AlarmValidationError, UNSET_ALARM_ID};
pub use notify::{format_alarm_time, AlarmAlert, AlarmNotifier, LogNotifier, NotifyError};
pub use repo::alarm_store::{AlarmStore, SqliteAlarmStore, StoreError, StoreResult};
pub use schedule::{
    next_trigger, snooze_deadline, Clock, SchedulingError, SystemClock, TimerWakeScheduler,
    WakeScheduler, SCHEDULE_ATTEMPTS, SNOOZE_MINUTES,
};
pub use service::alarm_repository::{AlarmError, AlarmRepository, AlarmResult};
pub use service::command_service::{
    AlarmCommandService, CommandError, LifecycleSignal, NotificationTask,
};
pub use service::view_state::AlarmViewState;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
