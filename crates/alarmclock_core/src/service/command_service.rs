//! Lifecycle signal handling.
//!
//! # Responsibility
//! - Translate boot, clock-change, fired and notification-action signals
//!   into repository calls.
//! - Run every handler detached from the signal source.
//!
//! # Invariants
//! - Handlers are never tied to a UI scope and always run to completion.
//! - Every handler logs exactly one completion event, success or failure.
//! - A fired alert is dismissed only after its action was applied.

use crate::model::alarm::{AlarmId, AlarmPayload};
use crate::notify::{AlarmAlert, AlarmNotifier, NotifyError};
use crate::service::alarm_repository::{AlarmError, AlarmRepository};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// User action picked on a fired-alarm alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTask {
    Cancel,
    Snooze,
}

/// OS-delivered lifecycle signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleSignal {
    BootCompleted,
    TimeChanged,
    TimezoneChanged,
    DateChanged,
    AlarmFired(AlarmPayload),
    NotificationAction { id: AlarmId, task: NotificationTask },
}

impl LifecycleSignal {
    fn name(&self) -> &'static str {
        match self {
            Self::BootCompleted => "boot_completed",
            Self::TimeChanged => "time_changed",
            Self::TimezoneChanged => "timezone_changed",
            Self::DateChanged => "date_changed",
            Self::AlarmFired(_) => "alarm_fired",
            Self::NotificationAction {
                task: NotificationTask::Cancel,
                ..
            } => "notification_cancel",
            Self::NotificationAction {
                task: NotificationTask::Snooze,
                ..
            } => "notification_snooze",
        }
    }
}

/// Handler failure, logged at completion.
#[derive(Debug)]
pub enum CommandError {
    Alarm(AlarmError),
    Notify(NotifyError),
}

impl Display for CommandError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alarm(err) => write!(f, "{err}"),
            Self::Notify(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CommandError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Alarm(err) => Some(err),
            Self::Notify(err) => Some(err),
        }
    }
}

impl From<AlarmError> for CommandError {
    fn from(value: AlarmError) -> Self {
        Self::Alarm(value)
    }
}

impl From<NotifyError> for CommandError {
    fn from(value: NotifyError) -> Self {
        Self::Notify(value)
    }
}

/// Dispatches lifecycle signals onto detached blocking tasks.
pub struct AlarmCommandService {
    repo: Arc<AlarmRepository>,
    notifier: Arc<dyn AlarmNotifier>,
    runtime: Handle,
}

impl AlarmCommandService {
    pub fn new(
        repo: Arc<AlarmRepository>,
        notifier: Arc<dyn AlarmNotifier>,
        runtime: Handle,
    ) -> Self {
        Self {
            repo,
            notifier,
            runtime,
        }
    }

    /// Spawns the handler for `signal` and returns immediately.
    ///
    /// The returned handle may be dropped; the task keeps running.
    pub fn handle(&self, signal: LifecycleSignal) -> JoinHandle<()> {
        let repo = Arc::clone(&self.repo);
        let notifier = Arc::clone(&self.notifier);

        self.runtime.spawn_blocking(move || {
            let started_at = Instant::now();
            let name = signal.name();
            match dispatch(&repo, notifier.as_ref(), signal) {
                Ok(()) => info!(
                    "event=signal_handled module=command status=ok signal={name} duration_ms={}",
                    started_at.elapsed().as_millis()
                ),
                Err(err) => error!(
                    "event=signal_handled module=command status=error signal={name} duration_ms={} error={err}",
                    started_at.elapsed().as_millis()
                ),
            }
        })
    }

    /// Drains `signals` until every sender is dropped.
    pub async fn run(&self, mut signals: UnboundedReceiver<LifecycleSignal>) {
        info!("event=signal_loop module=command status=start");
        while let Some(signal) = signals.recv().await {
            drop(self.handle(signal));
        }
        info!("event=signal_loop module=command status=stopped");
    }
}

fn dispatch(
    repo: &AlarmRepository,
    notifier: &dyn AlarmNotifier,
    signal: LifecycleSignal,
) -> Result<(), CommandError> {
    match signal {
        LifecycleSignal::BootCompleted => {
            repo.restart_all_active_alarms()?;
        }
        LifecycleSignal::TimeChanged
        | LifecycleSignal::TimezoneChanged
        | LifecycleSignal::DateChanged => {
            repo.cancel_alarms_and_set()?;
        }
        LifecycleSignal::AlarmFired(payload) => {
            if is_stale(repo, payload.id) {
                warn!(
                    "event=alert_skip module=command status=ok alarm_id={} reason=inactive_or_deleted",
                    payload.id
                );
                return Ok(());
            }
            notifier.show_alarm(&AlarmAlert::from(&payload))?;
        }
        LifecycleSignal::NotificationAction { id, task } => {
            match task {
                NotificationTask::Cancel => repo.cancel_alarm_after_set_off(id)?,
                NotificationTask::Snooze => {
                    repo.snooze_alarm_after_set_off(id)?;
                }
            }
            notifier.dismiss(id)?;
        }
    }
    Ok(())
}

// A store read failure must not swallow a ringing alarm.
fn is_stale(repo: &AlarmRepository, id: AlarmId) -> bool {
    match repo.get_alarm_by_id(id) {
        Ok(Some(alarm)) => !alarm.is_active,
        Ok(None) => true,
        Err(_) => false,
    }
}
