//! In-process wake scheduler backed by tokio timers.
//!
//! # Responsibility
//! - Hold one timer task per alarm id and deliver `AlarmFired` on expiry.
//!
//! # Invariants
//! - At most one live timer exists per alarm id.
//! - A fired or cancelled timer is removed from the registration table.
//! - Registrations do not survive the process; boot restart recreates them.

use crate::model::alarm::{AlarmId, AlarmPayload};
use crate::schedule::{SchedulingError, WakeScheduler};
use crate::service::command_service::LifecycleSignal;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

struct Registration {
    at: DateTime<Utc>,
    generation: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Registrations {
    next_generation: u64,
    by_id: HashMap<AlarmId, Registration>,
}

/// Wake scheduler that sleeps on the tokio runtime and emits fired signals.
///
/// Timers measure elapsed monotonic time, so a wall-clock change leaves
/// them stale until `cancel_alarms_and_set` re-registers every alarm.
pub struct TimerWakeScheduler {
    runtime: Handle,
    fired: UnboundedSender<LifecycleSignal>,
    registrations: Arc<Mutex<Registrations>>,
}

impl TimerWakeScheduler {
    /// Creates a scheduler spawning timers on `runtime`.
    pub fn new(runtime: Handle, fired: UnboundedSender<LifecycleSignal>) -> Self {
        Self {
            runtime,
            fired,
            registrations: Arc::new(Mutex::new(Registrations::default())),
        }
    }

    /// Returns outstanding registrations sorted by alarm id.
    pub fn pending(&self) -> Vec<(AlarmId, DateTime<Utc>)> {
        let Ok(table) = self.registrations.lock() else {
            return Vec::new();
        };
        let mut pending = table
            .by_id
            .iter()
            .map(|(id, registration)| (*id, registration.at))
            .collect::<Vec<_>>();
        pending.sort_by_key(|(id, _)| *id);
        pending
    }
}

impl WakeScheduler for TimerWakeScheduler {
    fn register_exact_one_shot(
        &self,
        id: AlarmId,
        at: DateTime<Utc>,
        payload: AlarmPayload,
    ) -> Result<(), SchedulingError> {
        if self.fired.is_closed() {
            return Err(SchedulingError::Unavailable(
                "fired signal channel is closed".to_string(),
            ));
        }

        let mut table = self
            .registrations
            .lock()
            .map_err(|_| SchedulingError::Unavailable("registration table poisoned".to_string()))?;

        table.next_generation += 1;
        let generation = table.next_generation;
        let delay = (at - Utc::now()).to_std().unwrap_or_default();
        let fired = self.fired.clone();
        let registrations = Arc::clone(&self.registrations);

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            if let Ok(mut table) = registrations.lock() {
                let current = table
                    .by_id
                    .get(&id)
                    .is_some_and(|registration| registration.generation == generation);
                if !current {
                    return;
                }
                table.by_id.remove(&id);
            }

            debug!("event=wake_fired module=schedule status=ok alarm_id={id}");
            if fired.send(LifecycleSignal::AlarmFired(payload)).is_err() {
                warn!(
                    "event=wake_fired module=schedule status=error alarm_id={id} error_code=receiver_closed"
                );
            }
        });

        if let Some(previous) = table.by_id.insert(
            id,
            Registration {
                at,
                generation,
                task,
            },
        ) {
            previous.task.abort();
        }

        debug!("event=wake_register module=schedule status=ok alarm_id={id} at={at}");
        Ok(())
    }

    fn cancel(&self, id: AlarmId) -> Result<(), SchedulingError> {
        let mut table = self
            .registrations
            .lock()
            .map_err(|_| SchedulingError::Unavailable("registration table poisoned".to_string()))?;

        if let Some(registration) = table.by_id.remove(&id) {
            registration.task.abort();
            debug!("event=wake_cancel module=schedule status=ok alarm_id={id}");
        }
        Ok(())
    }
}
