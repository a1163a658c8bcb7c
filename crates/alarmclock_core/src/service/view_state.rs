//! UI-facing view state over the alarm repository.
//!
//! # Responsibility
//! - Re-expose the repository feed to UI subscribers.
//! - Offer fire-and-forget commands scoped to one UI lifetime.
//!
//! # Invariants
//! - Commands never block the caller; results reach the UI via the feed.
//! - Closing or dropping the view aborts queued commands; writes already
//!   running are not rolled back.
//! - A closed view starts no further commands.
//! - Command failures are logged and published on `last_error`.

use crate::model::alarm::{AlarmId, AlarmRecord};
use crate::service::alarm_repository::{AlarmRepository, AlarmResult};
use log::{error, warn};
use std::future::poll_fn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::Poll;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// View state owning a task scope for UI-triggered alarm commands.
pub struct AlarmViewState {
    repo: Arc<AlarmRepository>,
    runtime: Handle,
    scope: Mutex<JoinSet<()>>,
    closed: AtomicBool,
    last_error: watch::Sender<Option<String>>,
}

impl AlarmViewState {
    /// Creates the view and queues an initial feed refresh.
    pub fn new(repo: Arc<AlarmRepository>, runtime: Handle) -> Self {
        let (last_error, _) = watch::channel(None);
        let view = Self {
            repo,
            runtime,
            scope: Mutex::new(JoinSet::new()),
            closed: AtomicBool::new(false),
            last_error,
        };
        view.refresh();
        view
    }

    /// Subscribes to the full alarm collection.
    pub fn alarms(&self) -> watch::Receiver<Vec<AlarmRecord>> {
        self.repo.subscribe()
    }

    /// Returns the latest published alarm collection.
    pub fn current(&self) -> Vec<AlarmRecord> {
        self.repo.snapshot()
    }

    /// Subscribes to the most recent command failure message.
    pub fn last_error(&self) -> watch::Receiver<Option<String>> {
        self.last_error.subscribe()
    }

    pub fn clear_error(&self) {
        self.last_error.send_replace(None);
    }

    /// Adds and schedules a new alarm.
    pub fn add_alarm(&self, title: impl Into<String>, hour: u32, minute: u32) {
        let alarm = AlarmRecord::new(title, hour, minute);
        self.launch("view_add", move |repo| repo.add_alarm(alarm).map(|_| ()));
    }

    /// Persists a full record and reconciles its wake-up.
    pub fn update_alarm(&self, alarm: AlarmRecord) {
        self.launch("view_update", move |repo| repo.update_alarm(&alarm));
    }

    /// Deletes a record and cancels its wake-up.
    pub fn delete_alarm(&self, alarm: AlarmRecord) {
        self.launch("view_delete", move |repo| repo.delete_alarm(&alarm));
    }

    pub fn toggle_alarm(&self, id: AlarmId) {
        self.launch("view_toggle", move |repo| repo.toggle_alarm(id).map(|_| ()));
    }

    pub fn edit_alarm(&self, id: AlarmId, title: impl Into<String>, hour: u32, minute: u32) {
        let title = title.into();
        self.launch("view_edit", move |repo| {
            repo.edit_alarm(id, title, hour, minute).map(|_| ())
        });
    }

    /// Re-reads the store into the feed.
    pub fn refresh(&self) {
        self.launch("view_refresh", |repo| repo.update_alarms());
    }

    /// Waits until every command queued so far has finished.
    ///
    /// The lock is held only while polling, so `close` may abort the
    /// awaited commands meanwhile.
    pub async fn settle(&self) {
        poll_fn(|cx| {
            let mut scope = self.scope();
            loop {
                match scope.poll_join_next(cx) {
                    Poll::Ready(Some(_)) => continue,
                    Poll::Ready(None) => return Poll::Ready(()),
                    Poll::Pending => return Poll::Pending,
                }
            }
        })
        .await;
    }

    /// Tears the scope down: aborts commands that have not started and
    /// refuses new ones.
    pub fn close(&self) {
        let mut scope = self.scope();
        self.closed.store(true, Ordering::SeqCst);
        scope.abort_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn launch(
        &self,
        event: &'static str,
        command: impl FnOnce(&AlarmRepository) -> AlarmResult<()> + Send + 'static,
    ) {
        let mut scope = self.scope();
        // Checked under the scope lock so `close` cannot slip in between.
        if self.is_closed() {
            warn!("event={event} module=view status=error error_code=view_closed");
            return;
        }
        let repo = Arc::clone(&self.repo);
        let last_error = self.last_error.clone();

        while scope.try_join_next().is_some() {}
        scope.spawn_blocking_on(
            move || {
                if let Err(err) = command(&repo) {
                    error!(
                        "event={event} module=view status=error error_code={} error={err}",
                        err.code()
                    );
                    last_error.send_replace(Some(err.to_string()));
                }
            },
            &self.runtime,
        );
    }

    fn scope(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.scope.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
