#![allow(dead_code)]

use alarmclock_core::{
    open_db_in_memory, AlarmAlert, AlarmId, AlarmNotifier, AlarmPayload, AlarmRecord,
    AlarmRepository, AlarmStore, Clock, NotifyError, SchedulingError, SqliteAlarmStore,
    StoreError, StoreResult, WakeScheduler,
};
use chrono::{DateTime, Local, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Local instant on a date without DST transitions in common zones.
pub fn local(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .earliest()
        .unwrap()
}

pub fn utc_of(local: DateTime<Local>) -> DateTime<Utc> {
    local.with_timezone(&Utc)
}

pub struct FixedClock {
    now: Mutex<DateTime<Local>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap()
    }
}

#[derive(Default)]
struct SchedulerState {
    outstanding: BTreeMap<AlarmId, (DateTime<Utc>, AlarmPayload)>,
    registers: Vec<(AlarmId, DateTime<Utc>)>,
    cancels: Vec<AlarmId>,
    failures_left: usize,
}

/// Scheduler double tracking outstanding registrations per id.
#[derive(Default)]
pub struct RecordingScheduler {
    state: Mutex<SchedulerState>,
}

impl RecordingScheduler {
    /// Makes the next `count` registration calls fail.
    pub fn fail_next_registers(&self, count: usize) {
        self.state.lock().unwrap().failures_left = count;
    }

    pub fn outstanding(&self) -> BTreeMap<AlarmId, DateTime<Utc>> {
        self.state
            .lock()
            .unwrap()
            .outstanding
            .iter()
            .map(|(id, (at, _))| (*id, *at))
            .collect()
    }

    pub fn registered_at(&self, id: AlarmId) -> Option<DateTime<Utc>> {
        self.outstanding().get(&id).copied()
    }

    pub fn payload_of(&self, id: AlarmId) -> Option<AlarmPayload> {
        self.state
            .lock()
            .unwrap()
            .outstanding
            .get(&id)
            .map(|(_, payload)| payload.clone())
    }

    pub fn register_calls(&self) -> Vec<(AlarmId, DateTime<Utc>)> {
        self.state.lock().unwrap().registers.clone()
    }

    pub fn cancel_calls(&self) -> Vec<AlarmId> {
        self.state.lock().unwrap().cancels.clone()
    }

    pub fn clear_calls(&self) {
        let mut state = self.state.lock().unwrap();
        state.registers.clear();
        state.cancels.clear();
    }

    /// Consumes the one-shot registration of `id`, as a real fire would.
    pub fn fire(&self, id: AlarmId) -> Option<AlarmPayload> {
        self.state
            .lock()
            .unwrap()
            .outstanding
            .remove(&id)
            .map(|(_, payload)| payload)
    }

    /// Drops every registration, as a reboot would.
    pub fn reboot(&self) {
        self.state.lock().unwrap().outstanding.clear();
    }
}

impl WakeScheduler for RecordingScheduler {
    fn register_exact_one_shot(
        &self,
        id: AlarmId,
        at: DateTime<Utc>,
        payload: AlarmPayload,
    ) -> Result<(), SchedulingError> {
        let mut state = self.state.lock().unwrap();
        state.registers.push((id, at));
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(SchedulingError::Rejected {
                id,
                reason: "injected failure".to_string(),
            });
        }
        state.outstanding.insert(id, (at, payload));
        Ok(())
    }

    fn cancel(&self, id: AlarmId) -> Result<(), SchedulingError> {
        let mut state = self.state.lock().unwrap();
        state.cancels.push(id);
        state.outstanding.remove(&id);
        Ok(())
    }
}

/// SQLite store with switchable failure injection.
pub struct FlakyStore {
    inner: SqliteAlarmStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    reads: AtomicUsize,
    write_gate: Mutex<()>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteAlarmStore::new(open_db_in_memory().unwrap()),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
            write_gate: Mutex::new(()),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Blocks every write until the returned guard is dropped.
    pub fn hold_writes(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().unwrap()
    }

    fn check_write(&self) -> StoreResult<()> {
        drop(self.write_gate.lock().unwrap());
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }

    fn check_read(&self) -> StoreResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".to_string()));
        }
        Ok(())
    }
}

impl AlarmStore for FlakyStore {
    fn insert(&self, alarm: &AlarmRecord) -> StoreResult<AlarmId> {
        self.check_write()?;
        self.inner.insert(alarm)
    }

    fn update(&self, alarm: &AlarmRecord) -> StoreResult<()> {
        self.check_write()?;
        self.inner.update(alarm)
    }

    fn delete(&self, id: AlarmId) -> StoreResult<()> {
        self.check_write()?;
        self.inner.delete(id)
    }

    fn get_all(&self) -> StoreResult<Vec<AlarmRecord>> {
        self.check_read()?;
        self.inner.get_all()
    }

    fn get_by_id(&self, id: AlarmId) -> StoreResult<Option<AlarmRecord>> {
        self.check_read()?;
        self.inner.get_by_id(id)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    shown: Mutex<Vec<AlarmAlert>>,
    dismissed: Mutex<Vec<AlarmId>>,
}

impl RecordingNotifier {
    pub fn shown(&self) -> Vec<AlarmAlert> {
        self.shown.lock().unwrap().clone()
    }

    pub fn dismissed(&self) -> Vec<AlarmId> {
        self.dismissed.lock().unwrap().clone()
    }
}

impl AlarmNotifier for RecordingNotifier {
    fn show_alarm(&self, alert: &AlarmAlert) -> Result<(), NotifyError> {
        self.shown.lock().unwrap().push(alert.clone());
        Ok(())
    }

    fn dismiss(&self, id: AlarmId) -> Result<(), NotifyError> {
        self.dismissed.lock().unwrap().push(id);
        Ok(())
    }
}

/// Repository wired to test doubles, clock fixed at 2026-05-04 06:30 local.
pub struct Harness {
    pub repo: Arc<AlarmRepository>,
    pub store: Arc<FlakyStore>,
    pub scheduler: Arc<RecordingScheduler>,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(FlakyStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let clock = Arc::new(FixedClock::new(local(2026, 5, 4, 6, 30)));
        let repo = Arc::new(AlarmRepository::with_clock(
            store.clone(),
            scheduler.clone(),
            clock.clone(),
        ));
        Self {
            repo,
            store,
            scheduler,
            clock,
        }
    }

    pub fn add(&self, title: &str, hour: u32, minute: u32) -> AlarmRecord {
        self.repo
            .add_alarm(AlarmRecord::new(title, hour, minute))
            .unwrap()
    }

    pub fn feed_ids(&self) -> Vec<AlarmId> {
        self.repo.snapshot().iter().map(|alarm| alarm.id).collect()
    }

    pub fn store_ids(&self) -> Vec<AlarmId> {
        self.repo
            .get_all_alarms()
            .unwrap()
            .iter()
            .map(|alarm| alarm.id)
            .collect()
    }
}
