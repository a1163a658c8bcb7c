mod common;

use alarmclock_core::{AlarmRepository, AlarmViewState};
use common::Harness;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

#[tokio::test]
async fn construction_loads_existing_alarms() {
    let h = Harness::new();
    let existing = h.add("Existing", 7, 0);
    let reopened = Arc::new(AlarmRepository::with_clock(
        h.store.clone(),
        h.scheduler.clone(),
        h.clock.clone(),
    ));
    assert!(reopened.snapshot().is_empty());

    let view = AlarmViewState::new(reopened, Handle::current());
    view.settle().await;

    assert_eq!(view.current(), vec![existing]);
}

#[tokio::test]
async fn commands_are_reflected_in_the_feed() {
    let h = Harness::new();
    let view = AlarmViewState::new(h.repo.clone(), Handle::current());
    let mut alarms = view.alarms();

    view.add_alarm("Wake", 7, 0);
    view.settle().await;
    alarms.changed().await.unwrap();
    let added = alarms.borrow_and_update().clone();
    assert_eq!(added.len(), 1);
    let id = added[0].id;

    view.edit_alarm(id, "Gym", 6, 15);
    view.settle().await;
    let edited = view.current();
    assert_eq!(edited[0].title, "Gym");
    assert_eq!((edited[0].hour, edited[0].minute), (6, 15));

    view.toggle_alarm(id);
    view.settle().await;
    assert!(!view.current()[0].is_active);
    assert!(h.scheduler.outstanding().is_empty());

    let mut record = view.current()[0].clone();
    record.is_active = true;
    view.update_alarm(record.clone());
    view.settle().await;
    assert_eq!(view.current(), vec![record.clone()]);
    assert!(h.scheduler.registered_at(id).is_some());

    view.delete_alarm(record);
    view.settle().await;
    assert!(view.current().is_empty());
    assert!(h.scheduler.outstanding().is_empty());
    assert!(view.last_error().borrow().is_none());
}

#[tokio::test]
async fn failures_are_published_on_last_error() {
    let h = Harness::new();
    let view = AlarmViewState::new(h.repo.clone(), Handle::current());
    view.settle().await;
    let mut errors = view.last_error();

    view.toggle_alarm(404);
    view.settle().await;

    assert!(errors.has_changed().unwrap());
    let message = errors.borrow_and_update().clone().unwrap();
    assert!(message.contains("404"));

    view.clear_error();
    assert!(errors.borrow().is_none());
}

#[tokio::test]
async fn refresh_picks_up_writes_made_elsewhere() {
    let h = Harness::new();
    let view = AlarmViewState::new(h.repo.clone(), Handle::current());
    view.settle().await;
    let reads_before = h.store.read_count();

    view.refresh();
    view.settle().await;

    assert!(h.store.read_count() > reads_before);
    assert_eq!(view.current(), h.repo.get_all_alarms().unwrap());
}

#[tokio::test]
async fn closing_keeps_completed_writes() {
    let h = Harness::new();
    let view = AlarmViewState::new(h.repo.clone(), Handle::current());
    view.add_alarm("Kept", 7, 0);
    view.settle().await;

    view.close();
    view.settle().await;
    drop(view);

    let stored = h.repo.get_all_alarms().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(h.repo.snapshot(), stored);
    assert!(h.scheduler.registered_at(stored[0].id).is_some());
}

#[tokio::test]
async fn closed_view_refuses_new_commands() {
    let h = Harness::new();
    let view = AlarmViewState::new(h.repo.clone(), Handle::current());
    view.settle().await;

    view.close();
    view.add_alarm("AfterClose", 7, 0);
    view.settle().await;

    assert!(view.is_closed());
    assert!(h.repo.get_all_alarms().unwrap().is_empty());
    assert!(h.scheduler.outstanding().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_during_settle_lets_settle_finish() {
    let h = Harness::new();
    let view = Arc::new(AlarmViewState::new(h.repo.clone(), Handle::current()));
    view.settle().await;

    let gate = h.store.hold_writes();
    view.add_alarm("Held", 7, 0);
    let settling = tokio::spawn({
        let view = view.clone();
        async move { view.settle().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    view.close();
    drop(gate);
    tokio::time::timeout(Duration::from_secs(5), settling)
        .await
        .unwrap()
        .unwrap();

    view.add_alarm("Late", 8, 0);
    view.settle().await;
    let titles: Vec<_> = h
        .repo
        .get_all_alarms()
        .unwrap()
        .into_iter()
        .map(|alarm| alarm.title)
        .collect();
    assert!(!titles.contains(&"Late".to_string()));
}
