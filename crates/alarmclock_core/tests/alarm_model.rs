use alarmclock_core::AlarmRecord;
use serde_json::json;

#[test]
fn record_serializes_with_flat_field_names() {
    let mut alarm = AlarmRecord::new("Wake", 6, 45);
    alarm.id = 3;

    let value = serde_json::to_value(&alarm).unwrap();

    assert_eq!(
        value,
        json!({
            "id": 3,
            "title": "Wake",
            "hour": 6,
            "minute": 45,
            "is_active": true
        })
    );
    let back: AlarmRecord = serde_json::from_value(value).unwrap();
    assert_eq!(back, alarm);
}

#[test]
fn payload_carries_identity_and_time() {
    let mut alarm = AlarmRecord::new("Meds", 21, 30);
    alarm.id = 8;

    let payload = alarm.payload();

    assert_eq!(payload.id, 8);
    assert_eq!(payload.title, "Meds");
    assert_eq!((payload.hour, payload.minute), (21, 30));
}
