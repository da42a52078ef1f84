use std::fs;
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;
use tablewatch_domain::{
    browse::{Observation, ReplaySource},
    checker::RunOutcome,
    config::CheckConfig,
    ledger::{JsonFileStore, LedgerStore},
    notifications::RecordingSink,
    payload::PayloadTree,
    time::{NotifiedKey, TimeWindow},
    AvailabilityChecker,
};
use tempfile::tempdir;

fn config() -> CheckConfig {
    CheckConfig::new(
        "https://booking.example.test/r/42",
        2,
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        TimeWindow::parse("18:00", "21:00").unwrap(),
    )
    .expect("valid config")
}

fn checker(sink: &Arc<RecordingSink>, store: JsonFileStore) -> AvailabilityChecker {
    AvailabilityChecker::builder(config())
        .with_notification_sink(Box::new(Arc::clone(sink)))
        .with_ledger_store(Box::new(store))
        .build()
}

#[test]
fn ledger_file_prevents_repeat_notifications_across_processes() {
    let temp = tempdir().expect("tempdir");
    let ledger_path = temp.path().join("notified.json");
    let payload = json!({
        "restaurant": {"name": "Test Bistro"},
        "availability": {
            "date": "2024-03-15",
            "slots": [
                {"time": "5:45 PM"},
                {"time": "7:30 PM"},
                {"time": "2024-03-15T20:00:00"}
            ]
        },
        "otherDates": [
            {"date": "2024-03-16", "slots": [{"time": "19:00"}]}
        ]
    })
    .to_string();

    let sink = Arc::new(RecordingSink::new());
    let mut first = checker(&sink, JsonFileStore::new(&ledger_path));
    let report = first
        .run(&mut ReplaySource::json_bodies([payload.clone()]))
        .expect("first run");
    assert_eq!(report.outcome(), RunOutcome::Notified(2));

    let messages: Vec<String> = sink.sent().into_iter().map(|r| r.message).collect();
    assert_eq!(
        messages,
        vec![
            "Table available at 19:30 on 2024-03-15 for 2 people.",
            "Table available at 20:00 on 2024-03-15 for 2 people.",
        ]
    );

    let stored = JsonFileStore::new(&ledger_path).load();
    let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
    assert!(stored.is_notified(&NotifiedKey::new(date, "19:30".parse().unwrap())));
    assert!(stored.is_notified(&NotifiedKey::new(date, "20:00".parse().unwrap())));
    assert_eq!(stored.len(), 2);

    // A fresh checker stands in for the next scheduled process.
    let mut second = checker(&sink, JsonFileStore::new(&ledger_path));
    let report = second
        .run(&mut ReplaySource::json_bodies([payload]))
        .expect("second run");
    assert_eq!(report.outcome(), RunOutcome::NothingNew);
    assert_eq!(sink.sent().len(), 2);
}

#[test]
fn corrupt_ledger_is_treated_as_no_history() {
    let temp = tempdir().expect("tempdir");
    let ledger_path = temp.path().join("notified.json");
    fs::write(&ledger_path, "[[[").expect("write corrupt ledger");

    let sink = Arc::new(RecordingSink::new());
    let mut checker = checker(&sink, JsonFileStore::new(&ledger_path));
    let report = checker
        .run(&mut ReplaySource::json_bodies([
            r#"{"date":"2024-03-15","slots":[{"time":"19:30"},{"time":"22:00"}]}"#,
        ]))
        .expect("run");
    assert_eq!(report.outcome(), RunOutcome::Notified(1));

    let raw = fs::read_to_string(&ledger_path).expect("ledger rewritten");
    assert!(raw.contains("2024-03-15_19:30"));
}

#[test]
fn evaluate_unions_json_and_text_observations() {
    let checker = AvailabilityChecker::builder(config())
        .trust_dated_text(true)
        .build();
    let observations = vec![
        Observation::Json {
            url: "https://booking.example.test/api/slots".into(),
            tree: PayloadTree::from_json(&json!({"day": "15/3/2024", "times": ["18:30", "23:00"]})),
        },
        Observation::Text("Availability for 2024-03-15: 6:30 PM, 8:45 PM".into()),
    ];
    let times: Vec<String> = checker
        .evaluate(&observations)
        .into_iter()
        .map(|t| t.to_string())
        .collect();
    assert_eq!(times, vec!["18:30", "20:45"]);
}
