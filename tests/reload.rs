mod common;

use std::sync::Arc;
use std::thread;

use serde_json::json;

use switchyard::error::Error;
use switchyard::Instance;

#[test]
fn test_failed_start_keeps_previous_config() {
    let tag = "failed-start";
    let instance = Instance::new(common::registry());
    instance
        .load(common::config(json!({"apps": {"recorder_a": {"tag": tag}}})))
        .unwrap();
    let before = instance.current().unwrap();

    let err = instance
        .load(common::config(json!({"apps": {
            "recorder_a": {"tag": tag},
            "recorder_b": {"tag": tag, "fail_start": true},
            "recorder_c": {"tag": tag}
        }})))
        .unwrap_err();
    assert!(matches!(err, Error::AppStart { ref app, .. } if app == "recorder_b"));

    let after = instance.current().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.generation(), 1);

    assert_eq!(
        common::events(tag),
        vec![
            // first config
            "provision recorder_a",
            "start recorder_a",
            // rejected config
            "provision recorder_a",
            "provision recorder_b",
            "provision recorder_c",
            "start recorder_a",
            "start recorder_b",
            "stop recorder_a",
            "cleanup recorder_c",
            "cleanup recorder_b",
            "cleanup recorder_a",
        ]
    );
}

#[test]
fn test_replace_stops_previous_after_starting_next() {
    let tag = "replace";
    let instance = Instance::new(common::registry());
    instance
        .load(common::config(json!({"apps": {"recorder_a": {"tag": tag}}})))
        .unwrap();
    instance
        .load(common::config(json!({"apps": {"recorder_b": {"tag": tag}}})))
        .unwrap();

    assert_eq!(
        common::events(tag),
        vec![
            "provision recorder_a",
            "start recorder_a",
            "provision recorder_b",
            "start recorder_b",
            "stop recorder_a",
            "cleanup recorder_a",
        ]
    );

    instance.stop();
    assert_eq!(
        common::events(tag)[6..],
        ["stop recorder_b".to_string(), "cleanup recorder_b".to_string()]
    );
}

#[test]
fn test_apps_stop_in_reverse_order() {
    let tag = "reverse-stop";
    let instance = Instance::new(common::registry());
    instance
        .load(common::config(json!({"apps": {
            "recorder_c": {"tag": tag},
            "recorder_a": {"tag": tag}
        }})))
        .unwrap();
    instance.stop();

    let events = common::events(tag);
    assert_eq!(
        events[4..],
        [
            "stop recorder_a".to_string(),
            "stop recorder_c".to_string(),
            "cleanup recorder_a".to_string(),
            "cleanup recorder_c".to_string(),
        ]
    );
}

#[test]
fn test_readers_see_whole_snapshots_during_reloads() {
    let instance = Arc::new(Instance::new(common::registry()));
    instance
        .load(common::config(json!({"apps": {"recorder_a": {"tag": "snapshots"}}})))
        .unwrap();

    let reader = {
        let instance = instance.clone();
        thread::spawn(move || {
            let mut last = 0;
            for _ in 0..2000 {
                let running = instance.current().unwrap();
                let names: Vec<&str> = running.app_names().collect();
                assert_eq!(names.len(), 1);
                assert!(running.generation() >= last);
                last = running.generation();
            }
        })
    };

    for i in 0..20 {
        let app = if i % 2 == 0 { "recorder_b" } else { "recorder_a" };
        instance
            .load(common::config(json!({"apps": {app: {"tag": "snapshots"}}})))
            .unwrap();
    }
    reader.join().unwrap();
    assert_eq!(instance.current().unwrap().generation(), 21);
}

#[test]
fn test_generation_watch_follows_loads() {
    let instance = Instance::new(common::registry());
    let rx = instance.subscribe();
    instance.load(common::config(json!({}))).unwrap();
    assert!(instance.load(common::config(json!({"apps": {"nope": {}}}))).is_err());
    assert_eq!(*rx.borrow(), 1);
    instance.load(common::config(json!({}))).unwrap();
    assert_eq!(*rx.borrow(), 2);
}
