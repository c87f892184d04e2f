//! Tests for snapshot.rs

use ergodoc_shared::snapshot::{MetricSnapshot, RawObservation, SnapshotKind};
use ergodoc_shared::DoctorError;
use serde_json::json;

fn network(messages_out: u64) -> RawObservation {
    RawObservation::new(SnapshotKind::Network, "demo@localhost")
        .with("peer", "worker@remote")
        .with("connected", true)
        .with("messages_in", 10)
        .with("messages_out", messages_out)
}

fn malformed_field(err: DoctorError) -> String {
    match err {
        DoctorError::MalformedObservation { field, .. } => field,
        other => panic!("expected MalformedObservation, got {:?}", other),
    }
}

#[test]
fn test_missing_required_field() {
    let raw = RawObservation::new(SnapshotKind::Node, "t")
        .with("node", "demo@localhost")
        .with("uptime_secs", 10);
    let err = MetricSnapshot::from_raw(raw).unwrap_err();
    assert_eq!(malformed_field(err), "processes_total");
}

#[test]
fn test_null_counts_as_missing() {
    let raw = network(1).with("peer", serde_json::Value::Null);
    let err = MetricSnapshot::from_raw(raw).unwrap_err();
    assert_eq!(malformed_field(err), "peer");
}

#[test]
fn test_negative_ratio_rejected() {
    let raw = RawObservation::new(SnapshotKind::Process, "t")
        .with("pid", "<A.0.1>")
        .with("state", "sleep")
        .with("mailbox_depth", 0)
        .with("drain_ratio", -0.5)
        .with("uptime_secs", 1);
    let err = MetricSnapshot::from_raw(raw).unwrap_err();
    assert!(err.to_string().contains("cannot be negative"));
}

#[test]
fn test_negative_count_rejected() {
    let raw = network(1).with("messages_in", -3);
    let err = MetricSnapshot::from_raw(raw).unwrap_err();
    assert_eq!(malformed_field(err), "messages_in");
}

#[test]
fn test_huge_count_is_out_of_range() {
    let raw = network(1).with("messages_in", 1e300);
    let err = MetricSnapshot::from_raw(raw).unwrap_err();
    assert!(err.to_string().contains("out of range"));
    assert_eq!(malformed_field(err), "messages_in");

    let raw = network(1).with("messages_in", 2.5);
    let err = MetricSnapshot::from_raw(raw).unwrap_err();
    assert!(err.to_string().contains("whole number"));
}

#[test]
fn test_wrong_json_type_rejected() {
    let raw = network(1).with("connected", "yes");
    let err = MetricSnapshot::from_raw(raw).unwrap_err();
    assert_eq!(malformed_field(err), "connected");
}

#[test]
fn test_compare_same_kind() {
    let before = MetricSnapshot::from_raw(network(5)).unwrap();
    let after = MetricSnapshot::from_raw(network(12)).unwrap();
    let delta = after.compare(&before).unwrap();
    assert_eq!(delta.kind, SnapshotKind::Network);
    assert!(delta.same_subject);
    assert_eq!(delta.field("messages_out").unwrap().change(), 7.0);
    assert_eq!(delta.changed().count(), 1);
}

#[test]
fn test_compare_different_kinds_fails() {
    let net = MetricSnapshot::from_raw(network(5)).unwrap();
    let events = MetricSnapshot::from_raw(
        RawObservation::new(SnapshotKind::Events, "t")
            .with("event", "orders")
            .with("producer", "<A.0.3>")
            .with("subscribers", 0)
            .with("published", 4),
    )
    .unwrap();

    assert_eq!(
        net.compare(&events).unwrap_err(),
        DoctorError::IncompatibleSnapshotKind {
            left: SnapshotKind::Network,
            right: SnapshotKind::Events,
        }
    );
    assert!(matches!(
        events.compare(&net),
        Err(DoctorError::IncompatibleSnapshotKind { .. })
    ));
}

#[test]
fn test_raw_observation_from_json() {
    let raw: RawObservation = serde_json::from_value(json!({
        "kind": "node",
        "observed_at": "2026-01-01T12:00:00Z",
        "source": "demo@localhost",
        "fields": { "node": "demo@localhost", "uptime_secs": 3600, "processes_total": 42 }
    }))
    .unwrap();
    assert_eq!(raw.subject(), Some("demo@localhost"));
    let snap = MetricSnapshot::from_raw(raw).unwrap();
    assert_eq!(snap.kind(), SnapshotKind::Node);
    assert_eq!(snap.source(), "demo@localhost");
}

#[test]
fn test_snapshot_ids_are_unique() {
    let a = MetricSnapshot::from_raw(network(1)).unwrap();
    let b = MetricSnapshot::from_raw(network(1)).unwrap();
    assert_ne!(a.id(), b.id());
}
