//! Tests against the recorded observations in demos/

use ergodoc_shared::{evaluate, MetricSnapshot, PlaybookSet, RawObservation, SessionBudget};
use ergodocd::config::Config;
use ergodocd::observer::ScriptedObserver;
use ergodocd::session::{ConclusionReason, Session};
use std::path::PathBuf;
use std::sync::Arc;

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos")
        .join(name)
}

#[test]
fn test_offline_evaluation_of_mailbox_fixture() {
    let content = std::fs::read_to_string(demo("mailbox_overload.json")).unwrap();
    let raws: Vec<RawObservation> = serde_json::from_str(&content).unwrap();
    let snapshots: Vec<MetricSnapshot> = raws
        .into_iter()
        .map(|raw| MetricSnapshot::from_raw(raw).unwrap())
        .collect();

    let hypotheses = evaluate(&PlaybookSet::builtin(), "performance", &snapshots).unwrap();
    let ids: Vec<&str> = hypotheses.iter().map(|h| h.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["mailbox-overload", "mailbox-growing", "deep-mailbox"]);
    assert_eq!(hypotheses[0].subject, "<9F3A.0.1004>");
}

#[tokio::test]
async fn test_run_mailbox_fixture_to_best_effort() {
    let observer = ScriptedObserver::load_json(&demo("mailbox_overload.json")).unwrap();
    let mut session = Session::new(
        Arc::new(PlaybookSet::builtin()),
        "performance",
        SessionBudget::default(),
    )
    .unwrap();

    let conclusion = session.run(&observer).await.unwrap();

    assert!(matches!(
        conclusion.reason,
        ConclusionReason::BudgetExhausted { .. }
    ));
    assert_eq!(conclusion.steps_used, 8);
    assert_eq!(conclusion.history.len(), 4);
    assert_eq!(conclusion.leading().unwrap().rule_id, "mailbox-overload");
}

#[tokio::test]
async fn test_run_crash_loop_fixture_confirms() {
    let observer = ScriptedObserver::load_json(&demo("crash_loop.json")).unwrap();
    let mut session = Session::new(
        Arc::new(PlaybookSet::builtin()),
        "supervision",
        SessionBudget::default(),
    )
    .unwrap();

    let conclusion = session.run(&observer).await.unwrap();
    assert!(conclusion.is_confirmed());
    assert_eq!(conclusion.leading().unwrap().subject, "<77B1.0.1012>");
}

#[test]
fn test_demo_playbooks_load_through_config() {
    let mut config = Config::default();
    config.playbooks.path = Some(demo("playbooks.toml").display().to_string());

    let set = config.load_playbooks().unwrap();
    assert_eq!(set.version, 2);
    let gateway = set.get("gateway").unwrap();
    assert_eq!(gateway.rules[0].id, "acceptor-blocked");
}
