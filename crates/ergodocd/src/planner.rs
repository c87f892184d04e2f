//! Chooses the next observation request for a session.
//!
//! Survey first, then narrow: follow the leading hypothesis to its subject,
//! otherwise cycle through the observation classes the playbook reads. A
//! target whose last request produced nothing is skipped for one step.

use crate::observer::ObservationRequest;
use ergodoc_shared::{Hypothesis, MetricSnapshot, Playbook};

pub fn next_request(
    playbook: &Playbook,
    history: &[MetricSnapshot],
    hypotheses: &[Hypothesis],
    last_failed: Option<&ObservationRequest>,
) -> ObservationRequest {
    if history.is_empty() {
        return ObservationRequest::survey();
    }

    let narrowed = hypotheses.first().and_then(|lead| {
        let rule = playbook.rules.iter().find(|r| r.id == lead.rule_id)?;
        Some(ObservationRequest::targeting(rule.kind, &lead.subject))
    });
    if let Some(request) = narrowed {
        if last_failed != Some(&request) {
            return request;
        }
    }

    let kinds = playbook.kinds();
    if kinds.is_empty() {
        return ObservationRequest::survey();
    }
    // The survey is history[0]; later observations advance the cycle.
    let kind = kinds[(history.len() - 1) % kinds.len()];
    ObservationRequest::of(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ergodoc_shared::{evaluate_playbook, PlaybookSet, RawObservation, SnapshotKind};

    fn snapshot(raw: RawObservation) -> MetricSnapshot {
        MetricSnapshot::from_raw(raw).unwrap()
    }

    fn survey() -> MetricSnapshot {
        snapshot(
            RawObservation::new(SnapshotKind::Node, "t")
                .with("node", "demo@localhost")
                .with("uptime_secs", 10)
                .with("processes_total", 40),
        )
    }

    fn process(pid: &str, depth: u64) -> MetricSnapshot {
        snapshot(
            RawObservation::new(SnapshotKind::Process, "t")
                .with("pid", pid)
                .with("state", "running")
                .with("mailbox_depth", depth)
                .with("drain_ratio", 1.0)
                .with("uptime_secs", 10),
        )
    }

    #[test]
    fn test_survey_comes_first() {
        let set = PlaybookSet::builtin();
        let playbook = set.get("performance").unwrap();
        assert!(next_request(playbook, &[], &[], None).is_survey());
    }

    #[test]
    fn test_cycles_playbook_kinds_after_survey() {
        let set = PlaybookSet::builtin();
        let playbook = set.get("performance").unwrap();
        let request = next_request(playbook, &[survey()], &[], None);
        assert_eq!(request, ObservationRequest::of(SnapshotKind::Process));
    }

    #[test]
    fn test_narrows_to_leading_subject() {
        let set = PlaybookSet::builtin();
        let playbook = set.get("performance").unwrap();
        let history = vec![survey(), process("<A.0.7>", 150)];
        let hypotheses = evaluate_playbook(playbook, &history);
        assert_eq!(hypotheses[0].rule_id, "deep-mailbox");

        let request = next_request(playbook, &history, &hypotheses, None);
        assert_eq!(
            request,
            ObservationRequest::targeting(SnapshotKind::Process, "<A.0.7>")
        );
    }

    #[test]
    fn test_failed_target_falls_back_to_cycle() {
        let set = PlaybookSet::builtin();
        let playbook = set.get("performance").unwrap();
        let history = vec![survey(), process("<A.0.7>", 150)];
        let hypotheses = evaluate_playbook(playbook, &history);
        let gone = ObservationRequest::targeting(SnapshotKind::Process, "<A.0.7>");

        let request = next_request(playbook, &history, &hypotheses, Some(&gone));
        assert_ne!(request, gone);
        assert!(request.target.is_none());

        // Any other failure leaves the narrowing alone
        let other = ObservationRequest::of(SnapshotKind::Process);
        let request = next_request(playbook, &history, &hypotheses, Some(&other));
        assert_eq!(request, gone);
    }
}
