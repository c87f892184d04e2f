//! Rule evaluation: snapshots in, hypotheses out, in rule-priority order.
//!
//! Pure functions only. The same inputs always give the same hypotheses in
//! the same order.

use crate::error::Result;
use crate::hypothesis::Hypothesis;
use crate::playbook::{Playbook, PlaybookSet};
use crate::rule::{ConditionOutcome, Rule};
use crate::snapshot::MetricSnapshot;

/// Evaluate the named playbook against a snapshot sequence.
pub fn evaluate(
    set: &PlaybookSet,
    playbook_id: &str,
    snapshots: &[MetricSnapshot],
) -> Result<Vec<Hypothesis>> {
    let playbook = set.get(playbook_id)?;
    Ok(evaluate_playbook(playbook, snapshots))
}

/// Evaluate every rule of `playbook`. Zero snapshots yield no hypotheses.
pub fn evaluate_playbook(playbook: &Playbook, snapshots: &[MetricSnapshot]) -> Vec<Hypothesis> {
    if snapshots.is_empty() {
        return Vec::new();
    }

    let ordered = time_ordered(snapshots);
    playbook
        .rules
        .iter()
        .filter_map(|rule| evaluate_rule(rule, &ordered))
        .collect()
}

/// Stable sort by observation time; ties keep their input order.
fn time_ordered(snapshots: &[MetricSnapshot]) -> Vec<&MetricSnapshot> {
    let mut ordered: Vec<&MetricSnapshot> = snapshots.iter().collect();
    ordered.sort_by_key(|s| s.observed_at());
    ordered
}

fn evaluate_rule(rule: &Rule, ordered: &[&MetricSnapshot]) -> Option<Hypothesis> {
    let latest = *ordered.iter().rev().find(|s| s.kind() == rule.kind)?;
    let history: Vec<&MetricSnapshot> = ordered
        .iter()
        .copied()
        .filter(|s| s.kind() == rule.kind && s.subject() == latest.subject())
        .collect();

    let mut evidence = Vec::with_capacity(rule.when.len());
    for condition in &rule.when {
        match condition.check(latest, &history) {
            ConditionOutcome::Match(e) => evidence.push(e),
            ConditionOutcome::NoMatch | ConditionOutcome::Skipped => return None,
        }
    }

    Some(Hypothesis {
        rule_id: rule.id.clone(),
        root_cause: rule.root_cause.clone(),
        action: rule.action.clone(),
        tier: rule.tier(),
        subject: latest.subject().to_string(),
        evidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{RawObservation, SnapshotKind};

    #[test]
    fn test_empty_snapshots_give_empty_result() {
        let set = PlaybookSet::builtin();
        for id in set.ids() {
            assert!(evaluate(&set, id, &[]).unwrap().is_empty());
        }
    }

    #[test]
    fn test_rule_ignores_other_kinds() {
        let set = PlaybookSet::builtin();
        let node = MetricSnapshot::from_raw(
            RawObservation::new(SnapshotKind::Node, "t")
                .with("node", "n@h")
                .with("uptime_secs", 1)
                .with("processes_total", 5),
        )
        .unwrap();
        assert!(evaluate(&set, "performance", &[node]).unwrap().is_empty());
    }
}
