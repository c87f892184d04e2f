//! Ranked root-cause hypotheses and the evidence behind them.

use crate::snapshot::MetricSnapshot;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Confidence tier, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
    /// Matched by a conclusive rule
    Confirmed,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::Low => "low",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::High => "high",
            ConfidenceTier::Confirmed => "confirmed",
        }
    }
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshots supporting one matched condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub snapshot_ids: Vec<Uuid>,
    pub detail: String,
}

impl Evidence {
    pub fn single(snapshot: &MetricSnapshot, detail: String) -> Self {
        Self {
            snapshot_ids: vec![snapshot.id()],
            detail,
        }
    }
}

/// Rule id carried by the best-effort hypothesis when nothing matched.
pub const INCONCLUSIVE_RULE_ID: &str = "inconclusive";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub rule_id: String,
    pub root_cause: String,
    pub action: String,
    pub tier: ConfidenceTier,
    /// Subject of the snapshot that triggered the rule
    pub subject: String,
    pub evidence: Vec<Evidence>,
}

impl Hypothesis {
    pub fn is_confirmed(&self) -> bool {
        self.tier == ConfidenceTier::Confirmed
    }

    /// Low-tier placeholder when a budget ran out before any rule matched.
    pub fn inconclusive(history: &[MetricSnapshot]) -> Self {
        Self {
            rule_id: INCONCLUSIVE_RULE_ID.to_string(),
            root_cause: "No playbook rule matched the collected observations".to_string(),
            action: "Widen the survey or run a different playbook".to_string(),
            tier: ConfidenceTier::Low,
            subject: String::new(),
            evidence: vec![Evidence {
                snapshot_ids: history.iter().map(|s| s.id()).collect(),
                detail: format!("{} observation(s) collected", history.len()),
            }],
        }
    }

    /// Every snapshot id referenced by this hypothesis, deduplicated.
    pub fn snapshot_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = Vec::new();
        for id in self.evidence.iter().flat_map(|e| e.snapshot_ids.iter()) {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }
}
