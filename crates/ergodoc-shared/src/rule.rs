//! Diagnostic rules: conjunctive conditions mapped to a root cause and action.

use crate::hypothesis::{ConfidenceTier, Evidence};
use crate::snapshot::{MetricSnapshot, MetricValue, SnapshotKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Comparison {
    pub fn holds(&self, left: f64, right: f64) -> bool {
        match self {
            Comparison::Gt => left > right,
            Comparison::Ge => left >= right,
            Comparison::Lt => left < right,
            Comparison::Le => left <= right,
            Comparison::Eq => left == right,
            Comparison::Ne => left != right,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
}

/// Expected value for an equality test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expected {
    Flag(bool),
    Text(String),
}

impl std::fmt::Display for Expected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expected::Flag(b) => write!(f, "{}", b),
            Expected::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One sub-condition of a rule. A rule matches only if all of them hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Field of the latest snapshot against a constant
    Threshold {
        field: String,
        op: Comparison,
        value: f64,
    },
    /// Two fields of the latest snapshot against each other
    Compare {
        left: String,
        op: Comparison,
        right: String,
    },
    /// Text or flag equality on the latest snapshot
    Equals { field: String, value: Expected },
    /// Last `samples` values strictly monotone, no plateau
    Trend {
        field: String,
        direction: TrendDirection,
        samples: usize,
    },
}

/// Outcome of checking one condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionOutcome {
    Match(Evidence),
    NoMatch,
    /// Not enough history for a trend
    Skipped,
}

impl Condition {
    pub fn above(field: &str, value: f64) -> Self {
        Condition::Threshold {
            field: field.to_string(),
            op: Comparison::Gt,
            value,
        }
    }

    pub fn at_least(field: &str, value: f64) -> Self {
        Condition::Threshold {
            field: field.to_string(),
            op: Comparison::Ge,
            value,
        }
    }

    pub fn equal_to(field: &str, value: f64) -> Self {
        Condition::Threshold {
            field: field.to_string(),
            op: Comparison::Eq,
            value,
        }
    }

    pub fn compare(left: &str, op: Comparison, right: &str) -> Self {
        Condition::Compare {
            left: left.to_string(),
            op,
            right: right.to_string(),
        }
    }

    pub fn is(field: &str, text: &str) -> Self {
        Condition::Equals {
            field: field.to_string(),
            value: Expected::Text(text.to_string()),
        }
    }

    pub fn flag(field: &str, value: bool) -> Self {
        Condition::Equals {
            field: field.to_string(),
            value: Expected::Flag(value),
        }
    }

    pub fn increasing(field: &str, samples: usize) -> Self {
        Condition::Trend {
            field: field.to_string(),
            direction: TrendDirection::Increasing,
            samples,
        }
    }

    pub fn decreasing(field: &str, samples: usize) -> Self {
        Condition::Trend {
            field: field.to_string(),
            direction: TrendDirection::Decreasing,
            samples,
        }
    }

    pub fn is_trend(&self) -> bool {
        matches!(self, Condition::Trend { .. })
    }

    /// Field names this condition reads.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Condition::Threshold { field, .. }
            | Condition::Equals { field, .. }
            | Condition::Trend { field, .. } => vec![field.as_str()],
            Condition::Compare { left, right, .. } => vec![left.as_str(), right.as_str()],
        }
    }

    /// Check against the latest snapshot and its time-ordered history
    /// (history ends with `latest`).
    pub fn check(&self, latest: &MetricSnapshot, history: &[&MetricSnapshot]) -> ConditionOutcome {
        match self {
            Condition::Threshold { field, op, value } => {
                match latest.value(field).and_then(|v| v.as_number()) {
                    Some(observed) if op.holds(observed, *value) => {
                        ConditionOutcome::Match(Evidence::single(
                            latest,
                            format!("{}={} {} {}", field, observed, op.symbol(), value),
                        ))
                    }
                    _ => ConditionOutcome::NoMatch,
                }
            }
            Condition::Compare { left, op, right } => {
                let l = latest.value(left).and_then(|v| v.as_number());
                let r = latest.value(right).and_then(|v| v.as_number());
                match (l, r) {
                    (Some(l), Some(r)) if op.holds(l, r) => {
                        ConditionOutcome::Match(Evidence::single(
                            latest,
                            format!("{}={} {} {}={}", left, l, op.symbol(), right, r),
                        ))
                    }
                    _ => ConditionOutcome::NoMatch,
                }
            }
            Condition::Equals { field, value } => {
                let holds = match (latest.value(field), value) {
                    (Some(MetricValue::Text(s)), Expected::Text(t)) => s == t.as_str(),
                    (Some(MetricValue::Flag(b)), Expected::Flag(e)) => b == *e,
                    _ => false,
                };
                if holds {
                    ConditionOutcome::Match(Evidence::single(
                        latest,
                        format!("{}={}", field, value),
                    ))
                } else {
                    ConditionOutcome::NoMatch
                }
            }
            Condition::Trend {
                field,
                direction,
                samples,
            } => {
                let points: Vec<(&MetricSnapshot, f64)> = history
                    .iter()
                    .filter_map(|s| s.value(field).and_then(|v| v.as_number()).map(|n| (*s, n)))
                    .collect();
                if *samples < 2 || points.len() < *samples {
                    return ConditionOutcome::Skipped;
                }

                let window = &points[points.len() - samples..];
                let monotone = window.windows(2).all(|pair| match direction {
                    TrendDirection::Increasing => pair[1].1 > pair[0].1,
                    TrendDirection::Decreasing => pair[1].1 < pair[0].1,
                });
                if !monotone {
                    return ConditionOutcome::NoMatch;
                }

                let values: Vec<String> = window.iter().map(|(_, n)| n.to_string()).collect();
                ConditionOutcome::Match(Evidence {
                    snapshot_ids: window.iter().map(|(s, _)| s.id()).collect(),
                    detail: format!(
                        "{} {} over {} samples [{}]",
                        field,
                        match direction {
                            TrendDirection::Increasing => "rising",
                            TrendDirection::Decreasing => "falling",
                        },
                        samples,
                        values.join(", ")
                    ),
                })
            }
        }
    }
}

fn default_confidence() -> ConfidenceTier {
    ConfidenceTier::Medium
}

/// Immutable condition → root cause → action triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub kind: SnapshotKind,
    pub root_cause: String,
    pub action: String,
    #[serde(default = "default_confidence")]
    pub confidence: ConfidenceTier,
    /// A match ends the investigation
    #[serde(default)]
    pub conclusive: bool,
    pub when: Vec<Condition>,
}

impl Rule {
    pub fn new(id: &str, kind: SnapshotKind, root_cause: &str, action: &str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            root_cause: root_cause.to_string(),
            action: action.to_string(),
            confidence: default_confidence(),
            conclusive: false,
            when: Vec::new(),
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.when.push(condition);
        self
    }

    pub fn confidence(mut self, tier: ConfidenceTier) -> Self {
        self.confidence = tier;
        self
    }

    pub fn conclusive(mut self) -> Self {
        self.conclusive = true;
        self
    }

    /// Tier a hypothesis from this rule carries.
    pub fn tier(&self) -> ConfidenceTier {
        if self.conclusive {
            ConfidenceTier::Confirmed
        } else {
            self.confidence
        }
    }

    pub fn has_trend(&self) -> bool {
        self.when.iter().any(Condition::is_trend)
    }

    /// True when every condition of `self` also appears in `other` and
    /// `other` has more of them.
    pub fn is_strict_subset_of(&self, other: &Rule) -> bool {
        self.kind == other.kind
            && self.when.len() < other.when.len()
            && self.when.iter().all(|c| other.when.contains(c))
    }
}
