//! Playbooks: named, ordered rule tables, one per symptom category.
//!
//! Rule order is the priority in which hypotheses are presented. Compound
//! rules must come before the rules whose conditions they extend;
//! `PlaybookSet::validate` rejects tables that get this wrong.

use crate::error::{DoctorError, Result};
use crate::hypothesis::ConfidenceTier;
use crate::rule::{Comparison, Condition, Rule};
use crate::snapshot::SnapshotKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Version of the built-in playbook set.
pub const BUILTIN_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub rules: Vec<Rule>,
}

impl Playbook {
    pub fn new(id: &str, title: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            rules: Vec::new(),
        }
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Observation classes the rules read, in first-use order.
    pub fn kinds(&self) -> Vec<SnapshotKind> {
        let mut kinds = Vec::new();
        for rule in &self.rules {
            if !kinds.contains(&rule.kind) {
                kinds.push(rule.kind);
            }
        }
        kinds
    }

    /// Longest trend window any rule needs.
    pub fn max_trend_samples(&self) -> usize {
        self.rules
            .iter()
            .flat_map(|r| r.when.iter())
            .filter_map(|c| match c {
                Condition::Trend { samples, .. } => Some(*samples),
                _ => None,
            })
            .max()
            .unwrap_or(1)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(DoctorError::InvalidPlaybook(reason));

        if self.rules.is_empty() {
            return invalid(format!("playbook '{}' has no rules", self.id));
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return invalid(format!("{}: duplicate rule id '{}'", self.id, rule.id));
            }
            if rule.when.is_empty() {
                return invalid(format!("{}/{}: rule has no conditions", self.id, rule.id));
            }
            if rule.confidence == ConfidenceTier::Confirmed {
                return invalid(format!(
                    "{}/{}: use `conclusive = true` instead of a confirmed confidence",
                    self.id, rule.id
                ));
            }
            for condition in &rule.when {
                for field in condition.fields() {
                    if rule.kind.field_type(field).is_none() {
                        return invalid(format!(
                            "{}/{}: {} snapshots have no field '{}'",
                            self.id, rule.id, rule.kind, field
                        ));
                    }
                }
                if let Condition::Trend { samples, .. } = condition {
                    if *samples < 2 {
                        return invalid(format!(
                            "{}/{}: a trend needs at least 2 samples",
                            self.id, rule.id
                        ));
                    }
                }
            }
        }

        for (i, earlier) in self.rules.iter().enumerate() {
            if let Some(later) = self.rules[i + 1..]
                .iter()
                .find(|later| earlier.is_strict_subset_of(later))
            {
                return invalid(format!(
                    "{}: rule '{}' is a subset of later rule '{}'; compound rules go first",
                    self.id, earlier.id, later.id
                ));
            }
        }

        Ok(())
    }
}

/// Versioned collection of playbooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookSet {
    pub version: u32,
    pub playbooks: Vec<Playbook>,
}

impl PlaybookSet {
    /// Parse and validate a playbook set from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let set: PlaybookSet =
            toml::from_str(content).map_err(|e| DoctorError::InvalidPlaybook(e.to_string()))?;
        set.validate()?;
        Ok(set)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| DoctorError::InvalidPlaybook(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for playbook in &self.playbooks {
            if !ids.insert(playbook.id.as_str()) {
                return Err(DoctorError::InvalidPlaybook(format!(
                    "duplicate playbook id '{}'",
                    playbook.id
                )));
            }
            playbook.validate()?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&Playbook> {
        self.playbooks
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| DoctorError::UnknownPlaybook(id.to_string()))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.playbooks.iter().map(|p| p.id.as_str()).collect()
    }

    /// Playbooks shipped with ergodoc.
    pub fn builtin() -> Self {
        Self {
            version: BUILTIN_VERSION,
            playbooks: vec![
                performance(),
                process_leak(),
                network(),
                supervision(),
                events(),
            ],
        }
    }
}

fn performance() -> Playbook {
    use SnapshotKind::Process;
    Playbook::new(
        "performance",
        "Slow or overloaded processes",
        "Mailbox pressure and blocked handlers",
    )
    .rule(
        Rule::new(
            "mailbox-overload",
            Process,
            "Message rate exceeds processing capacity",
            "Spread the load over a worker pool or throttle the producers sending to this process",
        )
        .when(Condition::above("mailbox_depth", 100.0))
        .when(Condition::at_least("drain_ratio", 2.0))
        .confidence(ConfidenceTier::High),
    )
    .rule(
        Rule::new(
            "mailbox-growing",
            Process,
            "Mailbox keeps growing without a plateau",
            "Profile the message handler; it is not keeping up with arrivals",
        )
        .when(Condition::increasing("mailbox_depth", 3)),
    )
    .rule(
        Rule::new(
            "blocked-in-call",
            Process,
            "Process is blocked in a synchronous call while messages queue up",
            "Replace the synchronous call with an asynchronous send/response or shorten its timeout",
        )
        .when(Condition::is("state", "wait_response"))
        .when(Condition::above("mailbox_depth", 0.0)),
    )
    .rule(
        Rule::new(
            "deep-mailbox",
            Process,
            "Deep mailbox",
            "Inspect the handler for slow operations before the backlog grows",
        )
        .when(Condition::above("mailbox_depth", 100.0))
        .confidence(ConfidenceTier::Low),
    )
}

fn process_leak() -> Playbook {
    use SnapshotKind::Node;
    Playbook::new(
        "process-leak",
        "Process and memory leaks",
        "Process counts or memory that never come back down",
    )
    .rule(
        Rule::new(
            "process-leak",
            Node,
            "Processes are spawned faster than they terminate (process leak)",
            "Find the spawner; link or monitor spawned processes and make sure they terminate",
        )
        .when(Condition::increasing("processes_total", 3))
        .when(Condition::above("processes_total", 1000.0))
        .confidence(ConfidenceTier::High),
    )
    .rule(
        Rule::new(
            "zombie-accumulation",
            Node,
            "Zombie processes are not being cleaned up",
            "Look for handlers that never return and for processes killed mid-message",
        )
        .when(Condition::above("processes_zombie", 0.0)),
    )
    .rule(
        Rule::new(
            "memory-growing",
            Node,
            "Node memory keeps growing",
            "Compare per-process memory across samples to find the holder",
        )
        .when(Condition::increasing("memory_used_bytes", 3))
        .confidence(ConfidenceTier::Low),
    )
    .rule(
        Rule::new(
            "process-count-rising",
            Node,
            "Process count is rising",
            "Keep sampling to see whether the count plateaus under steady load",
        )
        .when(Condition::increasing("processes_total", 3))
        .confidence(ConfidenceTier::Low),
    )
}

fn network() -> Playbook {
    use SnapshotKind::Network;
    Playbook::new(
        "network",
        "Inter-node connectivity",
        "Unreachable peers, rejected handshakes and unstable links",
    )
    .rule(
        Rule::new(
            "peer-unreachable",
            Network,
            "Remote node unreachable while messages are routed to it",
            "Verify the peer is running, its registrar route and the shared cookie",
        )
        .when(Condition::flag("connected", false))
        .when(Condition::above("messages_out", 0.0))
        .confidence(ConfidenceTier::High),
    )
    .rule(
        Rule::new(
            "handshake-rejected",
            Network,
            "Handshake rejected: cookie or TLS mismatch between nodes",
            "Align the node cookie and TLS settings on both sides",
        )
        .when(Condition::above("handshake_failures", 0.0))
        .confidence(ConfidenceTier::High),
    )
    .rule(
        Rule::new(
            "link-flapping",
            Network,
            "Link is flapping (repeated reconnects)",
            "Check network stability and keepalive settings between the nodes",
        )
        .when(Condition::increasing("reconnects", 3)),
    )
    .rule(
        Rule::new(
            "one-way-traffic",
            Network,
            "Traffic flows one way; the remote side is not replying",
            "Inspect the remote processes that should handle these messages",
        )
        .when(Condition::flag("connected", true))
        .when(Condition::above("messages_out", 0.0))
        .when(Condition::equal_to("messages_in", 0.0))
        .confidence(ConfidenceTier::Low),
    )
    .rule(
        Rule::new(
            "peer-disconnected",
            Network,
            "Peer disconnected",
            "Confirm whether the disconnect was planned",
        )
        .when(Condition::flag("connected", false))
        .confidence(ConfidenceTier::Low),
    )
}

fn supervision() -> Playbook {
    use SnapshotKind::Process;
    Playbook::new(
        "supervision",
        "Restart storms",
        "Supervised children that keep crashing",
    )
    .rule(
        Rule::new(
            "restart-intensity-exceeded",
            Process,
            "Supervisor restart intensity exceeded within its period",
            "Fix the crashing child; raising the intensity only hides the crash loop",
        )
        .when(Condition::compare(
            "restart_count",
            Comparison::Gt,
            "restart_intensity",
        ))
        .conclusive(),
    )
    .rule(
        Rule::new(
            "crash-loop",
            Process,
            "Child process is in a crash loop",
            "Inspect the child's termination reason across restarts",
        )
        .when(Condition::increasing("restart_count", 3))
        .confidence(ConfidenceTier::High),
    )
    .rule(
        Rule::new(
            "restarts-observed",
            Process,
            "Child restarts observed",
            "Check the supervisor's children for recent terminations",
        )
        .when(Condition::above("restart_count", 0.0))
        .confidence(ConfidenceTier::Low),
    )
}

fn events() -> Playbook {
    use SnapshotKind::Events;
    Playbook::new(
        "events",
        "Event delivery",
        "Published events that reach nobody",
    )
    .rule(
        Rule::new(
            "delivery-dropping",
            Events,
            "Event deliveries are being dropped",
            "Check subscriber mailboxes and the event buffer size",
        )
        .when(Condition::above("undelivered", 0.0))
        .confidence(ConfidenceTier::High),
    )
    .rule(
        Rule::new(
            "no-subscribers",
            Events,
            "Events are published with no subscribers",
            "Make sure consumers subscribe before the producer starts publishing",
        )
        .when(Condition::equal_to("subscribers", 0.0))
        .when(Condition::above("published", 0.0)),
    )
}
