//! Typed metric snapshots built from raw tool observations.
//!
//! A raw observation is whatever key/value data the monitored node's tool
//! interface returned. `MetricSnapshot::from_raw` checks it against the
//! schema of its observation class and freezes it. Snapshots are never
//! mutated afterwards and can only be compared within one class.

use crate::error::{DoctorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Observation class of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// One row of the process list
    Process,
    /// Node-wide summary
    Node,
    /// One network link to a peer node
    Network,
    /// One registered event and its subscriptions
    Events,
}

impl SnapshotKind {
    pub const ALL: [SnapshotKind; 4] = [
        SnapshotKind::Process,
        SnapshotKind::Node,
        SnapshotKind::Network,
        SnapshotKind::Events,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Process => "process",
            SnapshotKind::Node => "node",
            SnapshotKind::Network => "network",
            SnapshotKind::Events => "events",
        }
    }

    /// Field schema for this class, in declaration order.
    pub fn schema(&self) -> &'static [(&'static str, FieldType)] {
        match self {
            SnapshotKind::Process => PROCESS_SCHEMA,
            SnapshotKind::Node => NODE_SCHEMA,
            SnapshotKind::Network => NETWORK_SCHEMA,
            SnapshotKind::Events => EVENTS_SCHEMA,
        }
    }

    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        self.schema()
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, ty)| *ty)
    }
}

impl std::fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Number,
    Flag,
    Text,
}

const PROCESS_SCHEMA: &[(&str, FieldType)] = &[
    ("pid", FieldType::Text),
    ("name", FieldType::Text),
    ("behavior", FieldType::Text),
    ("state", FieldType::Text),
    ("mailbox_depth", FieldType::Number),
    ("drain_ratio", FieldType::Number),
    ("uptime_secs", FieldType::Number),
    ("messages_in", FieldType::Number),
    ("messages_out", FieldType::Number),
    ("restart_count", FieldType::Number),
    ("restart_intensity", FieldType::Number),
    ("restart_period_secs", FieldType::Number),
];

const NODE_SCHEMA: &[(&str, FieldType)] = &[
    ("node", FieldType::Text),
    ("uptime_secs", FieldType::Number),
    ("processes_total", FieldType::Number),
    ("processes_running", FieldType::Number),
    ("processes_zombie", FieldType::Number),
    ("memory_used_bytes", FieldType::Number),
    ("memory_alloc_bytes", FieldType::Number),
    ("applications", FieldType::Number),
];

const NETWORK_SCHEMA: &[(&str, FieldType)] = &[
    ("peer", FieldType::Text),
    ("connected", FieldType::Flag),
    ("messages_in", FieldType::Number),
    ("messages_out", FieldType::Number),
    ("bytes_in", FieldType::Number),
    ("bytes_out", FieldType::Number),
    ("reconnects", FieldType::Number),
    ("handshake_failures", FieldType::Number),
    ("pool_size", FieldType::Number),
];

const EVENTS_SCHEMA: &[(&str, FieldType)] = &[
    ("event", FieldType::Text),
    ("producer", FieldType::Text),
    ("subscribers", FieldType::Number),
    ("published", FieldType::Number),
    ("undelivered", FieldType::Number),
];

/// Process states as reported by the actor framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Init,
    Sleep,
    Running,
    WaitResponse,
    Terminated,
    Zombie,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Init => "init",
            ProcessState::Sleep => "sleep",
            ProcessState::Running => "running",
            ProcessState::WaitResponse => "wait_response",
            ProcessState::Terminated => "terminated",
            ProcessState::Zombie => "zombie",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "init" => Some(ProcessState::Init),
            "sleep" => Some(ProcessState::Sleep),
            "running" => Some(ProcessState::Running),
            "wait_response" | "waitresponse" => Some(ProcessState::WaitResponse),
            "terminated" => Some(ProcessState::Terminated),
            "zombie" => Some(ProcessState::Zombie),
            _ => None,
        }
    }
}

/// Untyped observation as handed over by an observation source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub kind: SnapshotKind,
    pub observed_at: DateTime<Utc>,
    /// Where the data came from (node name, tool name)
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl RawObservation {
    pub fn new(kind: SnapshotKind, source: &str) -> Self {
        Self {
            kind,
            observed_at: Utc::now(),
            source: source.to_string(),
            fields: Map::new(),
        }
    }

    pub fn at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = observed_at;
        self
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Subject the observation is about, if the identifying field is present.
    pub fn subject(&self) -> Option<&str> {
        let key = match self.kind {
            SnapshotKind::Process => "pid",
            SnapshotKind::Node => "node",
            SnapshotKind::Network => "peer",
            SnapshotKind::Events => "event",
        };
        self.fields.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetrics {
    pub pid: String,
    pub name: Option<String>,
    pub behavior: Option<String>,
    pub state: ProcessState,
    pub mailbox_depth: u64,
    /// Inbound rate over processed rate; above 1.0 the mailbox grows
    pub drain_ratio: f64,
    pub uptime_secs: u64,
    pub messages_in: u64,
    pub messages_out: u64,
    pub restart_count: u64,
    /// Only set on supervisors
    pub restart_intensity: Option<u64>,
    pub restart_period_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub node: String,
    pub uptime_secs: u64,
    pub processes_total: u64,
    pub processes_running: u64,
    pub processes_zombie: u64,
    pub memory_used_bytes: u64,
    pub memory_alloc_bytes: u64,
    pub applications: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub peer: String,
    pub connected: bool,
    pub messages_in: u64,
    pub messages_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub reconnects: u64,
    pub handshake_failures: u64,
    pub pool_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetrics {
    pub event: String,
    pub producer: String,
    pub subscribers: u64,
    pub published: u64,
    pub undelivered: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metrics {
    Process(ProcessMetrics),
    Node(NodeMetrics),
    Network(NetworkMetrics),
    Events(EventMetrics),
}

/// A single field value read from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue<'a> {
    Number(f64),
    Flag(bool),
    Text(&'a str),
}

impl MetricValue<'_> {
    /// Numeric view; flags read as 1 and 0.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
            MetricValue::Text(_) => None,
        }
    }
}

impl std::fmt::Display for MetricValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{}", n),
            MetricValue::Flag(b) => write!(f, "{}", b),
            MetricValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Immutable, timestamped observation of one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    id: Uuid,
    observed_at: DateTime<Utc>,
    source: String,
    metrics: Metrics,
}

impl MetricSnapshot {
    /// Validate a raw observation against its class schema.
    pub fn from_raw(raw: RawObservation) -> Result<Self> {
        let reader = FieldReader {
            kind: raw.kind,
            fields: &raw.fields,
        };

        let metrics = match raw.kind {
            SnapshotKind::Process => {
                let pid = reader.text("pid")?;
                let state_text = reader.text("state")?;
                let state = ProcessState::parse(&state_text).ok_or_else(|| {
                    DoctorError::malformed(
                        raw.kind,
                        "state",
                        format!("has unknown process state '{}'", state_text),
                    )
                })?;
                Metrics::Process(ProcessMetrics {
                    pid,
                    name: reader.opt_text("name")?,
                    behavior: reader.opt_text("behavior")?,
                    state,
                    mailbox_depth: reader.count("mailbox_depth")?,
                    drain_ratio: reader.ratio("drain_ratio")?,
                    uptime_secs: reader.count("uptime_secs")?,
                    messages_in: reader.opt_count("messages_in")?.unwrap_or(0),
                    messages_out: reader.opt_count("messages_out")?.unwrap_or(0),
                    restart_count: reader.opt_count("restart_count")?.unwrap_or(0),
                    restart_intensity: reader.opt_count("restart_intensity")?,
                    restart_period_secs: reader.opt_count("restart_period_secs")?,
                })
            }
            SnapshotKind::Node => Metrics::Node(NodeMetrics {
                node: reader.text("node")?,
                uptime_secs: reader.count("uptime_secs")?,
                processes_total: reader.count("processes_total")?,
                processes_running: reader.opt_count("processes_running")?.unwrap_or(0),
                processes_zombie: reader.opt_count("processes_zombie")?.unwrap_or(0),
                memory_used_bytes: reader.opt_count("memory_used_bytes")?.unwrap_or(0),
                memory_alloc_bytes: reader.opt_count("memory_alloc_bytes")?.unwrap_or(0),
                applications: reader.opt_count("applications")?.unwrap_or(0),
            }),
            SnapshotKind::Network => Metrics::Network(NetworkMetrics {
                peer: reader.text("peer")?,
                connected: reader.flag("connected")?,
                messages_in: reader.count("messages_in")?,
                messages_out: reader.count("messages_out")?,
                bytes_in: reader.opt_count("bytes_in")?.unwrap_or(0),
                bytes_out: reader.opt_count("bytes_out")?.unwrap_or(0),
                reconnects: reader.opt_count("reconnects")?.unwrap_or(0),
                handshake_failures: reader.opt_count("handshake_failures")?.unwrap_or(0),
                pool_size: reader.opt_count("pool_size")?.unwrap_or(0),
            }),
            SnapshotKind::Events => Metrics::Events(EventMetrics {
                event: reader.text("event")?,
                producer: reader.text("producer")?,
                subscribers: reader.count("subscribers")?,
                published: reader.count("published")?,
                undelivered: reader.opt_count("undelivered")?.unwrap_or(0),
            }),
        };

        Ok(Self {
            id: Uuid::new_v4(),
            observed_at: raw.observed_at,
            source: raw.source,
            metrics,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn kind(&self) -> SnapshotKind {
        match &self.metrics {
            Metrics::Process(_) => SnapshotKind::Process,
            Metrics::Node(_) => SnapshotKind::Node,
            Metrics::Network(_) => SnapshotKind::Network,
            Metrics::Events(_) => SnapshotKind::Events,
        }
    }

    /// Identity of what was observed: pid, node, peer or event name.
    pub fn subject(&self) -> &str {
        match &self.metrics {
            Metrics::Process(p) => &p.pid,
            Metrics::Node(n) => &n.node,
            Metrics::Network(n) => &n.peer,
            Metrics::Events(e) => &e.event,
        }
    }

    /// Read a field by its schema name. Absent optional fields return None.
    pub fn value(&self, field: &str) -> Option<MetricValue<'_>> {
        use MetricValue::{Flag, Number, Text};
        let count = |v: u64| Some(Number(v as f64));

        match &self.metrics {
            Metrics::Process(p) => match field {
                "pid" => Some(Text(&p.pid)),
                "name" => p.name.as_deref().map(Text),
                "behavior" => p.behavior.as_deref().map(Text),
                "state" => Some(Text(p.state.as_str())),
                "mailbox_depth" => count(p.mailbox_depth),
                "drain_ratio" => Some(Number(p.drain_ratio)),
                "uptime_secs" => count(p.uptime_secs),
                "messages_in" => count(p.messages_in),
                "messages_out" => count(p.messages_out),
                "restart_count" => count(p.restart_count),
                "restart_intensity" => p.restart_intensity.and_then(count),
                "restart_period_secs" => p.restart_period_secs.and_then(count),
                _ => None,
            },
            Metrics::Node(n) => match field {
                "node" => Some(Text(&n.node)),
                "uptime_secs" => count(n.uptime_secs),
                "processes_total" => count(n.processes_total),
                "processes_running" => count(n.processes_running),
                "processes_zombie" => count(n.processes_zombie),
                "memory_used_bytes" => count(n.memory_used_bytes),
                "memory_alloc_bytes" => count(n.memory_alloc_bytes),
                "applications" => count(n.applications),
                _ => None,
            },
            Metrics::Network(n) => match field {
                "peer" => Some(Text(&n.peer)),
                "connected" => Some(Flag(n.connected)),
                "messages_in" => count(n.messages_in),
                "messages_out" => count(n.messages_out),
                "bytes_in" => count(n.bytes_in),
                "bytes_out" => count(n.bytes_out),
                "reconnects" => count(n.reconnects),
                "handshake_failures" => count(n.handshake_failures),
                "pool_size" => count(n.pool_size),
                _ => None,
            },
            Metrics::Events(e) => match field {
                "event" => Some(Text(&e.event)),
                "producer" => Some(Text(&e.producer)),
                "subscribers" => count(e.subscribers),
                "published" => count(e.published),
                "undelivered" => count(e.undelivered),
                _ => None,
            },
        }
    }

    /// Numeric differences from `earlier` to `self`.
    pub fn compare(&self, earlier: &MetricSnapshot) -> Result<SnapshotDelta> {
        if self.kind() != earlier.kind() {
            return Err(DoctorError::IncompatibleSnapshotKind {
                left: self.kind(),
                right: earlier.kind(),
            });
        }

        let fields = self
            .kind()
            .schema()
            .iter()
            .filter(|(_, ty)| *ty != FieldType::Text)
            .filter_map(|(name, _)| {
                let before = earlier.value(name)?.as_number()?;
                let after = self.value(name)?.as_number()?;
                Some(FieldDelta {
                    field: name.to_string(),
                    before,
                    after,
                })
            })
            .collect();

        Ok(SnapshotDelta {
            kind: self.kind(),
            same_subject: self.subject() == earlier.subject(),
            elapsed_ms: (self.observed_at - earlier.observed_at).num_milliseconds(),
            fields,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    pub field: String,
    pub before: f64,
    pub after: f64,
}

impl FieldDelta {
    pub fn change(&self) -> f64 {
        self.after - self.before
    }
}

/// Result of comparing two snapshots of the same class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDelta {
    pub kind: SnapshotKind,
    pub same_subject: bool,
    /// Negative when the "later" snapshot was observed first
    pub elapsed_ms: i64,
    pub fields: Vec<FieldDelta>,
}

impl SnapshotDelta {
    pub fn field(&self, name: &str) -> Option<&FieldDelta> {
        self.fields.iter().find(|d| d.field == name)
    }

    /// Fields whose value changed
    pub fn changed(&self) -> impl Iterator<Item = &FieldDelta> {
        self.fields.iter().filter(|d| d.change() != 0.0)
    }
}

struct FieldReader<'a> {
    kind: SnapshotKind,
    fields: &'a Map<String, Value>,
}

impl FieldReader<'_> {
    fn required(&self, field: &str) -> Result<&Value> {
        match self.fields.get(field) {
            Some(Value::Null) | None => Err(DoctorError::malformed(self.kind, field, "is missing")),
            Some(v) => Ok(v),
        }
    }

    fn text(&self, field: &str) -> Result<String> {
        let value = self.required(field)?;
        match value.as_str() {
            Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
            Some(_) => Err(DoctorError::malformed(self.kind, field, "is empty")),
            None => Err(DoctorError::malformed(self.kind, field, "must be a string")),
        }
    }

    fn opt_text(&self, field: &str) -> Result<Option<String>> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.text(field).map(Some),
        }
    }

    fn count(&self, field: &str) -> Result<u64> {
        let value = self.required(field)?;
        if let Some(n) = value.as_u64() {
            return Ok(n);
        }
        match value.as_f64() {
            Some(f) if f < 0.0 => Err(DoctorError::malformed(
                self.kind,
                field,
                "must be a non-negative count",
            )),
            Some(f) if f.fract() != 0.0 => {
                Err(DoctorError::malformed(self.kind, field, "must be a whole number"))
            }
            Some(f) if f >= u64::MAX as f64 => {
                Err(DoctorError::malformed(self.kind, field, "is out of range"))
            }
            Some(f) => Ok(f as u64),
            None => Err(DoctorError::malformed(self.kind, field, "must be a number")),
        }
    }

    fn opt_count(&self, field: &str) -> Result<Option<u64>> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.count(field).map(Some),
        }
    }

    fn ratio(&self, field: &str) -> Result<f64> {
        let value = self.required(field)?;
        match value.as_f64() {
            Some(f) if !f.is_finite() => {
                Err(DoctorError::malformed(self.kind, field, "must be finite"))
            }
            Some(f) if f < 0.0 => Err(DoctorError::malformed(
                self.kind,
                field,
                "is a ratio and cannot be negative",
            )),
            Some(f) => Ok(f),
            None => Err(DoctorError::malformed(self.kind, field, "must be a number")),
        }
    }

    fn flag(&self, field: &str) -> Result<bool> {
        match self.required(field)? {
            Value::Bool(b) => Ok(*b),
            _ => Err(DoctorError::malformed(self.kind, field, "must be a boolean")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(depth: u64) -> RawObservation {
        RawObservation::new(SnapshotKind::Process, "node@test")
            .with("pid", "<ABC.0.1005>")
            .with("state", "running")
            .with("mailbox_depth", depth)
            .with("drain_ratio", 1.5)
            .with("uptime_secs", 120)
    }

    #[test]
    fn test_process_snapshot_defaults() {
        let snap = MetricSnapshot::from_raw(process(10)).unwrap();
        assert_eq!(snap.kind(), SnapshotKind::Process);
        assert_eq!(snap.subject(), "<ABC.0.1005>");
        assert_eq!(snap.value("restart_count"), Some(MetricValue::Number(0.0)));
        assert_eq!(snap.value("restart_intensity"), None);
        assert_eq!(snap.value("state"), Some(MetricValue::Text("running")));
    }

    #[test]
    fn test_state_must_be_known() {
        let raw = process(10).with("state", "dancing");
        let err = MetricSnapshot::from_raw(raw).unwrap_err();
        assert!(matches!(
            err,
            DoctorError::MalformedObservation { ref field, .. } if field == "state"
        ));
    }

    #[test]
    fn test_whole_float_counts_accepted() {
        let raw = process(0).with("mailbox_depth", 42.0);
        let snap = MetricSnapshot::from_raw(raw).unwrap();
        assert_eq!(snap.value("mailbox_depth"), Some(MetricValue::Number(42.0)));
    }

    #[test]
    fn test_flag_reads_as_number() {
        assert_eq!(MetricValue::Flag(true).as_number(), Some(1.0));
        assert_eq!(MetricValue::Flag(false).as_number(), Some(0.0));
        assert_eq!(MetricValue::Text("x").as_number(), None);
    }

    #[test]
    fn test_schema_lookup() {
        assert_eq!(
            SnapshotKind::Network.field_type("connected"),
            Some(FieldType::Flag)
        );
        assert_eq!(SnapshotKind::Node.field_type("mailbox_depth"), None);
    }
}
