//! Observation source abstraction.
//!
//! The session only depends on `ObservationSource`; whatever exposes live
//! metrics from the monitored node implements it. `ScriptedObserver` replays
//! recorded observations, for the `run` command and for tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ergodoc_shared::{DoctorError, RawObservation, SnapshotKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// What to observe next. An untargeted process request asks for the
/// busiest process (deepest mailbox).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationRequest {
    pub kind: SnapshotKind,
    #[serde(default)]
    pub target: Option<String>,
}

impl ObservationRequest {
    /// Node-wide summary, always the first request of a session.
    pub fn survey() -> Self {
        Self {
            kind: SnapshotKind::Node,
            target: None,
        }
    }

    pub fn of(kind: SnapshotKind) -> Self {
        Self { kind, target: None }
    }

    pub fn targeting(kind: SnapshotKind, subject: &str) -> Self {
        Self {
            kind,
            target: Some(subject.to_string()),
        }
    }

    pub fn is_survey(&self) -> bool {
        self.kind == SnapshotKind::Node && self.target.is_none()
    }
}

impl std::fmt::Display for ObservationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{}:{}", self.kind, target),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Capability to read live metrics from the monitored node.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn observe(&self, request: &ObservationRequest)
        -> Result<RawObservation, DoctorError>;
}

/// Replays recorded observations, one queue per observation class.
pub struct ScriptedObserver {
    queues: Mutex<HashMap<SnapshotKind, VecDeque<RawObservation>>>,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<ObservationRequest>>>,
}

impl ScriptedObserver {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            delay: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue observations in the given order.
    pub fn from_observations(observations: Vec<RawObservation>) -> Self {
        let observer = Self::new();
        for raw in observations {
            observer.push(raw);
        }
        observer
    }

    /// Load a JSON array of raw observations.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        let observations: Vec<RawObservation> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid fixture {}", path.display()))?;
        Ok(Self::from_observations(observations))
    }

    /// Delay every answer, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, raw: RawObservation) {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(raw.kind)
            .or_default()
            .push_back(raw);
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<ObservationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn remaining(&self, kind: SnapshotKind) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, VecDeque::len)
    }

    fn take(&self, request: &ObservationRequest) -> Option<RawObservation> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = queues.get_mut(&request.kind)?;
        match &request.target {
            Some(target) => {
                let index = queue
                    .iter()
                    .position(|raw| raw.subject() == Some(target.as_str()))?;
                queue.remove(index)
            }
            None => queue.pop_front(),
        }
    }
}

impl Default for ScriptedObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObservationSource for ScriptedObserver {
    async fn observe(
        &self,
        request: &ObservationRequest,
    ) -> Result<RawObservation, DoctorError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let raw = self.take(request).ok_or_else(|| {
            DoctorError::ObservationFailed(format!("no recorded '{}' observation left", request))
        })?;
        debug!("Replaying {} observation from {}", raw.kind, raw.source);
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(pid: &str) -> RawObservation {
        RawObservation::new(SnapshotKind::Process, "t").with("pid", pid)
    }

    #[test]
    fn test_survey_request() {
        assert!(ObservationRequest::survey().is_survey());
        assert!(!ObservationRequest::targeting(SnapshotKind::Node, "n@h").is_survey());
        assert_eq!(
            ObservationRequest::targeting(SnapshotKind::Process, "<A.0.1>").to_string(),
            "process:<A.0.1>"
        );
    }

    #[tokio::test]
    async fn test_scripted_replays_in_order() {
        let observer =
            ScriptedObserver::from_observations(vec![process("<A.0.1>"), process("<A.0.2>")]);
        let request = ObservationRequest::of(SnapshotKind::Process);

        let first = observer.observe(&request).await.unwrap();
        assert_eq!(first.subject(), Some("<A.0.1>"));
        let second = observer.observe(&request).await.unwrap();
        assert_eq!(second.subject(), Some("<A.0.2>"));
        assert!(matches!(
            observer.observe(&request).await,
            Err(DoctorError::ObservationFailed(_))
        ));
        assert_eq!(observer.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_targeted_request() {
        let observer =
            ScriptedObserver::from_observations(vec![process("<A.0.1>"), process("<A.0.2>")]);
        let raw = observer
            .observe(&ObservationRequest::targeting(SnapshotKind::Process, "<A.0.2>"))
            .await
            .unwrap();
        assert_eq!(raw.subject(), Some("<A.0.2>"));
        assert_eq!(observer.remaining(SnapshotKind::Process), 1);
    }
}
