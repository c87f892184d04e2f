//! Session orchestrator: survey, narrow, confirm.
//!
//! State machine: Started -> Observing <-> Evaluating -> Concluded.
//! A session owns its history and hypotheses exclusively; the playbook set
//! is shared read-only and pinned at creation.
//!
//! One observation may be pending at a time. `begin_observation` hands out
//! a ticket, `complete_observation` consumes it. `observe` wraps both around
//! a timed call to an `ObservationSource`. A ticket is bound to the session
//! and step that issued it; dropping it unused frees the pending slot.

use crate::observer::{ObservationRequest, ObservationSource};
use crate::planner;
use chrono::{DateTime, Utc};
use ergodoc_shared::budget::check_session_budget;
use ergodoc_shared::{
    evaluate_playbook, BudgetCheck, DoctorError, Hypothesis, MetricSnapshot, Playbook,
    PlaybookSet, RawObservation, SessionBudget,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing observed yet, only a survey may be issued
    Started,
    /// Waiting for, or free to request, the next observation
    Observing,
    /// Running the playbook over the history
    Evaluating,
    /// Terminal
    Concluded,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Started => "started",
            SessionState::Observing => "observing",
            SessionState::Evaluating => "evaluating",
            SessionState::Concluded => "concluded",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ConclusionReason {
    /// A conclusive rule matched
    Confirmed { rule_id: String },
    /// Steps or time ran out; hypotheses are best effort
    BudgetExhausted { check: BudgetCheck },
}

/// Terminal record of one investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conclusion {
    pub session_id: Uuid,
    pub playbook_id: String,
    pub playbook_version: u32,
    pub reason: ConclusionReason,
    /// Rule-priority order, never empty
    pub hypotheses: Vec<Hypothesis>,
    pub history: Vec<MetricSnapshot>,
    pub steps_used: u32,
    pub elapsed_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl Conclusion {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.reason, ConclusionReason::Confirmed { .. })
    }

    pub fn leading(&self) -> Option<&Hypothesis> {
        self.hypotheses.first()
    }
}

/// Holds a session's pending slot; releases it when dropped.
#[derive(Debug)]
struct PendingSlot(Arc<AtomicBool>);

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Proof that an observation is pending. Consumed by `complete_observation`.
#[derive(Debug)]
pub struct ObservationTicket {
    session_id: Uuid,
    request: ObservationRequest,
    step: u32,
    timeout: Duration,
    _slot: PendingSlot,
}

impl ObservationTicket {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn request(&self) -> &ObservationRequest {
        &self.request
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// min(per-observation timeout, remaining wall-clock budget)
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Where a completed observation left the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Back in Observing, budget remains
    Observing,
    Concluded,
}

pub struct Session {
    id: Uuid,
    playbooks: Arc<PlaybookSet>,
    playbook_id: String,
    budget: SessionBudget,
    state: SessionState,
    history: Vec<MetricSnapshot>,
    hypotheses: Vec<Hypothesis>,
    steps_used: u32,
    pending: Arc<AtomicBool>,
    /// Last request that produced no snapshot, cleared by a success
    last_failed: Option<ObservationRequest>,
    started: Instant,
    started_at: DateTime<Utc>,
    conclusion: Option<Conclusion>,
}

impl Session {
    /// Start an investigation with `playbook_id` from the pinned set.
    /// The budget is clamped to the hard caps.
    pub fn new(
        playbooks: Arc<PlaybookSet>,
        playbook_id: &str,
        budget: SessionBudget,
    ) -> Result<Self, DoctorError> {
        playbooks.get(playbook_id)?;
        let budget = budget.clamped();
        let id = Uuid::new_v4();
        info!(
            "Session {} started: playbook {} v{}, {} step(s), {}ms",
            id, playbook_id, playbooks.version, budget.max_steps, budget.max_duration_ms
        );
        Ok(Self {
            id,
            playbooks,
            playbook_id: playbook_id.to_string(),
            budget,
            state: SessionState::Started,
            history: Vec::new(),
            hypotheses: Vec::new(),
            steps_used: 0,
            pending: Arc::new(AtomicBool::new(false)),
            last_failed: None,
            started: Instant::now(),
            started_at: Utc::now(),
            conclusion: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn playbook_id(&self) -> &str {
        &self.playbook_id
    }

    pub fn playbook_version(&self) -> u32 {
        self.playbooks.version
    }

    pub fn budget(&self) -> &SessionBudget {
        &self.budget
    }

    pub fn history(&self) -> &[MetricSnapshot] {
        &self.history
    }

    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hypotheses
    }

    pub fn steps_used(&self) -> u32 {
        self.steps_used
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_concluded(&self) -> bool {
        self.state == SessionState::Concluded
    }

    pub fn conclusion(&self) -> Option<&Conclusion> {
        self.conclusion.as_ref()
    }

    fn playbook(&self) -> Result<&Playbook, DoctorError> {
        self.playbooks.get(&self.playbook_id)
    }

    fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    fn check_budget(&self) -> BudgetCheck {
        check_session_budget(self.steps_used, self.elapsed_ms(), &self.budget)
    }

    /// Reserve the single pending slot for `request`.
    ///
    /// Fails without side effects unless the budget is spent, in which
    /// case the session concludes first.
    pub fn begin_observation(
        &mut self,
        request: ObservationRequest,
    ) -> Result<ObservationTicket, DoctorError> {
        if self.is_concluded() {
            return Err(DoctorError::SessionConcluded);
        }
        if self.is_pending() {
            return Err(DoctorError::ObservationAlreadyPending);
        }
        if self.history.is_empty() && !request.is_survey() {
            return Err(DoctorError::SurveyRequired {
                request: request.to_string(),
            });
        }

        let check = self.check_budget();
        if check.is_exceeded() {
            let steps_used = self.steps_used;
            let elapsed_ms = self.elapsed_ms();
            self.conclude(ConclusionReason::BudgetExhausted { check });
            return Err(DoctorError::BudgetExhausted {
                steps_used,
                elapsed_ms,
            });
        }

        self.steps_used += 1;
        self.pending.store(true, Ordering::Release);
        self.state = SessionState::Observing;
        let timeout = self
            .budget
            .observation_timeout()
            .min(self.budget.remaining(self.elapsed()));
        debug!(
            "Session {} step {}/{}: requesting {}",
            self.id, self.steps_used, self.budget.max_steps, request
        );
        Ok(ObservationTicket {
            session_id: self.id,
            request,
            step: self.steps_used,
            timeout,
            _slot: PendingSlot(Arc::clone(&self.pending)),
        })
    }

    /// Release the pending slot with the result of the ticket's request.
    ///
    /// A ticket issued by another session, or for an earlier step, is
    /// refused with `StaleTicket` and changes nothing here. A failed or
    /// malformed observation leaves the session in Observing and is
    /// returned to the caller. A snapshot is appended to the history and
    /// the playbook re-evaluated.
    pub fn complete_observation(
        &mut self,
        ticket: ObservationTicket,
        result: Result<RawObservation, DoctorError>,
    ) -> Result<StepOutcome, DoctorError> {
        if ticket.session_id != self.id {
            warn!(
                "Session {} refused a ticket issued by session {}",
                self.id, ticket.session_id
            );
            return Err(DoctorError::StaleTicket);
        }
        if self.is_concluded() {
            return Err(DoctorError::SessionConcluded);
        }
        if ticket.step != self.steps_used {
            warn!(
                "Session {} refused a ticket for step {}, now at step {}",
                self.id, ticket.step, self.steps_used
            );
            return Err(DoctorError::StaleTicket);
        }
        let ObservationTicket { request, step, .. } = ticket;

        let snapshot = result.and_then(|raw| {
            if raw.kind != request.kind {
                return Err(DoctorError::ObservationFailed(format!(
                    "requested {} but received a {} observation",
                    request, raw.kind
                )));
            }
            MetricSnapshot::from_raw(raw)
        });
        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Session {} step {} failed: {}", self.id, step, e);
                self.last_failed = Some(request);
                return Err(e);
            }
        };
        self.last_failed = None;

        debug!(
            "Session {} received {} snapshot {} for {}",
            self.id,
            snapshot.kind(),
            snapshot.id(),
            snapshot.subject()
        );
        self.history.push(snapshot);
        self.state = SessionState::Evaluating;
        self.hypotheses = evaluate_playbook(self.playbook()?, &self.history);
        for h in &self.hypotheses {
            debug!("  {} [{}] {}", h.rule_id, h.tier, h.subject);
        }

        if let Some(confirmed) = self.hypotheses.iter().find(|h| h.is_confirmed()) {
            let rule_id = confirmed.rule_id.clone();
            self.conclude(ConclusionReason::Confirmed { rule_id });
            return Ok(StepOutcome::Concluded);
        }

        let check = self.check_budget();
        if check.is_exceeded() {
            self.conclude(ConclusionReason::BudgetExhausted { check });
            return Ok(StepOutcome::Concluded);
        }

        self.state = SessionState::Observing;
        Ok(StepOutcome::Observing)
    }

    /// Issue one request against `source`, bounded by the ticket timeout.
    pub async fn observe<S>(
        &mut self,
        source: &S,
        request: ObservationRequest,
    ) -> Result<StepOutcome, DoctorError>
    where
        S: ObservationSource + ?Sized,
    {
        let ticket = self.begin_observation(request)?;
        let timeout = ticket.timeout();
        let result = match tokio::time::timeout(timeout, source.observe(ticket.request())).await {
            Ok(result) => result,
            Err(_) => Err(DoctorError::ObservationTimeout {
                request: ticket.request().to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };
        self.complete_observation(ticket, result)
    }

    /// Drive the session to its conclusion, choosing requests with the
    /// planner. Observation-level failures are retried while budget lasts.
    pub async fn run<S>(&mut self, source: &S) -> Result<Conclusion, DoctorError>
    where
        S: ObservationSource + ?Sized,
    {
        loop {
            if let Some(conclusion) = &self.conclusion {
                return Ok(conclusion.clone());
            }

            let request = planner::next_request(
                self.playbook()?,
                &self.history,
                &self.hypotheses,
                self.last_failed.as_ref(),
            );
            match self.observe(source, request).await {
                Ok(_) | Err(DoctorError::BudgetExhausted { .. }) => {}
                Err(e) if e.is_retryable() => {
                    warn!("Session {}: retrying after {}", self.id, e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn conclude(&mut self, reason: ConclusionReason) {
        if self.hypotheses.is_empty() {
            self.hypotheses.push(Hypothesis::inconclusive(&self.history));
        }
        self.state = SessionState::Concluded;

        let conclusion = Conclusion {
            session_id: self.id,
            playbook_id: self.playbook_id.clone(),
            playbook_version: self.playbooks.version,
            reason,
            hypotheses: self.hypotheses.clone(),
            history: self.history.clone(),
            steps_used: self.steps_used,
            elapsed_ms: self.elapsed_ms(),
            started_at: self.started_at,
        };
        match &conclusion.reason {
            ConclusionReason::Confirmed { rule_id } => info!(
                "Session {} concluded: confirmed by {} after {} step(s)",
                self.id, rule_id, self.steps_used
            ),
            ConclusionReason::BudgetExhausted { check } => info!(
                "Session {} concluded: budget exhausted ({:?}), {} hypothesis(es)",
                self.id,
                check,
                conclusion.hypotheses.len()
            ),
        }
        self.conclusion = Some(conclusion);
    }
}
