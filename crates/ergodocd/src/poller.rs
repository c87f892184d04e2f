//! Trend polling: repeat one observation at a fixed interval.
//!
//! Bounded by a sample count and a duration, both clamped. Cancellation is
//! checked between samples. An observation in flight completes unless the
//! poll deadline passes first; then it is dropped and its step stays spent.

use crate::observer::{ObservationRequest, ObservationSource};
use crate::session::{Session, StepOutcome};
use ergodoc_shared::{DoctorError, PollBudget};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStop {
    MaxSamples,
    Duration,
    Cancelled,
    /// The session concluded, by confirmation or by its own budget
    Concluded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReport {
    /// Observations that produced a snapshot
    pub samples: u32,
    /// Observations issued, failed ones included
    pub attempts: u32,
    pub stopped: PollStop,
    pub elapsed_ms: u64,
}

/// Sample `request` into `session` until a bound is hit.
pub async fn poll_trend<S>(
    session: &mut Session,
    source: &S,
    request: &ObservationRequest,
    budget: PollBudget,
    cancel: &CancellationToken,
) -> Result<PollReport, DoctorError>
where
    S: ObservationSource + ?Sized,
{
    let budget = budget.clamped();
    let started = Instant::now();
    let deadline = started + budget.max_duration();
    let mut samples = 0u32;
    let mut attempts = 0u32;

    info!(
        "Polling {} every {}ms (max {} samples, {}ms)",
        request, budget.interval_ms, budget.max_samples, budget.max_duration_ms
    );

    let stopped = loop {
        if cancel.is_cancelled() {
            break PollStop::Cancelled;
        }
        if session.is_concluded() {
            break PollStop::Concluded;
        }
        if samples >= budget.max_samples {
            break PollStop::MaxSamples;
        }
        if Instant::now() >= deadline {
            break PollStop::Duration;
        }

        if attempts > 0 {
            let wake = (Instant::now() + budget.interval()).min(deadline);
            tokio::select! {
                _ = cancel.cancelled() => break PollStop::Cancelled,
                _ = tokio::time::sleep_until(wake) => {}
            }
            if Instant::now() >= deadline {
                break PollStop::Duration;
            }
        }

        attempts += 1;
        let sample =
            tokio::time::timeout_at(deadline, session.observe(source, request.clone())).await;
        let Ok(sample) = sample else {
            warn!("Poll attempt {} of {} cut off at the deadline", attempts, request);
            break PollStop::Duration;
        };
        match sample {
            Ok(StepOutcome::Observing) => samples += 1,
            Ok(StepOutcome::Concluded) => {
                samples += 1;
                break PollStop::Concluded;
            }
            Err(DoctorError::BudgetExhausted { .. }) => break PollStop::Concluded,
            Err(e) if e.is_retryable() => {
                warn!("Poll attempt {} of {} failed: {}", attempts, request, e);
            }
            Err(e) => return Err(e),
        }
        debug!("Poll {}: {} sample(s) after {} attempt(s)", request, samples, attempts);
    };

    let report = PollReport {
        samples,
        attempts,
        stopped,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        "Polling {} stopped ({:?}) with {} sample(s)",
        request, report.stopped, report.samples
    );
    Ok(report)
}
