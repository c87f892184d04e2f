//! Step and wall-clock budgets for diagnostic sessions and trend polling.
//!
//! Every budget is finite. Callers asking for "unlimited" get the hard cap.
//! Pure decision functions for testability.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MAX_STEPS: u32 = 8;
pub const MAX_STEPS_CAP: u32 = 64;
pub const DEFAULT_MAX_DURATION_MS: u64 = 60_000;
pub const MAX_DURATION_CAP_MS: u64 = 600_000;
pub const DEFAULT_OBSERVATION_TIMEOUT_MS: u64 = 5_000;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_POLL_SAMPLES: u32 = 10;
pub const MAX_POLL_SAMPLES_CAP: u32 = 120;
pub const DEFAULT_POLL_DURATION_MS: u64 = 30_000;

/// Limits for one investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBudget {
    /// Maximum observation requests issued
    pub max_steps: u32,
    /// Wall-clock budget in ms
    pub max_duration_ms: u64,
    /// Per-observation timeout in ms
    pub observation_timeout_ms: u64,
}

impl Default for SessionBudget {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_duration_ms: DEFAULT_MAX_DURATION_MS,
            observation_timeout_ms: DEFAULT_OBSERVATION_TIMEOUT_MS,
        }
    }
}

impl SessionBudget {
    /// `None` means the caller asked for no limit; the cap applies.
    pub fn new(max_steps: Option<u32>, max_duration_ms: Option<u64>) -> Self {
        Self {
            max_steps: max_steps.unwrap_or(MAX_STEPS_CAP),
            max_duration_ms: max_duration_ms.unwrap_or(MAX_DURATION_CAP_MS),
            ..Default::default()
        }
        .clamped()
    }

    pub fn with_observation_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.observation_timeout_ms = timeout_ms;
        self.clamped()
    }

    /// Force every limit into `1..=cap`.
    pub fn clamped(self) -> Self {
        let max_duration_ms = self.max_duration_ms.clamp(1, MAX_DURATION_CAP_MS);
        Self {
            max_steps: self.max_steps.clamp(1, MAX_STEPS_CAP),
            max_duration_ms,
            observation_timeout_ms: self.observation_timeout_ms.clamp(1, max_duration_ms),
        }
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    pub fn observation_timeout(&self) -> Duration {
        Duration::from_millis(self.observation_timeout_ms)
    }

    /// Wall-clock time left, zero once spent.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.max_duration().saturating_sub(elapsed)
    }
}

/// Budget check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BudgetCheck {
    Ok,
    StepsExhausted { limit: u32, used: u32 },
    TimeExhausted { budget_ms: u64, elapsed_ms: u64 },
}

impl BudgetCheck {
    pub fn is_exceeded(&self) -> bool {
        !matches!(self, Self::Ok)
    }
}

/// Pure function: may another observation be issued?
/// Steps are checked before time.
pub fn check_session_budget(
    steps_used: u32,
    elapsed_ms: u64,
    budget: &SessionBudget,
) -> BudgetCheck {
    if steps_used >= budget.max_steps {
        BudgetCheck::StepsExhausted {
            limit: budget.max_steps,
            used: steps_used,
        }
    } else if elapsed_ms >= budget.max_duration_ms {
        BudgetCheck::TimeExhausted {
            budget_ms: budget.max_duration_ms,
            elapsed_ms,
        }
    } else {
        BudgetCheck::Ok
    }
}

/// Limits for periodic trend sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollBudget {
    pub interval_ms: u64,
    pub max_samples: u32,
    pub max_duration_ms: u64,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_samples: DEFAULT_POLL_SAMPLES,
            max_duration_ms: DEFAULT_POLL_DURATION_MS,
        }
    }
}

impl PollBudget {
    pub fn clamped(self) -> Self {
        let max_duration_ms = self.max_duration_ms.clamp(1, MAX_DURATION_CAP_MS);
        Self {
            interval_ms: self.interval_ms.clamp(1, max_duration_ms),
            max_samples: self.max_samples.clamp(1, MAX_POLL_SAMPLES_CAP),
            max_duration_ms,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }
}
