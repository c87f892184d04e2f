//! Tests for budget.rs

use ergodoc_shared::budget::{
    check_session_budget, BudgetCheck, PollBudget, SessionBudget, MAX_DURATION_CAP_MS,
    MAX_POLL_SAMPLES_CAP, MAX_STEPS_CAP,
};
use std::time::Duration;

#[test]
fn test_session_budget_defaults_are_finite() {
    let budget = SessionBudget::default();
    assert_eq!(budget.max_steps, 8);
    assert_eq!(budget.max_duration_ms, 60_000);
    assert_eq!(budget.observation_timeout_ms, 5_000);
}

#[test]
fn test_unlimited_request_gets_cap() {
    let budget = SessionBudget::new(None, None);
    assert_eq!(budget.max_steps, MAX_STEPS_CAP);
    assert_eq!(budget.max_duration_ms, MAX_DURATION_CAP_MS);

    let budget = SessionBudget::new(Some(u32::MAX), Some(u64::MAX));
    assert_eq!(budget.max_steps, MAX_STEPS_CAP);
    assert_eq!(budget.max_duration_ms, MAX_DURATION_CAP_MS);
}

#[test]
fn test_zero_budget_clamped_to_one() {
    let budget = SessionBudget::new(Some(0), Some(0));
    assert_eq!(budget.max_steps, 1);
    assert_eq!(budget.max_duration_ms, 1);
    assert_eq!(budget.observation_timeout_ms, 1);
}

#[test]
fn test_observation_timeout_never_exceeds_duration() {
    let budget = SessionBudget::new(Some(4), Some(2_000)).with_observation_timeout_ms(9_000);
    assert_eq!(budget.observation_timeout_ms, 2_000);
}

#[test]
fn test_check_session_budget() {
    let budget = SessionBudget::new(Some(2), Some(1_000));
    assert_eq!(check_session_budget(1, 500, &budget), BudgetCheck::Ok);
    assert_eq!(
        check_session_budget(2, 500, &budget),
        BudgetCheck::StepsExhausted { limit: 2, used: 2 }
    );
    assert_eq!(
        check_session_budget(1, 1_000, &budget),
        BudgetCheck::TimeExhausted {
            budget_ms: 1_000,
            elapsed_ms: 1_000
        }
    );
    assert!(check_session_budget(5, 5_000, &budget).is_exceeded());
}

#[test]
fn test_remaining_saturates() {
    let budget = SessionBudget::new(Some(2), Some(1_000));
    assert_eq!(budget.remaining(Duration::from_millis(400)), Duration::from_millis(600));
    assert_eq!(budget.remaining(Duration::from_secs(5)), Duration::ZERO);
}

#[test]
fn test_poll_budget_clamped() {
    let poll = PollBudget {
        interval_ms: 0,
        max_samples: 10_000,
        max_duration_ms: 0,
    }
    .clamped();
    assert_eq!(poll.interval_ms, 1);
    assert_eq!(poll.max_samples, MAX_POLL_SAMPLES_CAP);
    assert_eq!(poll.max_duration_ms, 1);
}
