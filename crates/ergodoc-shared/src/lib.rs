//! Shared types and pure logic for ergodoc.
//!
//! Snapshot model, rule tables, the evaluator and budgets. Nothing in this
//! crate performs I/O or waits on anything.

pub mod budget;
pub mod error;
pub mod evaluator;
pub mod hypothesis;
pub mod playbook;
pub mod rule;
pub mod snapshot;

pub use budget::{BudgetCheck, PollBudget, SessionBudget};
pub use error::DoctorError;
pub use evaluator::{evaluate, evaluate_playbook};
pub use hypothesis::{ConfidenceTier, Evidence, Hypothesis};
pub use playbook::{Playbook, PlaybookSet};
pub use rule::{Comparison, Condition, Rule, TrendDirection};
pub use snapshot::{MetricSnapshot, MetricValue, RawObservation, SnapshotDelta, SnapshotKind};
