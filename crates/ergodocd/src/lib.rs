//! ergodoc daemon library - exposes modules for testing.

pub mod action;
pub mod cli;
pub mod config;
pub mod observer;
pub mod planner;
pub mod poller;
pub mod report;
pub mod session;

pub use action::{ActionGate, ActionRequest, ActionSource, AuthorizationToken, DryRunActions};
pub use observer::{ObservationRequest, ObservationSource, ScriptedObserver};
pub use poller::{poll_trend, PollReport, PollStop};
pub use session::{Conclusion, ConclusionReason, Session, SessionState, StepOutcome};
