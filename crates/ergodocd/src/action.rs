//! Authorization-gated actions that change the monitored node.
//!
//! Every mutating call needs an `AuthorizationToken` granted for exactly
//! that request. Tokens are moved into the call, so each one is used once.
//! No token, or a token for another request, fails with
//! `AuthorizationRequired` before the action source is touched. The gate
//! owns its source and never hands it out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ergodoc_shared::DoctorError;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};
use uuid::Uuid;

/// Phrase an operator types to authorize one action.
pub const ACTION_CONFIRMATION: &str = "I CONFIRM (apply action)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    /// Ask the process to exit with a reason
    TerminateProcess { pid: String, reason: String },
    /// Kill the process without running its termination callback
    KillProcess { pid: String },
    /// Drop the connection to a peer node
    DisconnectPeer { peer: String },
}

/// Risk level for actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionRisk {
    /// Recoverable, the supervisor restarts what it owns
    Medium,
    /// Destructive or hard to undo
    High,
}

impl ActionRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ActionRequest::TerminateProcess { .. } => "terminate_process",
            ActionRequest::KillProcess { .. } => "kill_process",
            ActionRequest::DisconnectPeer { .. } => "disconnect_peer",
        }
    }

    pub fn risk(&self) -> ActionRisk {
        match self {
            ActionRequest::TerminateProcess { .. } => ActionRisk::Medium,
            ActionRequest::KillProcess { .. } | ActionRequest::DisconnectPeer { .. } => {
                ActionRisk::High
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ActionRequest::TerminateProcess { pid, reason } => {
                format!("terminate {} with reason '{}'", pid, reason)
            }
            ActionRequest::KillProcess { pid } => format!("kill {}", pid),
            ActionRequest::DisconnectPeer { peer } => format!("disconnect from {}", peer),
        }
    }
}

/// Single-use authorization for one specific request.
#[derive(Debug)]
pub struct AuthorizationToken {
    id: Uuid,
    request: ActionRequest,
    granted_at: DateTime<Utc>,
}

impl AuthorizationToken {
    /// Grant a token when the operator typed the confirmation phrase.
    pub fn grant(request: &ActionRequest, confirmation: &str) -> Result<Self, DoctorError> {
        if confirmation.trim() != ACTION_CONFIRMATION {
            return Err(DoctorError::AuthorizationRequired {
                action: request.describe(),
            });
        }
        Ok(Self {
            id: Uuid::new_v4(),
            request: request.clone(),
            granted_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn granted_at(&self) -> DateTime<Utc> {
        self.granted_at
    }

    pub fn authorizes(&self, request: &ActionRequest) -> bool {
        &self.request == request
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub request: ActionRequest,
    pub token_id: Uuid,
    /// False for dry runs
    pub applied: bool,
    pub message: String,
}

/// Capability to mutate the monitored node. Only `ActionGate` calls it,
/// after checking the token against the request.
#[async_trait]
pub trait ActionSource: Send + Sync {
    async fn act(
        &self,
        request: &ActionRequest,
        token: AuthorizationToken,
    ) -> Result<ActionOutcome, DoctorError>;
}

#[async_trait]
impl<A: ActionSource + ?Sized> ActionSource for Arc<A> {
    async fn act(
        &self,
        request: &ActionRequest,
        token: AuthorizationToken,
    ) -> Result<ActionOutcome, DoctorError> {
        (**self).act(request, token).await
    }
}

/// The only path from a caller to an `ActionSource`.
pub struct ActionGate<A: ActionSource> {
    source: A,
}

impl<A: ActionSource> ActionGate<A> {
    pub fn new(source: A) -> Self {
        Self { source }
    }

    pub async fn act(
        &self,
        request: &ActionRequest,
        token: Option<AuthorizationToken>,
    ) -> Result<ActionOutcome, DoctorError> {
        let Some(token) = token else {
            warn!("Refusing {}: no authorization supplied", request.name());
            return Err(DoctorError::AuthorizationRequired {
                action: request.describe(),
            });
        };

        if !token.authorizes(request) {
            warn!(
                "Refusing {}: token {} was granted for a different request",
                request.name(),
                token.id()
            );
            return Err(DoctorError::AuthorizationRequired {
                action: request.describe(),
            });
        }

        info!(
            "Applying {} (risk {:?}, token {} granted at {})",
            request.describe(),
            request.risk(),
            token.id(),
            token.granted_at().to_rfc3339()
        );
        self.source.act(request, token).await
    }
}

/// Records what would have been done. Changes nothing.
#[derive(Default)]
pub struct DryRunActions {
    performed: Mutex<Vec<ActionRequest>>,
}

impl DryRunActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn performed(&self) -> Vec<ActionRequest> {
        self.performed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ActionSource for DryRunActions {
    async fn act(
        &self,
        request: &ActionRequest,
        token: AuthorizationToken,
    ) -> Result<ActionOutcome, DoctorError> {
        self.performed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        info!("Dry run: would {}", request.describe());
        Ok(ActionOutcome {
            request: request.clone(),
            token_id: token.id(),
            applied: false,
            message: format!("dry run: would {}", request.describe()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminate(pid: &str) -> ActionRequest {
        ActionRequest::TerminateProcess {
            pid: pid.to_string(),
            reason: "normal".to_string(),
        }
    }

    #[test]
    fn test_grant_requires_exact_phrase() {
        let request = terminate("<A.0.1>");
        assert!(AuthorizationToken::grant(&request, "yes").is_err());
        assert!(AuthorizationToken::grant(&request, "i confirm (apply action)").is_err());
        let token = AuthorizationToken::grant(&request, ACTION_CONFIRMATION).unwrap();
        assert!(token.authorizes(&request));
        assert!(!token.authorizes(&terminate("<A.0.2>")));
    }

    #[test]
    fn test_risk_levels() {
        assert_eq!(terminate("<A.0.1>").risk(), ActionRisk::Medium);
        assert_eq!(
            ActionRequest::KillProcess {
                pid: "<A.0.1>".to_string()
            }
            .risk(),
            ActionRisk::High
        );
    }
}
