//! Atomic transaction aggregate and its status machine.

use std::fmt;

use alz_common::{unix_millis, ExecutionOutcome, OperationRequest};
use alz_proofs::ProofTriple;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BatchFailure, CoordinatorError};
use crate::rollback::RollbackReport;

// ═══════════════════════════════════════════════════════════════════════════════
// STATUS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Preparing,
    Executing,
    Executed,
    ExecutionFailed,
    Proving,
    Proven,
    ProofFailed,
    Verifying,
    Committed,
    RollingBack,
    RolledBack,
    RollbackPartial,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Preparing => "PREPARING",
            Status::Executing => "EXECUTING",
            Status::Executed => "EXECUTED",
            Status::ExecutionFailed => "EXECUTION_FAILED",
            Status::Proving => "PROVING",
            Status::Proven => "PROVEN",
            Status::ProofFailed => "PROOF_FAILED",
            Status::Verifying => "VERIFYING",
            Status::Committed => "COMMITTED",
            Status::RollingBack => "ROLLING_BACK",
            Status::RolledBack => "ROLLED_BACK",
            Status::RollbackPartial => "ROLLBACK_PARTIAL",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Committed | Status::RolledBack | Status::RollbackPartial
        )
    }

    /// The allowed edge set. Terminal states have no successors.
    pub fn can_transition_to(&self, next: Status) -> bool {
        use Status::*;
        matches!(
            (self, next),
            (Preparing, Executing)
                | (Executing, Executed)
                | (Executing, ExecutionFailed)
                | (Executed, Proving)
                | (ExecutionFailed, RollingBack)
                | (Proving, Proven)
                | (Proving, ProofFailed)
                | (ProofFailed, RollingBack)
                | (Proven, Verifying)
                | (Verifying, Committed)
                | (Verifying, RollingBack)
                | (RollingBack, RolledBack)
                | (RollingBack, RollbackPartial)
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timed phases of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Execution,
    Proving,
    Verification,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Execution => "execution",
            Phase::Proving => "proving",
            Phase::Verification => "verification",
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AGGREGATE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: Status,
    pub to: Status,
    pub at: u64,
}

/// One atomic batch from submission to its terminal status.
///
/// `outcomes[i]` belongs to `requests[i]`; once proven, so does `proofs[i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomicTransaction {
    pub atomic_id: String,
    pub requests: Vec<OperationRequest>,
    pub outcomes: Vec<ExecutionOutcome>,
    pub proofs: Vec<ProofTriple>,
    status: Status,
    pub transitions: Vec<Transition>,
    pub created_at: u64,
    pub decided_at: Option<u64>,
    pub failure: Option<BatchFailure>,
    pub rollback_report: Option<RollbackReport>,
}

impl AtomicTransaction {
    pub fn new(requests: Vec<OperationRequest>) -> Self {
        Self {
            atomic_id: Uuid::new_v4().to_string(),
            requests,
            outcomes: Vec::new(),
            proofs: Vec::new(),
            status: Status::Preparing,
            transitions: Vec::new(),
            created_at: unix_millis(),
            decided_at: None,
            failure: None,
            rollback_report: None,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Move to `next`, refusing edges outside the status machine.
    pub fn advance(&mut self, next: Status) -> Result<(), CoordinatorError> {
        if !self.status.can_transition_to(next) {
            return Err(CoordinatorError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let at = unix_millis();
        self.transitions.push(Transition {
            from: self.status,
            to: next,
            at,
        });
        self.status = next;
        if next.is_terminal() {
            self.decided_at = Some(at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alz_common::params;

    fn tx() -> AtomicTransaction {
        AtomicTransaction::new(vec![OperationRequest::new(
            "chainX",
            "transfer",
            params([("amount", serde_json::json!(1))]),
        )])
    }

    #[test]
    fn test_commit_path() {
        let mut tx = tx();
        for next in [
            Status::Executing,
            Status::Executed,
            Status::Proving,
            Status::Proven,
            Status::Verifying,
            Status::Committed,
        ] {
            tx.advance(next).unwrap();
        }
        assert_eq!(tx.status(), Status::Committed);
        assert_eq!(tx.transitions.len(), 6);
        assert!(tx.decided_at.is_some());
    }

    #[test]
    fn test_rollback_paths() {
        let mut tx = tx();
        tx.advance(Status::Executing).unwrap();
        tx.advance(Status::ExecutionFailed).unwrap();
        tx.advance(Status::RollingBack).unwrap();
        tx.advance(Status::RollbackPartial).unwrap();
        assert!(tx.status().is_terminal());

        assert!(Status::Proving.can_transition_to(Status::ProofFailed));
        assert!(Status::ProofFailed.can_transition_to(Status::RollingBack));
        assert!(Status::Verifying.can_transition_to(Status::RollingBack));
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut tx = tx();
        let err = tx.advance(Status::Committed).unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::InvalidTransition {
                from: Status::Preparing,
                to: Status::Committed
            }
        ));
        assert_eq!(tx.status(), Status::Preparing);
        assert!(tx.transitions.is_empty());

        assert!(!Status::Proven.can_transition_to(Status::RollingBack));
        assert!(!Status::Executed.can_transition_to(Status::Committed));
    }

    #[test]
    fn test_terminal_is_frozen() {
        let mut tx = tx();
        tx.advance(Status::Executing).unwrap();
        tx.advance(Status::ExecutionFailed).unwrap();
        tx.advance(Status::RollingBack).unwrap();
        tx.advance(Status::RolledBack).unwrap();

        let all = [
            Status::Preparing,
            Status::Executing,
            Status::Executed,
            Status::ExecutionFailed,
            Status::Proving,
            Status::Proven,
            Status::ProofFailed,
            Status::Verifying,
            Status::Committed,
            Status::RollingBack,
            Status::RolledBack,
            Status::RollbackPartial,
        ];
        for next in all {
            assert!(tx.advance(next).is_err(), "{next} accepted after terminal");
        }
    }

    #[test]
    fn test_status_serializes_screaming() {
        let json = serde_json::to_string(&Status::RollbackPartial).unwrap();
        assert_eq!(json, "\"ROLLBACK_PARTIAL\"");
        assert_eq!(Status::ExecutionFailed.to_string(), "EXECUTION_FAILED");
    }
}
