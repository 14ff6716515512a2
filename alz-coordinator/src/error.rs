//! Error types for the coordinator.

use alz_common::LedgerId;
use alz_proofs::ProofKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{Phase, Status};

/// Precondition and programming errors. Ledger-side failures never surface
/// here; they become failed outcomes and a rolled-back batch.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("no adapter registered for ledger {0}")]
    UnknownLedger(LedgerId),

    #[error("request {index} duplicates request {first} ({ledger_id}/{operation})")]
    DuplicateRequest {
        first: usize,
        index: usize,
        ledger_id: LedgerId,
        operation: String,
    },

    #[error("atomic batch is empty")]
    EmptyBatch,

    #[error("ledger {0} is served by a simulated adapter")]
    SimulatedLedger(LedgerId),

    #[error("illegal status transition {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("invalid configuration: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("transaction {0} is already in the audit log")]
    Duplicate(String),

    #[error("transaction {atomic_id} is not terminal (status {status})")]
    NotTerminal { atomic_id: String, status: Status },

    #[error("audit storage error: {0}")]
    Storage(String),

    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sled::Error> for AuditError {
    fn from(err: sled::Error) -> Self {
        AuditError::Storage(err.to_string())
    }
}

/// Why a batch did not commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchFailure {
    #[error("request {index} on {ledger_id} failed: {reason}")]
    ExecutionFailure {
        index: usize,
        ledger_id: LedgerId,
        reason: String,
    },

    #[error("{kind} proof generation failed for request {index}: {reason}")]
    ProofGenerationFailure {
        kind: ProofKind,
        index: usize,
        reason: String,
    },

    #[error("{kind} proof for request {index} failed verification: {reason}")]
    ProofVerificationFailure {
        kind: ProofKind,
        index: usize,
        reason: String,
    },

    #[error("{phase} phase exceeded its {timeout_ms}ms budget")]
    PhaseTimeout { phase: Phase, timeout_ms: u64 },
}

impl BatchFailure {
    /// The proof kind involved, for proof-phase failures.
    pub fn proof_kind(&self) -> Option<ProofKind> {
        match self {
            BatchFailure::ProofGenerationFailure { kind, .. }
            | BatchFailure::ProofVerificationFailure { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
