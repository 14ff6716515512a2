//! Error types for proof generation and the proof registry.

use alz_common::{AdapterError, ConsensusFamily, LedgerId};
use thiserror::Error;

use crate::ProofKind;

#[derive(Debug, Error)]
pub enum ProofError {
    /// Proofs are only issued for outcomes that executed successfully.
    #[error("outcome {ledger_id}/{operation} is not executable: {reason}")]
    OutcomeNotExecutable {
        ledger_id: LedgerId,
        operation: String,
        reason: String,
    },

    #[error("expected {expected} proof, found {found}")]
    KindMismatch { expected: ProofKind, found: ProofKind },

    #[error("missing metadata: {0}")]
    MissingMetadata(String),

    #[error("inclusion path does not reach the ledger's transaction root")]
    InclusionMismatch,

    #[error("consensus evidence for {family} is missing {missing:?}")]
    IncompleteEvidence {
        family: ConsensusFamily,
        missing: Vec<String>,
    },

    #[error("consensus family mismatch: ledger runs {expected}, evidence claims {found}")]
    FamilyMismatch {
        expected: ConsensusFamily,
        found: ConsensusFamily,
    },

    #[error("proof backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The stored id does not match the proof content.
    #[error("proof id {claimed} does not match content id {computed}")]
    IdMismatch { claimed: String, computed: String },

    #[error("registry storage error: {0}")]
    Storage(String),

    #[error("registry serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sled::Error> for RegistryError {
    fn from(err: sled::Error) -> Self {
        RegistryError::Storage(err.to_string())
    }
}
