//! alz-common
//!
//! Shared types for atomic multi-ledger execution: ledger identities,
//! consensus families, operation requests, execution outcomes and the
//! `ChainAdapter` boundary every target ledger is reached through.
//!
//! # Layers
//!
//! ```text
//! caller ──► AtomicCoordinator ──► ExecutionCoordinator ──► ChainAdapter (per ledger)
//!                   │
//!                   └──► ProofProviders (ZK / Inclusion / Consensus)
//! ```
//!
//! Everything in this crate is plain data plus the adapter trait, so that the
//! proof providers and the coordinator can share it without depending on each
//! other.

pub mod adapter;
pub mod hash;
pub mod ledger;
pub mod merkle;
pub mod outcome;
pub mod request;

pub use adapter::{
    AdapterError, AdapterResponse, ChainAdapter, ConsensusEvidence, MerklePathElement, TxMetadata,
};
pub use ledger::{ConsensusFamily, LedgerId};
pub use merkle::MerkleTree;
pub use outcome::{ExecutionMode, ExecutionOutcome};
pub use request::{is_mutating_verb, params, OperationRequest, Params, MUTATING_VERBS};

/// Reserved operation name for compensating (undo) operations.
pub const ROLLBACK_OPERATION: &str = "rollback";

/// Current unix time in milliseconds.
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
