//! alz-proofs
//!
//! The layered proof pipeline for atomic multi-ledger execution.
//!
//! Every successful outcome is attested three ways:
//!
//! - **ZK** ([`ZkProvider`]): binds the outcome's request, return value and
//!   batch to a circuit/verifying key through a pluggable [`ZkBackend`].
//! - **Inclusion** ([`InclusionProvider`]): proves the transaction sits in
//!   its block's transaction tree by folding a Merkle path.
//! - **Consensus** ([`ConsensusProvider`]): checks that the ledger reported
//!   the finality fields its [`alz_common::ConsensusFamily`] requires.
//!
//! Each provider verifies from the payload alone. The [`ProofRegistry`]
//! records issued proofs for audit and replay protection, and
//! [`ProofVerifier`] exposes verification to third parties.

pub mod consensus;
pub mod error;
pub mod inclusion;
pub mod proof;
pub mod provider;
pub mod registry;
pub mod verifier;
pub mod zk;

pub use consensus::{missing_fields, ConsensusProvider, FinalityVerifier};
pub use error::{ProofError, RegistryError};
pub use inclusion::{check_inclusion, InclusionProvider};
pub use proof::{
    ConsensusPayload, ConsensusProof, InclusionPayload, InclusionProof, Proof, ProofEnvelope, ProofId,
    ProofKind, ProofTriple, Verdict, ZkPayload, ZkProof,
};
pub use provider::{ProofContext, ProofProvider};
pub use registry::{ProofRegistry, PROOF_DB_ENV};
pub use verifier::{ProofSuite, ProofVerifier, VerificationResponse};
pub use zk::{HashCommitmentBackend, ZkBackend, ZkProvider, ZK_PUBLIC_INPUT_COUNT};

/// Default circuit identifier of the outcome attestation circuit.
pub const DEFAULT_CIRCUIT_ID: &str = "alz-outcome-v1";

