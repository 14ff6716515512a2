//! Zero-knowledge attestation provider.
//!
//! The provider fixes the public-input layout and delegates proving and
//! verification to a [`ZkBackend`]. A SNARK/STARK library plugs in by
//! implementing that trait; the coordinator never changes.
//!
//! # Public inputs
//!
//! ```text
//! [0] outcome_commitment = H(request fingerprint || return value || tx hash || success)
//! [1] batch_binding      = H("alz.zk.batch" || atomic_id)
//! [2] ledger_binding     = H("alz.zk.ledger" || ledger_id)
//! [3] circuit_binding    = H("alz.zk.circuit" || circuit_id || verifying_key_id)
//! ```

use alz_common::hash::domain_hash;
use alz_common::{ExecutionOutcome, LedgerId};
use async_trait::async_trait;
use tracing::debug;

use crate::provider::ensure_executable;
use crate::{Proof, ProofContext, ProofError, ProofKind, ProofProvider, Verdict, ZkPayload};

/// Number of public inputs in the outcome circuit.
pub const ZK_PUBLIC_INPUT_COUNT: usize = 4;

const BATCH_DOMAIN: &[u8] = b"alz.zk.batch";
const LEDGER_DOMAIN: &[u8] = b"alz.zk.ledger";
const CIRCUIT_DOMAIN: &[u8] = b"alz.zk.circuit";
const VK_DOMAIN: &[u8] = b"alz.zk.vk";

/// Proving system behind the ZK provider.
pub trait ZkBackend: Send + Sync {
    fn circuit_id(&self) -> &str;

    fn verifying_key_id(&self) -> [u8; 32];

    fn prove(&self, public_inputs: &[[u8; 32]]) -> Result<Vec<u8>, ProofError>;

    /// Check `proof_blob` against `public_inputs`, re-deriving validity from
    /// the inputs themselves.
    fn verify(&self, public_inputs: &[[u8; 32]], proof_blob: &[u8]) -> Result<(), String>;
}

/// Keyed blake3 transcript commitment standing in for a SNARK.
///
/// The proof blob is `keyed_hash(secret, public_inputs)`. Verification
/// recomputes it, so a forged or altered blob is rejected, but the scheme is
/// symmetric (verifier holds the secret) and offers no zero-knowledge or
/// succinctness properties.
pub struct HashCommitmentBackend {
    circuit_id: String,
    secret: [u8; 32],
}

impl HashCommitmentBackend {
    pub fn new(circuit_id: impl Into<String>, secret: [u8; 32]) -> Self {
        Self {
            circuit_id: circuit_id.into(),
            secret,
        }
    }

    /// Derive the secret from a seed string.
    pub fn from_seed(circuit_id: impl Into<String>, seed: &str) -> Self {
        Self::new(circuit_id, *blake3::hash(seed.as_bytes()).as_bytes())
    }

    fn transcript(&self, public_inputs: &[[u8; 32]]) -> [u8; 32] {
        let mut data = Vec::with_capacity(public_inputs.len() * 32);
        for input in public_inputs {
            data.extend_from_slice(input);
        }
        *blake3::keyed_hash(&self.secret, &data).as_bytes()
    }
}

impl ZkBackend for HashCommitmentBackend {
    fn circuit_id(&self) -> &str {
        &self.circuit_id
    }

    fn verifying_key_id(&self) -> [u8; 32] {
        domain_hash(VK_DOMAIN, &[&self.secret])
    }

    fn prove(&self, public_inputs: &[[u8; 32]]) -> Result<Vec<u8>, ProofError> {
        Ok(self.transcript(public_inputs).to_vec())
    }

    fn verify(&self, public_inputs: &[[u8; 32]], proof_blob: &[u8]) -> Result<(), String> {
        if proof_blob == self.transcript(public_inputs).as_slice() {
            Ok(())
        } else {
            Err("transcript commitment does not match public inputs".to_string())
        }
    }
}

pub fn batch_binding(atomic_id: &str) -> [u8; 32] {
    domain_hash(BATCH_DOMAIN, &[atomic_id.as_bytes()])
}

pub fn ledger_binding(ledger_id: &LedgerId) -> [u8; 32] {
    domain_hash(LEDGER_DOMAIN, &[ledger_id.as_str().as_bytes()])
}

pub fn circuit_binding(circuit_id: &str, verifying_key_id: &[u8; 32]) -> [u8; 32] {
    domain_hash(CIRCUIT_DOMAIN, &[circuit_id.as_bytes(), verifying_key_id])
}

pub struct ZkProvider<B: ZkBackend> {
    issuer_id: String,
    backend: B,
}

impl<B: ZkBackend> ZkProvider<B> {
    pub fn new(issuer_id: impl Into<String>, backend: B) -> Self {
        Self {
            issuer_id: issuer_id.into(),
            backend,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn public_inputs(&self, outcome: &ExecutionOutcome, atomic_id: &str) -> Vec<[u8; 32]> {
        vec![
            outcome.commitment(),
            batch_binding(atomic_id),
            ledger_binding(&outcome.request.ledger_id),
            circuit_binding(self.backend.circuit_id(), &self.backend.verifying_key_id()),
        ]
    }
}

#[async_trait]
impl<B: ZkBackend> ProofProvider for ZkProvider<B> {
    fn kind(&self) -> ProofKind {
        ProofKind::Zk
    }

    fn issuer_id(&self) -> &str {
        &self.issuer_id
    }

    async fn generate(
        &self,
        outcome: &ExecutionOutcome,
        context: &ProofContext,
    ) -> Result<Proof, ProofError> {
        ensure_executable(outcome)?;

        let public_inputs = self.public_inputs(outcome, &context.atomic_id);
        let proof_blob = self.backend.prove(&public_inputs)?;

        let proof = Proof::zk(
            self.issuer_id.clone(),
            ZkPayload {
                ledger_id: outcome.request.ledger_id.clone(),
                circuit_id: self.backend.circuit_id().to_string(),
                verifying_key_id: self.backend.verifying_key_id(),
                public_inputs,
                proof_blob,
            },
        );
        debug!(proof_id = %proof.id_hex(), ledger = %outcome.request.ledger_id, "zk proof generated");
        Ok(proof)
    }

    async fn verify(&self, proof: &Proof) -> Verdict {
        let Proof::Zk(envelope) = proof else {
            return Verdict::invalid(format!("zk provider cannot verify {} proof", proof.kind()));
        };
        if !proof.has_valid_id() {
            return Verdict::invalid("proof id does not match payload");
        }

        let payload = &envelope.payload;
        if payload.circuit_id != self.backend.circuit_id() {
            return Verdict::invalid(format!("unknown circuit {}", payload.circuit_id));
        }
        if payload.verifying_key_id != self.backend.verifying_key_id() {
            return Verdict::invalid("verifying key mismatch");
        }
        if payload.public_inputs.len() != ZK_PUBLIC_INPUT_COUNT {
            return Verdict::invalid(format!(
                "expected {} public inputs, found {}",
                ZK_PUBLIC_INPUT_COUNT,
                payload.public_inputs.len()
            ));
        }
        if payload.public_inputs[2] != ledger_binding(&payload.ledger_id) {
            return Verdict::invalid("ledger binding does not match payload ledger");
        }
        if payload.public_inputs[3] != circuit_binding(&payload.circuit_id, &payload.verifying_key_id) {
            return Verdict::invalid("circuit binding mismatch");
        }

        match self.backend.verify(&payload.public_inputs, &payload.proof_blob) {
            Ok(()) => Verdict::Valid,
            Err(reason) => Verdict::Invalid(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_rejects_altered_inputs() {
        let backend = HashCommitmentBackend::from_seed("outcome-v1", "seed");
        let inputs = vec![[1u8; 32], [2u8; 32]];
        let blob = backend.prove(&inputs).unwrap();
        assert!(backend.verify(&inputs, &blob).is_ok());

        let altered = vec![[1u8; 32], [3u8; 32]];
        assert!(backend.verify(&altered, &blob).is_err());
    }

    #[test]
    fn test_backends_with_different_secrets_disagree() {
        let a = HashCommitmentBackend::from_seed("outcome-v1", "a");
        let b = HashCommitmentBackend::from_seed("outcome-v1", "b");
        let inputs = vec![[9u8; 32]];
        let blob = a.prove(&inputs).unwrap();
        assert!(b.verify(&inputs, &blob).is_err());
        assert_ne!(a.verifying_key_id(), b.verifying_key_id());
    }
}
