//! Proof objects.
//!
//! Every proof is an envelope around a kind-specific payload. The envelope's
//! `proof_id` is a content address over (kind, issuer, payload), so any
//! holder can recompute it; `created_at` is deliberately outside the hash so
//! regenerating a proof from the same outcome yields the same id.

use std::collections::BTreeMap;
use std::fmt;

use alz_common::hash::{canonical_json, domain_hash, to_hex};
use alz_common::{unix_millis, ConsensusFamily, ExecutionOutcome, LedgerId, MerklePathElement};
use serde::{Deserialize, Serialize};

use crate::zk::batch_binding;
use crate::ProofError;

/// Content-derived proof identifier.
pub type ProofId = [u8; 32];

const PROOF_ID_DOMAIN: &[u8] = b"alz.proof.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofKind {
    Zk,
    Inclusion,
    Consensus,
}

impl ProofKind {
    pub const ALL: [ProofKind; 3] = [Self::Zk, Self::Inclusion, Self::Consensus];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zk => "zk",
            Self::Inclusion => "inclusion",
            Self::Consensus => "consensus",
        }
    }
}

impl fmt::Display for ProofKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Zero-knowledge attestation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZkPayload {
    pub ledger_id: LedgerId,
    pub circuit_id: String,
    pub verifying_key_id: [u8; 32],
    /// Public inputs, in circuit order.
    pub public_inputs: Vec<[u8; 32]>,
    pub proof_blob: Vec<u8>,
}

/// Merkle inclusion payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionPayload {
    pub ledger_id: LedgerId,
    pub block_hash: [u8; 32],
    pub tx_hash: String,
    pub block_height: u64,
    pub leaf: [u8; 32],
    pub path: Vec<MerklePathElement>,
    pub depth: u32,
    pub root: [u8; 32],
}

/// Consensus attestation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusPayload {
    pub ledger_id: LedgerId,
    pub family: ConsensusFamily,
    pub tx_hash: String,
    pub block_height: u64,
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// Common proof header plus payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofEnvelope<P> {
    pub proof_id: ProofId,
    pub issuer_id: String,
    pub created_at: u64,
    pub payload: P,
}

impl<P: Serialize> ProofEnvelope<P> {
    fn seal(kind: ProofKind, issuer_id: impl Into<String>, payload: P) -> Self {
        let issuer_id = issuer_id.into();
        let proof_id = content_id(kind, &issuer_id, &payload);
        Self {
            proof_id,
            issuer_id,
            created_at: unix_millis(),
            payload,
        }
    }
}

pub type ZkProof = ProofEnvelope<ZkPayload>;
pub type InclusionProof = ProofEnvelope<InclusionPayload>;
pub type ConsensusProof = ProofEnvelope<ConsensusPayload>;

fn content_id<P: Serialize>(kind: ProofKind, issuer_id: &str, payload: &P) -> ProofId {
    domain_hash(
        PROOF_ID_DOMAIN,
        &[
            kind.as_str().as_bytes(),
            issuer_id.as_bytes(),
            &canonical_json(payload),
        ],
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Proof {
    Zk(ZkProof),
    Inclusion(InclusionProof),
    Consensus(ConsensusProof),
}

impl Proof {
    pub fn zk(issuer_id: impl Into<String>, payload: ZkPayload) -> Self {
        Self::Zk(ProofEnvelope::seal(ProofKind::Zk, issuer_id, payload))
    }

    pub fn inclusion(issuer_id: impl Into<String>, payload: InclusionPayload) -> Self {
        Self::Inclusion(ProofEnvelope::seal(ProofKind::Inclusion, issuer_id, payload))
    }

    pub fn consensus(issuer_id: impl Into<String>, payload: ConsensusPayload) -> Self {
        Self::Consensus(ProofEnvelope::seal(ProofKind::Consensus, issuer_id, payload))
    }

    pub fn kind(&self) -> ProofKind {
        match self {
            Self::Zk(_) => ProofKind::Zk,
            Self::Inclusion(_) => ProofKind::Inclusion,
            Self::Consensus(_) => ProofKind::Consensus,
        }
    }

    pub fn proof_id(&self) -> ProofId {
        match self {
            Self::Zk(p) => p.proof_id,
            Self::Inclusion(p) => p.proof_id,
            Self::Consensus(p) => p.proof_id,
        }
    }

    pub fn issuer_id(&self) -> &str {
        match self {
            Self::Zk(p) => &p.issuer_id,
            Self::Inclusion(p) => &p.issuer_id,
            Self::Consensus(p) => &p.issuer_id,
        }
    }

    pub fn created_at(&self) -> u64 {
        match self {
            Self::Zk(p) => p.created_at,
            Self::Inclusion(p) => p.created_at,
            Self::Consensus(p) => p.created_at,
        }
    }

    pub fn ledger_id(&self) -> &LedgerId {
        match self {
            Self::Zk(p) => &p.payload.ledger_id,
            Self::Inclusion(p) => &p.payload.ledger_id,
            Self::Consensus(p) => &p.payload.ledger_id,
        }
    }

    /// Recompute the id from kind, issuer and payload.
    pub fn content_id(&self) -> ProofId {
        match self {
            Self::Zk(p) => content_id(ProofKind::Zk, &p.issuer_id, &p.payload),
            Self::Inclusion(p) => content_id(ProofKind::Inclusion, &p.issuer_id, &p.payload),
            Self::Consensus(p) => content_id(ProofKind::Consensus, &p.issuer_id, &p.payload),
        }
    }

    pub fn has_valid_id(&self) -> bool {
        self.content_id() == self.proof_id()
    }

    pub fn id_hex(&self) -> String {
        to_hex(&self.proof_id())
    }

    /// Check that this proof attests `outcome` inside batch `atomic_id`.
    ///
    /// Provider verification only says the payload is internally sound. A
    /// sound proof of some other outcome, or of the same outcome in an
    /// earlier batch, fails here.
    pub fn check_binding(&self, outcome: &ExecutionOutcome, atomic_id: &str) -> Verdict {
        if self.ledger_id() != &outcome.request.ledger_id {
            return Verdict::invalid(format!(
                "proof attests ledger {}, outcome ran on {}",
                self.ledger_id(),
                outcome.request.ledger_id
            ));
        }
        match self {
            Self::Zk(p) => match p.payload.public_inputs.as_slice() {
                [commitment, batch, ..] => {
                    if *commitment != outcome.commitment() {
                        Verdict::invalid("zk outcome commitment does not match the outcome")
                    } else if *batch != batch_binding(atomic_id) {
                        Verdict::invalid("zk proof is bound to a different batch")
                    } else {
                        Verdict::Valid
                    }
                }
                _ => Verdict::invalid("zk proof carries no outcome or batch binding"),
            },
            Self::Inclusion(p) => tx_binding(&p.payload.tx_hash, outcome),
            Self::Consensus(p) => tx_binding(&p.payload.tx_hash, outcome),
        }
    }
}

fn tx_binding(tx_hash: &str, outcome: &ExecutionOutcome) -> Verdict {
    if outcome.tx_hash.as_deref() == Some(tx_hash) {
        Verdict::Valid
    } else {
        Verdict::invalid(format!(
            "proof attests transaction {tx_hash}, outcome reported {:?}",
            outcome.tx_hash
        ))
    }
}

/// Outcome of verifying one proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Valid,
    Invalid(String),
}

impl Verdict {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Valid => None,
            Self::Invalid(reason) => Some(reason),
        }
    }
}

/// The three proofs issued for one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofTriple {
    pub zk: Proof,
    pub inclusion: Proof,
    pub consensus: Proof,
}

impl ProofTriple {
    /// Assemble a triple, checking every slot holds the right kind.
    pub fn new(zk: Proof, inclusion: Proof, consensus: Proof) -> Result<Self, ProofError> {
        for (expected, proof) in [
            (ProofKind::Zk, &zk),
            (ProofKind::Inclusion, &inclusion),
            (ProofKind::Consensus, &consensus),
        ] {
            if proof.kind() != expected {
                return Err(ProofError::KindMismatch {
                    expected,
                    found: proof.kind(),
                });
            }
        }
        Ok(Self {
            zk,
            inclusion,
            consensus,
        })
    }

    pub fn as_array(&self) -> [&Proof; 3] {
        [&self.zk, &self.inclusion, &self.consensus]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_consensus() -> ConsensusPayload {
        ConsensusPayload {
            ledger_id: LedgerId::from("chainX"),
            family: ConsensusFamily::ProofOfStake,
            tx_hash: "0xabc".to_string(),
            block_height: 7,
            fields: BTreeMap::from([("slot".to_string(), serde_json::json!(7))]),
        }
    }

    #[test]
    fn test_proof_id_is_content_addressed() {
        let a = Proof::consensus("issuer", sample_consensus());
        let b = Proof::consensus("issuer", sample_consensus());
        assert_eq!(a.proof_id(), b.proof_id());
        assert!(a.has_valid_id());
    }

    #[test]
    fn test_proof_id_depends_on_issuer() {
        let a = Proof::consensus("issuer-a", sample_consensus());
        let b = Proof::consensus("issuer-b", sample_consensus());
        assert_ne!(a.proof_id(), b.proof_id());
    }

    #[test]
    fn test_tampered_payload_breaks_id() {
        let mut proof = Proof::consensus("issuer", sample_consensus());
        if let Proof::Consensus(ref mut p) = proof {
            p.payload.block_height += 1;
        }
        assert!(!proof.has_valid_id());
    }

    #[test]
    fn test_proof_serde_is_tagged() {
        let proof = Proof::consensus("issuer", sample_consensus());
        let json = serde_json::to_value(&proof).unwrap();
        assert_eq!(json["kind"], "consensus");
        let back: Proof = serde_json::from_value(json).unwrap();
        assert_eq!(back, proof);
    }

    fn outcome(tx_hash: &str) -> ExecutionOutcome {
        ExecutionOutcome::success(
            alz_common::OperationRequest::new("chainX", "transfer", Default::default()),
            serde_json::json!({"ok": true}),
            Some(tx_hash.to_string()),
            std::time::Duration::ZERO,
            alz_common::ExecutionMode::Real,
        )
    }

    #[test]
    fn test_consensus_binding_follows_tx_hash() {
        let proof = Proof::consensus("issuer", sample_consensus());
        assert!(proof.check_binding(&outcome("0xabc"), "batch-1").is_valid());

        let other = proof.check_binding(&outcome("0xdef"), "batch-1");
        assert!(other.reason().unwrap().contains("0xabc"));
    }

    #[test]
    fn test_binding_rejects_foreign_ledger() {
        let mut payload = sample_consensus();
        payload.ledger_id = LedgerId::from("chainY");
        let proof = Proof::consensus("issuer", payload);
        let verdict = proof.check_binding(&outcome("0xabc"), "batch-1");
        assert!(verdict.reason().unwrap().contains("chainY"));
    }

    #[test]
    fn test_zk_binding_checks_commitment_and_batch() {
        let executed = outcome("0xabc");
        let zk = |inputs: Vec<[u8; 32]>| {
            Proof::zk(
                "issuer",
                ZkPayload {
                    ledger_id: LedgerId::from("chainX"),
                    circuit_id: "c".to_string(),
                    verifying_key_id: [0; 32],
                    public_inputs: inputs,
                    proof_blob: vec![],
                },
            )
        };

        let bound = zk(vec![executed.commitment(), batch_binding("batch-1")]);
        assert!(bound.check_binding(&executed, "batch-1").is_valid());
        assert!(!bound.check_binding(&executed, "batch-2").is_valid());
        assert!(!bound.check_binding(&outcome("0xdef"), "batch-1").is_valid());
        assert!(!zk(vec![]).check_binding(&executed, "batch-1").is_valid());
    }

    #[test]
    fn test_triple_rejects_wrong_slot() {
        let c = Proof::consensus("issuer", sample_consensus());
        let err = ProofTriple::new(c.clone(), c.clone(), c).unwrap_err();
        assert!(matches!(
            err,
            ProofError::KindMismatch {
                expected: ProofKind::Zk,
                found: ProofKind::Consensus
            }
        ));
    }
}
