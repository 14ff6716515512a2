//! Consensus attestation provider.
//!
//! This is a structural attestation: it checks that the ledger reported every
//! field its consensus family requires (see
//! [`ConsensusFamily::required_fields`]). It does not validate validator
//! signatures or quorum weight, so it is weaker than the ZK and inclusion
//! proofs and must not be read as cryptographic proof of finality.
//!
//! Deployments that can check signatures register a [`FinalityVerifier`] per
//! family; it runs after the structural check.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use alz_common::{ConsensusFamily, ExecutionOutcome};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::provider::{ensure_executable, fetch_metadata};
use crate::{ConsensusPayload, Proof, ProofContext, ProofError, ProofKind, ProofProvider, Verdict};

/// Field that must be literally `true` wherever a family requires it.
const QUORUM_FIELD: &str = "quorum_reached";

/// Strong, family-specific finality check (signatures, quorum weight, ...).
#[async_trait]
pub trait FinalityVerifier: Send + Sync {
    async fn verify(&self, payload: &ConsensusPayload) -> Result<(), String>;
}

/// Required fields of `family` that are absent or empty in `fields`.
pub fn missing_fields(family: ConsensusFamily, fields: &BTreeMap<String, Value>) -> Vec<String> {
    family
        .required_fields()
        .iter()
        .filter(|name| !field_present(name, fields.get(**name)))
        .map(|name| name.to_string())
        .collect()
}

fn field_present(name: &str, value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Bool(b)) => name != QUORUM_FIELD || *b,
        Some(Value::Number(_)) => true,
    }
}

pub struct ConsensusProvider {
    issuer_id: String,
    strong_verifiers: HashMap<ConsensusFamily, Arc<dyn FinalityVerifier>>,
}

impl ConsensusProvider {
    pub fn new(issuer_id: impl Into<String>) -> Self {
        Self {
            issuer_id: issuer_id.into(),
            strong_verifiers: HashMap::new(),
        }
    }

    /// Register a strong verifier for `family`.
    pub fn with_finality_verifier(
        mut self,
        family: ConsensusFamily,
        verifier: Arc<dyn FinalityVerifier>,
    ) -> Self {
        self.strong_verifiers.insert(family, verifier);
        self
    }

    pub fn has_strong_verifier(&self, family: ConsensusFamily) -> bool {
        self.strong_verifiers.contains_key(&family)
    }
}

#[async_trait]
impl ProofProvider for ConsensusProvider {
    fn kind(&self) -> ProofKind {
        ProofKind::Consensus
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
        let metadata = fetch_metadata(outcome, context).await?;
        let evidence = context.adapter.finality_evidence(&metadata).await?;

        let expected = context.adapter.consensus_family();
        if evidence.family != expected {
            return Err(ProofError::FamilyMismatch {
                expected,
                found: evidence.family,
            });
        }

        let missing = missing_fields(evidence.family, &evidence.fields);
        if !missing.is_empty() {
            return Err(ProofError::IncompleteEvidence {
                family: evidence.family,
                missing,
            });
        }

        let proof = Proof::consensus(
            self.issuer_id.clone(),
            ConsensusPayload {
                ledger_id: metadata.ledger_id,
                family: evidence.family,
                tx_hash: metadata.tx_hash,
                block_height: metadata.block_height,
                fields: evidence.fields,
            },
        );
        debug!(
            proof_id = %proof.id_hex(),
            ledger = %outcome.request.ledger_id,
            family = %expected,
            "consensus proof generated"
        );
        Ok(proof)
    }

    async fn verify(&self, proof: &Proof) -> Verdict {
        let Proof::Consensus(envelope) = proof else {
            return Verdict::invalid(format!(
                "consensus provider cannot verify {} proof",
                proof.kind()
            ));
        };
        if !proof.has_valid_id() {
            return Verdict::invalid("proof id does not match payload");
        }

        let payload = &envelope.payload;
        let missing = missing_fields(payload.family, &payload.fields);
        if !missing.is_empty() {
            return Verdict::invalid(format!(
                "{} attestation missing {:?}",
                payload.family, missing
            ));
        }

        if let Some(strong) = self.strong_verifiers.get(&payload.family) {
            if let Err(reason) = strong.verify(payload).await {
                return Verdict::invalid(format!("finality check failed: {reason}"));
            }
        }
        Verdict::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_pow_complete() {
        let f = fields(&[
            ("block_hash", json!("0x01")),
            ("nonce", json!(42)),
            ("difficulty", json!(1000)),
        ]);
        assert!(missing_fields(ConsensusFamily::ProofOfWork, &f).is_empty());
    }

    #[test]
    fn test_pos_missing_signature() {
        let f = fields(&[("slot", json!(9)), ("validator_index", json!(3)), ("signature", json!(""))]);
        assert_eq!(missing_fields(ConsensusFamily::ProofOfStake, &f), vec!["signature"]);
    }

    #[test]
    fn test_quorum_must_be_true() {
        let f = fields(&[
            ("slot", json!(1)),
            ("history_hash", json!("0xaa")),
            ("quorum_reached", json!(false)),
        ]);
        assert_eq!(missing_fields(ConsensusFamily::PohPosBft, &f), vec!["quorum_reached"]);
    }

    #[test]
    fn test_tendermint_requires_signatures() {
        let f = fields(&[("height", json!(1)), ("round", json!(0)), ("commit_signatures", json!([]))]);
        assert_eq!(
            missing_fields(ConsensusFamily::Tendermint, &f),
            vec!["commit_signatures"]
        );
    }

    struct RejectAll;

    #[async_trait]
    impl FinalityVerifier for RejectAll {
        async fn verify(&self, _payload: &ConsensusPayload) -> Result<(), String> {
            Err("signature invalid".to_string())
        }
    }

    #[tokio::test]
    async fn test_strong_verifier_runs_after_structural_check() {
        let payload = ConsensusPayload {
            ledger_id: "chainX".into(),
            family: ConsensusFamily::GenericBft,
            tx_hash: "0x1".to_string(),
            block_height: 1,
            fields: fields(&[("view", json!(2)), ("quorum_certificate", json!("qc"))]),
        };
        let proof = Proof::consensus("issuer", payload);

        let lenient = ConsensusProvider::new("issuer");
        assert!(lenient.verify(&proof).await.is_valid());

        let strict = ConsensusProvider::new("issuer")
            .with_finality_verifier(ConsensusFamily::GenericBft, Arc::new(RejectAll));
        assert!(strict.has_strong_verifier(ConsensusFamily::GenericBft));
        let verdict = strict.verify(&proof).await;
        assert!(verdict.reason().unwrap().contains("signature invalid"));
    }
}
