//! Provider suite and the standalone proof verification API.

use std::sync::Arc;

use alz_common::hash::to_hex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    ConsensusProvider, InclusionProvider, Proof, ProofError, ProofId, ProofKind, ProofProvider,
    ProofRegistry, ZkBackend, ZkProvider,
};

/// One provider per proof kind.
#[derive(Clone)]
pub struct ProofSuite {
    zk: Arc<dyn ProofProvider>,
    inclusion: Arc<dyn ProofProvider>,
    consensus: Arc<dyn ProofProvider>,
}

impl ProofSuite {
    pub fn new(
        zk: Arc<dyn ProofProvider>,
        inclusion: Arc<dyn ProofProvider>,
        consensus: Arc<dyn ProofProvider>,
    ) -> Result<Self, ProofError> {
        for (expected, provider) in [
            (ProofKind::Zk, &zk),
            (ProofKind::Inclusion, &inclusion),
            (ProofKind::Consensus, &consensus),
        ] {
            if provider.kind() != expected {
                return Err(ProofError::KindMismatch {
                    expected,
                    found: provider.kind(),
                });
            }
        }
        Ok(Self {
            zk,
            inclusion,
            consensus,
        })
    }

    /// The three default providers, all issuing as `issuer_id`.
    pub fn with_defaults<B: ZkBackend + 'static>(issuer_id: &str, backend: B) -> Self {
        Self {
            zk: Arc::new(ZkProvider::new(issuer_id, backend)),
            inclusion: Arc::new(InclusionProvider::new(issuer_id)),
            consensus: Arc::new(ConsensusProvider::new(issuer_id)),
        }
    }

    pub fn provider(&self, kind: ProofKind) -> &Arc<dyn ProofProvider> {
        match kind {
            ProofKind::Zk => &self.zk,
            ProofKind::Inclusion => &self.inclusion,
            ProofKind::Consensus => &self.consensus,
        }
    }
}

impl std::fmt::Debug for ProofSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofSuite")
            .field("zk", &self.zk.issuer_id())
            .field("inclusion", &self.inclusion.issuer_id())
            .field("consensus", &self.consensus.issuer_id())
            .finish()
    }
}

/// Answer of [`ProofVerifier::verify_proof`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Whether the registry holds this proof (issued or seen locally).
    pub issued_by_us: bool,
}

impl VerificationResponse {
    fn invalid(reason: impl Into<String>, issued_by_us: bool) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            issued_by_us,
        }
    }
}

/// Verifies proofs independently of any live atomic transaction.
#[derive(Clone, Debug)]
pub struct ProofVerifier {
    suite: ProofSuite,
    registry: ProofRegistry,
}

impl ProofVerifier {
    pub fn new(suite: ProofSuite, registry: ProofRegistry) -> Self {
        Self { suite, registry }
    }

    pub fn suite(&self) -> &ProofSuite {
        &self.suite
    }

    pub fn registry(&self) -> &ProofRegistry {
        &self.registry
    }

    /// Check that `payload` is a `kind` proof whose content hashes to
    /// `proof_id` and that the matching provider accepts it.
    ///
    /// Registry membership is reported but does not decide validity.
    pub async fn verify_proof(
        &self,
        proof_id: &ProofId,
        payload: &Proof,
        kind: ProofKind,
    ) -> VerificationResponse {
        let issued_by_us = match self.registry.contains(proof_id) {
            Ok(found) => found,
            Err(err) => {
                warn!(proof_id = %to_hex(proof_id), error = %err, "registry lookup failed");
                false
            }
        };

        if payload.kind() != kind {
            return VerificationResponse::invalid(
                format!("claimed {kind} proof but payload is {}", payload.kind()),
                issued_by_us,
            );
        }
        if payload.proof_id() != *proof_id {
            return VerificationResponse::invalid("proof id does not match payload header", issued_by_us);
        }
        if !payload.has_valid_id() {
            return VerificationResponse::invalid("proof id does not match payload content", issued_by_us);
        }

        let verdict = self.suite.provider(kind).verify(payload).await;
        VerificationResponse {
            valid: verdict.is_valid(),
            reason: verdict.reason().map(str::to_string),
            issued_by_us,
        }
    }
}
