//! The `ProofProvider` seam.

use std::sync::Arc;

use alz_common::{ChainAdapter, ExecutionOutcome, TxMetadata};
use async_trait::async_trait;

use crate::{Proof, ProofError, ProofKind, Verdict};

/// Everything a provider may use besides the outcome itself.
#[derive(Clone)]
pub struct ProofContext {
    /// Atomic batch the outcome belongs to.
    pub atomic_id: String,
    /// Adapter of the outcome's ledger, for metadata queries.
    pub adapter: Arc<dyn ChainAdapter>,
}

impl ProofContext {
    pub fn new(atomic_id: impl Into<String>, adapter: Arc<dyn ChainAdapter>) -> Self {
        Self {
            atomic_id: atomic_id.into(),
            adapter,
        }
    }
}

impl std::fmt::Debug for ProofContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofContext")
            .field("atomic_id", &self.atomic_id)
            .field("ledger_id", self.adapter.ledger_id())
            .finish()
    }
}

/// Produces and checks one kind of proof.
///
/// `verify` must judge the proof from its payload alone. Whether the proof
/// was issued locally is a registry question and is answered elsewhere.
#[async_trait]
pub trait ProofProvider: Send + Sync {
    fn kind(&self) -> ProofKind;

    fn issuer_id(&self) -> &str;

    async fn generate(
        &self,
        outcome: &ExecutionOutcome,
        context: &ProofContext,
    ) -> Result<Proof, ProofError>;

    async fn verify(&self, proof: &Proof) -> Verdict;
}

/// Reject outcomes that did not execute successfully.
pub(crate) fn ensure_executable(outcome: &ExecutionOutcome) -> Result<(), ProofError> {
    if outcome.attempted && outcome.succeeded {
        return Ok(());
    }
    let reason = if !outcome.attempted {
        "request was never executed".to_string()
    } else {
        outcome
            .error
            .clone()
            .unwrap_or_else(|| "execution failed".to_string())
    };
    Err(ProofError::OutcomeNotExecutable {
        ledger_id: outcome.request.ledger_id.clone(),
        operation: outcome.request.operation_name.clone(),
        reason,
    })
}

/// Fetch and sanity-check the block placement of an outcome's transaction.
pub(crate) async fn fetch_metadata(
    outcome: &ExecutionOutcome,
    context: &ProofContext,
) -> Result<TxMetadata, ProofError> {
    let tx_hash = outcome.tx_hash.as_deref().ok_or_else(|| {
        ProofError::MissingMetadata(format!(
            "{}/{} reported no transaction hash",
            outcome.request.ledger_id, outcome.request.operation_name
        ))
    })?;

    if context.adapter.ledger_id() != &outcome.request.ledger_id {
        return Err(ProofError::MissingMetadata(format!(
            "context adapter serves {}, outcome belongs to {}",
            context.adapter.ledger_id(),
            outcome.request.ledger_id
        )));
    }

    let metadata = context.adapter.transaction_metadata(tx_hash).await?;
    if metadata.tx_hash != tx_hash || metadata.ledger_id != outcome.request.ledger_id {
        return Err(ProofError::MissingMetadata(format!(
            "ledger returned metadata for {}/{} when asked for {}/{}",
            metadata.ledger_id, metadata.tx_hash, outcome.request.ledger_id, tx_hash
        )));
    }
    Ok(metadata)
}
