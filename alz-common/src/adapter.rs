//! The `ChainAdapter` boundary.
//!
//! A chain adapter is the only way the coordinator and the proof providers
//! reach a ledger. It executes named operations and answers metadata queries
//! about the transactions it produced. Wire protocols, signing and RPC
//! plumbing live behind this trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{is_mutating_verb, ConsensusFamily, ExecutionMode, LedgerId, Params};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    /// The ledger rejected the operation (insufficient funds, bad nonce, ...).
    #[error("rejected by ledger: {0}")]
    Rejected(String),

    /// The ledger or its RPC endpoint could not be reached.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// Unknown transaction or block.
    #[error("not found: {0}")]
    NotFound(String),

    /// The ledger answered with something the adapter could not interpret.
    #[error("malformed ledger response: {0}")]
    Malformed(String),
}

/// Successful adapter execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterResponse {
    pub return_value: serde_json::Value,
    /// Transaction hash, when the operation produced a transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

/// One step of a Merkle authentication path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePathElement {
    /// Hash of the sibling node.
    pub sibling_hash: [u8; 32],
    /// True when the sibling sits on the left of the running hash.
    pub is_left: bool,
}

/// Block placement of a transaction, as reported by its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxMetadata {
    pub ledger_id: LedgerId,
    pub tx_hash: String,
    pub block_hash: [u8; 32],
    pub block_height: u64,
    /// Root of the block's transaction tree.
    pub tx_root: [u8; 32],
    /// Sibling path from the transaction leaf to `tx_root`.
    pub inclusion_path: Vec<MerklePathElement>,
}

/// Family-specific finality fields reported by a ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusEvidence {
    pub family: ConsensusFamily,
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl ConsensusEvidence {
    pub fn new(family: ConsensusFamily) -> Self {
        Self {
            family,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// Per-ledger execute/query capability.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Ledger this adapter is registered under.
    fn ledger_id(&self) -> &LedgerId;

    /// Finality mechanism of the ledger.
    fn consensus_family(&self) -> ConsensusFamily;

    /// Whether results come from the real ledger.
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Real
    }

    /// Table-driven by default; adapters with non-standard verbs override it.
    fn is_mutating(&self, operation_name: &str) -> bool {
        is_mutating_verb(operation_name)
    }

    /// Execute `operation_name` with `parameters` on the ledger.
    ///
    /// Every success reports a `tx_hash`. Reads report the identifier of the
    /// snapshot they were served from, so that they can be attested as well.
    async fn execute(
        &self,
        operation_name: &str,
        parameters: &Params,
    ) -> Result<AdapterResponse, AdapterError>;

    /// Block placement and inclusion path of `tx_hash`.
    async fn transaction_metadata(&self, tx_hash: &str) -> Result<TxMetadata, AdapterError>;

    /// Finality evidence for the block described by `metadata`.
    async fn finality_evidence(
        &self,
        metadata: &TxMetadata,
    ) -> Result<ConsensusEvidence, AdapterError>;
}
