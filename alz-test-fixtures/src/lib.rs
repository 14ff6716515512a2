//! Test fixtures for the alz workspace.
//!
//! [`MockLedger`] is a deterministic in-process ledger: every executed
//! operation lands in its own block, whose transaction tree is a real Merkle
//! tree, and finality evidence is derived from the block so that proofs over
//! the same transaction are reproducible. Failures are scripted through the
//! builder methods. A shared [`Journal`] records calls across ledgers in
//! global order.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alz_common::hash::{domain_hash, to_hex};
use alz_common::merkle::{leaf_hash, tx_leaf};
use alz_common::{
    is_mutating_verb, params, AdapterError, AdapterResponse, ChainAdapter, ConsensusEvidence,
    ConsensusFamily, ExecutionMode, LedgerId, MerkleTree, OperationRequest, Params, TxMetadata,
    ROLLBACK_OPERATION,
};
use async_trait::async_trait;
use serde_json::json;

/// Transactions per mock block, including the executed one.
const BLOCK_WIDTH: u64 = 4;

/// One adapter call as seen by a mock ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub sequence: u64,
    pub ledger_id: LedgerId,
    pub operation_name: String,
    pub parameters: Params,
}

/// Call log and concurrency gauge, shareable between ledgers.
#[derive(Debug, Default)]
pub struct Journal {
    calls: Mutex<Vec<CallRecord>>,
    sequence: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Journal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, ledger_id: &LedgerId, operation_name: &str, parameters: &Params) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().expect("journal poisoned").push(CallRecord {
            sequence,
            ledger_id: ledger_id.clone(),
            operation_name: operation_name.to_string(),
            parameters: parameters.clone(),
        });
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Every call, in arrival order.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().expect("journal poisoned").clone()
    }

    /// Ledgers that received a compensation call, in call order.
    pub fn rollback_ledgers(&self) -> Vec<LedgerId> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation_name == ROLLBACK_OPERATION)
            .map(|c| c.ledger_id)
            .collect()
    }

    /// Compensation calls, in call order.
    pub fn rollback_calls(&self) -> Vec<CallRecord> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation_name == ROLLBACK_OPERATION)
            .collect()
    }

    /// Non-compensation calls, in call order.
    pub fn forward_calls(&self) -> Vec<CallRecord> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation_name != ROLLBACK_OPERATION)
            .collect()
    }

    /// Highest number of executions observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
struct MockTx {
    height: u64,
    block_hash: [u8; 32],
    tx_root: [u8; 32],
    path: Vec<alz_common::MerklePathElement>,
}

/// Scriptable in-process ledger.
#[derive(Debug)]
pub struct MockLedger {
    ledger_id: LedgerId,
    family: ConsensusFamily,
    mode: ExecutionMode,
    journal: Arc<Journal>,
    latency: Duration,
    operation_latency: HashMap<String, Duration>,
    fail_all: bool,
    failing_operations: HashSet<String>,
    fail_rollback: bool,
    omitted_evidence: HashSet<String>,
    corrupt_inclusion: bool,
    mutating_operations: HashSet<String>,
    height: AtomicU64,
    txs: Mutex<HashMap<String, MockTx>>,
}

impl MockLedger {
    pub fn new(ledger_id: impl Into<LedgerId>, family: ConsensusFamily) -> Self {
        Self {
            ledger_id: ledger_id.into(),
            family,
            mode: ExecutionMode::Real,
            journal: Journal::new(),
            latency: Duration::ZERO,
            operation_latency: HashMap::new(),
            fail_all: false,
            failing_operations: HashSet::new(),
            fail_rollback: false,
            omitted_evidence: HashSet::new(),
            corrupt_inclusion: false,
            mutating_operations: HashSet::new(),
            height: AtomicU64::new(100),
            txs: Mutex::new(HashMap::new()),
        }
    }

    /// Share `journal` with other ledgers.
    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_operation_latency(mut self, operation: &str, latency: Duration) -> Self {
        self.operation_latency.insert(operation.to_string(), latency);
        self
    }

    pub fn simulated(mut self) -> Self {
        self.mode = ExecutionMode::Simulated;
        self
    }

    /// Reject every forward (non-compensation) operation.
    pub fn always_failing(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub fn failing_operation(mut self, operation: &str) -> Self {
        self.failing_operations.insert(operation.to_string());
        self
    }

    /// Reject compensation calls.
    pub fn failing_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    /// Leave `field` out of finality evidence.
    pub fn omitting_evidence_field(mut self, field: &str) -> Self {
        self.omitted_evidence.insert(field.to_string());
        self
    }

    /// Report inclusion paths that do not reach the block root.
    pub fn corrupting_inclusion(mut self) -> Self {
        self.corrupt_inclusion = true;
        self
    }

    /// Classify `operation` as mutating regardless of its verb.
    pub fn treating_as_mutating(mut self, operation: &str) -> Self {
        self.mutating_operations.insert(operation.to_string());
        self
    }

    pub fn journal(&self) -> Arc<Journal> {
        Arc::clone(&self.journal)
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn latency_for(&self, operation_name: &str) -> Duration {
        self.operation_latency
            .get(operation_name)
            .copied()
            .unwrap_or(self.latency)
    }

    fn should_fail(&self, operation_name: &str) -> bool {
        if operation_name == ROLLBACK_OPERATION {
            return self.fail_rollback;
        }
        self.fail_all || self.failing_operations.contains(operation_name)
    }

    /// Seal a one-transaction block and return the transaction hash.
    fn seal_block(&self, operation_name: &str, parameters: &Params) -> (String, u64) {
        let height = self.height.fetch_add(1, Ordering::SeqCst);
        let ledger = self.ledger_id.as_str().as_bytes();
        let tx_hash = format!(
            "0x{}",
            to_hex(&domain_hash(
                b"mock.tx",
                &[
                    ledger,
                    operation_name.as_bytes(),
                    &serde_json::to_vec(parameters).unwrap_or_default(),
                    &height.to_be_bytes(),
                ],
            ))
        );
        let block_hash = domain_hash(b"mock.block", &[ledger, &height.to_be_bytes()]);

        let position = (height % BLOCK_WIDTH) as usize;
        let mut leaves: Vec<[u8; 32]> = (0..BLOCK_WIDTH - 1)
            .map(|i| {
                leaf_hash(&domain_hash(
                    b"mock.filler",
                    &[ledger, &height.to_be_bytes(), &i.to_be_bytes()],
                ))
            })
            .collect();
        leaves.insert(position, tx_leaf(&self.ledger_id, &block_hash, &tx_hash, height));

        let tree = MerkleTree::from_leaves(leaves);
        let path = tree.path(position).unwrap_or_default();
        self.txs.lock().expect("mock ledger poisoned").insert(
            tx_hash.clone(),
            MockTx {
                height,
                block_hash,
                tx_root: tree.root(),
                path,
            },
        );
        (tx_hash, height)
    }

    fn evidence_for(&self, metadata: &TxMetadata) -> ConsensusEvidence {
        let h = metadata.block_height;
        let digest = |tag: &[u8]| {
            format!(
                "0x{}",
                to_hex(&domain_hash(tag, &[&metadata.block_hash, &h.to_be_bytes()]))
            )
        };
        let evidence = ConsensusEvidence::new(self.family);
        let evidence = match self.family {
            ConsensusFamily::ProofOfWork => evidence
                .with_field("block_hash", json!(to_hex(&metadata.block_hash)))
                .with_field("nonce", json!(h * 7919))
                .with_field("difficulty", json!(1_000_000u64)),
            ConsensusFamily::ProofOfStake => evidence
                .with_field("slot", json!(h))
                .with_field("validator_index", json!(h % 16))
                .with_field("signature", json!(digest(b"mock.sig"))),
            ConsensusFamily::PohPosBft => evidence
                .with_field("slot", json!(h))
                .with_field("history_hash", json!(digest(b"mock.poh")))
                .with_field("quorum_reached", json!(true)),
            ConsensusFamily::CustomPosBft => evidence
                .with_field("round", json!(h))
                .with_field("validator_set_hash", json!(digest(b"mock.vset")))
                .with_field("quorum_reached", json!(true)),
            ConsensusFamily::Tendermint => evidence
                .with_field("height", json!(h))
                .with_field("round", json!(0))
                .with_field("commit_signatures", json!([digest(b"mock.commit")])),
            ConsensusFamily::GenericBft => evidence
                .with_field("view", json!(h))
                .with_field("quorum_certificate", json!(digest(b"mock.qc"))),
        };
        let mut evidence = evidence;
        evidence
            .fields
            .retain(|name, _| !self.omitted_evidence.contains(name));
        evidence
    }
}

#[async_trait]
impl ChainAdapter for MockLedger {
    fn ledger_id(&self) -> &LedgerId {
        &self.ledger_id
    }

    fn consensus_family(&self) -> ConsensusFamily {
        self.family
    }

    fn mode(&self) -> ExecutionMode {
        self.mode
    }

    fn is_mutating(&self, operation_name: &str) -> bool {
        self.mutating_operations.contains(operation_name) || is_mutating_verb(operation_name)
    }

    async fn execute(
        &self,
        operation_name: &str,
        parameters: &Params,
    ) -> Result<AdapterResponse, AdapterError> {
        self.journal.enter();
        let latency = self.latency_for(operation_name);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.journal.record(&self.ledger_id, operation_name, parameters);
        self.journal.exit();

        if self.should_fail(operation_name) {
            return Err(AdapterError::Rejected(format!(
                "{} refused {}",
                self.ledger_id, operation_name
            )));
        }

        let (tx_hash, height) = self.seal_block(operation_name, parameters);
        Ok(AdapterResponse {
            return_value: json!({
                "ledger": self.ledger_id.as_str(),
                "operation": operation_name,
                "height": height,
            }),
            tx_hash: Some(tx_hash),
        })
    }

    async fn transaction_metadata(&self, tx_hash: &str) -> Result<TxMetadata, AdapterError> {
        let tx = self
            .txs
            .lock()
            .expect("mock ledger poisoned")
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| AdapterError::NotFound(tx_hash.to_string()))?;

        let mut path = tx.path;
        if self.corrupt_inclusion {
            if let Some(first) = path.first_mut() {
                first.sibling_hash[0] ^= 0xff;
            }
        }

        Ok(TxMetadata {
            ledger_id: self.ledger_id.clone(),
            tx_hash: tx_hash.to_string(),
            block_hash: tx.block_hash,
            block_height: tx.height,
            tx_root: tx.tx_root,
            inclusion_path: path,
        })
    }

    async fn finality_evidence(
        &self,
        metadata: &TxMetadata,
    ) -> Result<ConsensusEvidence, AdapterError> {
        Ok(self.evidence_for(metadata))
    }
}

/// `transfer {to, amount}` on `ledger`.
pub fn transfer(ledger: &str, to: &str, amount: u64) -> OperationRequest {
    OperationRequest::new(
        ledger,
        "transfer",
        params([("to", json!(to)), ("amount", json!(amount))]),
    )
}

/// Read-only `balance {address}` on `ledger`.
pub fn balance(ledger: &str, address: &str) -> OperationRequest {
    OperationRequest::new(ledger, "balance", params([("address", json!(address))]))
}
