//! The atomic coordinator: executes a batch across ledgers, proves and
//! verifies every outcome, then commits or compensates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alz_common::{ChainAdapter, ExecutionMode, ExecutionOutcome, OperationRequest};
use alz_proofs::{
    HashCommitmentBackend, Proof, ProofContext, ProofKind, ProofRegistry, ProofSuite, ProofTriple,
    ProofVerifier, DEFAULT_CIRCUIT_ID,
};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::alert::{Alert, AlertSink, LogAlertSink};
use crate::audit::{AuditLog, MemoryAuditLog};
use crate::config::{CoordinatorConfig, FailurePolicy};
use crate::error::{BatchFailure, CoordinatorError};
use crate::rollback::{compensate, rollback_plan, RollbackReport};
use crate::state::{AtomicTransaction, Phase, Status};
use crate::telemetry::ALERT_TARGET;
use crate::{AdapterRegistry, ExecutionCoordinator};

// ═══════════════════════════════════════════════════════════════════════════════
// RESULT
// ═══════════════════════════════════════════════════════════════════════════════

/// What `execute_atomic` reports back for a batch that passed preparation.
#[derive(Debug, Clone, Serialize)]
pub struct AtomicResult {
    pub atomic_id: String,
    pub status: Status,
    /// One per request, in submission order.
    pub outcomes: Vec<ExecutionOutcome>,
    /// One triple per outcome when the batch got through proving.
    pub proofs: Vec<ProofTriple>,
    pub failure: Option<BatchFailure>,
    pub rollback_report: Option<RollbackReport>,
    /// False when the audit log refused the terminal record.
    pub audit_recorded: bool,
}

impl AtomicResult {
    pub fn is_committed(&self) -> bool {
        self.status == Status::Committed
    }

    /// True when any outcome came from a simulated adapter.
    pub fn is_simulated(&self) -> bool {
        self.outcomes
            .iter()
            .any(|outcome| outcome.mode == ExecutionMode::Simulated)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct AtomicCoordinatorBuilder {
    adapters: AdapterRegistry,
    suite: Option<ProofSuite>,
    registry: Option<ProofRegistry>,
    audit: Option<Arc<dyn AuditLog>>,
    alerts: Option<Arc<dyn AlertSink>>,
    config: Option<CoordinatorConfig>,
}

impl AtomicCoordinatorBuilder {
    pub fn adapter(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.adapters.register(adapter);
        self
    }

    pub fn adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn proof_suite(mut self, suite: ProofSuite) -> Self {
        self.suite = Some(suite);
        self
    }

    pub fn registry(mut self, registry: ProofRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Unset parts default to the hash-commitment suite, an in-memory
    /// registry and audit log, and the logging alert sink.
    pub fn build(self) -> Result<AtomicCoordinator, CoordinatorError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let suite = self.suite.unwrap_or_else(|| {
            ProofSuite::with_defaults(
                &config.issuer_id,
                HashCommitmentBackend::from_seed(DEFAULT_CIRCUIT_ID, &config.zk_seed),
            )
        });
        let registry = self.registry.unwrap_or_else(ProofRegistry::in_memory);

        Ok(AtomicCoordinator {
            executor: ExecutionCoordinator::new(self.adapters),
            verifier: ProofVerifier::new(suite, registry),
            audit: self
                .audit
                .unwrap_or_else(|| Arc::new(MemoryAuditLog::new())),
            alerts: self.alerts.unwrap_or_else(|| Arc::new(LogAlertSink)),
            config,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COORDINATOR
// ═══════════════════════════════════════════════════════════════════════════════

pub struct AtomicCoordinator {
    executor: ExecutionCoordinator,
    verifier: ProofVerifier,
    audit: Arc<dyn AuditLog>,
    alerts: Arc<dyn AlertSink>,
    config: CoordinatorConfig,
}

/// Result of the execution phase.
struct ExecutionRound {
    outcomes: Vec<ExecutionOutcome>,
    failure: Option<BatchFailure>,
    /// Requests still running when the phase budget ran out.
    in_doubt: Vec<usize>,
}

enum Slot {
    Pending,
    InFlight,
    Done(ExecutionOutcome),
}

impl AtomicCoordinator {
    pub fn builder() -> AtomicCoordinatorBuilder {
        AtomicCoordinatorBuilder::default()
    }

    pub fn executor(&self) -> &ExecutionCoordinator {
        &self.executor
    }

    pub fn verifier(&self) -> &ProofVerifier {
        &self.verifier
    }

    pub fn registry(&self) -> &ProofRegistry {
        self.verifier.registry()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Run `requests` as one all-or-nothing batch.
    ///
    /// Returns `Err` only when the batch is refused before anything executes.
    /// Every other failure is reported through the result's status, failure
    /// and rollback report.
    pub async fn execute_atomic(
        &self,
        mut requests: Vec<OperationRequest>,
    ) -> Result<AtomicResult, CoordinatorError> {
        self.prepare(&mut requests)?;
        let tx = AtomicTransaction::new(requests);
        let span = info_span!("atomic", atomic_id = %tx.atomic_id);
        self.run(tx).instrument(span).await
    }

    /// Refuse empty batches, unknown ledgers, duplicates and (if configured)
    /// simulated adapters. Each request takes its owning adapter's mutating
    /// classification here, before the transaction records it.
    fn prepare(&self, requests: &mut [OperationRequest]) -> Result<(), CoordinatorError> {
        if requests.is_empty() {
            return Err(CoordinatorError::EmptyBatch);
        }

        let mut seen: HashMap<[u8; 32], usize> = HashMap::new();
        for (index, request) in requests.iter_mut().enumerate() {
            let adapter = self.executor.adapters().get(&request.ledger_id)?;
            request.is_mutating = adapter.is_mutating(&request.operation_name);
            if adapter.mode() == ExecutionMode::Simulated {
                if self.config.reject_simulated {
                    return Err(CoordinatorError::SimulatedLedger(request.ledger_id.clone()));
                }
                warn!(ledger_id = %request.ledger_id, "batch uses a simulated adapter");
            }
            if let Some(first) = seen.insert(request.fingerprint(), index) {
                return Err(CoordinatorError::DuplicateRequest {
                    first,
                    index,
                    ledger_id: request.ledger_id.clone(),
                    operation: request.operation_name.clone(),
                });
            }
        }
        Ok(())
    }

    async fn run(&self, mut tx: AtomicTransaction) -> Result<AtomicResult, CoordinatorError> {
        info!(requests = tx.requests.len(), "atomic batch accepted");

        tx.advance(Status::Executing)?;
        let round = self.execute_phase(&tx.requests).await;
        tx.outcomes = round.outcomes;
        if let Some(failure) = round.failure {
            tx.advance(Status::ExecutionFailed)?;
            return self.abort(tx, failure, &round.in_doubt).await;
        }
        tx.advance(Status::Executed)?;
        info!("execution phase complete");

        tx.advance(Status::Proving)?;
        match self.prove_phase(&tx).await {
            Ok(proofs) => {
                tx.proofs = proofs;
                tx.advance(Status::Proven)?;
            }
            Err(failure) => {
                tx.advance(Status::ProofFailed)?;
                return self.abort(tx, failure, &[]).await;
            }
        }
        info!(proofs = tx.proofs.len() * ProofKind::ALL.len(), "proving phase complete");

        tx.advance(Status::Verifying)?;
        if let Err(failure) = self.verify_phase(&tx).await {
            return self.abort(tx, failure, &[]).await;
        }

        tx.advance(Status::Committed)?;
        info!("atomic batch committed");
        Ok(self.finish(tx).await)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PHASES
    // ═══════════════════════════════════════════════════════════════════════════

    async fn execute_phase(&self, requests: &[OperationRequest]) -> ExecutionRound {
        let slots: Mutex<Vec<Slot>> = Mutex::new(requests.iter().map(|_| Slot::Pending).collect());
        let halted = AtomicBool::new(false);
        let fail_fast = self.config.failure_policy == FailurePolicy::FailFast;

        let run = {
            let slots = &slots;
            let halted = &halted;
            stream::iter(requests.iter().enumerate())
                .map(move |(index, request)| async move {
                    if fail_fast && halted.load(Ordering::SeqCst) {
                        return;
                    }
                    slots.lock().expect("execution slots poisoned")[index] = Slot::InFlight;

                    let outcome = match self.executor.execute_request(request).await {
                        Ok(outcome) => outcome,
                        Err(err) => ExecutionOutcome::failure(
                            request.clone(),
                            err.to_string(),
                            Duration::ZERO,
                            ExecutionMode::Real,
                        ),
                    };
                    if !outcome.succeeded {
                        halted.store(true, Ordering::SeqCst);
                    }
                    slots.lock().expect("execution slots poisoned")[index] = Slot::Done(outcome);
                })
                .buffer_unordered(self.config.max_parallelism)
                .collect::<Vec<()>>()
        };

        let timed_out = tokio::time::timeout(self.config.execution_timeout, run)
            .await
            .is_err();

        let slots = slots.into_inner().expect("execution slots poisoned");
        let mut outcomes = Vec::with_capacity(requests.len());
        let mut in_doubt = Vec::new();
        let mut first_failure = None;

        for (index, (slot, request)) in slots.into_iter().zip(requests).enumerate() {
            let outcome = match slot {
                Slot::Done(outcome) => outcome,
                Slot::InFlight => {
                    in_doubt.push(index);
                    ExecutionOutcome::failure(
                        request.clone(),
                        "execution phase timed out while the operation was in flight",
                        self.config.execution_timeout,
                        ExecutionMode::Real,
                    )
                }
                Slot::Pending => ExecutionOutcome::skipped(
                    request.clone(),
                    if timed_out {
                        "not started: execution phase timed out"
                    } else {
                        "not started: batch halted after a failure"
                    },
                ),
            };
            let doubtful = in_doubt.last() == Some(&index);
            if first_failure.is_none() && outcome.attempted && !outcome.succeeded && !doubtful {
                first_failure = Some(BatchFailure::ExecutionFailure {
                    index,
                    ledger_id: request.ledger_id.clone(),
                    reason: outcome.error.clone().unwrap_or_default(),
                });
            }
            outcomes.push(outcome);
        }

        let failure = first_failure.or_else(|| {
            timed_out.then(|| BatchFailure::PhaseTimeout {
                phase: Phase::Execution,
                timeout_ms: self.config.execution_timeout.as_millis() as u64,
            })
        });

        if let Some(failure) = &failure {
            warn!(%failure, in_doubt = in_doubt.len(), "execution phase failed");
        }

        ExecutionRound {
            outcomes,
            failure,
            in_doubt,
        }
    }

    async fn prove_phase(&self, tx: &AtomicTransaction) -> Result<Vec<ProofTriple>, BatchFailure> {
        let proving = stream::iter(tx.outcomes.iter().enumerate())
            .map(|(index, outcome)| self.prove_outcome(&tx.atomic_id, index, outcome))
            .buffered(self.config.max_parallelism)
            .try_collect::<Vec<ProofTriple>>();

        match tokio::time::timeout(self.config.proving_timeout, proving).await {
            Ok(result) => result,
            Err(_) => Err(BatchFailure::PhaseTimeout {
                phase: Phase::Proving,
                timeout_ms: self.config.proving_timeout.as_millis() as u64,
            }),
        }
    }

    async fn prove_outcome(
        &self,
        atomic_id: &str,
        index: usize,
        outcome: &ExecutionOutcome,
    ) -> Result<ProofTriple, BatchFailure> {
        let adapter = self
            .executor
            .adapters()
            .get(&outcome.request.ledger_id)
            .map_err(|err| BatchFailure::ProofGenerationFailure {
                kind: ProofKind::Zk,
                index,
                reason: err.to_string(),
            })?;
        let context = ProofContext::new(atomic_id, Arc::clone(adapter));

        let (zk, inclusion, consensus) = futures::try_join!(
            self.generate(ProofKind::Zk, index, outcome, &context),
            self.generate(ProofKind::Inclusion, index, outcome, &context),
            self.generate(ProofKind::Consensus, index, outcome, &context),
        )?;
        debug!(index, ledger_id = %outcome.request.ledger_id, "proof triple generated");

        Ok(ProofTriple {
            zk,
            inclusion,
            consensus,
        })
    }

    /// Generate one proof and record it in the registry.
    async fn generate(
        &self,
        kind: ProofKind,
        index: usize,
        outcome: &ExecutionOutcome,
        context: &ProofContext,
    ) -> Result<Proof, BatchFailure> {
        let failure = |reason: String| BatchFailure::ProofGenerationFailure {
            kind,
            index,
            reason,
        };

        let proof = self
            .verifier
            .suite()
            .provider(kind)
            .generate(outcome, context)
            .await
            .map_err(|err| failure(err.to_string()))?;
        if proof.kind() != kind {
            return Err(failure(format!("provider returned a {} proof", proof.kind())));
        }

        self.registry()
            .put(&proof)
            .map_err(|err| failure(format!("registry refused proof: {err}")))?;
        Ok(proof)
    }

    async fn verify_phase(&self, tx: &AtomicTransaction) -> Result<(), BatchFailure> {
        let checks = tx
            .proofs
            .iter()
            .zip(&tx.outcomes)
            .enumerate()
            .flat_map(|(index, (triple, outcome))| {
                ProofKind::ALL
                    .into_iter()
                    .zip(triple.as_array())
                    .map(move |(kind, proof)| (index, kind, proof, outcome))
            });

        let atomic_id = tx.atomic_id.as_str();
        let verifying = stream::iter(checks)
            .map(|(index, kind, proof, outcome)| {
                self.verify_one(index, kind, proof, outcome, atomic_id)
            })
            .buffer_unordered(self.config.max_parallelism)
            .try_collect::<Vec<()>>();

        match tokio::time::timeout(self.config.verification_timeout, verifying).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(BatchFailure::PhaseTimeout {
                phase: Phase::Verification,
                timeout_ms: self.config.verification_timeout.as_millis() as u64,
            }),
        }
    }

    /// A proof passes when its provider accepts it, it attests this outcome
    /// in this batch, and (if required) the registry holds it.
    async fn verify_one(
        &self,
        index: usize,
        kind: ProofKind,
        proof: &Proof,
        outcome: &ExecutionOutcome,
        atomic_id: &str,
    ) -> Result<(), BatchFailure> {
        let response = self
            .verifier
            .verify_proof(&proof.proof_id(), proof, kind)
            .await;
        let binding = proof.check_binding(outcome, atomic_id);

        let reason = if !response.valid {
            response
                .reason
                .unwrap_or_else(|| "proof rejected".to_string())
        } else if let Some(reason) = binding.reason() {
            reason.to_string()
        } else if self.config.require_registry_membership && !response.issued_by_us {
            "proof is not present in the registry".to_string()
        } else {
            return Ok(());
        };

        warn!(index, %kind, proof_id = %proof.id_hex(), %reason, "proof verification failed");
        Err(BatchFailure::ProofVerificationFailure {
            kind,
            index,
            reason,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TERMINATION
    // ═══════════════════════════════════════════════════════════════════════════

    async fn abort(
        &self,
        mut tx: AtomicTransaction,
        failure: BatchFailure,
        in_doubt: &[usize],
    ) -> Result<AtomicResult, CoordinatorError> {
        warn!(%failure, status = %tx.status(), "rolling back atomic batch");
        tx.advance(Status::RollingBack)?;

        let plan = rollback_plan(&tx.outcomes, in_doubt, self.config.compensate_read_only);
        let report = compensate(
            &self.executor,
            &tx.outcomes,
            &plan,
            &failure.to_string(),
            self.config.compensation_timeout,
        )
        .await;

        tx.failure = Some(failure);
        if report.all_succeeded() {
            tx.advance(Status::RolledBack)?;
            info!(compensated = report.entries.len(), "atomic batch rolled back");
        } else {
            tx.advance(Status::RollbackPartial)?;
            let alert = Alert {
                atomic_id: tx.atomic_id.clone(),
                status: tx.status(),
                failure: tx.failure.clone(),
                ledgers: report.failed_ledgers(),
                message: format!(
                    "compensation incomplete: {} of {} rollback calls failed; manual intervention required",
                    report.entries.iter().filter(|e| !e.succeeded).count(),
                    report.entries.len()
                ),
            };
            error!(
                target: ALERT_TARGET,
                atomic_id = %tx.atomic_id,
                ledgers = ?alert.ledgers,
                "ROLLBACK_PARTIAL"
            );
            self.alerts.raise(&alert).await;
        }
        tx.rollback_report = Some(report);

        Ok(self.finish(tx).await)
    }

    async fn finish(&self, tx: AtomicTransaction) -> AtomicResult {
        let audit_recorded = match self.audit.append(&tx).await {
            Ok(()) => true,
            Err(err) => {
                error!(
                    target: ALERT_TARGET,
                    atomic_id = %tx.atomic_id,
                    status = %tx.status(),
                    error = %err,
                    "audit append failed"
                );
                false
            }
        };

        let status = tx.status();
        AtomicResult {
            atomic_id: tx.atomic_id,
            status,
            outcomes: tx.outcomes,
            proofs: tx.proofs,
            failure: tx.failure,
            rollback_report: tx.rollback_report,
            audit_recorded,
        }
    }
}

impl std::fmt::Debug for AtomicCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicCoordinator")
            .field("adapters", self.executor.adapters())
            .field("registry", self.registry())
            .field("config", &self.config)
            .finish()
    }
}
