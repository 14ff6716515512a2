//! Single-operation execution against a registered ledger.

use std::sync::Arc;
use std::time::Instant;

use alz_common::{ChainAdapter, ExecutionOutcome, LedgerId, OperationRequest, Params};
use tracing::{debug, warn};

use crate::{AdapterRegistry, CoordinatorError};

/// Runs one operation on one ledger and reports what happened.
///
/// Ledger failures are outcomes, not errors: the only error is asking for a
/// ledger nobody registered.
#[derive(Clone, Debug)]
pub struct ExecutionCoordinator {
    adapters: AdapterRegistry,
}

impl ExecutionCoordinator {
    pub fn new(adapters: AdapterRegistry) -> Self {
        Self { adapters }
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub async fn execute(
        &self,
        ledger_id: &LedgerId,
        operation_name: &str,
        parameters: Params,
    ) -> Result<ExecutionOutcome, CoordinatorError> {
        let mut request = OperationRequest::new(ledger_id.clone(), operation_name, parameters);
        self.classify(&mut request)?;
        self.execute_request(&request).await
    }

    /// Run `request` as given. The outcome carries the request unchanged, so
    /// callers that want the adapter's classification call [`Self::classify`]
    /// first.
    pub async fn execute_request(
        &self,
        request: &OperationRequest,
    ) -> Result<ExecutionOutcome, CoordinatorError> {
        let adapter = self.adapters.get(&request.ledger_id)?;
        Ok(run(adapter, request.clone()).await)
    }

    /// Let the owning adapter decide whether the operation mutates state.
    /// Adapters may classify their own operations more precisely than the
    /// verb table.
    pub fn classify(&self, request: &mut OperationRequest) -> Result<(), CoordinatorError> {
        let adapter = self.adapters.get(&request.ledger_id)?;
        request.is_mutating = adapter.is_mutating(&request.operation_name);
        Ok(())
    }
}

async fn run(adapter: &Arc<dyn ChainAdapter>, request: OperationRequest) -> ExecutionOutcome {
    let mode = adapter.mode();

    debug!(
        ledger_id = %request.ledger_id,
        operation = %request.operation_name,
        mutating = request.is_mutating,
        ?mode,
        "executing operation"
    );

    let started = Instant::now();
    let result = adapter
        .execute(&request.operation_name, &request.parameters)
        .await;
    let elapsed = started.elapsed();

    match result {
        Ok(response) => {
            debug!(
                ledger_id = %request.ledger_id,
                operation = %request.operation_name,
                tx_hash = ?response.tx_hash,
                elapsed_ms = elapsed.as_millis() as u64,
                "operation succeeded"
            );
            ExecutionOutcome::success(request, response.return_value, response.tx_hash, elapsed, mode)
        }
        Err(err) => {
            warn!(
                ledger_id = %request.ledger_id,
                operation = %request.operation_name,
                error = %err,
                "operation failed"
            );
            ExecutionOutcome::failure(request, err.to_string(), elapsed, mode)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alz_common::{params, ConsensusFamily, ExecutionMode};
    use alz_test_fixtures::{balance, transfer, MockLedger};
    use serde_json::json;

    fn coordinator() -> ExecutionCoordinator {
        let adapters = AdapterRegistry::new()
            .with(MockLedger::new("chainX", ConsensusFamily::ProofOfStake).into_arc())
            .with(
                MockLedger::new("chainY", ConsensusFamily::ProofOfWork)
                    .always_failing()
                    .into_arc(),
            )
            .with(
                MockLedger::new("chainS", ConsensusFamily::GenericBft)
                    .simulated()
                    .into_arc(),
            )
            .with(
                MockLedger::new("chainM", ConsensusFamily::ProofOfStake)
                    .treating_as_mutating("balance")
                    .into_arc(),
            );
        ExecutionCoordinator::new(adapters)
    }

    #[tokio::test]
    async fn test_success_outcome() {
        let outcome = coordinator()
            .execute(
                &"chainX".into(),
                "transfer",
                params([("to", json!("addr1")), ("amount", json!(5))]),
            )
            .await
            .unwrap();
        assert!(outcome.succeeded);
        assert!(outcome.attempted);
        assert!(outcome.state_changed);
        assert!(outcome.tx_hash.is_some());
        assert_eq!(outcome.return_value["operation"], "transfer");
        assert_eq!(outcome.mode, ExecutionMode::Real);
    }

    #[tokio::test]
    async fn test_read_only_does_not_change_state() {
        let outcome = coordinator()
            .execute_request(&balance("chainX", "addr1"))
            .await
            .unwrap();
        assert!(outcome.succeeded);
        assert!(!outcome.request.is_mutating);
        assert!(!outcome.state_changed);
    }

    #[tokio::test]
    async fn test_outcome_keeps_request_as_given() {
        let executor = coordinator();
        let request = balance("chainM", "addr1");
        let outcome = executor.execute_request(&request).await.unwrap();
        assert_eq!(outcome.request, request);
        assert!(!outcome.state_changed);

        let mut classified = request.clone();
        executor.classify(&mut classified).unwrap();
        assert!(classified.is_mutating);
        let outcome = executor.execute_request(&classified).await.unwrap();
        assert_eq!(outcome.request, classified);
        assert!(outcome.state_changed);
    }

    #[tokio::test]
    async fn test_execute_uses_adapter_classification() {
        let outcome = coordinator()
            .execute(&"chainM".into(), "balance", params([("address", json!("addr1"))]))
            .await
            .unwrap();
        assert!(outcome.request.is_mutating);
    }

    #[tokio::test]
    async fn test_adapter_failure_is_an_outcome() {
        let outcome = coordinator()
            .execute_request(&transfer("chainY", "addr2", 7))
            .await
            .unwrap();
        assert!(!outcome.succeeded);
        assert!(!outcome.state_changed);
        assert!(outcome.error.unwrap().contains("refused"));
        assert_eq!(outcome.return_value, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_unknown_ledger_is_an_error() {
        let err = coordinator()
            .execute_request(&transfer("chainQ", "addr2", 7))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::UnknownLedger(id) if id.as_str() == "chainQ"));
    }

    #[tokio::test]
    async fn test_simulated_mode_is_reported() {
        let outcome = coordinator()
            .execute_request(&transfer("chainS", "addr3", 1))
            .await
            .unwrap();
        assert!(outcome.succeeded);
        assert_eq!(outcome.mode, ExecutionMode::Simulated);
    }
}
