//! Execution outcomes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::hash::{canonical_json, domain_hash};
use crate::OperationRequest;

const OUTCOME_COMMITMENT_DOMAIN: &[u8] = b"alz.outcome.v1";

/// Whether an adapter talks to the real ledger or fabricates results.
///
/// Simulated adapters are never substituted silently: the mode is carried on
/// every outcome so callers can tell the two apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Real,
    Simulated,
}

/// Result of attempting one operation on one ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub request: OperationRequest,
    pub succeeded: bool,
    /// Opaque adapter return value (`Null` on failure).
    pub return_value: serde_json::Value,
    /// True when the operation succeeded and was mutating.
    pub state_changed: bool,
    pub execution_time: Duration,
    pub mode: ExecutionMode,
    /// Ledger transaction hash reported by the adapter, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// False when the request was never started (batch halted first).
    pub attempted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn success(
        request: OperationRequest,
        return_value: serde_json::Value,
        tx_hash: Option<String>,
        execution_time: Duration,
        mode: ExecutionMode,
    ) -> Self {
        let state_changed = request.is_mutating;
        Self {
            request,
            succeeded: true,
            return_value,
            state_changed,
            execution_time,
            mode,
            tx_hash,
            attempted: true,
            error: None,
        }
    }

    pub fn failure(
        request: OperationRequest,
        error: impl Into<String>,
        execution_time: Duration,
        mode: ExecutionMode,
    ) -> Self {
        Self {
            request,
            succeeded: false,
            return_value: serde_json::Value::Null,
            state_changed: false,
            execution_time,
            mode,
            tx_hash: None,
            attempted: true,
            error: Some(error.into()),
        }
    }

    /// Outcome for a request that was never started.
    pub fn skipped(request: OperationRequest, reason: impl Into<String>) -> Self {
        Self {
            request,
            succeeded: false,
            return_value: serde_json::Value::Null,
            state_changed: false,
            execution_time: Duration::ZERO,
            mode: ExecutionMode::Real,
            tx_hash: None,
            attempted: false,
            error: Some(reason.into()),
        }
    }

    /// Binding commitment over request, return value and transaction hash.
    ///
    /// Two outcomes differing in any of those fields never share a commitment.
    pub fn commitment(&self) -> [u8; 32] {
        domain_hash(
            OUTCOME_COMMITMENT_DOMAIN,
            &[
                &self.request.fingerprint(),
                &canonical_json(&self.return_value),
                self.tx_hash.as_deref().unwrap_or_default().as_bytes(),
                &[self.succeeded as u8],
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Params;
    use serde_json::json;

    fn transfer() -> OperationRequest {
        OperationRequest::new("chainX", "transfer", Params::new())
    }

    #[test]
    fn test_state_changed_follows_mutating_flag() {
        let write = ExecutionOutcome::success(transfer(), json!(1), None, Duration::ZERO, ExecutionMode::Real);
        assert!(write.state_changed);

        let read = ExecutionOutcome::success(
            OperationRequest::new("chainX", "balance", Params::new()),
            json!(10),
            None,
            Duration::ZERO,
            ExecutionMode::Real,
        );
        assert!(!read.state_changed);

        let failed = ExecutionOutcome::failure(transfer(), "boom", Duration::ZERO, ExecutionMode::Real);
        assert!(!failed.state_changed);
        assert!(failed.attempted);
    }

    #[test]
    fn test_commitment_binds_return_value() {
        let a = ExecutionOutcome::success(transfer(), json!({"ok": 1}), None, Duration::ZERO, ExecutionMode::Real);
        let b = ExecutionOutcome::success(transfer(), json!({"ok": 2}), None, Duration::ZERO, ExecutionMode::Real);
        assert_ne!(a.commitment(), b.commitment());
    }

    #[test]
    fn test_skipped_is_not_attempted() {
        let outcome = ExecutionOutcome::skipped(transfer(), "halted");
        assert!(!outcome.attempted);
        assert!(!outcome.succeeded);
    }
}
