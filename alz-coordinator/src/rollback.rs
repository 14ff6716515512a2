//! Compensation of already-executed operations.
//!
//! The payload builder and the ordering policy are pure; [`compensate`] is the
//! only part that talks to ledgers.

use std::collections::BTreeMap;
use std::time::Duration;

use alz_common::{
    params, ExecutionOutcome, LedgerId, OperationRequest, Params, ROLLBACK_OPERATION,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::ExecutionCoordinator;

/// Parameters of the `rollback` call compensating `outcome`.
pub fn compensation_params(outcome: &ExecutionOutcome, failure_reason: &str) -> Params {
    params([
        ("original_operation", json!(outcome.request.operation_name)),
        ("original_parameters", json!(outcome.request.parameters)),
        ("original_return_value", outcome.return_value.clone()),
        ("failure_reason", json!(failure_reason)),
    ])
}

pub fn compensation_request(outcome: &ExecutionOutcome, failure_reason: &str) -> OperationRequest {
    OperationRequest::new(
        outcome.request.ledger_id.clone(),
        ROLLBACK_OPERATION,
        compensation_params(outcome, failure_reason),
    )
}

/// An outcome selected for compensation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackTarget {
    pub index: usize,
    /// Left running by a timeout; the ledger may or may not have applied it.
    pub in_doubt: bool,
}

/// Which outcomes to compensate, last-submitted first.
///
/// Succeeded outcomes are compensated (read-only ones only when
/// `compensate_read_only`); indices in `in_doubt` are compensated regardless.
pub fn rollback_plan(
    outcomes: &[ExecutionOutcome],
    in_doubt: &[usize],
    compensate_read_only: bool,
) -> Vec<RollbackTarget> {
    outcomes
        .iter()
        .enumerate()
        .rev()
        .filter_map(|(index, outcome)| {
            let doubtful = in_doubt.contains(&index);
            let succeeded =
                outcome.succeeded && (outcome.request.is_mutating || compensate_read_only);
            (succeeded || doubtful).then_some(RollbackTarget {
                index,
                in_doubt: doubtful,
            })
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPORT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackEntry {
    /// Index of the compensated request in the batch.
    pub index: usize,
    pub ledger_id: LedgerId,
    pub attempted: bool,
    pub succeeded: bool,
    pub in_doubt: bool,
    /// Outcome of the `rollback` call itself.
    pub outcome: ExecutionOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRollback {
    pub attempted: bool,
    pub succeeded: bool,
}

/// Per-request compensation results in the order they ran.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackReport {
    pub entries: Vec<RollbackEntry>,
}

impl RollbackReport {
    pub fn all_succeeded(&self) -> bool {
        self.entries.iter().all(|entry| entry.succeeded)
    }

    /// Aggregated view: a ledger succeeded only if all its compensations did.
    pub fn by_ledger(&self) -> BTreeMap<LedgerId, LedgerRollback> {
        let mut view: BTreeMap<LedgerId, LedgerRollback> = BTreeMap::new();
        for entry in &self.entries {
            view.entry(entry.ledger_id.clone())
                .and_modify(|ledger| {
                    ledger.attempted |= entry.attempted;
                    ledger.succeeded &= entry.succeeded;
                })
                .or_insert(LedgerRollback {
                    attempted: entry.attempted,
                    succeeded: entry.succeeded,
                });
        }
        view
    }

    pub fn failed_ledgers(&self) -> Vec<LedgerId> {
        self.by_ledger()
            .into_iter()
            .filter(|(_, ledger)| !ledger.succeeded)
            .map(|(id, _)| id)
            .collect()
    }

    /// Ledgers in compensation order.
    pub fn order(&self) -> Vec<LedgerId> {
        self.entries.iter().map(|e| e.ledger_id.clone()).collect()
    }
}

/// Run the compensations in `plan` one after another.
pub async fn compensate(
    executor: &ExecutionCoordinator,
    outcomes: &[ExecutionOutcome],
    plan: &[RollbackTarget],
    failure_reason: &str,
    timeout: Duration,
) -> RollbackReport {
    let mut report = RollbackReport::default();

    for target in plan {
        let Some(original) = outcomes.get(target.index) else {
            continue;
        };
        let request = compensation_request(original, failure_reason);
        debug!(
            index = target.index,
            ledger_id = %request.ledger_id,
            in_doubt = target.in_doubt,
            "compensating"
        );

        let outcome = match tokio::time::timeout(timeout, executor.execute_request(&request)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => ExecutionOutcome::failure(
                request,
                err.to_string(),
                Duration::ZERO,
                original.mode,
            ),
            Err(_) => ExecutionOutcome::failure(
                request,
                format!("compensation timed out after {}ms", timeout.as_millis()),
                timeout,
                original.mode,
            ),
        };

        if outcome.succeeded {
            info!(index = target.index, ledger_id = %original.request.ledger_id, "compensation applied");
        } else {
            warn!(
                index = target.index,
                ledger_id = %original.request.ledger_id,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "compensation failed"
            );
        }

        report.entries.push(RollbackEntry {
            index: target.index,
            ledger_id: original.request.ledger_id.clone(),
            attempted: outcome.attempted,
            succeeded: outcome.succeeded,
            in_doubt: target.in_doubt,
            outcome,
        });
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use alz_common::ExecutionMode;
    use alz_test_fixtures::{balance, transfer};

    fn ok(request: OperationRequest) -> ExecutionOutcome {
        ExecutionOutcome::success(
            request,
            json!({"ok": true}),
            Some("0xabc".into()),
            Duration::from_millis(3),
            ExecutionMode::Real,
        )
    }

    fn failed(request: OperationRequest) -> ExecutionOutcome {
        ExecutionOutcome::failure(request, "boom", Duration::ZERO, ExecutionMode::Real)
    }

    #[test]
    fn test_compensation_params() {
        let outcome = ok(transfer("chainX", "addr1", 100));
        let params = compensation_params(&outcome, "chainY refused transfer");

        assert_eq!(params["original_operation"], "transfer");
        assert_eq!(params["original_parameters"]["to"], "addr1");
        assert_eq!(params["original_parameters"]["amount"], 100);
        assert_eq!(params["original_return_value"], json!({"ok": true}));
        assert_eq!(params["failure_reason"], "chainY refused transfer");
        assert_eq!(params.len(), 4);

        let request = compensation_request(&outcome, "x");
        assert_eq!(request.operation_name, ROLLBACK_OPERATION);
        assert_eq!(request.ledger_id.as_str(), "chainX");
    }

    #[test]
    fn test_plan_is_reverse_submission_order() {
        let outcomes = vec![
            ok(transfer("A", "a", 1)),
            ok(transfer("B", "b", 1)),
            failed(transfer("C", "c", 1)),
        ];
        let plan = rollback_plan(&outcomes, &[], true);
        let indices: Vec<_> = plan.iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![1, 0]);
        assert!(plan.iter().all(|t| !t.in_doubt));
    }

    #[test]
    fn test_plan_read_only_policy() {
        let outcomes = vec![ok(balance("A", "a")), ok(transfer("B", "b", 1))];
        assert_eq!(rollback_plan(&outcomes, &[], true).len(), 2);

        let strict = rollback_plan(&outcomes, &[], false);
        assert_eq!(strict, vec![RollbackTarget { index: 1, in_doubt: false }]);
    }

    #[test]
    fn test_plan_includes_in_doubt() {
        let outcomes = vec![ok(transfer("A", "a", 1)), failed(transfer("B", "b", 1))];
        let plan = rollback_plan(&outcomes, &[1], false);
        assert_eq!(
            plan,
            vec![
                RollbackTarget { index: 1, in_doubt: true },
                RollbackTarget { index: 0, in_doubt: false },
            ]
        );
    }

    #[test]
    fn test_by_ledger_aggregates() {
        let entry = |index, ledger: &str, succeeded| RollbackEntry {
            index,
            ledger_id: ledger.into(),
            attempted: true,
            succeeded,
            in_doubt: false,
            outcome: ok(transfer(ledger, "a", 1)),
        };
        let report = RollbackReport {
            entries: vec![entry(2, "A", true), entry(1, "B", true), entry(0, "A", false)],
        };

        let view = report.by_ledger();
        assert_eq!(view[&LedgerId::from("A")], LedgerRollback { attempted: true, succeeded: false });
        assert_eq!(view[&LedgerId::from("B")], LedgerRollback { attempted: true, succeeded: true });
        assert!(!report.all_succeeded());
        assert_eq!(report.failed_ledgers(), vec![LedgerId::from("A")]);
        assert_eq!(
            report.order(),
            vec![LedgerId::from("A"), LedgerId::from("B"), LedgerId::from("A")]
        );
    }
}
