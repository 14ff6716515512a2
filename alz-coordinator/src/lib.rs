//! alz-coordinator
//!
//! Executes a batch of operations across independent ledgers as one unit.
//!
//! Flow:
//! 1. Prepare: refuse empty batches, unknown ledgers and duplicate requests
//! 2. Execute every request with bounded parallelism
//! 3. Prove each outcome three ways (ZK, inclusion, consensus)
//! 4. Verify every proof, then commit
//! 5. On any failure, compensate executed requests in reverse order
//!
//! Every terminal batch is appended to the [`AuditLog`]; batches that could
//! not be fully compensated are raised through the [`AlertSink`].

pub mod adapters;
pub mod alert;
pub mod audit;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod execution;
pub mod rollback;
pub mod state;
pub mod telemetry;

pub use adapters::AdapterRegistry;
pub use alert::{Alert, AlertSink, LogAlertSink, MemoryAlertSink};
pub use audit::{AuditLog, MemoryAuditLog, SledAuditLog, AUDIT_DB_ENV};
pub use config::{CoordinatorConfig, FailurePolicy};
pub use coordinator::{AtomicCoordinator, AtomicCoordinatorBuilder, AtomicResult};
pub use error::{AuditError, BatchFailure, CoordinatorError};
pub use execution::ExecutionCoordinator;
pub use rollback::{
    compensate, compensation_params, compensation_request, rollback_plan, LedgerRollback,
    RollbackEntry, RollbackReport, RollbackTarget,
};
pub use state::{AtomicTransaction, Phase, Status, Transition};
pub use telemetry::{init_tracing, ALERT_TARGET, DEFAULT_DIRECTIVE};
