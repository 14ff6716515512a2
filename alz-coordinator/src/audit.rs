//! Append-only audit log of terminal atomic transactions.

use std::fs;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use sled::Db;
use tracing::debug;

use crate::{AtomicTransaction, AuditError};

/// Env var naming the sled directory of the audit log.
pub const AUDIT_DB_ENV: &str = "ALZ_AUDIT_DB";

/// Receives every transaction exactly once, after it reached a terminal
/// status.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, transaction: &AtomicTransaction) -> Result<(), AuditError>;
}

fn ensure_terminal(transaction: &AtomicTransaction) -> Result<(), AuditError> {
    if transaction.status().is_terminal() {
        Ok(())
    } else {
        Err(AuditError::NotTerminal {
            atomic_id: transaction.atomic_id.clone(),
            status: transaction.status(),
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: RwLock<Vec<AtomicTransaction>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AtomicTransaction> {
        self.records.read().expect("audit log poisoned").clone()
    }

    pub fn get(&self, atomic_id: &str) -> Option<AtomicTransaction> {
        self.records
            .read()
            .expect("audit log poisoned")
            .iter()
            .find(|tx| tx.atomic_id == atomic_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("audit log poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, transaction: &AtomicTransaction) -> Result<(), AuditError> {
        ensure_terminal(transaction)?;
        let mut records = self.records.write().expect("audit log poisoned");
        if records.iter().any(|tx| tx.atomic_id == transaction.atomic_id) {
            return Err(AuditError::Duplicate(transaction.atomic_id.clone()));
        }
        records.push(transaction.clone());
        Ok(())
    }
}

/// Durable audit log on sled. Records are keyed by atomic id and flushed
/// before `append` returns.
#[derive(Clone)]
pub struct SledAuditLog {
    db: Db,
}

impl SledAuditLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    AuditError::Storage(format!(
                        "failed to create directory for audit db at {}: {}",
                        path_ref.display(),
                        err
                    ))
                })?;
            }
        }
        Ok(Self {
            db: sled::open(path_ref)?,
        })
    }

    pub fn get(&self, atomic_id: &str) -> Result<Option<AtomicTransaction>, AuditError> {
        match self.db.get(atomic_id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every record, ordered by creation time.
    pub fn records(&self) -> Result<Vec<AtomicTransaction>, AuditError> {
        let mut records = self
            .db
            .iter()
            .values()
            .map(|value| Ok(serde_json::from_slice(&value?)?))
            .collect::<Result<Vec<AtomicTransaction>, AuditError>>()?;
        records.sort_by_key(|tx| tx.created_at);
        Ok(records)
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}

impl std::fmt::Debug for SledAuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledAuditLog")
            .field("len", &self.db.len())
            .finish()
    }
}

#[async_trait]
impl AuditLog for SledAuditLog {
    async fn append(&self, transaction: &AtomicTransaction) -> Result<(), AuditError> {
        ensure_terminal(transaction)?;
        let bytes = serde_json::to_vec(transaction)?;
        let key = transaction.atomic_id.as_bytes();
        if self
            .db
            .compare_and_swap(key, None as Option<&[u8]>, Some(bytes))?
            .is_err()
        {
            return Err(AuditError::Duplicate(transaction.atomic_id.clone()));
        }
        self.db.flush()?;
        debug!(atomic_id = %transaction.atomic_id, status = %transaction.status(), "audit record persisted");
        Ok(())
    }
}
