//! Append-only proof registry.
//!
//! Answers "was this proof issued by us" and keeps proofs for audit and
//! replay. It is not a verification mechanism: providers verify payloads,
//! the registry only records them.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use alz_common::hash::to_hex;
use sled::Db;
use tracing::debug;

use crate::{Proof, ProofId, RegistryError};

/// Env var selecting a sled directory for the registry.
pub const PROOF_DB_ENV: &str = "ALZ_PROOF_DB";

#[derive(Clone)]
pub struct ProofRegistry {
    backend: Arc<RegistryBackend>,
}

enum RegistryBackend {
    InMemory(RwLock<HashMap<ProofId, Proof>>),
    Persistent(Db),
}

impl ProofRegistry {
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(RegistryBackend::InMemory(RwLock::new(HashMap::new()))),
        }
    }

    pub fn persistent(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    RegistryError::Storage(format!(
                        "failed to create directory for proof db at {}: {}",
                        path_ref.display(),
                        err
                    ))
                })?;
            }
        }
        let db = sled::open(path_ref)?;
        Ok(Self {
            backend: Arc::new(RegistryBackend::Persistent(db)),
        })
    }

    /// Persistent when [`PROOF_DB_ENV`] is set, in-memory otherwise.
    pub fn from_env() -> Result<Self, RegistryError> {
        match env::var(PROOF_DB_ENV) {
            Ok(path) if !path.is_empty() => Self::persistent(path),
            _ => Ok(Self::in_memory()),
        }
    }

    /// Record `proof`. Returns `true` when it was newly inserted and `false`
    /// when a proof with the same id was already present.
    ///
    /// The id is checked against the content first, so an existing entry
    /// under the same id carries the same kind, issuer and payload. Only
    /// `created_at` can differ; the first copy is kept.
    pub fn put(&self, proof: &Proof) -> Result<bool, RegistryError> {
        let proof_id = proof.proof_id();
        let computed = proof.content_id();
        if computed != proof_id {
            return Err(RegistryError::IdMismatch {
                claimed: to_hex(&proof_id),
                computed: to_hex(&computed),
            });
        }

        let inserted = match &*self.backend {
            RegistryBackend::InMemory(store) => {
                let mut guard = store.write().expect("proof registry poisoned");
                if guard.contains_key(&proof_id) {
                    false
                } else {
                    guard.insert(proof_id, proof.clone());
                    true
                }
            }
            RegistryBackend::Persistent(db) => {
                let bytes = serde_json::to_vec(proof)?;
                db.compare_and_swap(proof_id, None as Option<&[u8]>, Some(bytes))?
                    .is_ok()
            }
        };

        if inserted {
            debug!(proof_id = %proof.id_hex(), kind = %proof.kind(), "proof registered");
        }
        Ok(inserted)
    }

    pub fn contains(&self, proof_id: &ProofId) -> Result<bool, RegistryError> {
        match &*self.backend {
            RegistryBackend::InMemory(store) => Ok(store
                .read()
                .expect("proof registry poisoned")
                .contains_key(proof_id)),
            RegistryBackend::Persistent(db) => Ok(db.contains_key(proof_id)?),
        }
    }

    pub fn get(&self, proof_id: &ProofId) -> Result<Option<Proof>, RegistryError> {
        match &*self.backend {
            RegistryBackend::InMemory(store) => Ok(store
                .read()
                .expect("proof registry poisoned")
                .get(proof_id)
                .cloned()),
            RegistryBackend::Persistent(db) => match db.get(proof_id)? {
                Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
                None => Ok(None),
            },
        }
    }

    pub fn len(&self) -> usize {
        match &*self.backend {
            RegistryBackend::InMemory(store) => store.read().expect("proof registry poisoned").len(),
            RegistryBackend::Persistent(db) => db.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush persistent storage to disk. No-op in memory.
    pub fn flush(&self) -> Result<(), RegistryError> {
        if let RegistryBackend::Persistent(db) = &*self.backend {
            db.flush()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProofRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &*self.backend {
            RegistryBackend::InMemory(_) => "in_memory",
            RegistryBackend::Persistent(_) => "persistent",
        };
        f.debug_struct("ProofRegistry")
            .field("backend", &backend)
            .field("len", &self.len())
            .finish()
    }
}
