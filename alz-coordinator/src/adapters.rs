//! Ledger id → adapter lookup.

use std::collections::HashMap;
use std::sync::Arc;

use alz_common::{ChainAdapter, LedgerId};

use crate::CoordinatorError;

#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<LedgerId, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `adapter` under its own ledger id, returning any adapter it
    /// replaced.
    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) -> Option<Arc<dyn ChainAdapter>> {
        self.adapters.insert(adapter.ledger_id().clone(), adapter)
    }

    pub fn with(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, ledger_id: &LedgerId) -> Result<&Arc<dyn ChainAdapter>, CoordinatorError> {
        self.adapters
            .get(ledger_id)
            .ok_or_else(|| CoordinatorError::UnknownLedger(ledger_id.clone()))
    }

    pub fn contains(&self, ledger_id: &LedgerId) -> bool {
        self.adapters.contains_key(ledger_id)
    }

    pub fn ledger_ids(&self) -> Vec<LedgerId> {
        let mut ids: Vec<_> = self.adapters.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("ledgers", &self.ledger_ids())
            .finish()
    }
}
