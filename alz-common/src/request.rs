//! Operation requests submitted to the coordinator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash::{canonical_json, domain_hash};
use crate::LedgerId;

/// Ordered key → value operation parameters.
pub type Params = BTreeMap<String, serde_json::Value>;

/// Verbs that mark an operation as state-mutating.
pub const MUTATING_VERBS: [&str; 7] = [
    "transfer", "mint", "burn", "approve", "swap", "deposit", "withdraw",
];

const REQUEST_FINGERPRINT_DOMAIN: &[u8] = b"alz.request.v1";

/// Returns true when `operation_name` contains one of [`MUTATING_VERBS`],
/// ignoring case (`transferFrom` and `Mint` are both mutating).
pub fn is_mutating_verb(operation_name: &str) -> bool {
    let lowered = operation_name.to_ascii_lowercase();
    MUTATING_VERBS.iter().any(|verb| lowered.contains(verb))
}

/// One (ledger, operation, params) tuple of an atomic batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub ledger_id: LedgerId,
    pub operation_name: String,
    pub parameters: Params,
    /// Derived from `operation_name` when the request is built.
    pub is_mutating: bool,
}

impl OperationRequest {
    pub fn new(ledger_id: impl Into<LedgerId>, operation_name: impl Into<String>, parameters: Params) -> Self {
        let operation_name = operation_name.into();
        let is_mutating = is_mutating_verb(&operation_name);
        Self {
            ledger_id: ledger_id.into(),
            operation_name,
            parameters,
            is_mutating,
        }
    }

    /// Content hash over (ledger, operation, parameters).
    ///
    /// Two requests with the same fingerprint would execute the same effect
    /// twice; the coordinator refuses such batches.
    pub fn fingerprint(&self) -> [u8; 32] {
        domain_hash(
            REQUEST_FINGERPRINT_DOMAIN,
            &[
                self.ledger_id.as_str().as_bytes(),
                self.operation_name.as_bytes(),
                &canonical_json(&self.parameters),
            ],
        )
    }
}

/// Build a [`Params`] map from `(key, value)` pairs.
///
/// ```
/// use alz_common::request::params;
/// let p = params([("to", serde_json::json!("addr1")), ("amount", serde_json::json!(5))]);
/// assert_eq!(p.len(), 2);
/// ```
pub fn params<I, K>(pairs: I) -> Params
where
    I: IntoIterator<Item = (K, serde_json::Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
