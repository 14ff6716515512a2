//! Ledger identities and consensus families.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a target ledger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(String);

impl LedgerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LedgerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for LedgerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Category of finality mechanism a ledger uses.
///
/// The family decides which structured fields a consensus attestation must
/// carry; see [`ConsensusFamily::required_fields`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusFamily {
    /// Nakamoto-style proof of work.
    ProofOfWork,
    /// Slot-based proof of stake with a single proposer signature.
    ProofOfStake,
    /// Proof of history ordering with PoS voting and BFT finality.
    PohPosBft,
    /// Custom PoS validator set with BFT rounds.
    CustomPosBft,
    /// Tendermint-style height/round commits.
    Tendermint,
    /// Any other BFT protocol producing quorum certificates.
    GenericBft,
}

impl ConsensusFamily {
    pub const ALL: [ConsensusFamily; 6] = [
        Self::ProofOfWork,
        Self::ProofOfStake,
        Self::PohPosBft,
        Self::CustomPosBft,
        Self::Tendermint,
        Self::GenericBft,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProofOfWork => "proof_of_work",
            Self::ProofOfStake => "proof_of_stake",
            Self::PohPosBft => "poh_pos_bft",
            Self::CustomPosBft => "custom_pos_bft",
            Self::Tendermint => "tendermint",
            Self::GenericBft => "generic_bft",
        }
    }

    /// Fields a consensus attestation for this family must carry.
    ///
    /// | family | fields |
    /// |---|---|
    /// | PoW | `block_hash`, `nonce`, `difficulty` |
    /// | PoS | `slot`, `validator_index`, `signature` |
    /// | PoH+PoS+BFT | `slot`, `history_hash`, `quorum_reached` |
    /// | custom PoS+BFT | `round`, `validator_set_hash`, `quorum_reached` |
    /// | Tendermint | `height`, `round`, `commit_signatures` |
    /// | generic BFT | `view`, `quorum_certificate` |
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::ProofOfWork => &["block_hash", "nonce", "difficulty"],
            Self::ProofOfStake => &["slot", "validator_index", "signature"],
            Self::PohPosBft => &["slot", "history_hash", "quorum_reached"],
            Self::CustomPosBft => &["round", "validator_set_hash", "quorum_reached"],
            Self::Tendermint => &["height", "round", "commit_signatures"],
            Self::GenericBft => &["view", "quorum_certificate"],
        }
    }
}

impl fmt::Display for ConsensusFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_family_has_required_fields() {
        for family in ConsensusFamily::ALL {
            assert!(!family.required_fields().is_empty(), "{family}");
        }
    }

    #[test]
    fn test_ledger_id_serializes_as_string() {
        let id = LedgerId::from("chainX");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"chainX\"");
    }
}
