//! Merkle inclusion provider.
//!
//! The leaf is `H(ledger_id, block_hash, tx_hash, block_height)`; the ledger
//! supplies the sibling path and the transaction root of the block. Both
//! generation and verification fold the leaf through the path and compare
//! against the root.

use alz_common::merkle::{fold_path, tx_leaf};
use alz_common::ExecutionOutcome;
use async_trait::async_trait;
use tracing::debug;

use crate::provider::{ensure_executable, fetch_metadata};
use crate::{InclusionPayload, Proof, ProofContext, ProofError, ProofKind, ProofProvider, Verdict};

pub struct InclusionProvider {
    issuer_id: String,
}

impl InclusionProvider {
    pub fn new(issuer_id: impl Into<String>) -> Self {
        Self {
            issuer_id: issuer_id.into(),
        }
    }
}

/// Recompute an inclusion payload's root from its leaf preimage and path.
pub fn check_inclusion(payload: &InclusionPayload) -> Verdict {
    let leaf = tx_leaf(
        &payload.ledger_id,
        &payload.block_hash,
        &payload.tx_hash,
        payload.block_height,
    );
    if leaf != payload.leaf {
        return Verdict::invalid("leaf does not match its preimage fields");
    }
    if payload.depth as usize != payload.path.len() {
        return Verdict::invalid(format!(
            "declared depth {} but path has {} elements",
            payload.depth,
            payload.path.len()
        ));
    }
    if fold_path(&payload.leaf, &payload.path) != payload.root {
        return Verdict::invalid("path does not fold to root");
    }
    Verdict::Valid
}

#[async_trait]
impl ProofProvider for InclusionProvider {
    fn kind(&self) -> ProofKind {
        ProofKind::Inclusion
    }

    fn issuer_id(&self) -> &str {
        &self.issuer_id
    }

    async fn generate(
        &self,
        outcome: &ExecutionOutcome,
        context: &ProofContext,
    ) -> Result<Proof, ProofError> {
        ensure_executable(outcome)?;
        let metadata = fetch_metadata(outcome, context).await?;

        let leaf = tx_leaf(
            &metadata.ledger_id,
            &metadata.block_hash,
            &metadata.tx_hash,
            metadata.block_height,
        );
        if fold_path(&leaf, &metadata.inclusion_path) != metadata.tx_root {
            return Err(ProofError::InclusionMismatch);
        }

        let proof = Proof::inclusion(
            self.issuer_id.clone(),
            InclusionPayload {
                ledger_id: metadata.ledger_id,
                block_hash: metadata.block_hash,
                tx_hash: metadata.tx_hash,
                block_height: metadata.block_height,
                leaf,
                depth: metadata.inclusion_path.len() as u32,
                path: metadata.inclusion_path,
                root: metadata.tx_root,
            },
        );
        debug!(proof_id = %proof.id_hex(), ledger = %outcome.request.ledger_id, "inclusion proof generated");
        Ok(proof)
    }

    async fn verify(&self, proof: &Proof) -> Verdict {
        let Proof::Inclusion(envelope) = proof else {
            return Verdict::invalid(format!(
                "inclusion provider cannot verify {} proof",
                proof.kind()
            ));
        };
        if !proof.has_valid_id() {
            return Verdict::invalid("proof id does not match payload");
        }
        check_inclusion(&envelope.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alz_common::merkle::leaf_hash;
    use alz_common::{LedgerId, MerkleTree};

    fn sample_payload() -> InclusionPayload {
        let ledger_id = LedgerId::from("chainX");
        let block_hash = [4u8; 32];
        let leaf = tx_leaf(&ledger_id, &block_hash, "0xfeed", 12);
        let mut leaves: Vec<[u8; 32]> = (0..5u8).map(|i| leaf_hash(&[i; 32])).collect();
        leaves.insert(2, leaf);
        let tree = MerkleTree::from_leaves(leaves);
        let path = tree.path(2).unwrap();

        InclusionPayload {
            ledger_id,
            block_hash,
            tx_hash: "0xfeed".to_string(),
            block_height: 12,
            leaf,
            depth: path.len() as u32,
            path,
            root: tree.root(),
        }
    }

    #[test]
    fn test_valid_payload_checks() {
        assert_eq!(check_inclusion(&sample_payload()), Verdict::Valid);
    }

    #[test]
    fn test_any_flipped_path_byte_fails() {
        let payload = sample_payload();
        for (i, _) in payload.path.iter().enumerate() {
            for byte in 0..32 {
                let mut tampered = payload.clone();
                tampered.path[i].sibling_hash[byte] ^= 0x01;
                assert!(!check_inclusion(&tampered).is_valid(), "path {i} byte {byte}");
            }
        }
    }

    #[test]
    fn test_any_flipped_leaf_byte_fails() {
        let payload = sample_payload();
        for byte in 0..32 {
            let mut tampered = payload.clone();
            tampered.leaf[byte] ^= 0x80;
            assert!(!check_inclusion(&tampered).is_valid(), "leaf byte {byte}");
        }
    }

    #[test]
    fn test_flipped_side_fails() {
        let mut payload = sample_payload();
        payload.path[0].is_left = !payload.path[0].is_left;
        assert!(!check_inclusion(&payload).is_valid());
    }

    #[test]
    fn test_wrong_height_fails() {
        let mut payload = sample_payload();
        payload.block_height += 1;
        assert!(!check_inclusion(&payload).is_valid());
    }
}
