//! Binary Merkle trees over 32-byte leaves.
//!
//! Leaves and internal nodes are hashed under different domains, and trees
//! are padded to a power of two with zero leaves.

use crate::hash::domain_hash;
use crate::{LedgerId, MerklePathElement};

const LEAF_DOMAIN: &[u8] = b"alz.merkle.leaf.v1";
const NODE_DOMAIN: &[u8] = b"alz.merkle.node.v1";
const TX_LEAF_DOMAIN: &[u8] = b"alz.merkle.tx.v1";

/// Hash of a raw leaf value.
pub fn leaf_hash(value: &[u8; 32]) -> [u8; 32] {
    domain_hash(LEAF_DOMAIN, &[value])
}

/// Hash of two child nodes.
pub fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    domain_hash(NODE_DOMAIN, &[left, right])
}

/// Inclusion leaf for a transaction: H(ledger_id, block_hash, tx_hash, block_height).
pub fn tx_leaf(ledger_id: &LedgerId, block_hash: &[u8; 32], tx_hash: &str, block_height: u64) -> [u8; 32] {
    let value = domain_hash(
        TX_LEAF_DOMAIN,
        &[
            ledger_id.as_str().as_bytes(),
            block_hash,
            tx_hash.as_bytes(),
            &block_height.to_be_bytes(),
        ],
    );
    leaf_hash(&value)
}

/// Fold `leaf` through `path` and return the resulting root.
pub fn fold_path(leaf: &[u8; 32], path: &[MerklePathElement]) -> [u8; 32] {
    path.iter().fold(*leaf, |current, element| {
        if element.is_left {
            hash_pair(&element.sibling_hash, &current)
        } else {
            hash_pair(&current, &element.sibling_hash)
        }
    })
}

/// A fully materialised Merkle tree.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// levels[0] holds the (padded) leaves, the last level holds the root.
    levels: Vec<Vec<[u8; 32]>>,
    leaf_count: usize,
}

impl MerkleTree {
    /// Build a tree over already-hashed leaves.
    pub fn from_leaves(leaves: Vec<[u8; 32]>) -> Self {
        let leaf_count = leaves.len();
        let mut level = leaves;
        if level.is_empty() {
            level.push([0u8; 32]);
        }
        while level.len().count_ones() != 1 {
            level.push([0u8; 32]);
        }

        let mut levels = vec![level];
        while levels[levels.len() - 1].len() > 1 {
            let next = levels[levels.len() - 1]
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
            levels.push(next);
        }

        Self { levels, leaf_count }
    }

    pub fn root(&self) -> [u8; 32] {
        self.levels[self.levels.len() - 1][0]
    }

    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Sibling path for the leaf at `index`.
    pub fn path(&self, index: usize) -> Option<Vec<MerklePathElement>> {
        if index >= self.leaf_count {
            return None;
        }

        let mut path = Vec::with_capacity(self.depth());
        let mut current = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = current ^ 1;
            path.push(MerklePathElement {
                sibling_hash: level[sibling],
                is_left: current % 2 == 1,
            });
            current /= 2;
        }
        Some(path)
    }
}
