//! Commitment tree over sub-channel state hashes.
//!
//! Binary, positional keccak tree. Each parent is
//! `keccak256(left || right)`; leaves keep the order they are given in.
//!
//! ```text
//!              root
//!            /      \
//!        h(L0,L1)    L2        <- odd level: last node carried up unchanged
//!        /    \
//!      L0     L1
//! ```
//!
//! - empty leaf set → root is `H256::zero()`
//! - single leaf → root is the leaf itself
//! - odd level → the last node is promoted to the next level, and proofs
//!   emit no step for that level
//!
//! A proof is the list of siblings from leaf to root, each tagged with the
//! side the sibling sits on.

use serde::{Deserialize, Serialize};

use metachannel_types::{
    CanonicalState, ChannelError, H256, Result, SubChannelState,
    codec::{Decoder, Encoder},
    constants::MAX_PROOF_DEPTH,
    hash::keccak256_concat,
};

/// Which side of the running hash a sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: H256,
    pub side: Side,
}

/// Inclusion proof for one leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    pub steps: Vec<ProofStep>,
}

impl InclusionProof {
    #[must_use]
    pub fn depth(&self) -> usize {
        self.steps.len()
    }

    /// Root obtained by folding `leaf` through the steps.
    #[must_use]
    pub fn compute_root(&self, leaf: &H256) -> H256 {
        self.steps.iter().fold(*leaf, |acc, step| match step.side {
            Side::Left => hash_pair(&step.sibling, &acc),
            Side::Right => hash_pair(&acc, &step.sibling),
        })
    }

    /// Wire form: `count`, then `(side, sibling)` word pairs.
    /// `side` is a boolean word, `true` meaning the sibling is on the right.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::with_fields(1 + 2 * self.steps.len());
        enc.u64(self.steps.len() as u64);
        for step in &self.steps {
            enc.bool(step.side == Side::Right).h256(&step.sibling);
        }
        enc.finish()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut d = Decoder::unbounded(bytes)?;
        let count = d.u64("step_count")?;
        let count = usize::try_from(count)
            .ok()
            .filter(|c| *c <= MAX_PROOF_DEPTH)
            .ok_or_else(|| {
                ChannelError::malformed(format!("proof depth {count} exceeds {MAX_PROOF_DEPTH}"))
            })?;
        if d.remaining() != 2 * count {
            return Err(ChannelError::malformed(format!(
                "proof declares {count} steps but carries {} words",
                d.remaining()
            )));
        }
        let mut steps = Vec::with_capacity(count);
        for _ in 0..count {
            let side = if d.bool("side")? {
                Side::Right
            } else {
                Side::Left
            };
            let sibling = d.h256("sibling")?;
            steps.push(ProofStep { sibling, side });
        }
        d.finish()?;
        Ok(Self { steps })
    }
}

fn hash_pair(left: &H256, right: &H256) -> H256 {
    keccak256_concat(&[left.as_bytes(), right.as_bytes()])
}

fn next_level(level: &[H256]) -> Vec<H256> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => hash_pair(left, right),
            [single] => *single,
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CommitmentTree
// ---------------------------------------------------------------------------

/// A fully materialized tree; level 0 holds the leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentTree {
    levels: Vec<Vec<H256>>,
}

impl CommitmentTree {
    #[must_use]
    pub fn from_leaves(leaves: &[H256]) -> Self {
        let mut levels = vec![leaves.to_vec()];
        let mut top = leaves.to_vec();
        while top.len() > 1 {
            top = next_level(&top);
            levels.push(top.clone());
        }
        Self { levels }
    }

    /// Tree over the hashes of `states`, in order.
    #[must_use]
    pub fn from_states(states: &[SubChannelState]) -> Self {
        let leaves: Vec<H256> = states.iter().map(CanonicalState::hash).collect();
        Self::from_leaves(&leaves)
    }

    #[must_use]
    pub fn leaves(&self) -> &[H256] {
        self.levels.first().map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves().is_empty()
    }

    #[must_use]
    pub fn root(&self) -> H256 {
        self.levels
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or_else(H256::zero)
    }

    /// Index of the first leaf equal to `leaf`.
    #[must_use]
    pub fn position(&self, leaf: &H256) -> Option<usize> {
        self.leaves().iter().position(|l| l == leaf)
    }

    #[must_use]
    pub fn contains(&self, leaf: &H256) -> bool {
        self.position(leaf).is_some()
    }

    /// Proof for the first leaf equal to `target`.
    pub fn proof_for(&self, target: &H256) -> Result<InclusionProof> {
        let index = self
            .position(target)
            .ok_or_else(|| ChannelError::proof_mismatch(format!("{target} is not a leaf")))?;
        self.proof_at(index)
    }

    /// Proof for the leaf at `index`.
    pub fn proof_at(&self, index: usize) -> Result<InclusionProof> {
        if index >= self.len() {
            return Err(ChannelError::proof_mismatch(format!(
                "leaf index {index} out of range for {} leaves",
                self.len()
            )));
        }
        let mut steps = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = idx ^ 1;
            if let Some(sibling) = level.get(sibling_idx) {
                let side = if idx % 2 == 0 { Side::Right } else { Side::Left };
                steps.push(ProofStep {
                    sibling: *sibling,
                    side,
                });
            }
            idx /= 2;
        }
        Ok(InclusionProof { steps })
    }
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Root over `leaves`.
#[must_use]
pub fn build(leaves: &[H256]) -> H256 {
    CommitmentTree::from_leaves(leaves).root()
}

/// Proof that `target` is one of `leaves`.
pub fn proof(leaves: &[H256], target: &H256) -> Result<InclusionProof> {
    CommitmentTree::from_leaves(leaves).proof_for(target)
}

/// `true` iff `proof` folds `leaf` into `root`.
#[must_use]
pub fn verify(root: &H256, leaf: &H256, proof: &InclusionProof) -> bool {
    proof.depth() <= MAX_PROOF_DEPTH && proof.compute_root(leaf) == *root
}

/// Commitment root over a set of sub-channel states.
#[must_use]
pub fn subchannel_root(states: &[SubChannelState]) -> H256 {
    CommitmentTree::from_states(states).root()
}
