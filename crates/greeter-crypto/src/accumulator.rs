//! Append-only membership accumulator.
//!
//! A fixed-depth Poseidon Merkle tree over identity commitments. Every level
//! of filled nodes is kept, so an append rewrites only the `depth` ancestors
//! of the new leaf and inclusion proofs are read straight out of the level
//! vectors. Empty subtrees hash to precomputed zero values, with the zero
//! leaf being `H(0)`.

use crate::poseidon::{bytes_to_fr, canonical_fr, fr_to_bytes, hash1, hash2};
use ark_bn254::Fr;
use greeter_types::{
    Commitment, GreeterError, GreeterResult, MerkleRoot, DEFAULT_ROOT_HISTORY, MAX_TREE_DEPTH,
};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::collections::{HashMap, VecDeque};
use tracing::debug;
use zeroize::Zeroize;

/// Which side of the path node the sibling sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiblingSide {
    Left,
    Right,
}

// Sides reveal the leaf position, so witnesses wipe them with the secrets.
impl Zeroize for SiblingSide {
    fn zeroize(&mut self) {
        *self = SiblingSide::Left;
    }
}

#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathNode {
    #[serde_as(as = "serde_with::hex::Hex")]
    pub sibling: [u8; 32],
    pub side: SiblingSide,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    pub leaf_index: u64,
    pub leaf: Commitment,
    /// Leaf level first.
    pub path: Vec<PathNode>,
    pub root: MerkleRoot,
}

impl InclusionProof {
    /// Root obtained by hashing the leaf up the path.
    pub fn compute_root(&self) -> MerkleRoot {
        let mut current = bytes_to_fr(self.leaf.as_bytes());
        for node in &self.path {
            let sibling = bytes_to_fr(&node.sibling);
            current = match node.side {
                SiblingSide::Left => hash2(sibling, current),
                SiblingSide::Right => hash2(current, sibling),
            };
        }
        MerkleRoot::from_bytes(fr_to_bytes(&current))
    }

    /// Path sides must agree with `leaf_index` and the path must hash to `root`.
    pub fn verify(&self) -> bool {
        if self.path.len() > 64 {
            return false;
        }
        let sides_match = self.path.iter().enumerate().all(|(level, node)| {
            let is_right_child = (self.leaf_index >> level) & 1 == 1;
            match node.side {
                SiblingSide::Left => is_right_child,
                SiblingSide::Right => !is_right_child,
            }
        });
        let index_fits = self.path.len() == 64 || self.leaf_index >> self.path.len() == 0;

        sides_match && index_fits && self.compute_root() == self.root
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

/// Immutable, versioned copy of the commitment set handed to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentSnapshot {
    /// Number of registrations the snapshot covers.
    pub version: u64,
    pub depth: usize,
    pub root: MerkleRoot,
    pub commitments: Vec<Commitment>,
}

impl CommitmentSnapshot {
    pub fn is_current(&self, root: &MerkleRoot) -> bool {
        self.root == *root
    }
}

pub struct MembershipAccumulator {
    depth: usize,
    zero_values: Vec<Fr>,
    /// `levels[0]` holds leaves, `levels[depth]` holds at most the root.
    levels: Vec<Vec<Fr>>,
    indices: HashMap<Commitment, u64>,
    root: Fr,
    recent_roots: VecDeque<MerkleRoot>,
    root_history: usize,
}

impl MembershipAccumulator {
    pub fn new(depth: usize) -> GreeterResult<Self> {
        Self::with_root_history(depth, DEFAULT_ROOT_HISTORY)
    }

    pub fn with_root_history(depth: usize, root_history: usize) -> GreeterResult<Self> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(GreeterError::Config(format!(
                "tree depth must be 1..={}, got {}",
                MAX_TREE_DEPTH, depth
            )));
        }
        if root_history == 0 {
            return Err(GreeterError::Config("root history must be at least 1".into()));
        }

        let zero_values = zero_values(depth);
        let root = zero_values[depth];

        let mut recent_roots = VecDeque::with_capacity(root_history.min(1024));
        recent_roots.push_back(MerkleRoot::from_bytes(fr_to_bytes(&root)));

        Ok(Self {
            depth,
            zero_values,
            levels: vec![Vec::new(); depth + 1],
            indices: HashMap::new(),
            root,
            recent_roots,
            root_history,
        })
    }

    /// Tree holding `commitments` in order. All but the last
    /// `root_history - 1` leaves are hashed level by level; the rest are
    /// appended one at a time so the root history matches a tree that
    /// registered every leaf individually.
    pub fn from_commitments(
        depth: usize,
        root_history: usize,
        commitments: &[Commitment],
    ) -> GreeterResult<Self> {
        let mut accumulator = Self::with_root_history(depth, root_history)?;
        let bulk = commitments.len().saturating_sub(root_history - 1);

        accumulator.fill(&commitments[..bulk])?;
        for commitment in &commitments[bulk..] {
            accumulator.register(*commitment)?;
        }
        Ok(accumulator)
    }

    /// Replays a snapshot and checks it lands on the advertised root.
    pub fn from_snapshot(snapshot: &CommitmentSnapshot) -> GreeterResult<Self> {
        let accumulator =
            Self::from_commitments(snapshot.depth, DEFAULT_ROOT_HISTORY, &snapshot.commitments)?;

        let replayed = accumulator.current_root();
        if replayed != snapshot.root {
            return Err(GreeterError::SnapshotRootMismatch {
                advertised: snapshot.root.to_hex(),
                replayed: replayed.to_hex(),
            });
        }
        Ok(accumulator)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    pub fn len(&self) -> u64 {
        self.levels[0].len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    pub fn current_root(&self) -> MerkleRoot {
        MerkleRoot::from_bytes(fr_to_bytes(&self.root))
    }

    pub fn index_of(&self, commitment: &Commitment) -> Option<u64> {
        self.indices.get(commitment).copied()
    }

    /// Whether `root` is among the most recent roots this tree has had.
    pub fn is_known_root(&self, root: &MerkleRoot) -> bool {
        self.recent_roots.contains(root)
    }

    /// Index `commitment` would be appended at. Nothing is modified.
    pub fn check_append(&self, commitment: &Commitment) -> GreeterResult<u64> {
        if self.indices.contains_key(commitment) {
            return Err(GreeterError::DuplicateCommitment(commitment.to_hex()));
        }
        let index = self.len();
        if index >= self.capacity() {
            return Err(GreeterError::Full {
                capacity: self.capacity(),
            });
        }
        if canonical_fr(commitment.as_bytes()).is_none() {
            return Err(GreeterError::Serialization(format!(
                "commitment {} is not a canonical field element",
                commitment.short()
            )));
        }
        Ok(index)
    }

    /// Appends `commitment` at the next free index and returns that index.
    pub fn register(&mut self, commitment: Commitment) -> GreeterResult<u64> {
        let index = self.check_append(&commitment)?;
        let leaf = bytes_to_fr(commitment.as_bytes());

        self.levels[0].push(leaf);

        let mut position = index as usize;
        let mut current = leaf;
        for level in 0..self.depth {
            current = if position & 1 == 0 {
                hash2(current, self.node(level, position + 1))
            } else {
                hash2(self.node(level, position - 1), current)
            };
            position >>= 1;

            let parents = &mut self.levels[level + 1];
            if position < parents.len() {
                parents[position] = current;
            } else {
                parents.push(current);
            }
        }

        self.root = current;
        self.indices.insert(commitment, index);
        self.remember_root();

        debug!(
            "Registered commitment {} at index {} (root {})",
            commitment.short(),
            index,
            self.current_root().short()
        );
        Ok(index)
    }

    /// Inclusion proof for `leaf_index` against the current root.
    pub fn prove_inclusion(&self, leaf_index: u64) -> GreeterResult<InclusionProof> {
        if leaf_index >= self.len() {
            return Err(GreeterError::UnknownIndex {
                index: leaf_index,
                len: self.len(),
            });
        }

        let mut position = leaf_index as usize;
        let mut path = Vec::with_capacity(self.depth);
        for level in 0..self.depth {
            let node = if position & 1 == 0 {
                PathNode {
                    sibling: fr_to_bytes(&self.node(level, position + 1)),
                    side: SiblingSide::Right,
                }
            } else {
                PathNode {
                    sibling: fr_to_bytes(&self.node(level, position - 1)),
                    side: SiblingSide::Left,
                }
            };
            path.push(node);
            position >>= 1;
        }

        Ok(InclusionProof {
            leaf_index,
            leaf: Commitment::from_bytes(fr_to_bytes(&self.levels[0][leaf_index as usize])),
            path,
            root: self.current_root(),
        })
    }

    pub fn commitments(&self) -> Vec<Commitment> {
        self.levels[0]
            .iter()
            .map(|leaf| Commitment::from_bytes(fr_to_bytes(leaf)))
            .collect()
    }

    pub fn snapshot(&self) -> CommitmentSnapshot {
        CommitmentSnapshot {
            version: self.len(),
            depth: self.depth,
            root: self.current_root(),
            commitments: self.commitments(),
        }
    }

    /// Loads leaves into an empty tree and hashes each level once.
    fn fill(&mut self, commitments: &[Commitment]) -> GreeterResult<()> {
        if commitments.is_empty() {
            return Ok(());
        }
        if !self.is_empty() {
            return Err(GreeterError::Internal(
                "bulk load into a non-empty tree".into(),
            ));
        }

        for commitment in commitments {
            let index = self.check_append(commitment)?;
            self.levels[0].push(bytes_to_fr(commitment.as_bytes()));
            self.indices.insert(*commitment, index);
        }

        for level in 0..self.depth {
            let zero = self.zero_values[level];
            let parents = self.levels[level]
                .chunks(2)
                .map(|pair| hash2(pair[0], pair.get(1).copied().unwrap_or(zero)))
                .collect();
            self.levels[level + 1] = parents;
        }

        self.root = self.levels[self.depth][0];
        self.recent_roots.clear();
        self.remember_root();
        Ok(())
    }

    fn node(&self, level: usize, position: usize) -> Fr {
        self.levels[level]
            .get(position)
            .copied()
            .unwrap_or(self.zero_values[level])
    }

    fn remember_root(&mut self) {
        if self.recent_roots.len() >= self.root_history {
            self.recent_roots.pop_front();
        }
        self.recent_roots.push_back(self.current_root());
    }
}

fn zero_values(depth: usize) -> Vec<Fr> {
    let mut values = Vec::with_capacity(depth + 1);
    let mut current = hash1(Fr::from(0u64));
    values.push(current);
    for _ in 0..depth {
        current = hash2(current, current);
        values.push(current);
    }
    values
}

/// Root of a tree of `depth` holding `leaves`, computed level by level from
/// scratch. Reference for the incremental path.
pub fn rebuild_root(leaves: &[Commitment], depth: usize) -> GreeterResult<MerkleRoot> {
    if depth == 0 || depth > MAX_TREE_DEPTH {
        return Err(GreeterError::Config(format!(
            "tree depth must be 1..={}, got {}",
            MAX_TREE_DEPTH, depth
        )));
    }
    if leaves.len() as u64 > 1u64 << depth {
        return Err(GreeterError::Full {
            capacity: 1u64 << depth,
        });
    }

    let zeros = zero_values(depth);
    let mut level: Vec<Fr> = leaves
        .iter()
        .map(|leaf| bytes_to_fr(leaf.as_bytes()))
        .collect();

    for zero in zeros.iter().take(depth) {
        let mut next_level = Vec::with_capacity(level.len().div_ceil(2));
        for chunk in level.chunks(2) {
            let left = chunk[0];
            let right = if chunk.len() > 1 { chunk[1] } else { *zero };
            next_level.push(hash2(left, right));
        }
        level = next_level;
    }

    let root = level.first().copied().unwrap_or(zeros[depth]);
    Ok(MerkleRoot::from_bytes(fr_to_bytes(&root)))
}
