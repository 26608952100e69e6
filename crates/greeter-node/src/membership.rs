//! Shared, durable membership accumulator.
//!
//! Registrations take the write lock, so they are serialized with each other.
//! Everything that must agree on one root (an inclusion proof and the witness
//! built from it) happens under a single read guard.

use crate::storage::CommitmentStore;
use greeter_crypto::{
    CommitmentSnapshot, Identity, InclusionProof, MembershipAccumulator, Witness, WitnessBuilder,
};
use greeter_types::{Commitment, ExternalNullifier, GreeterError, GreeterResult, MerkleRoot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

pub struct SharedAccumulator {
    tree: RwLock<MembershipAccumulator>,
    store: Option<Arc<dyn CommitmentStore>>,
    registrations: AtomicU64,
    rejections: AtomicU64,
}

impl SharedAccumulator {
    /// Memory-only accumulator.
    pub fn new(accumulator: MembershipAccumulator) -> Self {
        Self {
            tree: RwLock::new(accumulator),
            store: None,
            registrations: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    /// Replays every stored commitment, then persists new ones to `store`.
    pub fn open(
        depth: usize,
        root_history: usize,
        store: Arc<dyn CommitmentStore>,
    ) -> GreeterResult<Self> {
        let commitments = store.load_commitments()?;
        let accumulator =
            MembershipAccumulator::from_commitments(depth, root_history, &commitments)?;

        info!(
            "Membership tree restored: {} members, root {}",
            accumulator.len(),
            accumulator.current_root().short()
        );

        Ok(Self {
            tree: RwLock::new(accumulator),
            store: Some(store),
            registrations: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        })
    }

    pub async fn register(&self, commitment: Commitment) -> GreeterResult<u64> {
        let mut tree = self.tree.write().await;

        let index = match tree.check_append(&commitment) {
            Ok(index) => index,
            Err(e) => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };
        if let Some(store) = &self.store {
            store.append_commitment(index, &commitment)?;
        }
        let registered = tree.register(commitment)?;
        if registered != index {
            return Err(GreeterError::Internal(format!(
                "commitment landed at {} instead of {}",
                registered, index
            )));
        }

        self.registrations.fetch_add(1, Ordering::Relaxed);
        info!(
            "Registered member {} at index {} (root {})",
            commitment.short(),
            index,
            tree.current_root().short()
        );
        Ok(index)
    }

    pub async fn current_root(&self) -> MerkleRoot {
        self.tree.read().await.current_root()
    }

    pub async fn is_known_root(&self, root: &MerkleRoot) -> bool {
        self.tree.read().await.is_known_root(root)
    }

    pub async fn prove_inclusion(&self, leaf_index: u64) -> GreeterResult<InclusionProof> {
        self.tree.read().await.prove_inclusion(leaf_index)
    }

    pub async fn index_of(&self, commitment: &Commitment) -> Option<u64> {
        self.tree.read().await.index_of(commitment)
    }

    pub async fn len(&self) -> u64 {
        self.tree.read().await.len()
    }

    pub async fn depth(&self) -> usize {
        self.tree.read().await.depth()
    }

    pub async fn snapshot(&self) -> CommitmentSnapshot {
        self.tree.read().await.snapshot()
    }

    /// Checks a caller-held inclusion proof against the current root.
    pub async fn build_witness(
        &self,
        identity: &Identity,
        inclusion_proof: &InclusionProof,
        message: &[u8],
        external_nullifier: &ExternalNullifier,
    ) -> GreeterResult<Witness> {
        let tree = self.tree.read().await;
        WitnessBuilder::new(&tree).build(identity, inclusion_proof, message, external_nullifier)
    }

    /// Locates `identity`, draws its proof and builds the witness against one root.
    pub async fn witness_for(
        &self,
        identity: &Identity,
        message: &[u8],
        external_nullifier: &ExternalNullifier,
    ) -> GreeterResult<Witness> {
        let tree = self.tree.read().await;
        let commitment = identity.commitment();
        let index = tree.index_of(&commitment).ok_or_else(|| {
            GreeterError::InvalidInclusionProof(format!(
                "commitment {} is not registered",
                commitment.short()
            ))
        })?;
        let proof = tree.prove_inclusion(index)?;
        WitnessBuilder::new(&tree).build(identity, &proof, message, external_nullifier)
    }

    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }

    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::GreeterStorage;
    use greeter_crypto::external_nullifier;

    #[tokio::test]
    async fn test_register_and_prove() {
        let shared = SharedAccumulator::new(MembershipAccumulator::new(3).unwrap());
        let id = Identity::random();

        assert_eq!(shared.register(Identity::random().commitment()).await.unwrap(), 0);
        assert_eq!(shared.register(id.commitment()).await.unwrap(), 1);

        let proof = shared.prove_inclusion(1).await.unwrap();
        assert!(proof.verify());
        assert_eq!(proof.root, shared.current_root().await);
        assert_eq!(shared.index_of(&id.commitment()).await, Some(1));
        assert_eq!(shared.registrations(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_counts_as_rejection() {
        let shared = SharedAccumulator::new(MembershipAccumulator::new(3).unwrap());
        let c = Identity::random().commitment();
        shared.register(c).await.unwrap();

        assert!(matches!(
            shared.register(c).await,
            Err(GreeterError::DuplicateCommitment(_))
        ));
        assert_eq!(shared.rejections(), 1);
        assert_eq!(shared.len().await, 1);
    }

    #[tokio::test]
    async fn test_stale_proof_after_concurrent_registration() {
        let shared = Arc::new(SharedAccumulator::new(MembershipAccumulator::new(3).unwrap()));
        let id = Identity::random();
        shared.register(id.commitment()).await.unwrap();
        let stale = shared.prove_inclusion(0).await.unwrap();

        let racer = Arc::clone(&shared);
        tokio::spawn(async move { racer.register(Identity::random().commitment()).await })
            .await
            .unwrap()
            .unwrap();

        let err = shared
            .build_witness(&id, &stale, b"hello", &external_nullifier(b"hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, GreeterError::ProofRootMismatch { .. }));

        // Re-fetching recovers.
        let fresh = shared.prove_inclusion(0).await.unwrap();
        assert!(shared
            .build_witness(&id, &fresh, b"hello", &external_nullifier(b"hello"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_witness_for_unregistered_identity() {
        let shared = SharedAccumulator::new(MembershipAccumulator::new(3).unwrap());
        shared.register(Identity::random().commitment()).await.unwrap();

        assert!(matches!(
            shared
                .witness_for(&Identity::random(), b"hi", &external_nullifier(b"hi"))
                .await,
            Err(GreeterError::InvalidInclusionProof(_))
        ));
    }

    #[tokio::test]
    async fn test_restored_from_store() {
        let storage: Arc<GreeterStorage> = Arc::new(GreeterStorage::in_memory(3).unwrap());
        let members: Vec<Identity> = (0..4).map(|_| Identity::random()).collect();

        let (earlier, root) = {
            let shared = SharedAccumulator::open(3, 3, storage.clone()).unwrap();
            let mut roots = Vec::new();
            for id in &members {
                shared.register(id.commitment()).await.unwrap();
                roots.push(shared.current_root().await);
            }
            (roots, shared.current_root().await)
        };

        let restored = SharedAccumulator::open(3, 3, storage).unwrap();
        assert_eq!(restored.current_root().await, root);
        assert_eq!(restored.index_of(&members[3].commitment()).await, Some(3));

        // The recent roots survive the restart; older ones stay expired.
        assert!(!restored.is_known_root(&earlier[0]).await);
        for root in &earlier[1..] {
            assert!(restored.is_known_root(root).await);
        }
    }
}
