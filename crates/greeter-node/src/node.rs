//! Composition root.
//!
//! A node owns exactly one accumulator, one nullifier registry and one board,
//! and hands them out by `Arc`. Restarting a node over the same data
//! directory restores all three.

use crate::board::GreetingBoard;
use crate::cancellation::CancellationToken;
use crate::config::GreeterConfig;
use crate::membership::SharedAccumulator;
use crate::nullifier::NullifierRegistry;
use crate::pipeline::SubmissionPipeline;
use crate::prover::{ProofService, ProverStats};
use crate::storage::GreeterStorage;
use greeter_crypto::keys::{load_prover, load_verifier, write_keys, KeyPaths};
use greeter_crypto::{external_nullifier, Groth16Backend, Identity, ProvingBackend, Witness};
use greeter_types::{
    Commitment, GreeterError, GreeterResult, InvalidProofReason, MerkleRoot, Signal, Verdict,
    Verification, DEFAULT_ROOT_HISTORY,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStats {
    pub members: u64,
    pub accepted_greetings: u64,
    pub scopes: usize,
    pub registrations: u64,
    pub rejected_registrations: u64,
    pub repeat_signals: u64,
    pub prover: ProverStats,
}

pub struct GreeterNode {
    storage: Option<Arc<GreeterStorage>>,
    accumulator: Arc<SharedAccumulator>,
    registry: Arc<NullifierRegistry>,
    prover: Arc<ProofService>,
    board: GreetingBoard,
    pipeline: SubmissionPipeline,
}

impl GreeterNode {
    /// Opens the data directory described by `config`, loading (or, when
    /// allowed, generating) keys for the configured tree depth.
    pub async fn open(config: &GreeterConfig) -> GreeterResult<Self> {
        let depth = config.tree.depth;
        let backend = load_backend(&config.keys_dir(), depth, config.keys.setup_if_missing).await?;
        let storage = Arc::new(GreeterStorage::open(config.resolved_storage(), depth)?);

        Self::assemble(Some(storage), backend, depth, config.tree.root_history).await
    }

    /// Durable node over an already opened database.
    pub async fn with_storage(
        storage: Arc<GreeterStorage>,
        backend: Arc<dyn ProvingBackend>,
        root_history: usize,
    ) -> GreeterResult<Self> {
        let depth = backend.depth();
        Self::assemble(Some(storage), backend, depth, root_history).await
    }

    /// Memory-only node, sized by the backend's circuit.
    pub async fn in_memory(backend: Arc<dyn ProvingBackend>) -> GreeterResult<Self> {
        let depth = backend.depth();
        Self::assemble(None, backend, depth, DEFAULT_ROOT_HISTORY).await
    }

    async fn assemble(
        storage: Option<Arc<GreeterStorage>>,
        backend: Arc<dyn ProvingBackend>,
        depth: usize,
        root_history: usize,
    ) -> GreeterResult<Self> {
        if backend.depth() != depth {
            return Err(GreeterError::Config(format!(
                "proving keys are for depth {} but the tree has depth {}",
                backend.depth(),
                depth
            )));
        }

        let (accumulator, registry) = match &storage {
            Some(storage) => (
                SharedAccumulator::open(depth, root_history, storage.clone())?,
                NullifierRegistry::open(storage.clone())?,
            ),
            None => (
                SharedAccumulator::new(
                    greeter_crypto::MembershipAccumulator::with_root_history(depth, root_history)?,
                ),
                NullifierRegistry::new(),
            ),
        };
        let accumulator = Arc::new(accumulator);
        let registry = Arc::new(registry);
        let prover = Arc::new(ProofService::new(backend));
        let board = GreetingBoard::from_records(&registry.records().await);

        let pipeline = SubmissionPipeline::new(
            Arc::clone(&accumulator),
            Arc::clone(&registry),
            Arc::clone(&prover),
            board.clone(),
        );

        info!(
            "Greeter node ready: depth {}, {} members, {} greetings",
            depth,
            accumulator.len().await,
            board.len()
        );

        Ok(Self {
            storage,
            accumulator,
            registry,
            prover,
            board,
            pipeline,
        })
    }

    pub async fn register(&self, commitment: Commitment) -> GreeterResult<u64> {
        self.accumulator.register(commitment).await
    }

    /// Builds a witness for `identity` against the current root. The scope
    /// is `topic`, or the message itself when no topic is given.
    pub async fn prepare(
        &self,
        identity: &Identity,
        message: &[u8],
        topic: Option<&[u8]>,
    ) -> GreeterResult<Witness> {
        let scope = external_nullifier(topic.unwrap_or(message));
        self.accumulator.witness_for(identity, message, &scope).await
    }

    /// Proves membership and produces a signal ready for [`submit`](Self::submit).
    pub async fn greet(
        &self,
        identity: &Identity,
        message: &[u8],
        topic: Option<&[u8]>,
    ) -> GreeterResult<Signal> {
        let witness = self.prepare(identity, message, topic).await?;
        Ok(self.prover.generate(witness).await?.into_signal())
    }

    pub async fn greet_cancellable(
        &self,
        identity: &Identity,
        message: &[u8],
        topic: Option<&[u8]>,
        cancel: CancellationToken,
    ) -> GreeterResult<Signal> {
        let witness = self.prepare(identity, message, topic).await?;
        Ok(self
            .prover
            .generate_cancellable(witness, cancel)
            .await?
            .into_signal())
    }

    pub async fn submit(&self, signal: &Signal) -> GreeterResult<Verdict> {
        self.pipeline.submit(signal).await
    }

    /// Checks a signal against this node's roots and keys without recording it.
    pub async fn check(&self, signal: &Signal) -> Verification {
        if !self
            .accumulator
            .is_known_root(&signal.public_signals.root)
            .await
        {
            return Verification::Invalid(InvalidProofReason::UnknownRoot);
        }
        self.prover.verify_signal(signal)
    }

    pub async fn current_root(&self) -> MerkleRoot {
        self.accumulator.current_root().await
    }

    pub fn accumulator(&self) -> &Arc<SharedAccumulator> {
        &self.accumulator
    }

    pub fn registry(&self) -> &Arc<NullifierRegistry> {
        &self.registry
    }

    pub fn prover(&self) -> &Arc<ProofService> {
        &self.prover
    }

    pub fn board(&self) -> &GreetingBoard {
        &self.board
    }

    pub fn storage(&self) -> Option<&Arc<GreeterStorage>> {
        self.storage.as_ref()
    }

    pub async fn flush(&self) -> GreeterResult<()> {
        match &self.storage {
            Some(storage) => storage.flush_async().await,
            None => Ok(()),
        }
    }

    pub async fn stats(&self) -> NodeStats {
        NodeStats {
            members: self.accumulator.len().await,
            accepted_greetings: self.board.len(),
            scopes: self.registry.scope_count(),
            registrations: self.accumulator.registrations(),
            rejected_registrations: self.accumulator.rejections(),
            repeat_signals: self.registry.repeats(),
            prover: self.prover.stats(),
        }
    }
}

/// Loads keys from `dir`. Falls back to a verifier when only the verifying
/// key is present, and to a local setup when `setup_if_missing` is set.
pub async fn load_backend(
    dir: &Path,
    depth: usize,
    setup_if_missing: bool,
) -> GreeterResult<Arc<dyn ProvingBackend>> {
    let paths = KeyPaths::in_dir(dir);

    let backend = if paths.proving_key.exists() && paths.exist() {
        info!("Loading proving key from {:?}", dir);
        load_prover(dir)?
    } else if paths.exist() {
        warn!("No proving key in {:?}; this node can verify but not prove", dir);
        load_verifier(dir)?
    } else if setup_if_missing {
        warn!(
            "No keys in {:?}; running a local setup for depth {}. Do not use these keys in production.",
            dir, depth
        );
        let backend = tokio::task::spawn_blocking(move || {
            Groth16Backend::setup(depth, &mut rand::thread_rng())
        })
        .await
        .map_err(|e| GreeterError::Internal(format!("setup task failed: {}", e)))??;
        write_keys(&backend, dir)?;
        backend
    } else {
        return Err(GreeterError::Config(format!(
            "No keys found in {}; run `greeter-keygen generate --depth {} --output {}` or set keys.setup_if_missing",
            dir.display(),
            depth,
            dir.display()
        )));
    };

    Ok(Arc::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::backend;

    #[tokio::test]
    async fn test_depth_mismatch_rejected() {
        let storage = Arc::new(GreeterStorage::in_memory(4).unwrap());
        let result = GreeterNode::assemble(Some(storage), backend(), 4, 16).await;
        assert!(matches!(result, Err(GreeterError::Config(_))));
    }

    #[tokio::test]
    async fn test_greet_with_topic_scopes_by_topic() {
        let node = GreeterNode::in_memory(backend()).await.unwrap();
        let alice = Identity::random();
        node.register(alice.commitment()).await.unwrap();

        let first = node.greet(&alice, b"hello", Some(b"event-1")).await.unwrap();
        let second = node.greet(&alice, b"bye", Some(b"event-1")).await.unwrap();
        assert_eq!(first.scope(), external_nullifier(b"event-1"));
        assert_eq!(first.nullifier_hash, second.nullifier_hash);

        assert_eq!(node.submit(&first).await.unwrap(), Verdict::Accepted);
        assert!(!node.submit(&second).await.unwrap().is_accepted());
    }

    #[tokio::test]
    async fn test_check_does_not_record() {
        let node = GreeterNode::in_memory(backend()).await.unwrap();
        let alice = Identity::random();
        node.register(alice.commitment()).await.unwrap();

        let signal = node.greet(&alice, b"hello", None).await.unwrap();
        assert_eq!(node.check(&signal).await, Verification::Valid);
        assert_eq!(node.check(&signal).await, Verification::Valid);
        assert_eq!(node.submit(&signal).await.unwrap(), Verdict::Accepted);
    }

    #[tokio::test]
    async fn test_missing_keys_without_setup() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_backend(dir.path(), 3, false).await,
            Err(GreeterError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_open_runs_local_setup_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GreeterConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config.tree.depth = 2;
        config.keys.setup_if_missing = true;

        let fingerprint = {
            let node = GreeterNode::open(&config).await.unwrap();
            assert_eq!(node.accumulator().depth().await, 2);
            greeter_crypto::keys::read_metadata(&config.keys_dir())
                .unwrap()
                .vk_hash
        };

        let node = GreeterNode::open(&config).await.unwrap();
        assert!(node.storage().is_some());
        assert_eq!(
            greeter_crypto::keys::read_metadata(&config.keys_dir())
                .unwrap()
                .vk_hash,
            fingerprint
        );
    }
}
