#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod board;
pub mod cancellation;
pub mod config;
pub mod membership;
pub mod node;
pub mod nullifier;
pub mod pipeline;
pub mod prover;
pub mod storage;

pub use board::{GreetingBoard, GreetingEvent, StartFrom, Subscription};
pub use cancellation::{CancelHandle, CancellationToken};
pub use config::{GreeterConfig, KeyStatus, KeysConfig, LogLevel, LoggingConfig, TreeConfig};
pub use membership::SharedAccumulator;
pub use node::{load_backend, GreeterNode, NodeStats};
pub use nullifier::{NullifierRegistry, ScopeGuard};
pub use pipeline::SubmissionPipeline;
pub use prover::{ProofService, ProverStats};
pub use storage::{
    CommitmentStore, GreeterStorage, NullifierRecord, NullifierStore, StorageConfig,
    StorageMetrics, StorageMetricsSnapshot,
};


#[cfg(test)]
pub(crate) mod test_support {
    use greeter_crypto::{Groth16Backend, Identity, MembershipAccumulator, ProvingBackend};
    use rand::{rngs::StdRng, SeedableRng};
    use std::sync::{Arc, OnceLock};

    pub(crate) const TEST_DEPTH: usize = 3;

    static BACKEND: OnceLock<Arc<Groth16Backend>> = OnceLock::new();

    /// One setup shared by every test in the crate.
    pub(crate) fn backend() -> Arc<dyn ProvingBackend> {
        BACKEND
            .get_or_init(|| {
                Arc::new(Groth16Backend::setup(TEST_DEPTH, &mut StdRng::seed_from_u64(7)).unwrap())
            })
            .clone()
    }

    pub(crate) fn populated_tree(members: &[Identity]) -> MembershipAccumulator {
        let mut tree = MembershipAccumulator::new(TEST_DEPTH).unwrap();
        for id in members {
            tree.register(id.commitment()).unwrap();
        }
        tree
    }
}
