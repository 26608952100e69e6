//! Signal admission: verify, then record, under the scope's lock.

use crate::board::GreetingBoard;
use crate::membership::SharedAccumulator;
use crate::nullifier::NullifierRegistry;
use crate::prover::ProofService;
use crate::storage::NullifierRecord;
use greeter_types::{
    Admission, GreeterResult, InvalidProofReason, Rejection, Signal, Verdict, Verification,
};
use std::sync::Arc;
use tracing::{info, warn};

pub struct SubmissionPipeline {
    accumulator: Arc<SharedAccumulator>,
    registry: Arc<NullifierRegistry>,
    prover: Arc<ProofService>,
    board: GreetingBoard,
}

impl SubmissionPipeline {
    pub fn new(
        accumulator: Arc<SharedAccumulator>,
        registry: Arc<NullifierRegistry>,
        prover: Arc<ProofService>,
        board: GreetingBoard,
    ) -> Self {
        Self {
            accumulator,
            registry,
            prover,
            board,
        }
    }

    /// Admits `signal` at most once per scope.
    ///
    /// Invalid signals are rejected with their reason and leave no trace in
    /// the registry. `Err` is reserved for infrastructure failures.
    pub async fn submit(&self, signal: &Signal) -> GreeterResult<Verdict> {
        let scope = signal.scope();
        let mut guard = self.registry.lock_scope(&scope).await;

        if !self
            .accumulator
            .is_known_root(&signal.public_signals.root)
            .await
        {
            return Ok(self.reject_invalid(signal, InvalidProofReason::UnknownRoot));
        }

        if let Verification::Invalid(reason) = self.prover.verify_signal(signal) {
            return Ok(self.reject_invalid(signal, reason));
        }

        let record = NullifierRecord {
            scope,
            nullifier_hash: signal.nullifier_hash,
            message: signal.message.clone(),
            root: signal.public_signals.root,
            accepted_at: chrono::Utc::now().timestamp_millis(),
        };

        match guard.record(record.clone())? {
            Admission::Accepted => {
                let event = self.board.publish(&record);
                info!(
                    "Greeting #{} accepted in scope {}: {:?}",
                    event.sequence,
                    scope.short(),
                    signal.message_lossy()
                );
                Ok(Verdict::Accepted)
            }
            Admission::AlreadyUsed => {
                warn!(
                    "Rejected repeat signal {} in scope {}",
                    signal.nullifier_hash.short(),
                    scope.short()
                );
                Ok(Verdict::Rejected(Rejection::AlreadyUsed))
            }
        }
    }

    fn reject_invalid(&self, signal: &Signal, reason: InvalidProofReason) -> Verdict {
        warn!(
            "Rejected signal {}: {}",
            signal.nullifier_hash.short(),
            reason
        );
        Verdict::Rejected(Rejection::InvalidProof(reason))
    }

    pub fn board(&self) -> &GreetingBoard {
        &self.board
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{backend, populated_tree};
    use greeter_crypto::{external_nullifier, Identity, WitnessBuilder};
    use greeter_types::{MerkleRoot, NullifierHash};

    struct Fixture {
        members: Vec<Identity>,
        accumulator: Arc<SharedAccumulator>,
        registry: Arc<NullifierRegistry>,
        prover: Arc<ProofService>,
        pipeline: Arc<SubmissionPipeline>,
    }

    fn fixture(size: usize) -> Fixture {
        let members: Vec<Identity> = (0..size).map(|_| Identity::random()).collect();
        let accumulator = Arc::new(SharedAccumulator::new(populated_tree(&members)));
        let registry = Arc::new(NullifierRegistry::new());
        let prover = Arc::new(ProofService::new(backend()));
        let pipeline = Arc::new(SubmissionPipeline::new(
            Arc::clone(&accumulator),
            Arc::clone(&registry),
            Arc::clone(&prover),
            GreetingBoard::new(),
        ));
        Fixture {
            members,
            accumulator,
            registry,
            prover,
            pipeline,
        }
    }

    async fn signal(f: &Fixture, member: usize, message: &[u8]) -> Signal {
        let witness = f
            .accumulator
            .witness_for(&f.members[member], message, &external_nullifier(message))
            .await
            .unwrap();
        f.prover.generate(witness).await.unwrap().into_signal()
    }

    #[tokio::test]
    async fn test_accept_then_repeat() {
        let f = fixture(5);
        let s = signal(&f, 2, b"hello").await;

        assert_eq!(f.pipeline.submit(&s).await.unwrap(), Verdict::Accepted);
        assert_eq!(
            f.pipeline.submit(&s).await.unwrap(),
            Verdict::Rejected(Rejection::AlreadyUsed)
        );

        let events = f.pipeline.board().events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, b"hello");
        assert_eq!(events[0].nullifier_hash, s.nullifier_hash);
    }

    #[tokio::test]
    async fn test_invalid_proof_never_records() {
        let f = fixture(3);
        let mut s = signal(&f, 0, b"hello").await;
        s.proof[10] ^= 0x40;

        let verdict = f.pipeline.submit(&s).await.unwrap();
        assert!(matches!(
            verdict,
            Verdict::Rejected(Rejection::InvalidProof(_))
        ));
        assert!(!f.registry.is_seen(&s.scope(), &s.nullifier_hash).await);
        assert!(f.pipeline.board().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_root_rejected() {
        let f = fixture(3);
        let mut s = signal(&f, 1, b"hello").await;
        s.public_signals.root = MerkleRoot::from_bytes([3; 32]);

        assert_eq!(
            f.pipeline.submit(&s).await.unwrap(),
            Verdict::Rejected(Rejection::InvalidProof(InvalidProofReason::UnknownRoot))
        );
    }

    #[tokio::test]
    async fn test_rejected_signals_leave_no_scopes() {
        let f = fixture(3);
        let valid = signal(&f, 0, b"hello").await;
        assert_eq!(f.pipeline.submit(&valid).await.unwrap(), Verdict::Accepted);

        for i in 0..64u8 {
            let mut s = valid.clone();
            s.public_signals.root = MerkleRoot::from_bytes([i; 32]);
            s.public_signals.external_nullifier = external_nullifier(&[i, 0xff]);
            assert!(!f.pipeline.submit(&s).await.unwrap().is_accepted());
        }

        let mut tampered = signal(&f, 1, b"bye").await;
        tampered.proof[10] ^= 0x40;
        assert!(!f.pipeline.submit(&tampered).await.unwrap().is_accepted());

        assert_eq!(f.registry.scope_count(), 1);
        assert_eq!(f.registry.accepted(), 1);
    }

    #[tokio::test]
    async fn test_nullifier_mismatch_rejected() {
        let f = fixture(3);
        let mut s = signal(&f, 1, b"hello").await;
        s.nullifier_hash = NullifierHash::from_bytes([4; 32]);

        assert_eq!(
            f.pipeline.submit(&s).await.unwrap(),
            Verdict::Rejected(Rejection::InvalidProof(
                InvalidProofReason::NullifierMismatch
            ))
        );
    }

    #[tokio::test]
    async fn test_older_root_still_accepted() {
        let f = fixture(3);
        let s = signal(&f, 1, b"hello").await;

        f.accumulator
            .register(Identity::random().commitment())
            .await
            .unwrap();
        assert_ne!(f.accumulator.current_root().await, s.public_signals.root);

        assert_eq!(f.pipeline.submit(&s).await.unwrap(), Verdict::Accepted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_double_submission() {
        let f = fixture(4);
        let s = Arc::new(signal(&f, 3, b"race").await);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let pipeline = Arc::clone(&f.pipeline);
                let s = Arc::clone(&s);
                tokio::spawn(async move { pipeline.submit(&s).await })
            })
            .collect();

        let verdicts: Vec<Verdict> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(verdicts.iter().filter(|v| v.is_accepted()).count(), 1);
        assert!(verdicts
            .iter()
            .filter(|v| !v.is_accepted())
            .all(|v| *v == Verdict::Rejected(Rejection::AlreadyUsed)));
    }

    #[tokio::test]
    async fn test_witness_from_caller_held_proof() {
        let f = fixture(3);
        let tree = populated_tree(&f.members);
        let proof = tree.prove_inclusion(0).unwrap();
        let witness = WitnessBuilder::new(&tree)
            .build(&f.members[0], &proof, b"hey", &external_nullifier(b"hey"))
            .unwrap();
        let s = f.prover.generate(witness).await.unwrap().into_signal();

        assert_eq!(f.pipeline.submit(&s).await.unwrap(), Verdict::Accepted);
    }
}
