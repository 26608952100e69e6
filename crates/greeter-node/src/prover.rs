//! Proof generation and verification service.
//!
//! Generation runs on the blocking pool, one task per request, with no shared
//! state between requests. Abandoning a request discards its result.

use crate::cancellation::CancellationToken;
use greeter_crypto::{verify_signal, GeneratedProof, ProvingBackend, Witness};
use greeter_types::{GreeterError, GreeterResult, PublicSignals, Signal, Verification};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProverStats {
    pub generated: u64,
    pub cancelled: u64,
    pub failed: u64,
    pub verified_valid: u64,
    pub verified_invalid: u64,
}

#[derive(Default)]
struct Counters {
    generated: AtomicU64,
    cancelled: AtomicU64,
    failed: AtomicU64,
    verified_valid: AtomicU64,
    verified_invalid: AtomicU64,
}

pub struct ProofService {
    backend: Arc<dyn ProvingBackend>,
    counters: Counters,
}

impl ProofService {
    pub fn new(backend: Arc<dyn ProvingBackend>) -> Self {
        Self {
            backend,
            counters: Counters::default(),
        }
    }

    pub fn depth(&self) -> usize {
        self.backend.depth()
    }

    pub async fn generate(&self, witness: Witness) -> GreeterResult<GeneratedProof> {
        let backend = Arc::clone(&self.backend);
        let started = Instant::now();

        let result = tokio::task::spawn_blocking(move || backend.prove(&witness))
            .await
            .map_err(|e| GreeterError::ProvingBackend(format!("prover task failed: {}", e)))
            .and_then(|r| r);

        self.finish(result, started)
    }

    /// Like [`generate`](Self::generate), but gives up as soon as `cancel` fires.
    pub async fn generate_cancellable(
        &self,
        witness: Witness,
        mut cancel: CancellationToken,
    ) -> GreeterResult<GeneratedProof> {
        if cancel.is_cancelled() {
            self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            return Err(GreeterError::Cancelled);
        }

        let backend = Arc::clone(&self.backend);
        let started = Instant::now();
        let task = tokio::task::spawn_blocking(move || backend.prove(&witness));

        tokio::select! {
            joined = task => {
                let result = joined
                    .map_err(|e| GreeterError::ProvingBackend(format!("prover task failed: {}", e)))
                    .and_then(|r| r);
                self.finish(result, started)
            }
            _ = cancel.cancelled() => {
                self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!("Proof generation cancelled after {:?}", started.elapsed());
                Err(GreeterError::Cancelled)
            }
        }
    }

    fn finish(
        &self,
        result: GreeterResult<GeneratedProof>,
        started: Instant,
    ) -> GreeterResult<GeneratedProof> {
        match &result {
            Ok(_) => {
                self.counters.generated.fetch_add(1, Ordering::Relaxed);
                debug!("Proof generated in {:?}", started.elapsed());
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Proof generation failed: {}", e);
            }
        }
        result
    }

    pub fn verify(&self, proof: &[u8], public_signals: &PublicSignals) -> bool {
        self.verify_detailed(proof, public_signals).is_valid()
    }

    pub fn verify_detailed(&self, proof: &[u8], public_signals: &PublicSignals) -> Verification {
        self.count(self.backend.verify_detailed(proof, public_signals))
    }

    /// Checks the signal envelope as well as the proof.
    pub fn verify_signal(&self, signal: &Signal) -> Verification {
        self.count(verify_signal(self.backend.as_ref(), signal))
    }

    fn count(&self, verification: Verification) -> Verification {
        if verification.is_valid() {
            self.counters.verified_valid.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.verified_invalid.fetch_add(1, Ordering::Relaxed);
        }
        verification
    }

    pub fn stats(&self) -> ProverStats {
        ProverStats {
            generated: self.counters.generated.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            verified_valid: self.counters.verified_valid.load(Ordering::Relaxed),
            verified_invalid: self.counters.verified_invalid.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{backend, populated_tree};
    use greeter_crypto::{external_nullifier, Identity, WitnessBuilder};
    use greeter_types::InvalidProofReason;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    /// Never finishes until released, so cancellation can be observed.
    struct StallingBackend {
        release: Arc<AtomicBool>,
    }

    impl ProvingBackend for StallingBackend {
        fn depth(&self) -> usize {
            3
        }

        fn prove(&self, _witness: &Witness) -> GreeterResult<GeneratedProof> {
            while !self.release.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(GreeterError::ProvingBackend("released".into()))
        }

        fn verify_detailed(&self, _proof: &[u8], _signals: &PublicSignals) -> Verification {
            Verification::Invalid(InvalidProofReason::PairingCheckFailed)
        }
    }

    fn witness(members: &[Identity], index: usize) -> Witness {
        let tree = populated_tree(members);
        let proof = tree.prove_inclusion(index as u64).unwrap();
        WitnessBuilder::new(&tree)
            .build(&members[index], &proof, b"hello", &external_nullifier(b"hello"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_generate_and_verify() {
        let service = ProofService::new(backend());
        let members: Vec<Identity> = (0..5).map(|_| Identity::random()).collect();

        let generated = service.generate(witness(&members, 2)).await.unwrap();
        assert!(service.verify(&generated.proof, &generated.public_signals));

        let signal = generated.into_signal();
        assert_eq!(service.verify_signal(&signal), Verification::Valid);
        assert_eq!(service.stats().generated, 1);
        assert_eq!(service.stats().verified_valid, 2);
    }

    #[tokio::test]
    async fn test_parallel_generation() {
        let service = Arc::new(ProofService::new(backend()));
        let members: Vec<Identity> = (0..5).map(|_| Identity::random()).collect();

        let tasks: Vec<_> = (0..3)
            .map(|i| {
                let service = Arc::clone(&service);
                let w = witness(&members, i);
                tokio::spawn(async move { service.generate(w).await })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            assert!(task.unwrap().is_ok());
        }
        assert_eq!(service.stats().generated, 3);
    }

    #[tokio::test]
    async fn test_cancel_in_flight_generation() {
        let release = Arc::new(AtomicBool::new(false));
        let service = ProofService::new(Arc::new(StallingBackend {
            release: Arc::clone(&release),
        }));
        let members: Vec<Identity> = (0..2).map(|_| Identity::random()).collect();
        let (handle, token) = CancellationToken::new();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
            handle
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            service.generate_cancellable(witness(&members, 0), token),
        )
        .await
        .unwrap();

        assert!(matches!(result, Err(GreeterError::Cancelled)));
        assert_eq!(service.stats().cancelled, 1);
        assert_eq!(service.stats().generated, 0);

        release.store(true, Ordering::Relaxed);
        drop(canceller.await.unwrap());
    }

    #[tokio::test]
    async fn test_already_cancelled_never_starts() {
        let service = ProofService::new(backend());
        let members: Vec<Identity> = (0..2).map(|_| Identity::random()).collect();
        let (handle, token) = CancellationToken::new();
        handle.cancel();

        assert!(matches!(
            service.generate_cancellable(witness(&members, 1), token).await,
            Err(GreeterError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_backend_failure_surfaces() {
        let service = ProofService::new(backend());
        let members: Vec<Identity> = (0..2).map(|_| Identity::random()).collect();
        let mut w = witness(&members, 0);
        w.private.nullifier_secret = *members[1].nullifier_secret();

        assert!(matches!(
            service.generate(w).await,
            Err(GreeterError::ProvingBackend(_))
        ));
        assert_eq!(service.stats().failed, 1);
    }
}
