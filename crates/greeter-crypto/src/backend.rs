//! Proving backend seam and the Groth16 backend behind it.

use crate::circuit::{public_inputs, SignalCircuit};
use crate::message::encode_message;
use crate::witness::Witness;
use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, ProvingKey, VerifyingKey};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use greeter_types::{
    GreeterError, GreeterResult, InvalidProofReason, PublicSignals, Signal, Verification,
};
use rand::{CryptoRng, RngCore};
use tracing::{debug, info};

/// Compressed BN254 Groth16 proof: A (G1), B (G2), C (G1).
pub const PROOF_SIZE: usize = 128;

/// What a proving backend must provide. Implementations are opaque to the
/// rest of the protocol.
pub trait ProvingBackend: Send + Sync {
    /// Tree depth the circuit was built for.
    fn depth(&self) -> usize;

    fn prove(&self, witness: &Witness) -> GreeterResult<GeneratedProof>;

    /// Never panics and never errors: anything malformed is a verdict.
    fn verify_detailed(&self, proof: &[u8], public_signals: &PublicSignals) -> Verification;

    fn verify(&self, proof: &[u8], public_signals: &PublicSignals) -> bool {
        self.verify_detailed(proof, public_signals).is_valid()
    }
}

#[derive(Clone, Debug)]
pub struct GeneratedProof {
    pub proof: Vec<u8>,
    pub public_signals: PublicSignals,
    pub message: Vec<u8>,
}

impl GeneratedProof {
    pub fn into_signal(self) -> Signal {
        Signal {
            message: self.message,
            nullifier_hash: self.public_signals.nullifier_hash,
            proof: self.proof,
            public_signals: self.public_signals,
        }
    }
}

/// Stateless checks on a whole signal, then the backend's proof check.
/// Root freshness is the caller's business.
pub fn verify_signal(backend: &dyn ProvingBackend, signal: &Signal) -> Verification {
    if signal.nullifier_hash != signal.public_signals.nullifier_hash {
        return Verification::Invalid(InvalidProofReason::NullifierMismatch);
    }
    match encode_message(&signal.message) {
        Ok(field) if field == signal.public_signals.message => {}
        _ => return Verification::Invalid(InvalidProofReason::MalformedPublicSignals),
    }
    backend.verify_detailed(&signal.proof, &signal.public_signals)
}

pub struct Groth16Backend {
    depth: usize,
    proving_key: Option<ProvingKey<Bn254>>,
    verifying_key: VerifyingKey<Bn254>,
    prepared_vk: PreparedVerifyingKey<Bn254>,
}

impl Groth16Backend {
    /// Circuit-specific setup. Slow for production depths.
    pub fn setup<R: RngCore + CryptoRng>(depth: usize, rng: &mut R) -> GreeterResult<Self> {
        info!("Running Groth16 setup for depth {}", depth);
        let (pk, vk) =
            Groth16::<Bn254>::circuit_specific_setup(SignalCircuit::blank(depth), rng)
                .map_err(|e| GreeterError::ProvingBackend(format!("setup failed: {}", e)))?;
        Self::with_keys(depth, Some(pk), vk)
    }

    pub fn from_proving_key_bytes(depth: usize, bytes: &[u8]) -> GreeterResult<Self> {
        let pk = ProvingKey::<Bn254>::deserialize_compressed(bytes)
            .map_err(|e| GreeterError::Serialization(format!("proving key: {}", e)))?;
        let vk = pk.vk.clone();
        Self::with_keys(depth, Some(pk), vk)
    }

    /// Verification-only backend.
    pub fn from_verifying_key_bytes(depth: usize, bytes: &[u8]) -> GreeterResult<Self> {
        let vk = VerifyingKey::<Bn254>::deserialize_compressed(bytes)
            .map_err(|e| GreeterError::Serialization(format!("verifying key: {}", e)))?;
        Self::with_keys(depth, None, vk)
    }

    fn with_keys(
        depth: usize,
        proving_key: Option<ProvingKey<Bn254>>,
        verifying_key: VerifyingKey<Bn254>,
    ) -> GreeterResult<Self> {
        if verifying_key.gamma_abc_g1.len() != crate::circuit::PUBLIC_INPUT_COUNT + 1 {
            return Err(GreeterError::ProvingBackend(format!(
                "verifying key expects {} public inputs",
                verifying_key.gamma_abc_g1.len().saturating_sub(1)
            )));
        }
        let prepared_vk = Groth16::<Bn254>::process_vk(&verifying_key)
            .map_err(|e| GreeterError::ProvingBackend(format!("verifying key: {}", e)))?;

        Ok(Self {
            depth,
            proving_key,
            verifying_key,
            prepared_vk,
        })
    }

    pub fn can_prove(&self) -> bool {
        self.proving_key.is_some()
    }

    pub fn proving_key_bytes(&self) -> GreeterResult<Vec<u8>> {
        let pk = self.proving_key.as_ref().ok_or_else(|| {
            GreeterError::ProvingBackend("backend holds no proving key".into())
        })?;
        let mut bytes = Vec::new();
        pk.serialize_compressed(&mut bytes)
            .map_err(|e| GreeterError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    pub fn verifying_key_bytes(&self) -> GreeterResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.verifying_key
            .serialize_compressed(&mut bytes)
            .map_err(|e| GreeterError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    /// BLAKE3 of the compressed verifying key, hex encoded.
    pub fn fingerprint(&self) -> GreeterResult<String> {
        Ok(vk_fingerprint(&self.verifying_key_bytes()?))
    }
}

pub fn vk_fingerprint(vk_bytes: &[u8]) -> String {
    hex::encode(blake3::hash(vk_bytes).as_bytes())
}

fn decode_proof(bytes: &[u8]) -> Option<Proof<Bn254>> {
    let mut reader = bytes;
    let proof = Proof::<Bn254>::deserialize_compressed(&mut reader).ok()?;
    // Trailing bytes make the encoding ambiguous.
    reader.is_empty().then_some(proof)
}

impl ProvingBackend for Groth16Backend {
    fn depth(&self) -> usize {
        self.depth
    }

    fn prove(&self, witness: &Witness) -> GreeterResult<GeneratedProof> {
        let pk = self.proving_key.as_ref().ok_or_else(|| {
            GreeterError::ProvingBackend("verification-only backend cannot prove".into())
        })?;
        if witness.depth() != self.depth {
            return Err(GreeterError::ProvingBackend(format!(
                "witness depth {} does not match circuit depth {}",
                witness.depth(),
                self.depth
            )));
        }

        let circuit = SignalCircuit::from_witness(witness)?;

        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit
            .clone()
            .generate_constraints(cs.clone())
            .map_err(|e| GreeterError::ProvingBackend(e.to_string()))?;
        let satisfied = cs
            .is_satisfied()
            .map_err(|e| GreeterError::ProvingBackend(e.to_string()))?;
        if !satisfied {
            return Err(GreeterError::ProvingBackend(
                "witness does not satisfy the signal circuit".into(),
            ));
        }

        let proof = Groth16::<Bn254>::prove(pk, circuit, &mut rand::thread_rng())
            .map_err(|e| GreeterError::ProvingBackend(format!("proving failed: {}", e)))?;

        let mut proof_bytes = Vec::with_capacity(PROOF_SIZE);
        proof
            .serialize_compressed(&mut proof_bytes)
            .map_err(|e| GreeterError::ProvingBackend(e.to_string()))?;

        let public_signals = PublicSignals {
            root: witness.public.root,
            nullifier_hash: witness.public.nullifier_hash,
            message: witness.public.message_field,
            external_nullifier: witness.public.external_nullifier,
        };

        if let Verification::Invalid(reason) = self.verify_detailed(&proof_bytes, &public_signals) {
            return Err(GreeterError::ProvingBackend(format!(
                "generated proof failed self-check: {}",
                reason
            )));
        }

        debug!(
            "Generated proof for nullifier {} ({} bytes)",
            public_signals.nullifier_hash.short(),
            proof_bytes.len()
        );

        Ok(GeneratedProof {
            proof: proof_bytes,
            public_signals,
            message: witness.public.message.clone(),
        })
    }

    fn verify_detailed(&self, proof: &[u8], public_signals: &PublicSignals) -> Verification {
        let Some(proof) = decode_proof(proof) else {
            return Verification::Invalid(InvalidProofReason::MalformedProof);
        };
        let Some(inputs) = public_inputs(public_signals) else {
            return Verification::Invalid(InvalidProofReason::MalformedPublicSignals);
        };

        match Groth16::<Bn254>::verify_with_processed_vk(&self.prepared_vk, &inputs, &proof) {
            Ok(true) => Verification::Valid,
            Ok(false) | Err(_) => Verification::Invalid(InvalidProofReason::PairingCheckFailed),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::accumulator::MembershipAccumulator;
    use crate::identity::{external_nullifier, Identity};
    use crate::witness::WitnessBuilder;
    use greeter_types::{MerkleRoot, NullifierHash};
    use rand::{rngs::StdRng, SeedableRng};
    use std::sync::OnceLock;

    pub(crate) const TEST_DEPTH: usize = 3;

    static BACKEND: OnceLock<Groth16Backend> = OnceLock::new();

    pub(crate) fn test_backend() -> &'static Groth16Backend {
        BACKEND.get_or_init(|| {
            Groth16Backend::setup(TEST_DEPTH, &mut StdRng::seed_from_u64(7)).unwrap()
        })
    }

    fn signal_from(member: usize, message: &[u8]) -> Signal {
        let members: Vec<Identity> = (0..5).map(|_| Identity::random()).collect();
        let mut acc = MembershipAccumulator::new(TEST_DEPTH).unwrap();
        for id in &members {
            acc.register(id.commitment()).unwrap();
        }
        let inclusion = acc.prove_inclusion(member as u64).unwrap();
        let witness = WitnessBuilder::new(&acc)
            .build(&members[member], &inclusion, message, &external_nullifier(message))
            .unwrap();

        test_backend().prove(&witness).unwrap().into_signal()
    }

    #[test]
    fn test_prove_and_verify() {
        let signal = signal_from(2, b"hello");
        assert_eq!(signal.proof.len(), PROOF_SIZE);
        assert_eq!(verify_signal(test_backend(), &signal), Verification::Valid);
        assert!(test_backend().verify(&signal.proof, &signal.public_signals));
    }

    #[test]
    fn test_truncated_proof_is_malformed() {
        let signal = signal_from(0, b"hello");
        let truncated = &signal.proof[..signal.proof.len() - 1];
        assert_eq!(
            test_backend().verify_detailed(truncated, &signal.public_signals),
            Verification::Invalid(InvalidProofReason::MalformedProof)
        );
        assert_eq!(
            test_backend().verify_detailed(&[], &signal.public_signals),
            Verification::Invalid(InvalidProofReason::MalformedProof)
        );
    }

    #[test]
    fn test_padded_proof_is_malformed() {
        let signal = signal_from(0, b"hello");
        let mut padded = signal.proof.clone();
        padded.push(0);
        assert_eq!(
            test_backend().verify_detailed(&padded, &signal.public_signals),
            Verification::Invalid(InvalidProofReason::MalformedProof)
        );
    }

    #[test]
    fn test_garbage_proof_does_not_panic() {
        let signal = signal_from(1, b"hello");
        for fill in [0x00u8, 0x5a, 0xff] {
            let verdict = test_backend().verify_detailed(&[fill; PROOF_SIZE], &signal.public_signals);
            assert!(!verdict.is_valid());
        }
    }

    #[test]
    fn test_swapped_public_signals_fail_pairing() {
        let signal = signal_from(3, b"hello");
        let mut swapped = signal.public_signals;
        swapped.root = MerkleRoot::from_bytes(*signal.public_signals.nullifier_hash.as_bytes());
        swapped.nullifier_hash = NullifierHash::from_bytes(*signal.public_signals.root.as_bytes());
        assert_eq!(
            test_backend().verify_detailed(&signal.proof, &swapped),
            Verification::Invalid(InvalidProofReason::PairingCheckFailed)
        );
    }

    #[test]
    fn test_non_canonical_public_signal() {
        let signal = signal_from(3, b"hello");
        let mut bad = signal.public_signals;
        bad.external_nullifier = greeter_types::ExternalNullifier::from_bytes([0xff; 32]);
        assert_eq!(
            test_backend().verify_detailed(&signal.proof, &bad),
            Verification::Invalid(InvalidProofReason::MalformedPublicSignals)
        );
    }

    #[test]
    fn test_nullifier_mismatch() {
        let mut signal = signal_from(4, b"hello");
        signal.nullifier_hash = Identity::random().nullifier_hash(&signal.scope());
        assert_eq!(
            verify_signal(test_backend(), &signal),
            Verification::Invalid(InvalidProofReason::NullifierMismatch)
        );
    }

    #[test]
    fn test_message_tampering_detected() {
        let mut signal = signal_from(4, b"hello");
        signal.message = b"goodbye".to_vec();
        assert_eq!(
            verify_signal(test_backend(), &signal),
            Verification::Invalid(InvalidProofReason::MalformedPublicSignals)
        );

        signal.public_signals.message = encode_message(b"goodbye").unwrap();
        assert_eq!(
            verify_signal(test_backend(), &signal),
            Verification::Invalid(InvalidProofReason::PairingCheckFailed)
        );
    }

    #[test]
    fn test_unsatisfied_witness_is_backend_error() {
        let members: Vec<Identity> = (0..2).map(|_| Identity::random()).collect();
        let mut acc = MembershipAccumulator::new(TEST_DEPTH).unwrap();
        for id in &members {
            acc.register(id.commitment()).unwrap();
        }
        let inclusion = acc.prove_inclusion(0).unwrap();
        let mut witness = WitnessBuilder::new(&acc)
            .build(&members[0], &inclusion, b"hi", &external_nullifier(b"hi"))
            .unwrap();
        witness.private.trapdoor = *members[1].trapdoor();

        assert!(matches!(
            test_backend().prove(&witness),
            Err(GreeterError::ProvingBackend(_))
        ));
    }

    #[test]
    fn test_verifier_only_backend() {
        let vk_bytes = test_backend().verifying_key_bytes().unwrap();
        let verifier = Groth16Backend::from_verifying_key_bytes(TEST_DEPTH, &vk_bytes).unwrap();
        assert!(!verifier.can_prove());
        assert_eq!(verifier.fingerprint().unwrap(), test_backend().fingerprint().unwrap());

        let signal = signal_from(2, b"hello");
        assert_eq!(verify_signal(&verifier, &signal), Verification::Valid);
    }
}
