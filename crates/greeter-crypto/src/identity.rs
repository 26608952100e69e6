//! Member identities.
//!
//! An identity is a pair of field elements. Its commitment is
//! `Poseidon(nullifier_secret, trapdoor)` and its nullifier hash in a scope is
//! `Poseidon(nullifier_secret, external_nullifier)`. Seeds map to identities
//! through domain-separated BLAKE3 key derivation, so a member holding the
//! same seed (say, a wallet signature over a fixed challenge) always recovers
//! the same identity.

use crate::poseidon::{bytes_to_fr, canonical_fr, fr_to_bytes, hash2};
use ark_bn254::Fr;
use ark_ff::PrimeField;
use greeter_types::{
    Commitment, ExternalNullifier, GreeterError, GreeterResult, NullifierHash, MAX_SEED_LEN,
    MIN_SEED_LEN,
};
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

const TRAPDOOR_CONTEXT: &str = "greeter 2024-01-15 identity trapdoor v1";
const NULLIFIER_CONTEXT: &str = "greeter 2024-01-15 identity nullifier secret v1";
const SCOPE_CONTEXT: &str = "greeter 2024-01-15 external nullifier v1";

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Identity {
    trapdoor: [u8; 32],
    nullifier_secret: [u8; 32],
}

impl Identity {
    pub fn from_seed(seed: &[u8]) -> GreeterResult<Self> {
        if seed.len() < MIN_SEED_LEN || seed.len() > MAX_SEED_LEN {
            return Err(GreeterError::InvalidSeed(format!(
                "seed must be {}..={} bytes, got {}",
                MIN_SEED_LEN,
                MAX_SEED_LEN,
                seed.len()
            )));
        }
        Ok(Self::derive(seed))
    }

    /// Fresh identity from the OS RNG.
    pub fn random() -> Self {
        let mut seed = [0u8; 64];
        rand::thread_rng().fill_bytes(&mut seed);
        let identity = Self::derive(&seed);
        seed.zeroize();
        identity
    }

    /// Both secrets must already be canonical field encodings.
    pub fn from_secrets(trapdoor: [u8; 32], nullifier_secret: [u8; 32]) -> GreeterResult<Self> {
        if canonical_fr(&trapdoor).is_none() {
            return Err(GreeterError::InvalidSeed(
                "trapdoor is not a canonical field element".into(),
            ));
        }
        if canonical_fr(&nullifier_secret).is_none() {
            return Err(GreeterError::InvalidSeed(
                "nullifier secret is not a canonical field element".into(),
            ));
        }
        Ok(Self {
            trapdoor,
            nullifier_secret,
        })
    }

    fn derive(seed: &[u8]) -> Self {
        let mut trapdoor_key = blake3::derive_key(TRAPDOOR_CONTEXT, seed);
        let mut nullifier_key = blake3::derive_key(NULLIFIER_CONTEXT, seed);

        let identity = Self {
            trapdoor: fr_to_bytes(&Fr::from_le_bytes_mod_order(&trapdoor_key)),
            nullifier_secret: fr_to_bytes(&Fr::from_le_bytes_mod_order(&nullifier_key)),
        };

        trapdoor_key.zeroize();
        nullifier_key.zeroize();
        identity
    }

    pub fn trapdoor(&self) -> &[u8; 32] {
        &self.trapdoor
    }

    pub fn nullifier_secret(&self) -> &[u8; 32] {
        &self.nullifier_secret
    }

    pub(crate) fn trapdoor_fr(&self) -> Fr {
        bytes_to_fr(&self.trapdoor)
    }

    pub(crate) fn nullifier_secret_fr(&self) -> Fr {
        bytes_to_fr(&self.nullifier_secret)
    }

    pub fn commitment(&self) -> Commitment {
        Commitment::from_bytes(fr_to_bytes(&hash2(
            self.nullifier_secret_fr(),
            self.trapdoor_fr(),
        )))
    }

    pub fn nullifier_hash(&self, external_nullifier: &ExternalNullifier) -> NullifierHash {
        NullifierHash::from_bytes(fr_to_bytes(&hash2(
            self.nullifier_secret_fr(),
            bytes_to_fr(external_nullifier.as_bytes()),
        )))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("commitment", &self.commitment())
            .field("trapdoor", &"[REDACTED]")
            .field("nullifier_secret", &"[REDACTED]")
            .finish()
    }
}

pub fn create_identity(seed: &[u8]) -> GreeterResult<Identity> {
    Identity::from_seed(seed)
}

pub fn commitment_of(identity: &Identity) -> Commitment {
    identity.commitment()
}

pub fn nullifier_hash(identity: &Identity, external_nullifier: &ExternalNullifier) -> NullifierHash {
    identity.nullifier_hash(external_nullifier)
}

/// Maps a topic (a message, a poll id, an epoch label) to its scope.
pub fn external_nullifier(topic: &[u8]) -> ExternalNullifier {
    let key = blake3::derive_key(SCOPE_CONTEXT, topic);
    ExternalNullifier::from_bytes(fr_to_bytes(&Fr::from_le_bytes_mod_order(&key)))
}
