//! Canonical Poseidon hash for the greeter protocol.
//!
//! Commitments, nullifier hashes and Merkle nodes all go through these
//! functions, natively and inside the signal circuit, so both sides agree
//! bit for bit.
//!
//! ## Parameters (BN254 scalar field)
//! - Width: 3 (rate=2, capacity=1)
//! - Full rounds: 8
//! - Partial rounds: 57
//! - S-box: x^5
//! - Round constants: Grain LFSR (arkworks standard)
//!
//! Every hash outputs the first squeezed element of the sponge.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    constraints::CryptographicSpongeVar,
    poseidon::{constraints::PoseidonSpongeVar, find_poseidon_ark_and_mds, PoseidonConfig, PoseidonSponge},
    CryptographicSponge,
};
use ark_ff::{BigInteger, PrimeField};
use ark_r1cs_std::fields::fp::FpVar;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};
use ark_serialize::CanonicalDeserialize;
use std::sync::OnceLock;

static CANONICAL_CONFIG: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();

pub fn canonical_config() -> &'static PoseidonConfig<Fr> {
    CANONICAL_CONFIG.get_or_init(|| {
        let rate = 2;
        let alpha = 5u64;
        let full_rounds = 8;
        let partial_rounds = 57;
        let field_bits = 254;

        let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
            field_bits,
            rate,
            full_rounds,
            partial_rounds,
            0, // skip_matrices
        );

        PoseidonConfig {
            full_rounds: full_rounds as usize,
            partial_rounds: partial_rounds as usize,
            alpha,
            ark,
            mds,
            rate,
            capacity: 1,
        }
    })
}

pub fn hash_fields(inputs: &[Fr]) -> Fr {
    let mut sponge = PoseidonSponge::new(canonical_config());
    for input in inputs {
        sponge.absorb(input);
    }
    let output: Vec<Fr> = sponge.squeeze_field_elements(1);
    output[0]
}

/// Merkle node and commitment hash.
pub fn hash2(left: Fr, right: Fr) -> Fr {
    hash_fields(&[left, right])
}

pub fn hash1(input: Fr) -> Fr {
    hash_fields(&[input])
}

/// In-circuit counterpart of [`hash_fields`].
pub fn hash_fields_var(
    cs: ConstraintSystemRef<Fr>,
    inputs: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut sponge = PoseidonSpongeVar::new(cs, canonical_config());
    sponge.absorb(&inputs)?;
    let output = sponge.squeeze_field_elements(1)?;
    Ok(output[0].clone())
}

/// Little-endian canonical encoding.
pub fn fr_to_bytes(f: &Fr) -> [u8; 32] {
    let bytes = f.into_bigint().to_bytes_le();
    let mut result = [0u8; 32];
    result.copy_from_slice(&bytes[..32]);
    result
}

/// Reduces arbitrary bytes into the field. Only for values we derive ourselves.
pub fn bytes_to_fr(bytes: &[u8; 32]) -> Fr {
    Fr::from_le_bytes_mod_order(bytes)
}

/// Strict decoding: `None` unless `bytes` is the canonical encoding of a field element.
pub fn canonical_fr(bytes: &[u8; 32]) -> Option<Fr> {
    Fr::deserialize_compressed(&bytes[..]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_r1cs_std::{alloc::AllocVar, R1CSVar};
    use ark_relations::r1cs::ConstraintSystem;

    #[test]
    fn test_hash_deterministic() {
        let a = Fr::from(12345u64);
        let b = Fr::from(67890u64);

        assert_eq!(hash2(a, b), hash2(a, b));
        assert_ne!(hash2(a, b), hash2(b, a));
    }

    #[test]
    fn test_native_matches_gadget() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let a = Fr::from(7u64);
        let b = Fr::from(11u64);

        let a_var = FpVar::new_witness(cs.clone(), || Ok(a)).unwrap();
        let b_var = FpVar::new_witness(cs.clone(), || Ok(b)).unwrap();
        let out = hash_fields_var(cs.clone(), &[a_var, b_var]).unwrap();

        assert_eq!(out.value().unwrap(), hash2(a, b));
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn test_field_roundtrip() {
        let original = Fr::from(0xdeadbeefu64);
        let bytes = fr_to_bytes(&original);
        assert_eq!(bytes_to_fr(&bytes), original);
        assert_eq!(canonical_fr(&bytes), Some(original));
    }

    #[test]
    fn test_non_canonical_rejected() {
        // 0xff..ff exceeds the BN254 scalar modulus.
        assert!(canonical_fr(&[0xff; 32]).is_none());
    }
}
