//! Signal circuit.
//!
//! Proves, without revealing which leaf:
//! - `H(nullifier_secret, trapdoor)` sits in the tree with root `root`
//! - `nullifier_hash = H(nullifier_secret, external_nullifier)`
//! - the proof is bound to `message`
//!
//! Public inputs, in allocation order: root, nullifier hash, message,
//! external nullifier.

use crate::accumulator::SiblingSide;
use crate::poseidon::{canonical_fr, hash2, hash_fields_var};
use crate::witness::Witness;
use ark_bn254::Fr;
use ark_ff::{Field, One};
use ark_r1cs_std::{
    alloc::AllocVar, boolean::Boolean, eq::EqGadget, fields::fp::FpVar, fields::FieldVar,
    select::CondSelectGadget,
};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use greeter_types::{GreeterError, GreeterResult, PublicSignals};

pub const PUBLIC_INPUT_COUNT: usize = 4;

#[derive(Clone)]
pub struct SignalCircuit {
    trapdoor: Option<Fr>,
    nullifier_secret: Option<Fr>,
    leaf_index: Option<Fr>,
    siblings: Vec<Option<Fr>>,
    /// `true` when the path node is a right child.
    path_bits: Vec<Option<bool>>,
    root: Option<Fr>,
    nullifier_hash: Option<Fr>,
    message: Option<Fr>,
    external_nullifier: Option<Fr>,
}

impl SignalCircuit {
    /// Shape-only circuit for key generation.
    pub fn blank(depth: usize) -> Self {
        Self {
            trapdoor: None,
            nullifier_secret: None,
            leaf_index: None,
            siblings: vec![None; depth],
            path_bits: vec![None; depth],
            root: None,
            nullifier_hash: None,
            message: None,
            external_nullifier: None,
        }
    }

    pub fn from_witness(witness: &Witness) -> GreeterResult<Self> {
        let private = &witness.private;
        let public = &witness.public;

        if private.siblings.len() != private.sides.len() {
            return Err(GreeterError::ProvingBackend(format!(
                "witness has {} siblings but {} sides",
                private.siblings.len(),
                private.sides.len()
            )));
        }

        let strict = |bytes: &[u8; 32], what: &str| {
            canonical_fr(bytes).ok_or_else(|| {
                GreeterError::ProvingBackend(format!("{} is not a canonical field element", what))
            })
        };

        let nullifier_secret = strict(&private.nullifier_secret, "nullifier secret")?;
        let external_nullifier = strict(public.external_nullifier.as_bytes(), "external nullifier")?;

        let siblings = private
            .siblings
            .iter()
            .map(|sibling| strict(sibling, "path sibling").map(Some))
            .collect::<GreeterResult<Vec<_>>>()?;

        Ok(Self {
            trapdoor: Some(strict(&private.trapdoor, "trapdoor")?),
            nullifier_secret: Some(nullifier_secret),
            leaf_index: Some(Fr::from(private.leaf_index)),
            siblings,
            path_bits: private
                .sides
                .iter()
                .map(|side| Some(*side == SiblingSide::Left))
                .collect(),
            root: Some(strict(public.root.as_bytes(), "root")?),
            nullifier_hash: Some(hash2(nullifier_secret, external_nullifier)),
            message: Some(strict(public.message_field.as_bytes(), "message")?),
            external_nullifier: Some(external_nullifier),
        })
    }

    pub fn depth(&self) -> usize {
        self.siblings.len()
    }
}

/// Public input vector in circuit order. `None` on any non-canonical field.
pub fn public_inputs(signals: &PublicSignals) -> Option<Vec<Fr>> {
    Some(vec![
        canonical_fr(signals.root.as_bytes())?,
        canonical_fr(signals.nullifier_hash.as_bytes())?,
        canonical_fr(signals.message.as_bytes())?,
        canonical_fr(signals.external_nullifier.as_bytes())?,
    ])
}

impl ConstraintSynthesizer<Fr> for SignalCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let trapdoor = FpVar::new_witness(cs.clone(), || {
            self.trapdoor.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let nullifier_secret = FpVar::new_witness(cs.clone(), || {
            self.nullifier_secret.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let leaf_index = FpVar::new_witness(cs.clone(), || {
            self.leaf_index.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let mut siblings = Vec::with_capacity(self.siblings.len());
        for sibling in &self.siblings {
            siblings.push(FpVar::new_witness(cs.clone(), || {
                sibling.ok_or(SynthesisError::AssignmentMissing)
            })?);
        }

        let mut path_bits = Vec::with_capacity(self.path_bits.len());
        for bit in &self.path_bits {
            path_bits.push(Boolean::new_witness(cs.clone(), || {
                bit.ok_or(SynthesisError::AssignmentMissing)
            })?);
        }

        let root = FpVar::new_input(cs.clone(), || {
            self.root.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let nullifier_hash = FpVar::new_input(cs.clone(), || {
            self.nullifier_hash.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let message = FpVar::new_input(cs.clone(), || {
            self.message.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let external_nullifier = FpVar::new_input(cs.clone(), || {
            self.external_nullifier.ok_or(SynthesisError::AssignmentMissing)
        })?;

        // Path bits are the little-endian binary expansion of the leaf index.
        let mut recomposed = FpVar::<Fr>::zero();
        let mut weight = Fr::one();
        for bit in &path_bits {
            recomposed += FpVar::from(bit.clone()) * weight;
            weight.double_in_place();
        }
        recomposed.enforce_equal(&leaf_index)?;

        let commitment =
            hash_fields_var(cs.clone(), &[nullifier_secret.clone(), trapdoor])?;

        let mut current = commitment;
        for (sibling, is_right) in siblings.iter().zip(path_bits.iter()) {
            let left = FpVar::conditionally_select(is_right, sibling, &current)?;
            let right = FpVar::conditionally_select(is_right, &current, sibling)?;
            current = hash_fields_var(cs.clone(), &[left, right])?;
        }
        current.enforce_equal(&root)?;

        let computed_nullifier =
            hash_fields_var(cs.clone(), &[nullifier_secret, external_nullifier])?;
        computed_nullifier.enforce_equal(&nullifier_hash)?;

        // A constraint touching the message keeps it bound to the proof.
        let _message_square = message.square()?;

        Ok(())
    }
}
