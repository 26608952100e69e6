//! Witness assembly for the signal circuit.

use crate::accumulator::{InclusionProof, MembershipAccumulator, SiblingSide};
use crate::identity::Identity;
use crate::message::encode_message;
use crate::poseidon::canonical_fr;
use greeter_types::{
    ExternalNullifier, GreeterError, GreeterResult, MerkleRoot, MessageField, NullifierHash,
};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Inputs only the prover sees. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateInputs {
    pub trapdoor: [u8; 32],
    pub nullifier_secret: [u8; 32],
    pub leaf_index: u64,
    /// Leaf level first.
    pub siblings: Vec<[u8; 32]>,
    pub sides: Vec<SiblingSide>,
}

impl fmt::Debug for PrivateInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateInputs")
            .field("depth", &self.siblings.len())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicInputs {
    pub root: MerkleRoot,
    pub message: Vec<u8>,
    pub message_field: MessageField,
    pub external_nullifier: ExternalNullifier,
    pub nullifier_hash: NullifierHash,
}

#[derive(Clone, Debug)]
pub struct Witness {
    pub private: PrivateInputs,
    pub public: PublicInputs,
}

impl Witness {
    pub fn depth(&self) -> usize {
        self.private.siblings.len()
    }
}

/// Builds witnesses against the accumulator's current root.
pub struct WitnessBuilder<'a> {
    accumulator: &'a MembershipAccumulator,
}

impl<'a> WitnessBuilder<'a> {
    pub fn new(accumulator: &'a MembershipAccumulator) -> Self {
        Self { accumulator }
    }

    pub fn build(
        &self,
        identity: &Identity,
        inclusion_proof: &InclusionProof,
        message: &[u8],
        external_nullifier: &ExternalNullifier,
    ) -> GreeterResult<Witness> {
        build_witness(
            &self.accumulator.current_root(),
            self.accumulator.depth(),
            identity,
            inclusion_proof,
            message,
            external_nullifier,
        )
    }
}

/// Same as [`WitnessBuilder::build`] for callers holding only a root, such as
/// a client working from a commitment snapshot.
pub fn build_witness(
    current_root: &MerkleRoot,
    depth: usize,
    identity: &Identity,
    inclusion_proof: &InclusionProof,
    message: &[u8],
    external_nullifier: &ExternalNullifier,
) -> GreeterResult<Witness> {
    if inclusion_proof.root != *current_root {
        return Err(GreeterError::ProofRootMismatch {
            proof_root: inclusion_proof.root.to_hex(),
            current_root: current_root.to_hex(),
        });
    }
    if inclusion_proof.depth() != depth {
        return Err(GreeterError::InvalidInclusionProof(format!(
            "path has {} levels, tree has {}",
            inclusion_proof.depth(),
            depth
        )));
    }
    if inclusion_proof.leaf != identity.commitment() {
        return Err(GreeterError::InvalidInclusionProof(
            "leaf is not this identity's commitment".into(),
        ));
    }
    if !inclusion_proof.verify() {
        return Err(GreeterError::InvalidInclusionProof(
            "path does not hash to the claimed root".into(),
        ));
    }
    if canonical_fr(external_nullifier.as_bytes()).is_none() {
        return Err(GreeterError::Serialization(
            "external nullifier is not a canonical field element".into(),
        ));
    }
    let message_field = encode_message(message)?;

    let private = PrivateInputs {
        trapdoor: *identity.trapdoor(),
        nullifier_secret: *identity.nullifier_secret(),
        leaf_index: inclusion_proof.leaf_index,
        siblings: inclusion_proof.path.iter().map(|node| node.sibling).collect(),
        sides: inclusion_proof.path.iter().map(|node| node.side).collect(),
    };
    let public = PublicInputs {
        root: inclusion_proof.root,
        message: message.to_vec(),
        message_field,
        external_nullifier: *external_nullifier,
        nullifier_hash: identity.nullifier_hash(external_nullifier),
    };

    Ok(Witness { private, public })
}
