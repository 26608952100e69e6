#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod accumulator;
pub mod backend;
pub mod circuit;
pub mod identity;
pub mod keys;
pub mod message;
pub mod poseidon;
pub mod witness;

pub use accumulator::{
    rebuild_root, CommitmentSnapshot, InclusionProof, MembershipAccumulator, PathNode,
    SiblingSide,
};
pub use backend::{
    verify_signal, vk_fingerprint, GeneratedProof, Groth16Backend, ProvingBackend, PROOF_SIZE,
};
pub use circuit::SignalCircuit;
pub use identity::{
    commitment_of, create_identity, external_nullifier, nullifier_hash, Identity,
};
pub use keys::{load_prover, load_verifier, read_metadata, write_keys, KeyMetadata, KeyPaths};
pub use message::{decode_message, encode_message};
pub use witness::{build_witness, PrivateInputs, PublicInputs, Witness, WitnessBuilder};
