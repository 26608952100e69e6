#![forbid(unsafe_code)]
#![warn(clippy::all)]

mod error;
mod field;
mod signal;

pub use error::{ErrorClass, GreeterError, GreeterResult};
pub use field::{Commitment, ExternalNullifier, MerkleRoot, MessageField, NullifierHash};
pub use signal::{
    Admission, InvalidProofReason, PublicSignals, Rejection, Signal, Verdict, Verification,
};

pub const FIELD_ELEMENT_SIZE: usize = 32;

/// Depth of the membership tree in the reference deployment (2^20 members).
pub const DEFAULT_TREE_DEPTH: usize = 20;

pub const MAX_TREE_DEPTH: usize = 32;

/// Bytes of message that fit a BN254 scalar without reduction.
pub const MESSAGE_CAPACITY: usize = 31;

pub const MIN_SEED_LEN: usize = 32;

pub const MAX_SEED_LEN: usize = 1024;

/// Recent roots a verifier keeps accepting after further registrations.
pub const DEFAULT_ROOT_HISTORY: usize = 256;
