use thiserror::Error;

/// Coarse grouping of failures, used by callers to decide on recovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller mistakes. Surfaced immediately, never retried.
    Input,
    /// The accumulator moved underneath the caller. Re-fetch and rebuild.
    Staleness,
    /// Registration-time rejection, fatal to that attempt.
    Capacity,
    /// Proving or verification failure. Always fails closed.
    Cryptographic,
    /// Storage, configuration and other plumbing faults.
    Infrastructure,
}

#[derive(Error, Debug)]
pub enum GreeterError {
    #[error("Invalid identity seed: {0}")]
    InvalidSeed(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unknown leaf index {index} (tree holds {len} leaves)")]
    UnknownIndex { index: u64, len: u64 },

    #[error("Invalid inclusion proof: {0}")]
    InvalidInclusionProof(String),

    #[error("Inclusion proof root {proof_root} does not match current root {current_root}")]
    ProofRootMismatch {
        proof_root: String,
        current_root: String,
    },

    #[error("Snapshot root mismatch: advertised {advertised}, replayed {replayed}")]
    SnapshotRootMismatch { advertised: String, replayed: String },

    #[error("Membership tree is full (capacity {capacity})")]
    Full { capacity: u64 },

    #[error("Commitment already registered: {0}")]
    DuplicateCommitment(String),

    #[error("Proving backend error: {0}")]
    ProvingBackend(String),

    #[error("Proof generation cancelled")]
    Cancelled,

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GreeterError {
    pub fn class(&self) -> ErrorClass {
        match self {
            GreeterError::InvalidSeed(_)
            | GreeterError::MalformedMessage(_)
            | GreeterError::UnknownIndex { .. }
            | GreeterError::InvalidInclusionProof(_) => ErrorClass::Input,
            GreeterError::ProofRootMismatch { .. } | GreeterError::SnapshotRootMismatch { .. } => {
                ErrorClass::Staleness
            }
            GreeterError::Full { .. } | GreeterError::DuplicateCommitment(_) => ErrorClass::Capacity,
            GreeterError::ProvingBackend(_) | GreeterError::Crypto(_) => ErrorClass::Cryptographic,
            GreeterError::Cancelled
            | GreeterError::Storage(_)
            | GreeterError::Serialization(_)
            | GreeterError::Config(_)
            | GreeterError::Internal(_) => ErrorClass::Infrastructure,
        }
    }

    /// Only staleness is worth retrying, after re-fetching the tree state.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Staleness
    }
}

pub type GreeterResult<T> = Result<T, GreeterError>;
