use crate::field::{ExternalNullifier, MerkleRoot, MessageField, NullifierHash};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::fmt;

/// Public inputs a signal proof is checked against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicSignals {
    pub root: MerkleRoot,
    pub nullifier_hash: NullifierHash,
    pub message: MessageField,
    pub external_nullifier: ExternalNullifier,
}

/// A greeting as it travels from prover to verifier.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    #[serde_as(as = "serde_with::hex::Hex")]
    pub message: Vec<u8>,
    pub nullifier_hash: NullifierHash,
    #[serde_as(as = "serde_with::hex::Hex")]
    pub proof: Vec<u8>,
    pub public_signals: PublicSignals,
}

impl Signal {
    pub fn scope(&self) -> ExternalNullifier {
        self.public_signals.external_nullifier
    }

    pub fn message_lossy(&self) -> String {
        String::from_utf8_lossy(&self.message).into_owned()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidProofReason {
    /// Proof bytes are truncated, padded, or not valid curve points.
    MalformedProof,
    /// A public signal is not a canonical field encoding, or the message
    /// does not encode to the advertised field value.
    MalformedPublicSignals,
    /// The signal's nullifier hash differs from the one the proof commits to.
    NullifierMismatch,
    /// The proof targets a root the membership tree never had.
    UnknownRoot,
    /// The proof does not verify against the public signals.
    PairingCheckFailed,
}

impl fmt::Display for InvalidProofReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidProofReason::MalformedProof => write!(f, "malformed proof"),
            InvalidProofReason::MalformedPublicSignals => write!(f, "malformed public signals"),
            InvalidProofReason::NullifierMismatch => write!(f, "nullifier hash mismatch"),
            InvalidProofReason::UnknownRoot => write!(f, "unknown membership root"),
            InvalidProofReason::PairingCheckFailed => write!(f, "proof does not verify"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    Valid,
    Invalid(InvalidProofReason),
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid)
    }
}

/// Outcome of recording a nullifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    AlreadyUsed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    /// This member already signaled in this scope.
    AlreadyUsed,
    InvalidProof(InvalidProofReason),
}

/// What the registry tells the submitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Accepted,
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Accepted => write!(f, "accepted"),
            Verdict::Rejected(Rejection::AlreadyUsed) => {
                write!(f, "rejected: already signaled in this scope")
            }
            Verdict::Rejected(Rejection::InvalidProof(reason)) => {
                write!(f, "rejected: invalid proof ({})", reason)
            }
        }
    }
}
