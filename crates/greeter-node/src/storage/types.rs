use greeter_types::{ExternalNullifier, MerkleRoot, NullifierHash};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub version: u32,
    pub created_at: i64,
    pub depth: usize,
}

/// An accepted signal, as the nullifier registry remembers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullifierRecord {
    pub scope: ExternalNullifier,
    pub nullifier_hash: NullifierHash,
    pub message: Vec<u8>,
    pub root: MerkleRoot,
    /// Unix milliseconds.
    pub accepted_at: i64,
}
