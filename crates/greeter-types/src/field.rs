use crate::error::{GreeterError, GreeterResult};
use crate::FIELD_ELEMENT_SIZE;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::fmt;

macro_rules! field_bytes {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[serde_as]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(#[serde_as(as = "serde_with::hex::Hex")] pub [u8; FIELD_ELEMENT_SIZE]);

        impl $name {
            pub fn from_bytes(bytes: [u8; FIELD_ELEMENT_SIZE]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; FIELD_ELEMENT_SIZE] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> GreeterResult<Self> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s)
                    .map_err(|e| GreeterError::Serialization(e.to_string()))?;
                if bytes.len() != FIELD_ELEMENT_SIZE {
                    return Err(GreeterError::Serialization(format!(
                        "{} must be {} bytes, got {}",
                        stringify!($name),
                        FIELD_ELEMENT_SIZE,
                        bytes.len()
                    )));
                }
                let mut arr = [0u8; FIELD_ELEMENT_SIZE];
                arr.copy_from_slice(&bytes);
                Ok(Self(arr))
            }

            /// First eight bytes in hex, for log lines.
            pub fn short(&self) -> String {
                hex::encode(&self.0[..8])
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl From<[u8; FIELD_ELEMENT_SIZE]> for $name {
            fn from(bytes: [u8; FIELD_ELEMENT_SIZE]) -> Self {
                Self(bytes)
            }
        }
    };
}

field_bytes!(
    /// Public identity commitment, a leaf of the membership tree.
    Commitment
);

field_bytes!(
    /// Root of the membership tree.
    MerkleRoot
);

field_bytes!(
    /// Per-member, per-scope tag that exposes double signaling.
    NullifierHash
);

field_bytes!(
    /// Scope a nullifier lives in (a topic, a poll, an epoch).
    ExternalNullifier
);

field_bytes!(
    /// Field encoding of a signal's message.
    MessageField
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let root = MerkleRoot::from_bytes([0xab; 32]);
        assert_eq!(root.to_hex().len(), 64);
        assert_eq!(MerkleRoot::from_hex(&root.to_hex()).unwrap(), root);
        assert_eq!(MerkleRoot::from_hex(&format!("0x{}", root.to_hex())).unwrap(), root);
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(Commitment::from_hex("abcd").is_err());
        assert!(Commitment::from_hex("zz").is_err());
    }

    #[test]
    fn test_json_is_hex_string() {
        let c = Commitment::from_bytes([0x01; 32]);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
        let back: Commitment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
