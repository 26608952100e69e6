//! Message to field encoding.
//!
//! Message bytes are read as a little-endian integer. At most
//! [`MESSAGE_CAPACITY`] bytes fit below the BN254 modulus, so the encoding
//! never reduces. A trailing zero byte would be indistinguishable from
//! padding and is rejected.

use greeter_types::{GreeterError, GreeterResult, MessageField, FIELD_ELEMENT_SIZE, MESSAGE_CAPACITY};

pub fn encode_message(message: &[u8]) -> GreeterResult<MessageField> {
    if message.len() > MESSAGE_CAPACITY {
        return Err(GreeterError::MalformedMessage(format!(
            "{} bytes exceeds the {}-byte field capacity",
            message.len(),
            MESSAGE_CAPACITY
        )));
    }
    if message.last() == Some(&0) {
        return Err(GreeterError::MalformedMessage(
            "trailing zero byte is ambiguous with padding".into(),
        ));
    }

    let mut bytes = [0u8; FIELD_ELEMENT_SIZE];
    bytes[..message.len()].copy_from_slice(message);
    Ok(MessageField::from_bytes(bytes))
}

/// Inverse of [`encode_message`]. `None` for values it never produces.
pub fn decode_message(field: &MessageField) -> Option<Vec<u8>> {
    let bytes = field.as_bytes();
    if bytes[MESSAGE_CAPACITY..].iter().any(|b| *b != 0) {
        return None;
    }
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    Some(bytes[..end].to_vec())
}
