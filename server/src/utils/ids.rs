//! Id generation and hex helpers

use rand::RngCore;

/// Generate a cryptographically secure random key of `len` bytes.
pub fn generate_key(len: usize) -> Vec<u8> {
    let mut key = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Generate a message id in the `msg_<12 hex chars>` shape.
pub fn generate_message_id() -> String {
    let bytes = generate_key(6);
    format!("msg_{}", encode_hex(&bytes))
}

/// Generate a waiter id.
pub fn generate_waiter_id() -> String {
    let bytes = generate_key(8);
    format!("waiter_{}", encode_hex(&bytes))
}

/// Generate a push-socket session id.
pub fn generate_session_id() -> String {
    let bytes = generate_key(8);
    format!("sess_{}", encode_hex(&bytes))
}

/// Generate a request id for error responses, in the `req_<16 hex chars>` shape.
pub fn generate_request_id() -> String {
    let bytes = generate_key(8);
    format!("req_{}", encode_hex(&bytes))
}

/// Encode bytes to a hex string.
pub fn encode_hex(bytes: &[u8]) -> String {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";
    let mut result = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        result.push(HEX_CHARS[(byte >> 4) as usize] as char);
        result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
    }
    result
}
