//! Outbound webhook signing
//!
//! Receivers verify by recomputing HMAC-SHA256 over the raw body with their
//! endpoint secret and comparing (timing-safe) against the hex after the
//! `sha256=` prefix.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the `X-OpenPayFlow-Signature` header value for a body
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature header against a raw body
pub fn verify(secret: &str, body: &[u8], header_value: &str) -> bool {
    let received_hex = match header_value.strip_prefix(SIGNATURE_PREFIX) {
        Some(h) => h,
        None => return false,
    };
    let received = match hex::decode(received_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    if received.len() != expected.len() {
        return false;
    }

    // Constant-time comparison
    let mut result = 0u8;
    for (a, b) in received.iter().zip(expected.iter()) {
        result |= a ^ b;
    }
    result == 0
}
