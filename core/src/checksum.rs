//! HMAC-SHA256 signing and verification
//!
//! The diagnostics vendor expects an `X-Checksum` header on booking creation
//! and the payment gateway signs both checkout callbacks and webhooks. All
//! three use HMAC-SHA256 rendered as lower-case hex.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign `payload` with `key`, returning lower-case hex
pub fn sign(key: &[u8], payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature. Malformed hex never verifies.
pub fn verify(key: &[u8], payload: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Payload signed by the payment gateway on a successful checkout
pub fn payment_payload(order_id: &str, payment_id: &str) -> String {
    format!("{}|{}", order_id, payment_id)
}
