//! HMAC-SHA256 payload signing.
//!
//! One signing routine serves both paths: the WebSocket `auth` event and
//! every authenticated REST request sign their payload the same way, so the
//! implementation lives here rather than in either client crate. Uses
//! `ring` for constant-time HMAC; secrets never appear in logs or errors.

use ring::hmac;

/// Hex-encoded HMAC-SHA256 digest of `payload` under `secret`.
///
/// The result is lowercase hex, the form venues expect in signature
/// headers and auth frames.
pub fn sign_payload(secret: &str, payload: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let tag = hmac::sign(&key, payload.as_bytes());
    hex::encode(tag.as_ref())
}
