//! Sync service authentication
//!
//! The room sends a random nonce; the service proves it holds the shared
//! secret by returning HMAC-SHA256(secret, nonce), base64 encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use ring::hmac;

use crate::game::constants::sync::NONCE_BYTES;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("Signature is not valid base64")]
    MalformedSignature,
    #[error("Signature does not match nonce")]
    BadSignature,
    #[error("Handshake step {0} received out of order")]
    OutOfOrder(&'static str),
}

/// Generate a fresh base64 nonce from the CSPRNG
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

/// Signature the service is expected to return for `nonce`
pub fn sign(secret: &[u8], nonce: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    STANDARD.encode(hmac::sign(&key, nonce.as_bytes()).as_ref())
}

/// Check a signature in constant time
pub fn verify(secret: &[u8], nonce: &str, signature: &str) -> Result<(), HandshakeError> {
    let tag = STANDARD
        .decode(signature)
        .map_err(|_| HandshakeError::MalformedSignature)?;
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    hmac::verify(&key, nonce.as_bytes(), &tag).map_err(|_| HandshakeError::BadSignature)
}
