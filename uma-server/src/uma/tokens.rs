//! Random token and identifier generation.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Generate a cryptographically secure random token.
///
/// 32 random bytes (256 bits) encoded as base64url without padding, so the
/// result is safe in URLs, form bodies and storage paths.
pub fn generate_secure_token() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(token_bytes)
}

/// Shorter random identifier for catalog records
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    let id_bytes: [u8; 12] = rng.gen();
    URL_SAFE_NO_PAD.encode(id_bytes)
}

/// Configuration code of the form `<random>.<epoch-millis>`
pub fn generate_configuration_code(now: DateTime<Utc>) -> String {
    format!("{}.{}", generate_id(), now.timestamp_millis())
}

/// Stable, path-safe digest of an arbitrary string such as a scope URL or a
/// bearer token
pub fn digest(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
