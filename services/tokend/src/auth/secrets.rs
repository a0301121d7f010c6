//! Secret hashing and refresh token generation.
//!
//! # Purpose
//! Client secrets are only ever compared as one-way digests, and refresh
//! tokens are opaque random strings. Both are produced here so their format
//! stays consistent across the store and the rotation protocol.
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Bytes of entropy in a refresh token (256 bits).
pub const REFRESH_TOKEN_BYTES: usize = 32;

/// Hex SHA-256 of a raw client secret, the only form in which secrets are
/// stored or looked up.
pub fn hash_client_secret(raw_secret: &str) -> String {
    digest_hex(raw_secret.as_bytes())
}

/// Reference recorded in the audit log for a session token.
pub fn session_token_ref(session_token: &str) -> String {
    digest_hex(session_token.as_bytes())
}

/// Fresh hex-encoded refresh token drawn from the OS-seeded thread RNG.
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (left, right) in a.iter().zip(b.iter()) {
        diff |= left ^ right;
    }
    diff == 0
}

fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_hash_is_stable() {
        let a = hash_client_secret("s3cr3t");
        let b = hash_client_secret("s3cr3t");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn secret_hash_changes_with_input() {
        assert_ne!(hash_client_secret("s3cr3t"), hash_client_secret("s3cr3t "));
    }

    #[test]
    fn refresh_tokens_are_256_bit_hex() {
        let token = generate_refresh_token();
        assert_eq!(token.len(), REFRESH_TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_refresh_token());
    }

    #[test]
    fn constant_time_eq_compares_bytes() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
