//! Token hashing utilities.
//!
//! Raw bearer secrets are never stored or compared directly; both
//! issuance and validation work on SHA-256 hex digests.

use sha2::{Digest, Sha256};

/// Hashes a raw token to its stored form.
pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Timing-safe string comparison to prevent timing attacks.
///
/// Uses constant-time comparison to avoid leaking information about the
/// expected value through timing analysis.
pub fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    let mut result = 0u8;
    for (a_byte, b_byte) in a_bytes.iter().zip(b_bytes.iter()) {
        result |= a_byte ^ b_byte;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_hex_sha256() {
        let first = hash_token("tok_live_abc123");
        let second = hash_token("tok_live_abc123");

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_tokens_hash_differently() {
        assert_ne!(hash_token("tok_a"), hash_token("tok_b"));
    }

    #[test]
    fn timing_safe_eq_same() {
        assert!(timing_safe_eq("hello", "hello"));
    }

    #[test]
    fn timing_safe_eq_different() {
        assert!(!timing_safe_eq("hello", "world"));
    }

    #[test]
    fn timing_safe_eq_different_length() {
        assert!(!timing_safe_eq("hello", "hello_world"));
    }
}
