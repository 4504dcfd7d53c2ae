//! Bearer-token generation and hashing for users and nodes. Tokens are
//! shown to the caller exactly once, at creation; only the SHA-256
//! digest is persisted.

use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};

pub fn generate_token_b64_urlsafe(size: usize) -> String {
    let mut bytes = vec![0_u8; size];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

pub fn sha256_urlsafe_token(token: &str) -> Result<Vec<u8>, anyhow::Error> {
    let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| anyhow::anyhow!("invalid token encoding"))?;

    let mut hasher = Sha256::new();
    hasher.update(raw);
    Ok(hasher.finalize().to_vec())
}

/// Constant-time equality, independent of where the two slices first
/// differ. Token comparisons must not leak timing information about
/// how many leading bytes matched.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0_u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_token_b64_urlsafe_decodes_to_requested_size_and_has_no_padding() {
        let token = generate_token_b64_urlsafe(32);
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));

        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .expect("token should be valid base64url");
        assert_eq!(decoded.len(), 32);
    }

    #[test]
    fn sha256_urlsafe_token_hashes_the_decoded_token() -> Result<(), anyhow::Error> {
        let raw = vec![1_u8, 2, 3, 4, 5, 6];
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&raw);

        let hashed = sha256_urlsafe_token(&token)?;

        let mut hasher = Sha256::new();
        hasher.update(&raw);
        assert_eq!(hashed, hasher.finalize().to_vec());
        Ok(())
    }

    #[test]
    fn sha256_urlsafe_token_rejects_invalid_base64() {
        let err = sha256_urlsafe_token("%%%").expect_err("expected error");
        assert!(err.to_string().contains("invalid token encoding"));
    }

    #[test]
    fn constant_time_eq_matches_only_identical_slices() {
        assert!(constant_time_eq(b"abc123", b"abc123"));
        assert!(!constant_time_eq(b"abc123", b"abc124"));
        assert!(!constant_time_eq(b"abc123", b"abc12"));
    }
}
