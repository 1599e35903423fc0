//! API key material and validation.
//!
//! The raw secret (`avfx_` prefix) is returned exactly once at creation;
//! only its SHA-256 digest is stored. Revocation is terminal: a revoked key
//! never validates again, regardless of scopes or expiry.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

pub const KEY_PREFIX: &str = "avfx_";

/// Generate a fresh API key secret and its storable digest.
pub fn generate_key() -> (String, String) {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let raw = format!("{}{}", KEY_PREFIX, URL_SAFE_NO_PAD.encode(bytes));
    let digest = hash_key(&raw);
    (raw, digest)
}

pub fn hash_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Validity check applied after a digest lookup succeeds.
pub fn key_is_usable(
    revoked_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    if revoked_at.is_some() {
        return false;
    }
    match expires_at {
        Some(expiry) => expiry > now,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn generated_keys_are_prefixed_and_unique() {
        let (a, digest_a) = generate_key();
        let (b, _) = generate_key();
        assert!(a.starts_with(KEY_PREFIX));
        assert_ne!(a, b);
        assert_eq!(hash_key(&a), digest_a);
        assert_ne!(hash_key(&a), hash_key(&b));
    }

    #[test]
    fn digest_is_hex_sha256() {
        let digest = hash_key("avfx_fixed");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn revoked_key_never_validates() {
        let now = Utc::now();
        let revoked = Some(now - Duration::days(1));
        // Revocation wins even with a far-future expiry or none at all.
        assert!(!key_is_usable(revoked, None, now));
        assert!(!key_is_usable(revoked, Some(now + Duration::days(365)), now));
    }

    #[test]
    fn expiry_is_enforced() {
        let now = Utc::now();
        assert!(key_is_usable(None, Some(now + Duration::hours(1)), now));
        assert!(!key_is_usable(None, Some(now - Duration::hours(1)), now));
        assert!(key_is_usable(None, None, now));
    }
}
