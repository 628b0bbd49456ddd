// src/utils/crypto.rs
//! Content hashing for credential documents.
//!
//! Uses Blake2b with a 256-bit output, the same digest the chain stores as a
//! credential's `credential_hash` and uses for its `CredentialByHash` index.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

/// Computes a Blake2b-256 hash of the input data.
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Hashes an uploaded document and renders the digest as `0x`-prefixed hex.
///
/// This is the `contentHash` submitted with `issue_credential` and looked up
/// by `verify_credential`.
pub fn hash_document(data: &[u8]) -> String {
    format!("0x{}", hex::encode(hash_data(data)))
}

/// Checks that a document matches a previously computed content hash.
///
/// Comparison ignores hex letter case and surrounding whitespace.
pub fn verify_file_hash(data: &[u8], expected_hash: &str) -> bool {
    hash_document(data).eq_ignore_ascii_case(expected_hash.trim())
}

/// Parses a `0x`-prefixed (or bare) 64 character hex string into a 32-byte hash.
///
/// # Returns
/// `None` if the string is not exactly 32 bytes of valid hex.
pub fn parse_hash(value: &str) -> Option<[u8; 32]> {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(digits).ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_matches_known_digest() {
        assert_eq!(
            hash_document(b""),
            "0x0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn test_hash_is_deterministic_and_content_sensitive() {
        let first = hash_document(b"Bachelor of Science, 2024");
        let second = hash_document(b"Bachelor of Science, 2024");
        let other = hash_document(b"Bachelor of Science, 2025");

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first.len(), 66);
    }

    #[test]
    fn test_verify_file_hash_ignores_case() {
        let doc = b"transcript.pdf contents";
        let hash = hash_document(doc).to_uppercase().replacen("0X", "0x", 1);

        assert!(verify_file_hash(doc, &hash));
        assert!(!verify_file_hash(b"tampered", &hash));
    }

    #[test]
    fn test_parse_hash() {
        let hash = hash_document(b"diploma");
        assert_eq!(parse_hash(&hash), Some(hash_data(b"diploma")));
        assert_eq!(parse_hash(hash.trim_start_matches("0x")), Some(hash_data(b"diploma")));
        assert_eq!(parse_hash("0x1234"), None);
        assert_eq!(parse_hash("not hex"), None);
    }
}
