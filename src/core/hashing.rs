//! Content hashing.
//!
//! Content hashes are SHA-256 over the logical type name and the canonical
//! JSON rendering of an artifact's payload fields. `serde_json::Value` keeps
//! object keys sorted, so two payloads with the same fields hash identically
//! regardless of construction order.

use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Hash an artifact payload (hex-encoded SHA-256)
pub fn hash_content(type_name: &str, payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(type_name.as_bytes());
    hasher.update(b"\n");
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Produce a hash that will never collide with another artifact's.
///
/// Used for artifacts that carry no usable content hash: they are treated as
/// globally unique and stored in full.
pub fn synthesize_hash(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"synthetic\n");
    hasher.update(key.as_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether a hash is missing or blank
pub fn is_blank(hash: Option<&str>) -> bool {
    hash.map_or(true, |h| h.trim().is_empty())
}

/// Short form of a hash for log lines and CLI output (first 12 hex chars)
pub fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_is_stable_and_key_order_independent() {
        let a = hash_content("prompt", &json!({"role": "user", "text": "hi"}));
        let b = hash_content("prompt", &json!({"text": "hi", "role": "user"}));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_type_name_participates_in_hash() {
        let payload = json!({"text": "same"});
        assert_ne!(hash_content("prompt", &payload), hash_content("evidence", &payload));
    }

    #[test]
    fn test_synthesized_hashes_are_distinct() {
        let a = synthesize_hash("k");
        let b = synthesize_hash("k");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_blank_detection() {
        assert!(is_blank(None));
        assert!(is_blank(Some("")));
        assert!(is_blank(Some("   ")));
        assert!(!is_blank(Some("abc")));
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_hash("abc"), "abc");
    }
}
