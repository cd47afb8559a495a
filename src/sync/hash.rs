//! Content hashing for sync operations.
//!
//! SHA256 over the serialized JSON of a record's synchronized fields. Used by
//! the pull path to tell whether a remote record actually differs from the
//! clean local copy before rewriting the row.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute a SHA256 hash of a serializable value.
///
/// Identity and sync bookkeeping are not part of [`crate::model::RecordFields`],
/// so two copies of the same content hash equal regardless of which side
/// they came from.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized to JSON.
pub fn content_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&json);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Check if content has changed against a previously stored hash.
///
/// Returns `true` when there is no stored hash or the hashes differ.
#[must_use]
pub fn has_changed(current_hash: &str, stored_hash: Option<&str>) -> bool {
    stored_hash.is_none_or(|h| h != current_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordFields;

    #[test]
    fn test_content_hash_deterministic() {
        let fields = RecordFields::note("Buy milk").body("2 litres");

        let hash1 = content_hash(&fields).unwrap();
        let hash2 = content_hash(&fields.clone()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA256 produces 64 hex chars
    }

    #[test]
    fn test_content_hash_changes_with_content() {
        let a = RecordFields::note("Buy milk");
        let mut b = a.clone();
        b.pinned = true;

        assert_ne!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn test_has_changed() {
        assert!(has_changed("abc123", None));
        assert!(has_changed("abc123", Some("xyz789")));
        assert!(!has_changed("abc123", Some("abc123")));
    }
}
