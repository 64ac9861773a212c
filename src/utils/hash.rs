use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Length of the hex namespace token derived from a user id.
pub const NAMESPACE_TOKEN_LEN: usize = 32;

pub fn compute_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Stable namespace token for a user.
///
/// The same transform is used for upsert, query and delete, so the raw user
/// identifier never reaches the vector store.
pub fn namespace_for(user: &str) -> String {
    let hash = compute_sha256(user.trim().as_bytes());
    hash.chars().take(NAMESPACE_TOKEN_LEN).collect()
}

/// Record id: `{namespace}-{label}-{random suffix}`.
pub fn record_id(namespace: &str, label: &str) -> String {
    format!("{}-{}-{}", namespace, label.trim(), Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            compute_sha256(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn namespace_is_stable_and_hides_user() {
        let first = namespace_for("testUser");
        let second = namespace_for("  testUser ");
        assert_eq!(first, second);
        assert_eq!(first.len(), NAMESPACE_TOKEN_LEN);
        assert!(!first.contains("testUser"));
        assert_ne!(first, namespace_for("otherUser"));
    }

    #[test]
    fn record_ids_are_unique_per_label() {
        let namespace = namespace_for("u1");
        let ids: HashSet<String> = (0..1000).map(|_| record_id(&namespace, "cat")).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.starts_with(&format!("{}-cat-", namespace))));
    }
}
