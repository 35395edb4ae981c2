use sha2::{Digest, Sha256};

/// SHA-256 of a cached upstream body, hex encoded.
/// Used to tell whether a refresh actually changed the dataset.
pub fn compute_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_deterministic() {
        assert_eq!(compute_digest(b"{\"prefixes\":[]}"), compute_digest(b"{\"prefixes\":[]}"));
    }

    #[test]
    fn test_digest_changes_with_body() {
        assert_ne!(compute_digest(b"{\"syncToken\":\"1\"}"), compute_digest(b"{\"syncToken\":\"2\"}"));
    }

    #[test]
    fn test_digest_is_hex_sha256() {
        assert_eq!(
            compute_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
