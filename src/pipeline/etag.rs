//! Strong ETag computation and `If-None-Match` handling (spec.md §4.6 step 8).

use sha2::{Digest, Sha256};

/// `"{deployment_id}-{path-hash}"`, quoted as a strong ETag.
pub fn compute(deployment_id: &str, served_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(served_path.as_bytes());
    let digest = hasher.finalize();
    format!("\"{deployment_id}-{}\"", hex::encode(&digest[..8]))
}

/// `If-None-Match` may carry a comma-separated list of ETags, any of which
/// quoted or weak (`W/"..."`); we only emit strong tags but honor a match
/// against a weak-prefixed client value too.
pub fn matches_if_none_match(header_value: &str, etag: &str) -> bool {
    header_value.split(',').map(str::trim).any(|candidate| {
        let candidate = candidate.strip_prefix("W/").unwrap_or(candidate);
        candidate == etag || candidate == "*"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_deployment_and_path_produce_same_etag() {
        let a = compute("abcd1234", "/index.html");
        let b = compute("abcd1234", "/index.html");
        assert_eq!(a, b);
    }

    #[test]
    fn different_deployment_changes_etag() {
        let a = compute("abcd1234", "/index.html");
        let b = compute("ffffffff", "/index.html");
        assert_ne!(a, b);
    }

    #[test]
    fn if_none_match_honors_list_and_wildcard() {
        let etag = compute("abcd1234", "/index.html");
        assert!(matches_if_none_match(&etag, &etag));
        assert!(matches_if_none_match(&format!("\"stale\", {etag}"), &etag));
        assert!(matches_if_none_match("*", &etag));
        assert!(!matches_if_none_match("\"stale\"", &etag));
    }
}
