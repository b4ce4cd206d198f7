//! Header overlay application (spec.md §4.6 step 7): patterns applied in
//! insertion order, last match for a given header name wins.

use std::collections::HashMap;

use crate::config::site::HeaderPatterns;

use super::patterns::{compile, matches};

/// Pattern shapes accepted: `/*`, `/*.ext`, `/prefix/*`, or literal. These
/// are simpler than the redirect/named-segment grammar, so matching is
/// done directly rather than through [`super::patterns`].
fn pattern_matches(pattern: &str, path: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return path == prefix || path.starts_with(&format!("{prefix}/"));
    }
    if let Some(ext) = pattern.strip_prefix("/*.") {
        return path.ends_with(&format!(".{ext}"));
    }
    if pattern == "/*" {
        return true;
    }
    // Fall back to the richer splat/named matcher for anything else
    // (kept for forward compatibility with pattern shapes beyond the
    // documented three).
    matches(&compile(pattern), path).is_some()
}

pub fn resolve(patterns: &HeaderPatterns, path: &str) -> HashMap<String, String> {
    let mut result = HashMap::new();
    for (pattern, entries) in patterns {
        if pattern_matches(pattern, path) {
            for (name, value) in entries {
                result.insert(name.clone(), value.clone());
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_pattern_overrides_earlier_for_same_header() {
        let patterns: HeaderPatterns = vec![
            ("/*".to_string(), HashMap::from([("X-Frame".to_string(), "DENY".to_string())])),
            ("/*.js".to_string(), HashMap::from([("X-Frame".to_string(), "SAMEORIGIN".to_string())])),
        ];
        let headers = resolve(&patterns, "/app.js");
        assert_eq!(headers.get("X-Frame"), Some(&"SAMEORIGIN".to_string()));
    }

    #[test]
    fn prefix_pattern_matches_subtree() {
        let patterns: HeaderPatterns = vec![(
            "/assets/*".to_string(),
            HashMap::from([("Cache-Control".to_string(), "max-age=3600".to_string())]),
        )];
        let headers = resolve(&patterns, "/assets/img/logo.png");
        assert_eq!(headers.get("Cache-Control"), Some(&"max-age=3600".to_string()));
        assert!(resolve(&patterns, "/index.html").is_empty());
    }
}
