//! Glob matching for capability site scopes (spec.md §4.4): `*` matches
//! any run of characters, `?` matches one.

use globset::{Glob, GlobSetBuilder};

/// Builds a matcher for `patterns` (empty patterns, or exactly `["*"]`, is
/// "matches everything"). Matching a site name is OR across patterns.
pub fn build_matcher(patterns: &[String]) -> globset::GlobSet {
    let mut builder = GlobSetBuilder::new();
    if patterns.is_empty() {
        builder.add(Glob::new("*").expect("literal glob never fails"));
    } else {
        for pattern in patterns {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            } else {
                tracing::warn!(pattern, "invalid site glob pattern, ignoring");
            }
        }
    }
    builder.build().unwrap_or_else(|_| {
        GlobSetBuilder::new()
            .build()
            .expect("empty globset always builds")
    })
}

pub fn matches(patterns: &[String], site: &str) -> bool {
    build_matcher(patterns).is_match(site)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patterns_match_everything() {
        assert!(matches(&[], "anything"));
    }

    #[test]
    fn star_matches_everything() {
        assert!(matches(&["*".to_string()], "anything"));
    }

    #[test]
    fn prefix_glob_matches_run() {
        let patterns = vec!["demo-*".to_string()];
        assert!(matches(&patterns, "demo-staging"));
        assert!(!matches(&patterns, "other"));
    }

    #[test]
    fn or_across_multiple_entries() {
        let patterns = vec!["docs".to_string(), "demo-*".to_string()];
        assert!(matches(&patterns, "docs"));
        assert!(matches(&patterns, "demo-staging"));
        assert!(!matches(&patterns, "other"));
    }
}
