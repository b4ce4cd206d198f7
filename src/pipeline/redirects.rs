//! Redirect rule evaluation (spec.md §4.6 step 4): first match wins.

use crate::config::site::RedirectRule;

use super::patterns::{compile, matches, substitute};

pub struct RedirectHit {
    pub location: String,
    pub status: u16,
}

/// Walks `rules` in order and returns the first match, with its `to`
/// template substituted using the captured params/splat.
pub fn resolve(rules: &[RedirectRule], path: &str) -> Option<RedirectHit> {
    for rule in rules {
        let segments = compile(&rule.from);
        if let Some(result) = matches(&segments, path) {
            return Some(RedirectHit {
                location: substitute(&rule.to, &result),
                status: rule.status_or_default(),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(from: &str, to: &str, status: u16) -> RedirectRule {
        RedirectRule {
            from: from.to_string(),
            to: to.to_string(),
            status,
        }
    }

    #[test]
    fn first_match_wins_with_param_capture() {
        let rules = vec![
            rule("/blog/:slug", "/posts/:slug", 301),
            rule("/docs/*", "/wiki/*", 0),
        ];
        let hit = resolve(&rules, "/blog/hello").unwrap();
        assert_eq!(hit.location, "/posts/hello");
        assert_eq!(hit.status, 301);

        let hit = resolve(&rules, "/docs/a/b/c").unwrap();
        assert_eq!(hit.location, "/wiki/a/b/c");
        assert_eq!(hit.status, 301);

        assert!(resolve(&rules, "/other").is_none());
    }
}
