//! Shared path-pattern matcher for redirects and header overlays
//! (spec.md §4.6 step 4, step 7): literal, `:name`, and `*` segments.

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Named(String),
    Splat,
}

pub fn compile(pattern: &str) -> Vec<Segment> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|seg| {
            if seg == "*" {
                Segment::Splat
            } else if let Some(name) = seg.strip_prefix(':') {
                Segment::Named(name.to_string())
            } else {
                Segment::Literal(seg.to_string())
            }
        })
        .collect()
}

/// Attempts to match `path` against `segments`. On success, returns the
/// captured named params plus the splat remainder (if any).
pub fn matches(segments: &[Segment], path: &str) -> Option<MatchResult> {
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut params = Vec::new();
    let mut splat_remainder = None;

    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Splat => {
                splat_remainder = Some(parts[i..].join("/"));
                return Some(MatchResult {
                    params,
                    splat: splat_remainder,
                });
            }
            Segment::Named(name) => {
                let part = parts.get(i)?;
                params.push((name.clone(), (*part).to_string()));
            }
            Segment::Literal(literal) => {
                if parts.get(i) != Some(&literal.as_str()) {
                    return None;
                }
            }
        }
    }

    // No splat: segment counts must match exactly.
    if parts.len() != segments.len() {
        return None;
    }

    Some(MatchResult {
        params,
        splat: None,
    })
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchResult {
    pub params: Vec<(String, String)>,
    pub splat: Option<String>,
}

/// Substitutes `:name` and `*` tokens in `template` using a match result.
pub fn substitute(template: &str, result: &MatchResult) -> String {
    template
        .split('/')
        .map(|seg| {
            if seg == "*" {
                result.splat.clone().unwrap_or_default()
            } else if let Some(name) = seg.strip_prefix(':') {
                result
                    .params
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default()
            } else {
                seg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_requires_exact_segment_count() {
        let segments = compile("/exact");
        assert!(matches(&segments, "/exact").is_some());
        assert!(matches(&segments, "/exact/extra").is_none());
    }

    #[test]
    fn named_segment_captures_value() {
        let segments = compile("/blog/:slug");
        let result = matches(&segments, "/blog/hello").unwrap();
        assert_eq!(result.params, vec![("slug".to_string(), "hello".to_string())]);
    }

    #[test]
    fn splat_captures_remainder() {
        let segments = compile("/docs/*");
        let result = matches(&segments, "/docs/a/b/c").unwrap();
        assert_eq!(result.splat.as_deref(), Some("a/b/c"));
    }

    #[test]
    fn substitutes_named_and_splat() {
        let segments = compile("/blog/:slug");
        let result = matches(&segments, "/blog/hello").unwrap();
        assert_eq!(substitute("/posts/:slug", &result), "/posts/hello");

        let segments = compile("/docs/*");
        let result = matches(&segments, "/docs/a/b/c").unwrap();
        assert_eq!(substitute("/wiki/*", &result), "/wiki/a/b/c");
    }
}
