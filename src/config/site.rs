//! Per-deployment `SiteConfig` and its merge-with-server-defaults rules
//! (spec.md §4.1), plus the `RedirectRule` data shape used by the request
//! pipeline (§4.6).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Raw `tspages.toml` shape, parsed at deploy time (spec.md §4.1) or from
/// the server TOML's `[defaults]` table. Every field is optional so the
/// merge step can tell "not set" apart from "explicitly false/empty".
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct RawSiteConfig {
    pub spa_routing: Option<bool>,
    pub html_extensions: Option<bool>,
    pub analytics: Option<bool>,
    pub directory_listing: Option<bool>,
    pub public: Option<bool>,
    #[serde(default)]
    pub index_page: Option<String>,
    #[serde(default)]
    pub not_found_page: Option<String>,
    #[serde(default)]
    pub trailing_slash: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, HashMap<String, String>>>,
    #[serde(default)]
    pub redirects: Option<Vec<RedirectRule>>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_events: Option<Vec<String>>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

/// A single redirect rule (spec.md §3).
///
/// `from` supports three shapes: literal (`/exact`), named segment
/// (`/blog/:slug`), splat (`/docs/*`). Matching and substitution live in
/// [`crate::pipeline::redirects`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RedirectRule {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub status: u16,
}

impl RedirectRule {
    /// Validate the invariants from spec.md §3: `from` starts with `/`;
    /// every named param used in `to` appears in `from`; `*` in `to`
    /// requires `*` in `from`.
    pub fn validate(&self) -> AppResult<()> {
        if !self.from.starts_with('/') {
            return Err(AppError::InvalidInput(format!(
                "redirect `from` must start with '/': {}",
                self.from
            )));
        }
        if !(self.to.starts_with('/') || self.to.contains("://")) {
            return Err(AppError::InvalidInput(format!(
                "redirect `to` must be absolute or a URL: {}",
                self.to
            )));
        }
        if !matches!(self.status, 0 | 301 | 302) {
            return Err(AppError::InvalidInput(format!(
                "redirect `status` must be 301 or 302 (0 = default), got {}",
                self.status
            )));
        }

        let from_params: Vec<&str> = self
            .from
            .split('/')
            .filter(|seg| seg.starts_with(':'))
            .map(|seg| &seg[1..])
            .collect();
        let from_has_splat = self.from.split('/').any(|seg| seg == "*");

        for seg in self.to.split('/') {
            if let Some(name) = seg.strip_prefix(':') {
                if !from_params.contains(&name) {
                    return Err(AppError::InvalidInput(format!(
                        "redirect `to` references undeclared param ':{name}'"
                    )));
                }
            }
            if seg == "*" && !from_has_splat {
                return Err(AppError::InvalidInput(
                    "redirect `to` uses '*' but `from` has no splat segment".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn status_or_default(&self) -> u16 {
        if self.status == 0 {
            301
        } else {
            self.status
        }
    }
}

/// Header overlay: ordered list of (pattern, header-name-value map)
/// entries, in insertion order — last match for a given header name wins
/// (spec.md §4.6 step 7).
pub type HeaderPatterns = Vec<(String, HashMap<String, String>)>;

/// Merged per-deployment behavior (spec.md §3/§4.1). This is the value
/// every component reads from — never `RawSiteConfig` directly.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteConfig {
    pub spa_routing: bool,
    pub html_extensions: bool,
    pub analytics: bool,
    pub directory_listing: bool,
    pub public: bool,
    pub index_page: String,
    pub not_found_page: String,
    pub trailing_slash: String,
    pub headers: HeaderPatterns,
    pub redirects: Vec<RedirectRule>,
    pub webhook_url: String,
    pub webhook_events: Vec<String>,
    pub webhook_secret: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            spa_routing: false,
            html_extensions: false,
            analytics: true,
            directory_listing: false,
            public: false,
            index_page: "index.html".to_string(),
            not_found_page: String::new(),
            trailing_slash: String::new(),
            headers: Vec::new(),
            redirects: Vec::new(),
            webhook_url: String::new(),
            webhook_events: Vec::new(),
            webhook_secret: String::new(),
        }
    }
}

impl SiteConfig {
    /// Build a top-level (server-default) `SiteConfig` straight from TOML,
    /// with no deployment layer to merge against — equivalent to merging
    /// against an all-`None` deployment config.
    pub fn from_raw(raw: RawSiteConfig) -> Self {
        Self::default().merge(&raw)
    }

    /// Merge a deployment's raw config onto `self` (the server default),
    /// per the rules in spec.md §4.1.
    pub fn merge(&self, deployment: &RawSiteConfig) -> Self {
        let analytics = deployment.analytics.unwrap_or(self.analytics);

        SiteConfig {
            spa_routing: deployment.spa_routing.unwrap_or(self.spa_routing),
            html_extensions: deployment.html_extensions.unwrap_or(self.html_extensions),
            analytics,
            directory_listing: deployment
                .directory_listing
                .unwrap_or(self.directory_listing),
            public: deployment.public.unwrap_or(self.public),
            index_page: non_empty_or(&deployment.index_page, &self.index_page),
            not_found_page: non_empty_or(&deployment.not_found_page, &self.not_found_page),
            trailing_slash: non_empty_or(&deployment.trailing_slash, &self.trailing_slash),
            headers: merge_headers(&self.headers, deployment.headers.as_ref()),
            redirects: match &deployment.redirects {
                Some(list) => list.clone(),
                None => self.redirects.clone(),
            },
            webhook_url: match deployment.webhook_url.as_deref() {
                Some(url) if !url.is_empty() => url.to_string(),
                _ => self.webhook_url.clone(),
            },
            webhook_events: if deployment.webhook_url.as_deref().is_some_and(|u| !u.is_empty()) {
                deployment.webhook_events.clone().unwrap_or_default()
            } else {
                self.webhook_events.clone()
            },
            webhook_secret: if deployment.webhook_url.as_deref().is_some_and(|u| !u.is_empty()) {
                deployment.webhook_secret.clone().unwrap_or_default()
            } else {
                self.webhook_secret.clone()
            },
        }
    }

    /// Validate the merged value (spec.md §4.1: "validation runs on the
    /// merged value and fails the deploy if invalid").
    pub fn validate(&self) -> AppResult<()> {
        if !matches!(self.trailing_slash.as_str(), "" | "add" | "remove") {
            return Err(AppError::InvalidInput(format!(
                "trailing_slash must be '', 'add', or 'remove', got '{}'",
                self.trailing_slash
            )));
        }

        let mut seen_from = std::collections::HashSet::new();
        for rule in &self.redirects {
            rule.validate()?;
            if !seen_from.insert(rule.from.clone()) {
                return Err(AppError::InvalidInput(format!(
                    "duplicate redirect `from`: {}",
                    rule.from
                )));
            }
        }

        for pattern in self.headers.iter().map(|(p, _)| p) {
            if !pattern.starts_with('/') {
                return Err(AppError::InvalidInput(format!(
                    "header pattern must start with '/': {pattern}"
                )));
            }
        }

        Ok(())
    }
}

fn non_empty_or(deployment: &Option<String>, default: &str) -> String {
    match deployment {
        Some(v) if !v.is_empty() => v.clone(),
        _ => default.to_string(),
    }
}

/// Per-path-pattern overlay: deployment patterns replace the default entry
/// for that pattern; other default patterns remain (spec.md §4.1).
fn merge_headers(
    default: &HeaderPatterns,
    deployment: Option<&HashMap<String, HashMap<String, String>>>,
) -> HeaderPatterns {
    let Some(deployment) = deployment else {
        return default.clone();
    };

    let mut merged: Vec<(String, HashMap<String, String>)> = default
        .iter()
        .filter(|(pattern, _)| !deployment.contains_key(pattern))
        .cloned()
        .collect();
    for (pattern, headers) in deployment {
        merged.push((pattern.clone(), headers.clone()));
    }
    merged
}
