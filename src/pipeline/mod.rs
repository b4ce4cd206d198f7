//! The 11-step per-site request pipeline (spec.md §4.6). `resolve` covers
//! steps 1-8 and 10 (authorization through ETag, and 404 page selection);
//! range handling, content-type-by-extension, and `Cache-Control` (step 9)
//! are left to the file-server primitive the caller wires up
//! (`tower_http::services::ServeFile`), and analytics emission (step 11)
//! is the caller's responsibility once the final status is known.

pub mod etag;
pub mod headers;
pub mod patterns;
pub mod redirects;

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::site::SiteConfig;
use crate::store::Store;

#[derive(Debug)]
pub enum Resolution {
    Forbidden,
    Placeholder,
    Redirect {
        location: String,
        status: u16,
    },
    NotModified,
    Serve {
        fs_path: PathBuf,
        etag: String,
        extra_headers: HashMap<String, String>,
    },
    NotFound {
        custom_page: Option<PathBuf>,
        extra_headers: HashMap<String, String>,
    },
}

pub struct PipelineInput<'a> {
    pub site: &'a str,
    pub path: &'a str,
    pub can_view: bool,
    pub if_none_match: Option<&'a str>,
}

/// Runs steps 1-8 and 10 against the site's active deployment. Returns
/// `Ok(Resolution::Placeholder)` rather than an error when there is no
/// active deployment — that is a valid, expected state (spec.md §3).
pub async fn resolve(store: &Store, defaults: &SiteConfig, input: &PipelineInput<'_>) -> crate::error::AppResult<Resolution> {
    let Some(deployment_id) = store.current_deployment(input.site).await? else {
        return Ok(Resolution::Placeholder);
    };

    let raw_cfg = store.read_site_config(input.site, &deployment_id).await?;
    let cfg = defaults.merge(&raw_cfg);

    if !input.can_view && !cfg.public {
        return Ok(Resolution::Forbidden);
    }

    if let Some(hit) = redirects::resolve(&cfg.redirects, input.path) {
        return Ok(Resolution::Redirect {
            location: hit.location,
            status: hit.status,
        });
    }

    if let Some(normalized) = trailing_slash_redirect(&cfg.trailing_slash, input.path) {
        return Ok(Resolution::Redirect {
            location: normalized,
            status: 308,
        });
    }

    let content_root = store.content_path(input.site, &deployment_id);

    if !cfg.html_extensions {
        if let Some(stripped) = input.path.strip_suffix(".html") {
            if !stripped.is_empty() {
                return Ok(Resolution::Redirect {
                    location: stripped.to_string(),
                    status: 301,
                });
            }
        }
    }

    let resolved = resolve_clean_url(&content_root, input.path, &cfg).await;

    let Some(served_path) = resolved else {
        let custom_page = if cfg.not_found_page.is_empty() {
            None
        } else {
            let candidate = content_root.join(cfg.not_found_page.trim_start_matches('/'));
            candidate.is_file().then_some(candidate)
        };
        let extra_headers = headers::resolve(&cfg.headers, input.path);
        return Ok(Resolution::NotFound {
            custom_page,
            extra_headers,
        });
    };

    let rel = served_path
        .strip_prefix(&content_root)
        .unwrap_or(&served_path)
        .to_string_lossy()
        .replace(std::path::MAIN_SEPARATOR, "/");
    let etag = etag::compute(&deployment_id, &rel);

    if let Some(inm) = input.if_none_match {
        if etag::matches_if_none_match(inm, &etag) {
            return Ok(Resolution::NotModified);
        }
    }

    let extra_headers = headers::resolve(&cfg.headers, input.path);
    Ok(Resolution::Serve {
        fs_path: served_path,
        etag,
        extra_headers,
    })
}

fn trailing_slash_redirect(mode: &str, path: &str) -> Option<String> {
    let has_extension = path.rsplit('/').next().is_some_and(|last| last.contains('.'));
    match mode {
        "add" if !path.ends_with('/') && !has_extension => Some(format!("{path}/")),
        "remove" if path.ends_with('/') && path != "/" => {
            Some(path.trim_end_matches('/').to_string())
        }
        _ => None,
    }
}

/// Clean-URL resolution order (spec.md §4.6 step 6): exact file, then
/// `q/index.html`, then `q.html`, then (if SPA) the configured index page.
async fn resolve_clean_url(content_root: &std::path::Path, path: &str, cfg: &SiteConfig) -> Option<PathBuf> {
    let trimmed = path.trim_start_matches('/');
    let exact = content_root.join(trimmed);
    if is_regular_file(&exact).await {
        return Some(exact);
    }

    let dir_index = content_root.join(trimmed).join("index.html");
    if is_regular_file(&dir_index).await {
        return Some(dir_index);
    }

    let with_html = content_root.join(format!("{trimmed}.html"));
    if is_regular_file(&with_html).await {
        return Some(with_html);
    }

    if cfg.spa_routing {
        let index = content_root.join(&cfg.index_page);
        if is_regular_file(&index).await {
            return Some(index);
        }
    }

    None
}

async fn is_regular_file(path: &std::path::Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::site::RawSiteConfig;

    async fn setup_site(store: &Store, site: &str) -> String {
        store.create_site(site).await.unwrap();
        let id = store.new_deployment_id();
        let content = store.create_deployment(site, &id).await.unwrap();
        tokio::fs::write(content.join("about"), b"plain about file")
            .await
            .unwrap();
        tokio::fs::write(content.join("about.html"), b"<html>about</html>")
            .await
            .unwrap();
        tokio::fs::write(content.join("docs.html"), b"<html>docs</html>")
            .await
            .unwrap();
        store
            .write_manifest(
                site,
                &id,
                &crate::store::manifest::Manifest {
                    site: site.to_string(),
                    id: id.clone(),
                    created_at: chrono::Utc::now(),
                    created_by: "tester".to_string(),
                    created_by_avatar: None,
                    size_bytes: 0,
                },
            )
            .await
            .unwrap();
        store.mark_complete(site, &id).await.unwrap();
        store.activate_deployment(site, &id).await.unwrap();
        id
    }

    #[tokio::test]
    async fn no_active_deployment_yields_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.create_site("blog").await.unwrap();

        let input = PipelineInput {
            site: "blog",
            path: "/",
            can_view: true,
            if_none_match: None,
        };
        let resolution = resolve(&store, &SiteConfig::default(), &input).await.unwrap();
        assert!(matches!(resolution, Resolution::Placeholder));
    }

    #[tokio::test]
    async fn exact_file_wins_over_html_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        setup_site(&store, "docs").await;

        let input = PipelineInput {
            site: "docs",
            path: "/about",
            can_view: true,
            if_none_match: None,
        };
        let resolution = resolve(&store, &SiteConfig::default(), &input).await.unwrap();
        match resolution {
            Resolution::Serve { fs_path, .. } => {
                assert!(fs_path.ends_with("about"));
                assert!(!fs_path.to_string_lossy().ends_with(".html"));
            }
            other => panic!("expected Serve, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bare_path_falls_back_to_html_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        setup_site(&store, "docs").await;

        let input = PipelineInput {
            site: "docs",
            path: "/docs",
            can_view: true,
            if_none_match: None,
        };
        let resolution = resolve(&store, &SiteConfig::default(), &input).await.unwrap();
        match resolution {
            Resolution::Serve { fs_path, .. } => assert!(fs_path.ends_with("docs.html")),
            other => panic!("expected Serve, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn html_extension_redirects_to_clean_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        setup_site(&store, "docs").await;

        let input = PipelineInput {
            site: "docs",
            path: "/docs.html",
            can_view: true,
            if_none_match: None,
        };
        let resolution = resolve(&store, &SiteConfig::default(), &input).await.unwrap();
        match resolution {
            Resolution::Redirect { location, status } => {
                assert_eq!(location, "/docs");
                assert_eq!(status, 301);
            }
            other => panic!("expected Redirect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn private_site_forbidden_without_view_cap() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        setup_site(&store, "docs").await;

        let input = PipelineInput {
            site: "docs",
            path: "/about",
            can_view: false,
            if_none_match: None,
        };
        let resolution = resolve(&store, &SiteConfig::default(), &input).await.unwrap();
        assert!(matches!(resolution, Resolution::Forbidden));
    }

    #[tokio::test]
    async fn public_site_skips_auth() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let id = setup_site(&store, "docs").await;
        let mut cfg = RawSiteConfig::default();
        cfg.public = Some(true);
        store.write_site_config("docs", &id, &cfg).await.unwrap();

        let input = PipelineInput {
            site: "docs",
            path: "/about",
            can_view: false,
            if_none_match: None,
        };
        let resolution = resolve(&store, &SiteConfig::default(), &input).await.unwrap();
        assert!(matches!(resolution, Resolution::Serve { .. }));
    }

    #[tokio::test]
    async fn missing_file_falls_through_to_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        setup_site(&store, "docs").await;

        let input = PipelineInput {
            site: "docs",
            path: "/missing",
            can_view: true,
            if_none_match: None,
        };
        let resolution = resolve(&store, &SiteConfig::default(), &input).await.unwrap();
        assert!(matches!(resolution, Resolution::NotFound { .. }));
    }
}
