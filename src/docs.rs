//! Embedded help documentation (SPEC_FULL.md §4.12): markdown source is
//! baked into the binary with `include_str!`, mirroring the teacher's
//! `init_templates.rs` embedding pattern, and rendered through the same
//! `pulldown-cmark` path used for single-file Markdown deploys.

use crate::error::{AppError, AppResult};
use crate::ingest::single_file::render_markdown;

struct Page {
    slug: &'static str,
    title: &'static str,
    source: &'static str,
}

const PAGES: &[Page] = &[
    Page {
        slug: "overview",
        title: "Overview",
        source: include_str!("../docs/overview.md"),
    },
    Page {
        slug: "deploying",
        title: "Deploying",
        source: include_str!("../docs/deploying.md"),
    },
    Page {
        slug: "capabilities",
        title: "Capabilities",
        source: include_str!("../docs/capabilities.md"),
    },
    Page {
        slug: "webhooks",
        title: "Webhooks",
        source: include_str!("../docs/webhooks.md"),
    },
];

/// Renders `page` to HTML, or `NotFound` if no embedded page matches.
pub fn render(page: &str) -> AppResult<String> {
    PAGES
        .iter()
        .find(|p| p.slug == page)
        .map(|p| format!("<h1>{}</h1>\n{}", p.title, render_markdown(p.source)))
        .ok_or_else(|| AppError::NotFound(format!("no docs page '{page}'")))
}

pub fn list_pages() -> Vec<&'static str> {
    PAGES.iter().map(|p| p.slug).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_known_page() {
        let html = render("overview").unwrap();
        assert!(html.contains("<h1>Overview</h1>"));
    }

    #[test]
    fn unknown_page_is_not_found() {
        assert!(render("does-not-exist").is_err());
    }
}
