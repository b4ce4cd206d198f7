//! `/feed.atom` endpoints (SPEC_FULL.md §4.11, spec.md §6.3).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use crate::error::{AppError, AppResult};
use crate::feeds;
use crate::AppContext;

use super::common::AuthCtx;

pub async fn all_sites(
    State(ctx): State<Arc<AppContext>>,
    extensions: axum::http::Extensions,
) -> AppResult<Response> {
    let auth = AuthCtx::from_extensions(&extensions);
    let mut sites = Vec::new();
    for name in ctx.store.list_sites().await? {
        if auth.caps.can_view(&name) {
            sites.push(name);
        }
    }
    render_feed(&ctx, &sites).await
}

pub async fn one_site(
    State(ctx): State<Arc<AppContext>>,
    Path(site): Path<String>,
    extensions: axum::http::Extensions,
) -> AppResult<Response> {
    let auth = AuthCtx::from_extensions(&extensions);
    if !auth.caps.can_view(&site) {
        return Err(AppError::Forbidden);
    }
    render_feed(&ctx, &[site]).await
}

async fn render_feed(ctx: &AppContext, sites: &[String]) -> AppResult<Response> {
    let base_url = format!("https://{}.{}", ctx.config.hostname, ctx.config.dns_suffix);
    let feed = feeds::build(&ctx.store, sites, &base_url).await?;
    Ok((
        [(axum::http::header::CONTENT_TYPE, "application/atom+xml")],
        feed.to_string(),
    )
        .into_response())
}
