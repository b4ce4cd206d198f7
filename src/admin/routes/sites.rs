//! `/sites` endpoints (spec.md §6.3): create, list, and fetch one site.
//! Site deletion lives in [`super::deployments`] since it shares the
//! `/deploy/{site}` path prefix on the wire.

use std::sync::Arc;

use axum::extract::{OriginalUri, Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::AppContext;

use super::common::{render, AuthCtx};

#[derive(Debug, Deserialize)]
pub struct CreateSiteRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct SiteSummary {
    pub name: String,
    pub active_deployment_id: Option<String>,
    pub public: bool,
}

pub async fn create_site(
    State(ctx): State<Arc<AppContext>>,
    extensions: axum::http::Extensions,
    Json(req): Json<CreateSiteRequest>,
) -> AppResult<Json<SiteSummary>> {
    let auth = AuthCtx::from_extensions(&extensions);
    if !auth.caps.can_create_site(&req.name) {
        return Err(AppError::Forbidden);
    }
    ctx.store.create_site(&req.name).await?;
    ctx.hosts.ensure_server(&req.name, ctx.config.defaults.public).await?;
    Ok(Json(SiteSummary {
        name: req.name,
        active_deployment_id: None,
        public: ctx.config.defaults.public,
    }))
}

pub async fn list_sites(
    State(ctx): State<Arc<AppContext>>,
    extensions: axum::http::Extensions,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let auth = AuthCtx::from_extensions(&extensions);
    let mut summaries = Vec::new();
    for name in ctx.store.list_sites().await? {
        if !auth.caps.can_view(&name) {
            continue;
        }
        summaries.push(site_summary(&ctx, &name).await?);
    }
    Ok(render(&headers, &uri, "Sites", &summaries))
}

pub async fn get_site(
    State(ctx): State<Arc<AppContext>>,
    Path(site): Path<String>,
    extensions: axum::http::Extensions,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let auth = AuthCtx::from_extensions(&extensions);
    if !auth.caps.can_view(&site) {
        return Err(AppError::Forbidden);
    }
    if !ctx.store.site_exists(&site) {
        return Err(AppError::NotFound(format!("site '{site}' not found")));
    }
    let summary = site_summary(&ctx, &site).await?;
    Ok(render(&headers, &uri, &site, &summary))
}

async fn site_summary(ctx: &AppContext, name: &str) -> AppResult<SiteSummary> {
    let active_deployment_id = ctx.store.current_deployment(name).await?;
    let cfg = ctx.config.defaults.merge(&ctx.store.read_current_site_config(name).await?);
    Ok(SiteSummary {
        name: name.to_string(),
        active_deployment_id,
        public: cfg.public,
    })
}
