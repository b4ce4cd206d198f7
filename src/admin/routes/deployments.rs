//! `/deploy/{site}` endpoints (spec.md §4.3, §6.3): upload, list, activate,
//! and delete deployments, plus site deletion (it shares this path prefix
//! on the wire: `DELETE /deploy/{site}` is "delete site", admin-scoped).

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::ingest::{self, IngestHints};
use crate::store::manifest::Manifest;
use crate::webhook::WebhookEvent;
use crate::AppContext;

use super::common::{render, AuthCtx};

#[derive(Debug, Serialize)]
pub struct DeployResponse {
    pub deployment_id: String,
    pub site: String,
    pub url: String,
    pub size_bytes: u64,
}

/// `PUT/POST /deploy/{site}` and `PUT /deploy/{site}/{filename}` share this
/// handler; `filename` (when present) only supplies a format hint.
pub async fn upload(
    State(ctx): State<Arc<AppContext>>,
    Path(site): Path<String>,
    extensions: axum::http::Extensions,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<DeployResponse>> {
    upload_with_filename(ctx, site, None, extensions, query, headers, body).await
}

pub async fn upload_variant(
    State(ctx): State<Arc<AppContext>>,
    Path((site, filename)): Path<(String, String)>,
    extensions: axum::http::Extensions,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<DeployResponse>> {
    upload_with_filename(ctx, site, Some(filename), extensions, query, headers, body).await
}

async fn upload_with_filename(
    ctx: Arc<AppContext>,
    site: String,
    filename: Option<String>,
    extensions: axum::http::Extensions,
    query: HashMap<String, String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<DeployResponse>> {
    let auth = AuthCtx::from_extensions(&extensions);
    if !auth.caps.can_deploy(&site) {
        return Err(AppError::Forbidden);
    }
    if !ctx.store.site_exists(&site) {
        return Err(AppError::NotFound(format!("site '{site}' not found")));
    }

    let max_bytes = ctx.config.max_upload_mb.saturating_mul(1024 * 1024);
    if body.len() as u64 > max_bytes {
        return Err(AppError::TooLarge);
    }

    let hints = IngestHints {
        declared_content_type: headers
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        filename,
        format_query: query.get("format").cloned(),
    };

    let id = ctx.store.new_deployment_id();
    let content_dir = ctx.store.create_deployment(&site, &id).await?;
    let result = ingest::ingest(&body, &hints, &content_dir, max_bytes).await?;

    if let Some(cfg) = &result.site_config {
        ctx.store.write_site_config(&site, &id, cfg).await?;
    }

    // Validation runs on the merged value and fails the deploy if invalid
    // (spec.md §4.1), independent of whether this upload also activates —
    // an `?activate=false` upload must not be marked complete carrying an
    // invalid `tspages.toml`.
    let raw_cfg = result.site_config.clone().unwrap_or_default();
    ctx.config.defaults.merge(&raw_cfg).validate()?;

    let manifest = Manifest {
        site: site.clone(),
        id: id.clone(),
        created_at: chrono::Utc::now(),
        created_by: auth.identity.login_name.clone(),
        created_by_avatar: auth.identity.profile_pic_url.clone(),
        size_bytes: result.bytes_written,
    };

    // The manifest -> .complete -> activate sequence must be observed as
    // one step per site (spec.md §9), so it is held under this site's
    // deploy lock rather than left to the Store's per-call atomicity.
    let _deploy_guard = ctx.deploy_locks.acquire(&site).await;
    ctx.store.write_manifest(&site, &id, &manifest).await?;
    ctx.store.mark_complete(&site, &id).await?;
    ctx.metrics.inc_deploys();

    let activate = query.get("activate").map(|v| v.as_str()) != Some("false");
    if activate {
        activate_deployment_internal(&ctx, &site, &id).await?;
    }

    let site_cfg = ctx
        .config
        .defaults
        .merge(&ctx.store.read_current_site_config(&site).await?);
    ctx.webhooks.fire(WebhookEvent {
        event: "deploy".to_string(),
        site: site.clone(),
        config: site_cfg,
        data: serde_json::json!({ "deployment_id": id, "size_bytes": result.bytes_written }),
    });

    Ok(Json(DeployResponse {
        deployment_id: id,
        site: site.clone(),
        url: format!("https://{site}.{}", ctx.config.dns_suffix),
        size_bytes: result.bytes_written,
    }))
}

pub async fn list_deployments(
    State(ctx): State<Arc<AppContext>>,
    Path(site): Path<String>,
    extensions: axum::http::Extensions,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let auth = AuthCtx::from_extensions(&extensions);
    if !auth.caps.can_deploy(&site) && !auth.caps.can_view(&site) {
        return Err(AppError::Forbidden);
    }
    let deployments = ctx.store.list_deployments(&site).await?;
    Ok(render(&headers, &uri, &format!("{site} deployments"), &deployments))
}

/// `GET /deployments` (spec.md §6.3): every deployment across every site
/// the caller can at least view.
pub async fn list_all_deployments(
    State(ctx): State<Arc<AppContext>>,
    extensions: axum::http::Extensions,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let auth = AuthCtx::from_extensions(&extensions);
    let mut all = Vec::new();
    for site in ctx.store.list_sites().await? {
        if !auth.caps.can_view(&site) {
            continue;
        }
        all.extend(ctx.store.list_deployments(&site).await?);
    }
    Ok(render(&headers, &uri, "Deployments", &all))
}

pub async fn get_deployment(
    State(ctx): State<Arc<AppContext>>,
    Path((site, id)): Path<(String, String)>,
    extensions: axum::http::Extensions,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let auth = AuthCtx::from_extensions(&extensions);
    if !auth.caps.can_view(&site) {
        return Err(AppError::Forbidden);
    }
    let deployments = ctx.store.list_deployments(&site).await?;
    let found = deployments
        .into_iter()
        .find(|d| d.manifest.id == id)
        .ok_or_else(|| AppError::NotFound(format!("deployment '{id}' not found")))?;
    Ok(render(&headers, &uri, &id, &found))
}

pub async fn activate(
    State(ctx): State<Arc<AppContext>>,
    Path((site, id)): Path<(String, String)>,
    extensions: axum::http::Extensions,
) -> AppResult<Json<serde_json::Value>> {
    let auth = AuthCtx::from_extensions(&extensions);
    if !auth.caps.can_deploy(&site) {
        return Err(AppError::Forbidden);
    }
    let _deploy_guard = ctx.deploy_locks.acquire(&site).await;
    activate_deployment_internal(&ctx, &site, &id).await?;
    Ok(Json(serde_json::json!({ "site": site, "deployment_id": id, "active": true })))
}

async fn activate_deployment_internal(ctx: &AppContext, site: &str, id: &str) -> AppResult<()> {
    ctx.store.activate_deployment(site, id).await?;
    ctx.metrics.inc_activations();

    let cfg = ctx.config.defaults.merge(&ctx.store.read_current_site_config(site).await?);
    cfg.validate()?;
    ctx.hosts.ensure_server(site, cfg.public).await?;

    ctx.webhooks.fire(WebhookEvent {
        event: "activate".to_string(),
        site: site.to_string(),
        config: cfg,
        data: serde_json::json!({ "deployment_id": id }),
    });
    Ok(())
}

pub async fn delete_deployment(
    State(ctx): State<Arc<AppContext>>,
    Path((site, id)): Path<(String, String)>,
    extensions: axum::http::Extensions,
) -> AppResult<Json<serde_json::Value>> {
    let auth = AuthCtx::from_extensions(&extensions);
    if !auth.caps.can_deploy(&site) {
        return Err(AppError::Forbidden);
    }
    ctx.store.delete_deployment(&site, &id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

pub async fn delete_inactive(
    State(ctx): State<Arc<AppContext>>,
    Path(site): Path<String>,
    extensions: axum::http::Extensions,
) -> AppResult<Json<serde_json::Value>> {
    let auth = AuthCtx::from_extensions(&extensions);
    if !auth.caps.can_deploy(&site) {
        return Err(AppError::Forbidden);
    }
    let removed = ctx.store.cleanup_inactive(&site, 0).await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

pub async fn delete_site(
    State(ctx): State<Arc<AppContext>>,
    Path(site): Path<String>,
    extensions: axum::http::Extensions,
) -> AppResult<Json<serde_json::Value>> {
    let auth = AuthCtx::from_extensions(&extensions);
    if !auth.caps.can_delete_site(&site) {
        return Err(AppError::Forbidden);
    }
    ctx.hosts.stop_server(&site).await;
    ctx.store.delete_site(&site).await?;
    Ok(Json(serde_json::json!({ "deleted": site })))
}
