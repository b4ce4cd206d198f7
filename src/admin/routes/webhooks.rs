//! `/webhooks` endpoints (spec.md §4.7, §6.3): listing and manual resend.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::webhook;
use crate::AppContext;

use super::common::{render, AuthCtx};

const DEFAULT_LIMIT: i64 = 50;

pub async fn list_all(
    State(ctx): State<Arc<AppContext>>,
    extensions: axum::http::Extensions,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    list_for_site(ctx, None, extensions, query, headers, uri).await
}

pub async fn list_for_path_site(
    State(ctx): State<Arc<AppContext>>,
    Path(site): Path<String>,
    extensions: axum::http::Extensions,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    list_for_site(ctx, Some(site), extensions, query, headers, uri).await
}

async fn list_for_site(
    ctx: Arc<AppContext>,
    site: Option<String>,
    extensions: axum::http::Extensions,
    query: HashMap<String, String>,
    headers: HeaderMap,
    uri: axum::http::Uri,
) -> AppResult<Response> {
    let auth = AuthCtx::from_extensions(&extensions);
    if let Some(site) = &site {
        if !auth.caps.is_admin(site) {
            return Err(AppError::Forbidden);
        }
    } else if !auth.caps.has_admin_cap() {
        return Err(AppError::Forbidden);
    }

    let succeeded_only = query.get("succeeded").and_then(|v| v.parse::<bool>().ok());
    let limit = query
        .get("limit")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(DEFAULT_LIMIT);

    let summaries = ctx
        .webhook_ledger
        .list_summaries(site.as_deref(), query.get("event").map(String::as_str), succeeded_only, limit, 0)
        .await?;
    Ok(render(&headers, &uri, "Webhooks", &summaries))
}

pub async fn get_one(
    State(ctx): State<Arc<AppContext>>,
    Path(webhook_id): Path<String>,
    extensions: axum::http::Extensions,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
) -> AppResult<Response> {
    let auth = AuthCtx::from_extensions(&extensions);
    let attempts = ctx.webhook_ledger.attempts_for(&webhook_id).await?;
    let Some(first) = attempts.first() else {
        return Err(AppError::NotFound(format!("no delivery history for '{webhook_id}'")));
    };
    if !auth.caps.is_admin(&first.site) {
        return Err(AppError::Forbidden);
    }
    Ok(render(&headers, &uri, &webhook_id, &attempts))
}

pub async fn retry(
    State(ctx): State<Arc<AppContext>>,
    Path(webhook_id): Path<String>,
    extensions: axum::http::Extensions,
) -> AppResult<Json<serde_json::Value>> {
    let auth = AuthCtx::from_extensions(&extensions);
    let last = ctx
        .webhook_ledger
        .last_attempt(&webhook_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no delivery history for '{webhook_id}'")))?;
    if !auth.caps.is_admin(&last.site) {
        return Err(AppError::Forbidden);
    }

    let cfg = ctx
        .config
        .defaults
        .merge(&ctx.store.read_current_site_config(&last.site).await?);
    let attempt = webhook::resend(&ctx.webhook_ledger, &webhook_id, &cfg.webhook_secret).await?;
    Ok(Json(serde_json::json!({ "webhook_id": webhook_id, "attempt": attempt })))
}
