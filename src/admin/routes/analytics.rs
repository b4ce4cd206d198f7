//! `/analytics` endpoints (SPEC_FULL.md §4.8, spec.md §6.3): raw event
//! listing and hour/day aggregation.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;

use crate::analytics::aggregate::{self, Bucket};
use crate::analytics;
use crate::error::{AppError, AppResult};
use crate::AppContext;

use super::common::{render, AuthCtx};

const DEFAULT_LIMIT: i64 = 100;

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
    match &site {
        Some(site) if !auth.caps.can_view(site) => return Err(AppError::Forbidden),
        None if !auth.caps.has_admin_cap() => return Err(AppError::Forbidden),
        _ => {}
    }

    let limit = query
        .get("limit")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(DEFAULT_LIMIT);

    if let Some(bucket) = query.get("bucket") {
        let bucket = Bucket::parse(bucket)?;
        let since = query.get("since").map(String::as_str).unwrap_or("1970-01-01T00:00:00Z");
        let until = query.get("until").map(String::as_str).unwrap_or("9999-12-31T00:00:00Z");
        let rows = aggregate::query(&ctx.db, site.as_deref(), bucket, since, until).await?;
        return Ok(render(&headers, &uri, "Analytics", &rows));
    }

    let rows = analytics::list_events(&ctx.db, site.as_deref(), limit).await?;
    Ok(render(&headers, &uri, "Analytics", &rows))
}
