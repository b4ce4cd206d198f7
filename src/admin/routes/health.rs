//! `/healthz` endpoints (SPEC_FULL.md §4.10, spec.md §6.3): liveness for
//! the whole daemon and per-site endpoint health.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::AppContext;

use super::common::AuthCtx;

#[derive(Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub running_sites: usize,
}

/// No-auth platform health (spec.md §6.3).
pub async fn healthz(State(ctx): State<Arc<AppContext>>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        uptime_secs: ctx.metrics.uptime_secs(),
        running_sites: ctx.hosts.running_count().await,
    })
}

#[derive(Serialize)]
pub struct SiteHealthBody {
    pub site: String,
    pub status: &'static str,
    pub active_deployment_id: Option<String>,
}

/// `view`-scoped: checks the site has an active deployment and a running
/// mesh endpoint (spec.md §6.3 "Site health").
pub async fn site_healthz(
    State(ctx): State<Arc<AppContext>>,
    Path(site): Path<String>,
    extensions: axum::http::Extensions,
) -> AppResult<(StatusCode, Json<SiteHealthBody>)> {
    let auth = AuthCtx::from_extensions(&extensions);
    if !auth.caps.can_view(&site) {
        return Err(AppError::Forbidden);
    }
    if !ctx.store.site_exists(&site) {
        return Err(AppError::NotFound(format!("site '{site}' not found")));
    }

    let active_deployment_id = ctx.store.current_deployment(&site).await?;
    let running = ctx.hosts.is_running(&site).await;
    let healthy = active_deployment_id.is_some() && running;

    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    Ok((
        status,
        Json(SiteHealthBody {
            site,
            status: if healthy { "ok" } else { "degraded" },
            active_deployment_id,
        }),
    ))
}
