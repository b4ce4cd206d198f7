//! `GET /metrics` (SPEC_FULL.md §4.10, spec.md §6.3): Prometheus text
//! scrape, gated on the `metrics` or `admin` capability.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};

use crate::error::{AppError, AppResult};
use crate::AppContext;

use super::common::AuthCtx;

pub async fn metrics(
    State(ctx): State<Arc<AppContext>>,
    extensions: axum::http::Extensions,
) -> AppResult<Response> {
    let auth = AuthCtx::from_extensions(&extensions);
    if !auth.caps.can_scrape_metrics() {
        return Err(AppError::Forbidden);
    }
    let running_sites = ctx.hosts.running_count().await as u64;
    let body = ctx.metrics.render_prometheus(running_sites);
    Ok((
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
