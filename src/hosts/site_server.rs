//! The per-site `axum` `Router` served by one mesh endpoint (spec.md §4.5,
//! §4.6). Runs [`pipeline::resolve`] to decide what to do with a request,
//! then hands the actual bytes off to `tower_http`'s `ServeFile` for range
//! support, content-type sniffing, and `Cache-Control` (pipeline step 9),
//! and records the served status with the analytics recorder (step 11).

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{info_span, Instrument};

use crate::analytics::AnalyticsEvent;
use crate::authz::middleware::{authenticate, AuthContext};
use crate::authz::{CapList, Identity};
use crate::config::site::SiteConfig;
use crate::pipeline::{self, PipelineInput, Resolution};
use crate::AppContext;

#[derive(Clone)]
struct SiteState {
    ctx: Arc<AppContext>,
    site: String,
}

/// Builds the `Router` served for `site` — a single wildcard GET route
/// behind the shared authentication middleware, mirroring the teacher's
/// thin-handler-over-shared-state shape in `rest/mod.rs`.
pub fn build_site_router(ctx: Arc<AppContext>, site: String) -> Router {
    let auth_ctx = AuthContext {
        mesh: ctx.mesh.clone(),
        capability_name: ctx.config.capability_name.clone(),
    };
    let state = SiteState { ctx, site };

    Router::new()
        .route("/{*path}", get(serve_path))
        .route("/", get(serve_root))
        .route_layer(axum::middleware::from_fn_with_state(auth_ctx, authenticate))
        .with_state(state)
}

async fn serve_root(state: State<SiteState>, connect: ConnectInfo<std::net::SocketAddr>, req: Request) -> Response {
    serve(state, connect, "/".to_string(), req).await
}

async fn serve_path(
    state: State<SiteState>,
    connect: ConnectInfo<std::net::SocketAddr>,
    axum::extract::Path(path): axum::extract::Path<String>,
    req: Request,
) -> Response {
    serve(state, connect, format!("/{path}"), req).await
}

async fn serve(
    State(state): State<SiteState>,
    ConnectInfo(_addr): ConnectInfo<std::net::SocketAddr>,
    path: String,
    req: Request,
) -> Response {
    let span = info_span!("site_request", site = %state.site, path = %path);
    async move {
        let identity = req.extensions().get::<Identity>().cloned().unwrap_or_default();
        let caps = req.extensions().get::<CapList>().cloned().unwrap_or_default();
        let if_none_match = req
            .headers()
            .get(axum::http::header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let input = PipelineInput {
            site: &state.site,
            path: &path,
            can_view: caps.can_view(&state.site),
            if_none_match: if_none_match.as_deref(),
        };

        let resolution = match pipeline::resolve(&state.ctx.store, &state.ctx.config.defaults, &input).await {
            Ok(r) => r,
            Err(e) => return e.into_response(),
        };

        let (response, status) = render_resolution(resolution, &req).await;
        state.ctx.metrics.inc_requests(&state.site);
        record_analytics(&state.ctx, &state.site, &path, status, identity).await;
        response
    }
    .instrument(span)
    .await
}

async fn render_resolution(resolution: Resolution, req: &Request) -> (Response, u16) {
    match resolution {
        Resolution::Forbidden => (StatusCode::FORBIDDEN.into_response(), 403),
        Resolution::Placeholder => (placeholder_page().into_response(), 200),
        Resolution::NotModified => (StatusCode::NOT_MODIFIED.into_response(), 304),
        Resolution::Redirect { location, status } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::MOVED_PERMANENTLY);
            let mut response = status.into_response();
            if let Ok(value) = HeaderValue::from_str(&location) {
                response.headers_mut().insert(axum::http::header::LOCATION, value);
            }
            (response, status.as_u16())
        }
        Resolution::Serve { fs_path, etag, extra_headers } => {
            let mut response = serve_file(&fs_path, req).await;
            apply_etag_and_headers(&mut response, &etag, &extra_headers);
            let status = response.status().as_u16();
            (response, status)
        }
        Resolution::NotFound { custom_page, extra_headers } => {
            let mut response = match custom_page {
                Some(path) => serve_file(&path, req).await,
                None => StatusCode::NOT_FOUND.into_response(),
            };
            *response.status_mut() = StatusCode::NOT_FOUND;
            apply_extra_headers(&mut response, &extra_headers);
            (response, 404)
        }
    }
}

/// Hands the file off to `ServeFile` for range/content-type/`Last-Modified`
/// handling; conditional-GET is already resolved by the pipeline before
/// this is reached.
async fn serve_file(path: &std::path::Path, req: &Request) -> Response {
    let mut passthrough = Request::new(Body::empty());
    *passthrough.method_mut() = axum::http::Method::GET;
    if let Some(range) = req.headers().get(axum::http::header::RANGE) {
        passthrough.headers_mut().insert(axum::http::header::RANGE, range.clone());
    }

    let result: Result<Response, Infallible> = ServeFile::new(path).oneshot(passthrough).await;
    match result {
        Ok(response) => response.into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn apply_etag_and_headers(response: &mut Response, etag: &str, extra: &std::collections::HashMap<String, String>) {
    if let Ok(value) = HeaderValue::from_str(etag) {
        response.headers_mut().insert(axum::http::header::ETAG, value);
    }
    apply_extra_headers(response, extra);
}

fn apply_extra_headers(response: &mut Response, extra: &std::collections::HashMap<String, String>) {
    for (name, value) in extra {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            response.headers_mut().insert(name, value);
        }
    }
}

fn placeholder_page() -> axum::response::Html<&'static str> {
    axum::response::Html(
        "<!DOCTYPE html><html><head><title>tspages</title></head>\
         <body><h1>No deployment yet</h1><p>This site has no active deployment.</p></body></html>",
    )
}

async fn record_analytics(ctx: &AppContext, site: &str, path: &str, status: u16, identity: Identity) {
    let cfg: SiteConfig = match ctx.store.read_current_site_config(site).await {
        Ok(raw) => ctx.config.defaults.merge(&raw),
        Err(_) => ctx.config.defaults.clone(),
    };
    if cfg.analytics {
        ctx.analytics.record(AnalyticsEvent::new(site, path, status, identity));
    }
}
