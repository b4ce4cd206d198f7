//! Shared admin-route plumbing: content negotiation and the identity/caps
//! extractors every handler pulls from request extensions (spec.md §4.4,
//! §6.3). The templated HTML dashboard is out of scope (spec.md §1), so
//! the HTML branch here renders a minimal inline page rather than a full
//! layout — see [`AppError`]'s own `IntoResponse` for the error-page half
//! of this split.

use axum::extract::OriginalUri;
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::authz::{CapList, Identity};

/// `Accept: application/json`, or a `.json` path suffix, selects the JSON
/// rendering; everything else falls back to a minimal HTML page
/// (spec.md §6.3 "HTML and JSON (via `Accept: application/json` or `.json`
/// suffix)").
pub fn wants_json(headers: &HeaderMap, uri: &axum::http::Uri) -> bool {
    if uri.path().ends_with(".json") {
        return true;
    }
    headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}

/// Renders `value` as JSON when the caller asked for it, or as a minimal
/// styled HTML page otherwise. `title` labels the HTML page only.
pub fn render<T: Serialize>(headers: &HeaderMap, uri: &axum::http::Uri, title: &str, value: &T) -> Response {
    if wants_json(headers, uri) {
        return Json(value).into_response();
    }
    let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());
    html_page(title, &body).into_response()
}

pub fn html_page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title} — tspages</title></head>\n\
         <body><h1>{title}</h1><pre>{escaped}</pre></body></html>\n",
        title = html_escape(title),
        escaped = html_escape(body),
    ))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Extracts the request path (with query string stripped) for wire-route
/// handlers that need to distinguish a `.json` suffix from the resource
/// path itself.
pub fn request_uri(uri: &OriginalUri) -> axum::http::Uri {
    uri.0.clone()
}

pub struct AuthCtx {
    pub identity: Identity,
    pub caps: CapList,
}

impl AuthCtx {
    pub fn from_extensions(extensions: &axum::http::Extensions) -> Self {
        Self {
            identity: extensions.get::<Identity>().cloned().unwrap_or_default(),
            caps: extensions.get::<CapList>().cloned().unwrap_or_default(),
        }
    }
}
