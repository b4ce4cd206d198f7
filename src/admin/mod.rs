//! Admin control plane (spec.md §6.3, SPEC_FULL.md §4.9): one `axum`
//! `Router`, composed from per-resource route modules the way the
//! teacher's `rest/mod.rs` composes `build_router`.

pub mod routes;

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::authz::middleware::{authenticate, AuthContext};
use crate::AppContext;

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let auth_ctx = AuthContext {
        mesh: ctx.mesh.clone(),
        capability_name: ctx.config.capability_name.clone(),
    };

    Router::new()
        .route("/healthz", get(routes::health::healthz))
        .route("/sites/{site}/healthz", get(routes::health::site_healthz))
        .route("/metrics", get(routes::metrics::metrics))
        .route("/docs/{page}", get(routes::docs::page))
        .route("/feed.atom", get(routes::feeds::all_sites))
        .route("/sites/{site}/feed.atom", get(routes::feeds::one_site))
        .route("/sites", post(routes::sites::create_site).get(routes::sites::list_sites))
        .route("/sites/{site}", get(routes::sites::get_site))
        .route("/sites/{site}/deployments", get(routes::deployments::list_deployments))
        .route("/sites/{site}/deployments/{id}", get(routes::deployments::get_deployment))
        .route("/deployments", get(routes::deployments::list_all_deployments))
        .route(
            "/deploy/{site}",
            put(routes::deployments::upload)
                .post(routes::deployments::upload)
                .get(routes::deployments::list_deployments)
                .delete(routes::deployments::delete_site),
        )
        .route("/deploy/{site}/deployments", delete(routes::deployments::delete_inactive))
        .route(
            "/deploy/{site}/{id}",
            put(routes::deployments::upload_variant).delete(routes::deployments::delete_deployment),
        )
        .route("/deploy/{site}/{id}/activate", post(routes::deployments::activate))
        .route("/webhooks", get(routes::webhooks::list_all))
        .route("/webhooks/{id}", get(routes::webhooks::get_one))
        .route("/webhooks/{id}/retry", post(routes::webhooks::retry))
        .route("/sites/{site}/webhooks", get(routes::webhooks::list_for_path_site))
        .route("/analytics", get(routes::analytics::list_all))
        .route("/sites/{site}/analytics", get(routes::analytics::list_for_path_site))
        .route_layer(axum::middleware::from_fn_with_state(auth_ctx, authenticate))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
