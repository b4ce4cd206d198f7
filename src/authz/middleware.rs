//! Attaches [`Identity`] and [`CapList`] to every request by consulting
//! the mesh provider's `WhoIs` for the remote peer (spec.md §4.4).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::mesh::{parse_capabilities, MeshProvider};
use super::{CapList, Identity};
use crate::error::AppError;

#[derive(Clone)]
pub struct AuthContext {
    pub mesh: Arc<dyn MeshProvider>,
    pub capability_name: String,
}

/// Parsing failure is a hard 403 (spec.md §4.4: "Parsing failure → 403").
/// A peer the mesh provider doesn't recognize, or one with no capability
/// blobs at all, still proceeds with an empty `CapList` — handlers decide
/// whether that 403s.
pub async fn authenticate(
    State(ctx): State<AuthContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let who = ctx
        .mesh
        .who_is(addr.ip())
        .await
        .map_err(|_| AppError::Forbidden)?;

    let (identity, caps) = match who {
        Some(response) => {
            let caps = parse_capabilities(&response, &ctx.capability_name).map_err(|_| AppError::Forbidden)?;
            (response.identity, caps)
        }
        None => (Identity::default(), Vec::new()),
    };

    request.extensions_mut().insert(identity);
    request.extensions_mut().insert(CapList(caps));
    Ok(next.run(request).await)
}
