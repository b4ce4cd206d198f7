//! Multi-host manager: one mesh endpoint per site plus one for the admin
//! control plane (spec.md §4.5). The server map is guarded by a single
//! mutex; starting a new endpoint happens outside the lock so a slow
//! listener bind never blocks unrelated `EnsureServer`/`StopServer` calls.

pub mod endpoint;
pub mod site_server;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use endpoint::SiteEndpoint;

pub type StartSiteFuture = Pin<Box<dyn Future<Output = AppResult<SiteEndpoint>> + Send>>;

/// Pluggable endpoint starter — swapped out for a no-op in tests so the
/// manager's bookkeeping can be exercised without a real mesh listener.
pub trait StartSite: Send + Sync {
    fn start(&self, site: String, public: bool) -> StartSiteFuture;
}

impl<F> StartSite for F
where
    F: Fn(String, bool) -> StartSiteFuture + Send + Sync,
{
    fn start(&self, site: String, public: bool) -> StartSiteFuture {
        (self)(site, public)
    }
}

pub struct MultiHostManager {
    servers: Mutex<HashMap<String, SiteEndpoint>>,
    max_sites: usize,
    start_site: Arc<dyn StartSite>,
}

impl MultiHostManager {
    pub fn new(max_sites: usize, start_site: Arc<dyn StartSite>) -> Self {
        Self {
            servers: Mutex::new(HashMap::new()),
            max_sites,
            start_site,
        }
    }

    /// Starts an endpoint for `site` if none is running, or restarts it if
    /// the `public` flag changed since it was last started (spec.md §4.5
    /// "restart-on-config-change"). Double-checked locking: the fast-path
    /// check and the final install both happen under the lock; the slow
    /// start happens outside it.
    pub async fn ensure_server(&self, site: &str, public: bool) -> AppResult<()> {
        {
            let servers = self.servers.lock().await;
            if let Some(existing) = servers.get(site) {
                if existing.public == public {
                    return Ok(());
                }
            } else if servers.len() >= self.max_sites {
                return Err(AppError::Unavailable(format!(
                    "max_sites ({}) reached",
                    self.max_sites
                )));
            }
        }

        let new_endpoint = self.start_site.start(site.to_string(), public).await?;

        let mut servers = self.servers.lock().await;
        match servers.get(site) {
            Some(existing) if existing.public == public => {
                // Another caller won the race while we were starting.
                new_endpoint.close().await;
            }
            Some(_stale) => {
                let stale = servers.remove(site).expect("checked Some above");
                servers.insert(site.to_string(), new_endpoint);
                drop(servers);
                stale.close().await;
            }
            None if servers.len() >= self.max_sites => {
                // Limit was reached while we were starting.
                drop(servers);
                new_endpoint.close().await;
                return Err(AppError::Unavailable(format!(
                    "max_sites ({}) reached",
                    self.max_sites
                )));
            }
            None => {
                servers.insert(site.to_string(), new_endpoint);
            }
        }

        info!(site, public, "endpoint ensured");
        Ok(())
    }

    pub async fn stop_server(&self, site: &str) {
        let removed = {
            let mut servers = self.servers.lock().await;
            servers.remove(site)
        };
        if let Some(endpoint) = removed {
            endpoint.close().await;
            info!(site, "endpoint stopped");
        }
    }

    /// At startup: `EnsureServer` every `(site, public)` pair discovered on
    /// disk. Failures for one site are logged and do not block the rest.
    pub async fn start_existing_sites(&self, sites: &[(String, bool)]) {
        for (site, public) in sites {
            if let Err(e) = self.ensure_server(site, *public).await {
                warn!(site, err = %e, "failed to start endpoint at startup");
            }
        }
    }

    pub async fn is_running(&self, site: &str) -> bool {
        self.servers.lock().await.contains_key(site)
    }

    pub async fn running_count(&self) -> usize {
        self.servers.lock().await.len()
    }

    pub async fn close(&self) {
        let all: Vec<SiteEndpoint> = {
            let mut servers = self.servers.lock().await;
            servers.drain().map(|(_, v)| v).collect()
        };
        for endpoint in all {
            endpoint.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_starter(count: Arc<AtomicUsize>) -> Arc<dyn StartSite> {
        Arc::new(move |site: String, public: bool| -> StartSiteFuture {
            let count = count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                let (tx, rx) = tokio::sync::oneshot::channel();
                let handle = tokio::spawn(async move {
                    let _ = rx.await;
                });
                Ok(SiteEndpoint::new(site, public, handle, tx))
            })
        })
    }

    #[tokio::test]
    async fn ensure_server_starts_once_for_same_public_flag() {
        let starts = Arc::new(AtomicUsize::new(0));
        let manager = MultiHostManager::new(10, counting_starter(starts.clone()));
        manager.ensure_server("docs", false).await.unwrap();
        manager.ensure_server("docs", false).await.unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(manager.is_running("docs").await);
    }

    #[tokio::test]
    async fn ensure_server_restarts_on_public_flag_change() {
        let starts = Arc::new(AtomicUsize::new(0));
        let manager = MultiHostManager::new(10, counting_starter(starts.clone()));
        manager.ensure_server("docs", false).await.unwrap();
        manager.ensure_server("docs", true).await.unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        assert!(manager.is_running("docs").await);
    }

    #[tokio::test]
    async fn respects_max_sites() {
        let starts = Arc::new(AtomicUsize::new(0));
        let manager = MultiHostManager::new(1, counting_starter(starts.clone()));
        manager.ensure_server("a", false).await.unwrap();
        let err = manager.ensure_server("b", false).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(manager.running_count().await, 1);
    }

    #[tokio::test]
    async fn stop_server_removes_and_closes() {
        let starts = Arc::new(AtomicUsize::new(0));
        let manager = MultiHostManager::new(10, counting_starter(starts));
        manager.ensure_server("docs", false).await.unwrap();
        manager.stop_server("docs").await;
        assert!(!manager.is_running("docs").await);
    }

    #[tokio::test]
    async fn close_stops_everything() {
        let starts = Arc::new(AtomicUsize::new(0));
        let manager = MultiHostManager::new(10, counting_starter(starts));
        manager.ensure_server("a", false).await.unwrap();
        manager.ensure_server("b", false).await.unwrap();
        manager.close().await;
        assert_eq!(manager.running_count().await, 0);
    }
}
