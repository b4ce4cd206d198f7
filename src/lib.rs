//! tspages — private static-site hosting platform for a mesh VPN
//! (spec.md §1). This crate implements the deployment store, the
//! capability-based authorization core, the archive ingestion pipeline,
//! the per-site multi-host manager, the per-site request pipeline, and the
//! webhook dispatcher; it wires them together behind an admin control
//! plane and a set of per-site mesh endpoints.

pub mod admin;
pub mod analytics;
pub mod authz;
pub mod config;
pub mod db;
pub mod deploy_lock;
pub mod docs;
pub mod error;
pub mod feeds;
pub mod hosts;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod store;
pub mod webhook;

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use authz::mesh::MeshProvider;
use config::ServerConfig;
use db::Database;
use deploy_lock::DeployLocks;
use hosts::MultiHostManager;
use metrics::DaemonMetrics;
use store::Store;
use webhook::ledger::Ledger;
use webhook::WebhookDispatcher;

/// Process-wide shared state handed to every admin route and background
/// task (SPEC_FULL.md glossary `AppContext`), modeled on the teacher's
/// `AppContext` in `lib.rs`.
pub struct AppContext {
    pub config: ServerConfig,
    pub store: Store,
    pub db: Database,
    pub analytics: analytics::AnalyticsRecorder,
    pub webhooks: WebhookDispatcher,
    pub webhook_ledger: Arc<Ledger>,
    pub hosts: Arc<MultiHostManager>,
    pub metrics: Arc<DaemonMetrics>,
    pub mesh: Arc<dyn MeshProvider>,
    /// Serializes the manifest -> `.complete` -> activate sequence per
    /// site (spec.md §9); acquired by the deploy and activate handlers,
    /// never by the Store itself.
    pub deploy_locks: DeployLocks,
    pub started_at: Instant,
}

impl AppContext {
    /// Assembles every component from a loaded [`ServerConfig`] and an
    /// already-constructed [`MultiHostManager`] (the manager needs its
    /// `start_site` closure wired against this same context, so the
    /// caller builds it after constructing everything else — see
    /// `main::run_server`).
    pub async fn build(
        config: ServerConfig,
        mesh: Arc<dyn MeshProvider>,
        hosts: Arc<MultiHostManager>,
    ) -> anyhow::Result<Arc<Self>> {
        let store = Store::new(&config.data_dir);
        let db = Database::open(&config.data_dir).await?;
        let metrics = Arc::new(DaemonMetrics::new());
        let analytics = analytics::AnalyticsRecorder::spawn(db.clone(), metrics.clone());
        let webhooks = WebhookDispatcher::spawn(db.clone(), metrics.clone());
        let webhook_ledger = Arc::new(Ledger::new(db.clone()));

        let removed = store.cleanup_orphans().await?;
        if removed > 0 {
            info!(removed, "startup orphan cleanup finished");
        }

        Ok(Arc::new(Self {
            config,
            store,
            db,
            analytics,
            webhooks,
            webhook_ledger,
            hosts,
            metrics,
            mesh,
            deploy_locks: DeployLocks::new(),
            started_at: Instant::now(),
        }))
    }
}
