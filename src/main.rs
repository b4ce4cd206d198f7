//! `tspages` binary entry point: CLI parsing, logging setup, server
//! bootstrap, and graceful shutdown (SPEC_FULL.md §6.6), mirroring the
//! teacher's implicit-default-subcommand shape in `daemon/src/main.rs`
//! (`Some(Command::Serve) | None` both run the server).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tokio::sync::oneshot;
use tracing::{info, warn, Instrument};

use tspages::authz::mesh::{DevMeshProvider, MeshProvider};
use tspages::config::ServerConfig;
use tspages::hosts::endpoint::SiteEndpoint;
use tspages::hosts::{site_server, MultiHostManager, StartSite, StartSiteFuture};
use tspages::AppContext;

#[derive(Parser)]
#[command(name = "tspages", about = "Private static-site hosting platform for a mesh VPN", version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Server config TOML (built-in defaults + env vars apply if omitted).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the server (default when no subcommand is given).
    Serve,
    /// Configuration-only diagnostics — no listener is started.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Load and validate the server TOML, printing unknown-key warnings.
    /// Exits non-zero on a validation error.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Some(Command::Config { action: ConfigAction::Check }) => {
            let _ = init_tracing("info", None);
            config_check(args.config.as_deref())
        }
        None | Some(Command::Serve) => {
            let config = ServerConfig::load(args.config.as_deref()).context("failed to load server config")?;
            // Kept alive for the process lifetime: dropping it stops the
            // non-blocking file writer from flushing further lines.
            let _log_guard = init_tracing(&config.log_level, config.log_file.as_deref());
            run_server(config).await
        }
    }
}

/// `EnvFilter` seeded from `log_level` (spec.md §6.4 `TSPAGES_LOG_LEVEL`),
/// mirroring the teacher's `setup_logging` in `daemon/src/main.rs`. With no
/// `log_file`, stdout gets a compact layer, or JSON when stdout isn't a
/// terminal. With a `log_file`, stdout keeps its compact layer and a
/// daily-rolling non-blocking file layer is added alongside it. Falls back
/// to stdout-only if the log directory can't be created — never panics on
/// a bad log path.
fn init_tracing(log_level: &str, log_file: Option<&std::path::Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use std::io::IsTerminal;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_is_tty = std::io::stdout().is_terminal();

    let Some(path) = log_file else {
        let result = if stdout_is_tty {
            tracing_subscriber::fmt().with_env_filter(filter).compact().try_init()
        } else {
            tracing_subscriber::fmt().with_env_filter(filter).json().try_init()
        };
        let _ = result;
        return None;
    };

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
    let filename = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("tspages.log"));

    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("warn: could not create log directory '{}': {e} — falling back to stdout", dir.display());
        let _ = tracing_subscriber::fmt().with_env_filter(filter).compact().try_init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(dir, filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init();

    Some(guard)
}

fn config_check(path: Option<&std::path::Path>) -> Result<()> {
    match ServerConfig::load(path) {
        Ok(cfg) => {
            println!(
                "config OK — data_dir={}, state_dir={}, hostname={}, max_sites={}, max_deployments={}",
                cfg.data_dir.display(),
                cfg.state_dir.display(),
                cfg.hostname,
                cfg.max_sites,
                cfg.max_deployments
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("config invalid: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run_server(config: ServerConfig) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "tspages starting");
    info!(
        data_dir = %config.data_dir.display(),
        hostname = %config.hostname,
        max_sites = config.max_sites,
        "config loaded"
    );

    // The mesh VPN library itself is an opaque external dependency (spec.md
    // §1, §6.2) and out of scope for this crate; only the development mock
    // ships here. Production deployments must refuse the bypass it grants
    // (spec.md §9 open questions), so it is gated behind an explicit opt-in.
    let dev_mode = std::env::var("TSPAGES_DEV_MODE")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    if !dev_mode {
        anyhow::bail!(
            "no mesh provider configured: this build ships only the development mesh mock. \
             Set TSPAGES_DEV_MODE=1 to run it (never in production — it grants an admin \
             identity to every caller) or link a real tailnet-backed MeshProvider."
        );
    }
    warn!("running with the development mesh provider — every caller is granted admin access");
    let mesh: Arc<dyn MeshProvider> = Arc::new(DevMeshProvider::new(config.capability_name.clone()));

    // `MultiHostManager` needs a `start_site` closure that can build a
    // per-site router against the shared `AppContext`, but `AppContext`
    // itself needs the manager to exist first (lib.rs `AppContext::build`).
    // Broken by handing the closure a cell it fills in once `ctx` exists;
    // `start_site` is only ever invoked after `run_server` finishes wiring
    // (first call is `start_existing_sites`, below).
    let ctx_cell: Arc<OnceCell<Arc<AppContext>>> = Arc::new(OnceCell::new());

    let start_site: Arc<dyn StartSite> = {
        let ctx_cell = ctx_cell.clone();
        let mesh = mesh.clone();
        let dns_suffix = config.dns_suffix.clone();
        Arc::new(move |site: String, public: bool| -> StartSiteFuture {
            let ctx_cell = ctx_cell.clone();
            let mesh = mesh.clone();
            let dns_suffix = dns_suffix.clone();
            Box::pin(async move {
                let ctx = ctx_cell
                    .get()
                    .expect("AppContext must be built before any site endpoint starts")
                    .clone();
                let hostname = format!("{site}.{dns_suffix}");
                let listener = mesh
                    .listen(&hostname)
                    .await
                    .map_err(|e| tspages::error::AppError::Internal(e))?;
                let router = site_server::build_site_router(ctx, site.clone())
                    .into_make_service_with_connect_info::<SocketAddr>();

                let (shutdown_tx, shutdown_rx) = oneshot::channel();
                let span = tracing::info_span!("site_endpoint", site = %site, %hostname);
                let handle = tokio::spawn(
                    async move {
                        let server = axum::serve(listener, router).with_graceful_shutdown(async {
                            let _ = shutdown_rx.await;
                        });
                        if let Err(e) = server.await {
                            tracing::error!(err = %e, "site endpoint exited with error");
                        }
                    }
                    .instrument(span),
                );

                Ok(SiteEndpoint::new(site, public, handle, shutdown_tx))
            })
        })
    };

    let hosts = Arc::new(MultiHostManager::new(config.max_sites, start_site));
    let ctx = AppContext::build(config, mesh.clone(), hosts.clone()).await?;
    ctx_cell
        .set(ctx.clone())
        .map_err(|_| anyhow::anyhow!("AppContext initialized twice"))?;

    // Plain, unauthenticated health listener for platform probes that
    // can't reach a per-site mesh endpoint (spec.md §6.4 `TSPAGES_HEALTH_ADDR`),
    // separate from the control plane's mesh-authenticated `/healthz`.
    let health_listener = tokio::net::TcpListener::bind(&ctx.config.health_addr)
        .await
        .with_context(|| format!("failed to bind health_addr {}", ctx.config.health_addr))?;
    info!(addr = %ctx.config.health_addr, "health listener bound");
    let health_ctx = ctx.clone();
    let (health_shutdown_tx, health_shutdown_rx) = oneshot::channel();
    let health_handle = tokio::spawn(async move {
        let app = axum::Router::new()
            .route("/healthz", axum::routing::get(tspages::admin::routes::health::healthz))
            .with_state(health_ctx);
        let server = axum::serve(health_listener, app).with_graceful_shutdown(async {
            let _ = health_shutdown_rx.await;
        });
        if let Err(e) = server.await {
            tracing::error!(err = %e, "health listener exited with error");
        }
    });

    // Admin control plane gets its own mesh endpoint, same as any site
    // (spec.md §4.5 "plus one for the control plane").
    let admin_hostname = format!("admin.{}", ctx.config.dns_suffix);
    let admin_listener = mesh
        .listen(&admin_hostname)
        .await
        .context("failed to bind admin control plane endpoint")?;
    info!(hostname = %admin_hostname, "admin control plane endpoint bound");
    let admin_router = tspages::admin::build_router(ctx.clone())
        .into_make_service_with_connect_info::<SocketAddr>();
    let (admin_shutdown_tx, admin_shutdown_rx) = oneshot::channel();
    let admin_handle = tokio::spawn(async move {
        let server = axum::serve(admin_listener, admin_router).with_graceful_shutdown(async {
            let _ = admin_shutdown_rx.await;
        });
        if let Err(e) = server.await {
            tracing::error!(err = %e, "admin control plane exited with error");
        }
    });

    // Bring up every site already present on disk (spec.md §4.5
    // `StartExistingSites`).
    let mut existing = Vec::new();
    for name in ctx.store.list_sites().await.unwrap_or_default() {
        let raw_cfg = ctx.store.read_current_site_config(&name).await.unwrap_or_default();
        let cfg = ctx.config.defaults.merge(&raw_cfg);
        existing.push((name, cfg.public));
    }
    ctx.hosts.start_existing_sites(&existing).await;
    info!(sites = existing.len(), "existing sites started");

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping");

    ctx.hosts.close().await;
    let _ = admin_shutdown_tx.send(());
    let _ = admin_handle.await;
    let _ = health_shutdown_tx.send(());
    let _ = health_handle.await;

    info!("tspages stopped");
    Ok(())
}

/// Waits for `SIGINT` or (on unix) `SIGTERM`, whichever comes first.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(err = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
