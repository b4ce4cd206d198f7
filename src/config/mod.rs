//! Server configuration: TOML + environment variable + built-in default,
//! in that precedence order (spec.md §4.1). Per-deployment configuration
//! (`SiteConfig`, merge rules, redirect/header patterns) lives in
//! [`site`].

pub mod site;

pub use site::{HeaderPatterns, RedirectRule, SiteConfig};

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

const DEFAULT_MAX_UPLOAD_MB: u64 = 512;
const DEFAULT_MAX_SITES: usize = 100;
const DEFAULT_MAX_DEPLOYMENTS: usize = 20;
const DEFAULT_DNS_SUFFIX: &str = "ts.net";
const DEFAULT_CAPABILITY_NAME: &str = "tspages.dev/cap";
const DEFAULT_HEALTH_ADDR: &str = "127.0.0.1:4400";

/// Raw TOML shape. Every field is optional so the loader can tell a
/// present-but-default value apart from an absent one.
#[derive(Debug, Default, Deserialize)]
struct RawServerConfig {
    data_dir: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    hostname: Option<String>,
    dns_suffix: Option<String>,
    capability_name: Option<String>,
    max_upload_mb: Option<i64>,
    max_sites: Option<i64>,
    max_deployments: Option<i64>,
    hide_footer: Option<bool>,
    log_level: Option<String>,
    log_file: Option<PathBuf>,
    health_addr: Option<String>,
    #[serde(default)]
    defaults: site::RawSiteConfig,
}

/// Process-wide settings, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub state_dir: PathBuf,
    pub hostname: String,
    pub dns_suffix: String,
    pub capability_name: String,
    pub max_upload_mb: u64,
    pub max_sites: usize,
    pub max_deployments: usize,
    pub hide_footer: bool,
    pub log_level: String,
    /// Optional daily-rolling log file, in addition to stdout (spec.md §6.5).
    pub log_file: Option<PathBuf>,
    pub health_addr: String,
    /// Server-wide default `SiteConfig`, merged against every deployment's
    /// `tspages.toml` (spec.md §4.1).
    pub defaults: SiteConfig,
}

impl ServerConfig {
    /// Load from `path` (or the built-in defaults if `path` is `None`),
    /// applying environment variable overrides (spec.md §6.4) on top.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let raw = match path {
            Some(p) => parse_toml_warning_unknown_keys(p)?,
            None => RawServerConfig::default(),
        };

        let max_upload_mb = non_negative(raw.max_upload_mb, "max_upload_mb")?
            .map(|v| v as u64)
            .or_else(env_u64("TSPAGES_MAX_UPLOAD_MB"))
            .unwrap_or(DEFAULT_MAX_UPLOAD_MB);
        let max_sites = non_negative(raw.max_sites, "max_sites")?
            .map(|v| v as usize)
            .or_else(env_usize("TSPAGES_MAX_SITES"))
            .unwrap_or(DEFAULT_MAX_SITES);
        let max_deployments = non_negative(raw.max_deployments, "max_deployments")?
            .map(|v| v as usize)
            .or_else(env_usize("TSPAGES_MAX_DEPLOYMENTS"))
            .unwrap_or(DEFAULT_MAX_DEPLOYMENTS);

        let data_dir = raw
            .data_dir
            .or_else(|| std::env::var("TSPAGES_DATA_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("/var/lib/tspages"));
        let state_dir = raw
            .state_dir
            .or_else(|| std::env::var("TSPAGES_STATE_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("/var/lib/tspages/state"));
        let hostname = raw
            .hostname
            .or_else(|| std::env::var("TSPAGES_HOSTNAME").ok())
            .unwrap_or_else(|| "tspages".to_string());
        let dns_suffix = raw
            .dns_suffix
            .unwrap_or_else(|| DEFAULT_DNS_SUFFIX.to_string());
        let capability_name = raw
            .capability_name
            .or_else(|| std::env::var("TSPAGES_CAPABILITY").ok())
            .unwrap_or_else(|| DEFAULT_CAPABILITY_NAME.to_string());
        let hide_footer = raw
            .hide_footer
            .or_else(|| env_bool("TSPAGES_HIDE_FOOTER"))
            .unwrap_or(false);
        let log_level = raw
            .log_level
            .or_else(|| std::env::var("TSPAGES_LOG_LEVEL").ok())
            .unwrap_or_else(|| "info".to_string());
        let log_file = raw
            .log_file
            .or_else(|| std::env::var("TSPAGES_LOG_FILE").ok().map(PathBuf::from));
        let health_addr = raw
            .health_addr
            .or_else(|| std::env::var("TSPAGES_HEALTH_ADDR").ok())
            .unwrap_or_else(|| DEFAULT_HEALTH_ADDR.to_string());

        let defaults = SiteConfig::from_raw(raw.defaults);

        Ok(Self {
            data_dir,
            state_dir,
            hostname,
            dns_suffix,
            capability_name,
            max_upload_mb,
            max_sites,
            max_deployments,
            hide_footer,
            log_level,
            log_file,
            health_addr,
            defaults,
        })
    }
}

fn non_negative(v: Option<i64>, field: &str) -> anyhow::Result<Option<i64>> {
    match v {
        Some(n) if n < 0 => anyhow::bail!("{field} must not be negative, got {n}"),
        other => Ok(other),
    }
}

fn env_u64(key: &'static str) -> impl Fn() -> Option<u64> {
    move || std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_usize(key: &'static str) -> impl Fn() -> Option<usize> {
    move || std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Parses the TOML at `path`, first as a generic [`toml::Value`] so unknown
/// top-level keys can be logged as warnings (likely typos — spec.md §4.1),
/// then into the typed [`RawServerConfig`].
fn parse_toml_warning_unknown_keys(path: &Path) -> anyhow::Result<RawServerConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;

    if let Ok(toml::Value::Table(table)) = contents.parse::<toml::Value>() {
        let known: &[&str] = &[
            "data_dir",
            "state_dir",
            "hostname",
            "dns_suffix",
            "capability_name",
            "max_upload_mb",
            "max_sites",
            "max_deployments",
            "hide_footer",
            "log_level",
            "log_file",
            "health_addr",
            "defaults",
        ];
        for key in table.keys() {
            if !known.contains(&key.as_str()) {
                warn!(key, path = %path.display(), "unknown config key — likely a typo");
            }
        }
    }

    toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))
}
