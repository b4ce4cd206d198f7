//! The mesh VPN contract the core consumes (spec.md §6.2): `WhoIs` for
//! per-request identity and capability lookup. A local mock stands in for
//! development mode when no real mesh library is wired up.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::net::IpAddr;

use super::{Capability, Identity};

#[derive(Debug, Clone)]
pub struct WhoIsResponse {
    pub identity: Identity,
    /// Capability JSON blobs keyed by capability name, as handed back by
    /// the mesh library's ACL grant map (spec.md §6.2). Parsed into
    /// [`Capability`] by the caller, which knows the configured capability
    /// name to look under.
    pub cap_map: HashMap<String, Vec<Value>>,
}

#[async_trait]
pub trait MeshProvider: Send + Sync {
    async fn who_is(&self, remote_addr: IpAddr) -> anyhow::Result<Option<WhoIsResponse>>;

    /// Binds a connection acceptor for `hostname` (spec.md §6.2 `ListenTLS`).
    /// The real mesh library resolves `hostname` on the tailnet and
    /// provisions a TLS certificate automatically; this trait only commits
    /// to handing back something `axum::serve` can drive, so a real
    /// implementation's listener type stays out of this crate.
    async fn listen(&self, hostname: &str) -> anyhow::Result<tokio::net::TcpListener>;
}

/// Supplies a fixed admin identity regardless of the caller, for local
/// development when no real mesh library is configured.
pub struct DevMeshProvider {
    capability_name: String,
}

impl DevMeshProvider {
    pub fn new(capability_name: impl Into<String>) -> Self {
        Self {
            capability_name: capability_name.into(),
        }
    }
}

#[async_trait]
impl MeshProvider for DevMeshProvider {
    async fn who_is(&self, remote_addr: IpAddr) -> anyhow::Result<Option<WhoIsResponse>> {
        let identity = Identity {
            login_name: "dev@localhost".to_string(),
            display_name: "Local Developer".to_string(),
            profile_pic_url: None,
            node_name: "dev-node".to_string(),
            node_ip: remote_addr.to_string(),
            os: std::env::consts::OS.to_string(),
            os_version: String::new(),
            device: "dev".to_string(),
            tags: Vec::new(),
        };

        let admin_cap = serde_json::to_value(Capability {
            access: super::Access::Admin,
            sites: vec!["*".to_string()],
        })?;

        let mut cap_map = HashMap::new();
        cap_map.insert(self.capability_name.clone(), vec![admin_cap]);

        Ok(Some(WhoIsResponse { identity, cap_map }))
    }

    /// No tailnet available in development mode: binds a plain loopback
    /// TCP listener on an OS-assigned port instead of a mesh hostname.
    /// Never used when a real mesh provider is configured.
    async fn listen(&self, hostname: &str) -> anyhow::Result<tokio::net::TcpListener> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tracing::warn!(hostname, %addr, "dev mesh provider: bound plain loopback listener, no TLS, no mesh");
        Ok(listener)
    }
}

/// Parses the JSON blobs under `capability_name` into [`Capability`]
/// values. No blob under that name is a valid empty-caps state (spec.md
/// §4.4: "Missing caps → context carries an empty list"); a blob that is
/// present but fails to parse is an authorization failure, not silent
/// absence (spec.md §4.4: "Parsing failure → 403"), so it is surfaced as
/// `Err` rather than dropped.
pub fn parse_capabilities(response: &WhoIsResponse, capability_name: &str) -> anyhow::Result<Vec<Capability>> {
    let Some(blobs) = response.cap_map.get(capability_name) else {
        return Ok(Vec::new());
    };
    blobs
        .iter()
        .map(|blob| {
            serde_json::from_value::<Capability>(blob.clone())
                .map_err(|e| anyhow::anyhow!("failed to parse capability blob: {e}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dev_provider_grants_admin() {
        let provider = DevMeshProvider::new("tspages.dev/cap");
        let response = provider
            .who_is("127.0.0.1".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        let caps = parse_capabilities(&response, "tspages.dev/cap").unwrap();
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].access, super::super::Access::Admin);
    }

    #[test]
    fn no_blob_under_name_is_empty_not_an_error() {
        let response = WhoIsResponse {
            identity: Identity::default(),
            cap_map: HashMap::new(),
        };
        let caps = parse_capabilities(&response, "tspages.dev/cap").unwrap();
        assert!(caps.is_empty());
    }

    #[test]
    fn unparseable_blob_is_a_parse_error() {
        let mut cap_map = HashMap::new();
        cap_map.insert(
            "tspages.dev/cap".to_string(),
            vec![Value::String("not a capability".to_string())],
        );
        let response = WhoIsResponse {
            identity: Identity::default(),
            cap_map,
        };
        assert!(parse_capabilities(&response, "tspages.dev/cap").is_err());
    }
}
