//! Capability-based authorization (spec.md §4.4).

pub mod glob;
pub mod mesh;
pub mod middleware;

use serde::{Deserialize, Serialize};

/// Ordered so `access >= Deploy` etc. read naturally; `Metrics` is
/// orthogonal (scrape-only, no site content) and deliberately not placed
/// above `Admin` in the ordering — it is never implied by or implies any
/// other level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    View,
    Deploy,
    Admin,
    Metrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub access: Access,
    #[serde(default)]
    pub sites: Vec<String>,
}

impl Capability {
    fn matches_site(&self, site: &str) -> bool {
        glob::matches(&self.sites, site)
    }
}

/// An identity derived from the mesh VPN for the requesting peer
/// (spec.md §3 `Identity`). Never persisted except as embedded strings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Identity {
    pub login_name: String,
    pub display_name: String,
    pub profile_pic_url: Option<String>,
    pub node_name: String,
    pub node_ip: String,
    pub os: String,
    pub os_version: String,
    pub device: String,
    pub tags: Vec<String>,
}

/// The merged capability list for one caller, attached to the request
/// context by [`middleware`].
#[derive(Debug, Clone, Default)]
pub struct CapList(pub Vec<Capability>);

impl CapList {
    pub fn can_view(&self, site: &str) -> bool {
        self.0
            .iter()
            .any(|c| matches!(c.access, Access::View | Access::Deploy | Access::Admin) && c.matches_site(site))
    }

    pub fn can_deploy(&self, site: &str) -> bool {
        self.0
            .iter()
            .any(|c| matches!(c.access, Access::Deploy | Access::Admin) && c.matches_site(site))
    }

    pub fn is_admin(&self, site: &str) -> bool {
        self.0
            .iter()
            .any(|c| c.access == Access::Admin && c.matches_site(site))
    }

    pub fn can_create_site(&self, name: &str) -> bool {
        self.is_admin(name)
    }

    pub fn can_delete_site(&self, site: &str) -> bool {
        self.is_admin(site)
    }

    pub fn has_deploy_cap(&self) -> bool {
        self.0.iter().any(|c| matches!(c.access, Access::Deploy | Access::Admin))
    }

    pub fn has_admin_cap(&self) -> bool {
        self.0.iter().any(|c| c.access == Access::Admin)
    }

    pub fn can_scrape_metrics(&self) -> bool {
        self.0
            .iter()
            .any(|c| matches!(c.access, Access::Metrics | Access::Admin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(access: Access, sites: &[&str]) -> Capability {
        Capability {
            access,
            sites: sites.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn deploy_scope_matches_spec_scenario() {
        let caps = CapList(vec![cap(Access::Deploy, &["docs", "demo-*"])]);
        assert!(caps.can_deploy("docs"));
        assert!(caps.can_deploy("demo-staging"));
        assert!(!caps.can_deploy("other"));
        assert!(caps.can_view("docs"));
        assert!(caps.can_view("demo-staging"));
        assert!(!caps.can_view("other"));
        assert!(!caps.is_admin("docs"));
    }

    #[test]
    fn admin_implies_view_and_deploy() {
        let caps = CapList(vec![cap(Access::Admin, &["*"])]);
        assert!(caps.can_view("anything"));
        assert!(caps.can_deploy("anything"));
        assert!(caps.is_admin("anything"));
    }

    #[test]
    fn metrics_is_orthogonal() {
        let caps = CapList(vec![cap(Access::Metrics, &["*"])]);
        assert!(!caps.can_view("anything"));
        assert!(caps.can_scrape_metrics());
    }

    #[test]
    fn merging_is_order_independent() {
        let a = CapList(vec![cap(Access::View, &["docs"]), cap(Access::Admin, &["demo"])]);
        let b = CapList(vec![cap(Access::Admin, &["demo"]), cap(Access::View, &["docs"])]);
        for site in ["docs", "demo", "other"] {
            assert_eq!(a.can_view(site), b.can_view(site));
            assert_eq!(a.is_admin(site), b.is_admin(site));
        }
    }
}
