//! Per-deployment manifest sidecar (spec.md §3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub site: String,
    pub id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_avatar: Option<String>,
    pub size_bytes: u64,
}

/// A listed deployment, enriched with manifest contents and its active
/// state (spec.md §4.2 `ListDeployments`).
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentInfo {
    #[serde(flatten)]
    pub manifest: Manifest,
    pub active: bool,
}

/// A single regular file within a deployment's content tree (spec.md §4.2
/// `ListDeploymentFiles`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    pub hash: String,
}
