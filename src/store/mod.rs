//! The Store owns the on-disk tree under `{data_dir}/sites/*` (spec.md §4.2).
//! Every other component reads content and metadata through it; the
//! `current` symlink is the only mutable pointer and is always swapped via
//! atomic rename, mirroring the teacher's claim-by-atomic-UPDATE pattern in
//! `storage/mod.rs`.

pub mod diff;
pub mod hash;
pub mod manifest;

use std::path::{Path, PathBuf};

use rand::RngCore;
use tracing::{debug, info, warn};

use crate::config::site::RawSiteConfig;
use crate::error::{AppError, AppResult};
use manifest::{DeploymentInfo, FileEntry, Manifest};

const COMPLETE_MARKER: &str = ".complete";
const CURRENT_LINK: &str = "current";
const MANIFEST_FILE: &str = "manifest.json";
const SITE_CONFIG_FILE: &str = "tspages.toml";

#[derive(Clone)]
pub struct Store {
    data_dir: PathBuf,
}

impl Store {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn sites_root(&self) -> PathBuf {
        self.data_dir.join("sites")
    }

    fn site_dir(&self, site: &str) -> PathBuf {
        self.sites_root().join(site)
    }

    fn deployments_dir(&self, site: &str) -> PathBuf {
        self.site_dir(site).join("deployments")
    }

    fn deployment_dir(&self, site: &str, id: &str) -> PathBuf {
        self.deployments_dir(site).join(id)
    }

    fn content_dir(&self, site: &str, id: &str) -> PathBuf {
        self.deployment_dir(site, id).join("content")
    }

    // ─── Site lifecycle ───────────────────────────────────────────────────

    pub async fn create_site(&self, name: &str) -> AppResult<()> {
        validate_site_name(name)?;
        let dir = self.site_dir(name);
        if dir.exists() {
            return Err(AppError::Conflict(format!("site '{name}' already exists")));
        }
        tokio::fs::create_dir_all(dir.join("deployments")).await?;
        info!(site = name, "site created");
        Ok(())
    }

    pub async fn delete_site(&self, name: &str) -> AppResult<()> {
        let dir = self.site_dir(name);
        if dir.exists() {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        info!(site = name, "site deleted");
        Ok(())
    }

    pub fn site_exists(&self, name: &str) -> bool {
        self.site_dir(name).is_dir()
    }

    pub async fn list_sites(&self) -> AppResult<Vec<String>> {
        let root = self.sites_root();
        if !root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    // ─── Deployment lifecycle ─────────────────────────────────────────────

    /// 8 hex chars from the OS CSPRNG. Collisions are possible in
    /// principle; the caller retries on `Conflict`.
    pub fn new_deployment_id(&self) -> String {
        let mut bytes = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    pub async fn create_deployment(&self, site: &str, id: &str) -> AppResult<PathBuf> {
        let content = self.content_dir(site, id);
        tokio::fs::create_dir_all(&content).await?;
        Ok(content)
    }

    pub async fn write_manifest(&self, site: &str, id: &str, manifest: &Manifest) -> AppResult<()> {
        let dir = self.deployment_dir(site, id);
        let final_path = dir.join(MANIFEST_FILE);
        let tmp_path = dir.join(format!("{MANIFEST_FILE}.tmp"));
        let body = serde_json::to_vec_pretty(manifest)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
        tokio::fs::write(&tmp_path, body).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    pub async fn mark_complete(&self, site: &str, id: &str) -> AppResult<()> {
        let marker = self.deployment_dir(site, id).join(COMPLETE_MARKER);
        tokio::fs::write(&marker, b"").await?;
        debug!(site, id, "deployment marked complete");
        Ok(())
    }

    fn is_complete(&self, site: &str, id: &str) -> bool {
        self.deployment_dir(site, id).join(COMPLETE_MARKER).is_file()
    }

    /// Atomically swaps the `current` symlink to point at `deployments/{id}`.
    /// Creates a temp symlink then renames over `current` — POSIX rename is
    /// atomic within the same directory, so readers never observe a broken
    /// link (spec.md §4.2).
    pub async fn activate_deployment(&self, site: &str, id: &str) -> AppResult<()> {
        if !self.is_complete(site, id) {
            return Err(AppError::Conflict(format!(
                "deployment '{id}' is not complete"
            )));
        }
        let site_dir = self.site_dir(site);
        let target = PathBuf::from("deployments").join(id);
        let tmp_link = site_dir.join(format!("{CURRENT_LINK}.tmp"));
        let final_link = site_dir.join(CURRENT_LINK);

        let _ = tokio::fs::remove_file(&tmp_link).await;
        #[cfg(unix)]
        tokio::fs::symlink(&target, &tmp_link).await?;
        #[cfg(not(unix))]
        compile_error!("tspages requires a unix-like target for atomic symlink activation");

        tokio::fs::rename(&tmp_link, &final_link).await?;
        info!(site, id, "deployment activated");
        Ok(())
    }

    pub async fn current_deployment(&self, site: &str) -> AppResult<Option<String>> {
        let link = self.site_dir(site).join(CURRENT_LINK);
        match tokio::fs::read_link(&link).await {
            Ok(target) => Ok(target.file_name().and_then(|n| n.to_str()).map(str::to_string)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_deployments(&self, site: &str) -> AppResult<Vec<DeploymentInfo>> {
        let active = self.current_deployment(site).await?;
        let dir = self.deployments_dir(site);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut infos = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            let manifest_path = entry.path().join(MANIFEST_FILE);
            let Ok(raw) = tokio::fs::read(&manifest_path).await else {
                continue;
            };
            let Ok(manifest) = serde_json::from_slice::<Manifest>(&raw) else {
                warn!(site, id, "unreadable manifest, skipping");
                continue;
            };
            infos.push(DeploymentInfo {
                active: active.as_deref() == Some(id.as_str()),
                manifest,
            });
        }
        infos.sort_by(|a, b| b.manifest.created_at.cmp(&a.manifest.created_at));
        Ok(infos)
    }

    pub async fn list_deployment_files(&self, site: &str, id: &str) -> AppResult<Vec<FileEntry>> {
        let root = self.content_dir(site, id);
        let mut files = Vec::new();
        walk_files(&root, &root, &mut files).await?;
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    pub async fn delete_deployment(&self, site: &str, id: &str) -> AppResult<()> {
        if self.current_deployment(site).await?.as_deref() == Some(id) {
            return Err(AppError::Conflict(format!(
                "cannot delete active deployment '{id}'"
            )));
        }
        let dir = self.deployment_dir(site, id);
        if dir.exists() {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }

    /// Deletes inactive deployments beyond the newest `keep` (spec.md §4.2).
    pub async fn cleanup_inactive(&self, site: &str, keep: usize) -> AppResult<usize> {
        let deployments = self.list_deployments(site).await?;
        let mut inactive: Vec<&DeploymentInfo> =
            deployments.iter().filter(|d| !d.active).collect();
        // list_deployments is already newest-first.
        if inactive.len() <= keep {
            return Ok(0);
        }
        let to_remove = inactive.split_off(keep);
        let mut removed = 0;
        for info in to_remove {
            self.delete_deployment(site, &info.manifest.id).await?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Removes any deployment directory lacking `.complete` across every
    /// site. Run once at startup (spec.md §4.2).
    pub async fn cleanup_orphans(&self) -> AppResult<usize> {
        let mut removed = 0;
        for site in self.list_sites().await? {
            let dir = self.deployments_dir(&site);
            if !dir.exists() {
                continue;
            }
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_dir() {
                    continue;
                }
                if !entry.path().join(COMPLETE_MARKER).is_file() {
                    warn!(site, path = %entry.path().display(), "removing orphaned deployment");
                    tokio::fs::remove_dir_all(entry.path()).await?;
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            info!(removed, "startup orphan cleanup finished");
        }
        Ok(removed)
    }

    // ─── Per-deployment site config sidecar ───────────────────────────────

    pub async fn write_site_config(&self, site: &str, id: &str, cfg: &RawSiteConfig) -> AppResult<()> {
        let path = self.deployment_dir(site, id).join(SITE_CONFIG_FILE);
        let body = toml::to_string_pretty(cfg).map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
        tokio::fs::write(&path, body).await?;
        Ok(())
    }

    pub async fn read_site_config(&self, site: &str, id: &str) -> AppResult<RawSiteConfig> {
        let path = self.deployment_dir(site, id).join(SITE_CONFIG_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(body) => toml::from_str(&body).map_err(|e| AppError::Internal(anyhow::anyhow!(e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RawSiteConfig::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read_current_site_config(&self, site: &str) -> AppResult<RawSiteConfig> {
        match self.current_deployment(site).await? {
            Some(id) => self.read_site_config(site, &id).await,
            None => Ok(RawSiteConfig::default()),
        }
    }

    pub fn content_path(&self, site: &str, id: &str) -> PathBuf {
        self.content_dir(site, id)
    }
}

async fn walk_files(root: &Path, dir: &Path, out: &mut Vec<FileEntry>) -> AppResult<()> {
    if !dir.exists() {
        return Ok(());
    }
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            Box::pin(walk_files(root, &path, out)).await?;
        } else if file_type.is_file() {
            let metadata = entry.metadata().await?;
            let hash = hash::hash_file(&path).await?;
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            out.push(FileEntry {
                path: rel,
                size: metadata.len(),
                hash,
            });
        }
    }
    Ok(())
}

/// DNS-label-compatible name, `[a-z0-9-]`, ≤63 chars (spec.md §3).
pub fn validate_site_name(name: &str) -> AppResult<()> {
    if name.is_empty() || name.len() > 63 {
        return Err(AppError::InvalidInput(
            "site name must be 1-63 characters".to_string(),
        ));
    }
    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(AppError::InvalidInput(
            "site name must match [a-z0-9-]".to_string(),
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(AppError::InvalidInput(
            "site name must not start or end with '-'".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_manifest(site: &str, id: &str) -> Manifest {
        Manifest {
            site: site.to_string(),
            id: id.to_string(),
            created_at: Utc::now(),
            created_by: "tester".to_string(),
            created_by_avatar: None,
            size_bytes: 0,
        }
    }

    #[tokio::test]
    async fn create_site_then_duplicate_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.create_site("blog").await.unwrap();
        let err = store.create_site("blog").await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn rejects_invalid_site_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        assert!(store.create_site("Has_Upper").await.is_err());
        assert!(store.create_site("-leading").await.is_err());
    }

    #[tokio::test]
    async fn full_deployment_lifecycle_activates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.create_site("blog").await.unwrap();

        let id = store.new_deployment_id();
        assert_eq!(id.len(), 8);
        store.create_deployment("blog", &id).await.unwrap();
        store
            .write_manifest("blog", &id, &sample_manifest("blog", &id))
            .await
            .unwrap();

        assert!(store.activate_deployment("blog", &id).await.is_err());

        store.mark_complete("blog", &id).await.unwrap();
        store.activate_deployment("blog", &id).await.unwrap();

        assert_eq!(store.current_deployment("blog").await.unwrap(), Some(id.clone()));
        let deployments = store.list_deployments("blog").await.unwrap();
        assert_eq!(deployments.len(), 1);
        assert!(deployments[0].active);
    }

    #[tokio::test]
    async fn cannot_delete_active_deployment() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.create_site("blog").await.unwrap();
        let id = store.new_deployment_id();
        store.create_deployment("blog", &id).await.unwrap();
        store
            .write_manifest("blog", &id, &sample_manifest("blog", &id))
            .await
            .unwrap();
        store.mark_complete("blog", &id).await.unwrap();
        store.activate_deployment("blog", &id).await.unwrap();

        let err = store.delete_deployment("blog", &id).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn cleanup_orphans_removes_incomplete_deployments() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.create_site("blog").await.unwrap();
        let id = store.new_deployment_id();
        store.create_deployment("blog", &id).await.unwrap();
        // no .complete marker written

        let removed = store.cleanup_orphans().await.unwrap();
        assert_eq!(removed, 1);
        assert!(!store.deployment_dir("blog", &id).exists());
    }

    #[tokio::test]
    async fn cleanup_inactive_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.create_site("blog").await.unwrap();

        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = store.new_deployment_id();
            store.create_deployment("blog", &id).await.unwrap();
            store
                .write_manifest("blog", &id, &sample_manifest("blog", &id))
                .await
                .unwrap();
            store.mark_complete("blog", &id).await.unwrap();
            ids.push(id);
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        store.activate_deployment("blog", &ids[2]).await.unwrap();

        let removed = store.cleanup_inactive("blog", 0).await.unwrap();
        assert_eq!(removed, 2);
        let remaining = store.list_deployments("blog").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].active);
    }

    #[tokio::test]
    async fn list_deployment_files_hashes_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.create_site("blog").await.unwrap();
        let id = store.new_deployment_id();
        let content = store.create_deployment("blog", &id).await.unwrap();
        tokio::fs::write(content.join("index.html"), b"<html></html>")
            .await
            .unwrap();
        tokio::fs::create_dir_all(content.join("assets")).await.unwrap();
        tokio::fs::write(content.join("assets/app.js"), b"console.log(1)")
            .await
            .unwrap();

        let files = store.list_deployment_files("blog", &id).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "assets/app.js");
        assert_eq!(files[1].path, "index.html");
    }

    #[tokio::test]
    async fn site_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.create_site("blog").await.unwrap();
        let id = store.new_deployment_id();
        store.create_deployment("blog", &id).await.unwrap();

        let cfg = RawSiteConfig {
            spa_routing: Some(true),
            ..Default::default()
        };
        store.write_site_config("blog", &id, &cfg).await.unwrap();
        let read_back = store.read_site_config("blog", &id).await.unwrap();
        assert_eq!(read_back.spa_routing, Some(true));
    }
}
