//! Atom feed generation (SPEC_FULL.md §4.11): one `Entry` per site's
//! active deployment, newest first. Built with `atom_syndication`'s
//! builder API the way the teacher reaches for typed builders over
//! hand-formatted XML elsewhere in this codebase.

use atom_syndication::{Entry, Feed, FixedDateTime, Person};

use crate::error::AppResult;
use crate::store::Store;

/// One feed entry, sourced from a site's current deployment manifest.
struct ActivationEntry {
    site: String,
    deployment_id: String,
    created_at: chrono::DateTime<chrono::Utc>,
    created_by: String,
}

/// Builds the feed for `sites` (already filtered to what the caller can
/// view). `base_url` is used to build each entry's canonical link.
pub async fn build(store: &Store, sites: &[String], base_url: &str) -> AppResult<Feed> {
    let mut entries = Vec::new();
    for site in sites {
        let Some(deployment_id) = store.current_deployment(site).await? else {
            continue;
        };
        let deployments = store.list_deployments(site).await?;
        if let Some(info) = deployments.iter().find(|d| d.manifest.id == deployment_id) {
            entries.push(ActivationEntry {
                site: site.clone(),
                deployment_id: deployment_id.clone(),
                created_at: info.manifest.created_at,
                created_by: info.manifest.created_by.clone(),
            });
        }
    }
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let updated: FixedDateTime = entries
        .first()
        .map(|e| e.created_at.into())
        .unwrap_or_else(|| chrono::Utc::now().into());

    let atom_entries = entries
        .into_iter()
        .map(|e| {
            let link = atom_syndication::Link {
                href: format!("{base_url}/sites/{}", e.site),
                rel: "alternate".to_string(),
                ..Default::default()
            };
            Entry {
                title: format!("{} — deployment {}", e.site, e.deployment_id).into(),
                id: format!("{base_url}/sites/{}/deployments/{}", e.site, e.deployment_id),
                updated: e.created_at.into(),
                authors: vec![Person {
                    name: e.created_by,
                    ..Default::default()
                }],
                links: vec![link],
                ..Default::default()
            }
        })
        .collect();

    Ok(Feed {
        title: "tspages activations".into(),
        id: format!("{base_url}/feed.atom"),
        updated,
        entries: atom_entries,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::manifest::Manifest;

    #[tokio::test]
    async fn feed_contains_one_entry_per_active_deployment() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.create_site("docs").await.unwrap();
        let id = store.new_deployment_id();
        store.create_deployment("docs", &id).await.unwrap();
        store
            .write_manifest(
                "docs",
                &id,
                &Manifest {
                    site: "docs".to_string(),
                    id: id.clone(),
                    created_at: chrono::Utc::now(),
                    created_by: "alice".to_string(),
                    created_by_avatar: None,
                    size_bytes: 10,
                },
            )
            .await
            .unwrap();
        store.mark_complete("docs", &id).await.unwrap();
        store.activate_deployment("docs", &id).await.unwrap();

        let feed = build(&store, &["docs".to_string()], "https://tspages.example").await.unwrap();
        assert_eq!(feed.entries.len(), 1);
        assert!(feed.entries[0].title.value.contains("docs"));
    }

    #[tokio::test]
    async fn site_with_no_active_deployment_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.create_site("empty").await.unwrap();

        let feed = build(&store, &["empty".to_string()], "https://tspages.example").await.unwrap();
        assert!(feed.entries.is_empty());
    }
}
