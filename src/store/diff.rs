//! Diff between two deployments of the same site (spec.md §4.2).

use std::collections::HashMap;

use super::manifest::FileEntry;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DeploymentDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

/// Group paths present in `before`/`after` into added/removed/changed,
/// lexicographically sorted within each group.
pub fn diff_files(before: &[FileEntry], after: &[FileEntry]) -> DeploymentDiff {
    let before_map: HashMap<&str, &str> = before
        .iter()
        .map(|f| (f.path.as_str(), f.hash.as_str()))
        .collect();
    let after_map: HashMap<&str, &str> = after
        .iter()
        .map(|f| (f.path.as_str(), f.hash.as_str()))
        .collect();

    let mut added = Vec::new();
    let mut changed = Vec::new();
    for (path, hash) in &after_map {
        match before_map.get(path) {
            None => added.push((*path).to_string()),
            Some(old_hash) if old_hash != hash => changed.push((*path).to_string()),
            Some(_) => {}
        }
    }

    let mut removed: Vec<String> = before_map
        .keys()
        .filter(|p| !after_map.contains_key(*p))
        .map(|p| (*p).to_string())
        .collect();

    added.sort();
    changed.sort();
    removed.sort();

    DeploymentDiff {
        added,
        removed,
        changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, hash: &str) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            size: 0,
            hash: hash.to_string(),
        }
    }

    #[test]
    fn detects_added_removed_changed() {
        let before = vec![entry("a.html", "h1"), entry("b.html", "h2")];
        let after = vec![entry("a.html", "h1"), entry("b.html", "h3"), entry("c.html", "h4")];
        let diff = diff_files(&before, &after);
        assert_eq!(diff.added, vec!["c.html".to_string()]);
        assert_eq!(diff.changed, vec!["b.html".to_string()]);
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn identical_trees_produce_empty_diff() {
        let tree = vec![entry("a.html", "h1")];
        let diff = diff_files(&tree, &tree);
        assert_eq!(diff, DeploymentDiff::default());
    }

    #[test]
    fn removed_file_detected() {
        let before = vec![entry("a.html", "h1"), entry("old.html", "h2")];
        let after = vec![entry("a.html", "h1")];
        let diff = diff_files(&before, &after);
        assert_eq!(diff.removed, vec!["old.html".to_string()]);
    }
}
