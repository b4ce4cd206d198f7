//! Shared entry-name cleaning and path-containment check used by both the
//! ZIP and tar extractors (spec.md §4.3 extractor safety rules).

use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Cleans `entry_name` and resolves it against `dest_root`, rejecting
/// anything that would escape `dest_root` (zip-slip, absolute paths,
/// leading `..` components, and trailing-slash tricks on non-directory
/// entries).
pub fn safe_join(dest_root: &Path, entry_name: &str) -> AppResult<PathBuf> {
    if entry_name.is_empty() {
        return Err(AppError::Extraction("empty entry name".to_string()));
    }

    let candidate = Path::new(entry_name);
    if candidate.is_absolute() {
        return Err(AppError::Extraction(format!(
            "entry has an absolute path: {entry_name}"
        )));
    }

    let mut resolved = dest_root.to_path_buf();
    for component in candidate.components() {
        use std::path::Component;
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(AppError::Extraction(format!(
                    "zip-slip: entry escapes destination via '..': {entry_name}"
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::Extraction(format!(
                    "entry has an absolute path: {entry_name}"
                )));
            }
        }
    }

    if !resolved.starts_with(dest_root) {
        return Err(AppError::Extraction(format!(
            "zip-slip: entry resolves outside destination: {entry_name}"
        )));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_parent_dir_traversal() {
        let root = Path::new("/data/sites/blog/content");
        assert!(safe_join(root, "../../etc/passwd").is_err());
    }

    #[test]
    fn rejects_absolute_entry() {
        let root = Path::new("/data/sites/blog/content");
        assert!(safe_join(root, "/etc/passwd").is_err());
    }

    #[test]
    fn accepts_nested_relative_path() {
        let root = Path::new("/data/sites/blog/content");
        let resolved = safe_join(root, "assets/img/logo.png").unwrap();
        assert_eq!(resolved, root.join("assets/img/logo.png"));
    }

    #[test]
    fn rejects_embedded_parent_dir() {
        let root = Path::new("/data/sites/blog/content");
        assert!(safe_join(root, "assets/../../escape.txt").is_err());
    }
}
