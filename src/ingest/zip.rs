//! ZIP extraction (spec.md §4.3).

use std::io::Cursor;

use crate::error::{AppError, AppResult};

use super::limits::Budget;
use super::path_safety::safe_join;

pub async fn extract(bytes: &[u8], dest_root: &std::path::Path, max_bytes: u64) -> AppResult<u64> {
    let bytes = bytes.to_vec();
    let dest_root = dest_root.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&bytes, &dest_root, max_bytes))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?
}

fn extract_blocking(bytes: &[u8], dest_root: &std::path::Path, max_bytes: u64) -> AppResult<u64> {
    let reader = Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| AppError::Extraction(format!("not a valid zip archive: {e}")))?;

    let budget = Budget::new(max_bytes);
    let mut total_written: u64 = 0;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| AppError::Extraction(format!("corrupt zip entry {i}: {e}")))?;

        let name = entry.name().to_string();
        let is_dir = entry.is_dir();
        let dest = safe_join(dest_root, &name)?;

        if is_dir {
            std::fs::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // A directory entry recorded without the conventional trailing
        // slash still must not collide with an existing real directory.
        if dest.is_dir() {
            return Err(AppError::Extraction(format!(
                "entry '{name}' collides with a directory"
            )));
        }

        let mut out = std::fs::File::create(&dest)?;
        let mut limited = budget.wrap(&mut entry);
        let written = std::io::copy(&mut limited, &mut out).map_err(|e| {
            if e.kind() == std::io::ErrorKind::Other {
                AppError::TooLarge
            } else {
                AppError::from(e)
            }
        })?;
        total_written += written;
        if total_written > max_bytes {
            return Err(AppError::TooLarge);
        }
    }

    Ok(total_written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            for (name, content) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[tokio::test]
    async fn extracts_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let zip_bytes = build_zip(&[
            ("index.html", b"<html></html>"),
            ("assets/app.js", b"console.log(1)"),
        ]);
        let written = extract(&zip_bytes, dir.path(), 1024 * 1024).await.unwrap();
        assert!(written > 0);
        assert!(dir.path().join("index.html").exists());
        assert!(dir.path().join("assets/app.js").exists());
    }

    #[tokio::test]
    async fn rejects_zip_slip_entry() {
        let dir = tempfile::tempdir().unwrap();
        let zip_bytes = build_zip(&[("../escape.txt", b"oops")]);
        let err = extract(&zip_bytes, dir.path(), 1024 * 1024).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_over_budget() {
        let dir = tempfile::tempdir().unwrap();
        let zip_bytes = build_zip(&[("big.bin", &[0u8; 4096])]);
        let err = extract(&zip_bytes, dir.path(), 100).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::PAYLOAD_TOO_LARGE);
    }
}
