//! Tar extraction, optionally gzip- or xz-compressed (spec.md §4.3).

use std::io::Read;

use crate::error::{AppError, AppResult};

use super::limits::Budget;
use super::path_safety::safe_join;

pub enum Compression {
    None,
    Gzip,
    Xz,
}

pub async fn extract(
    bytes: &[u8],
    compression: Compression,
    dest_root: &std::path::Path,
    max_bytes: u64,
) -> AppResult<u64> {
    let bytes = bytes.to_vec();
    let dest_root = dest_root.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&bytes, compression, &dest_root, max_bytes))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?
}

fn extract_blocking(
    bytes: &[u8],
    compression: Compression,
    dest_root: &std::path::Path,
    max_bytes: u64,
) -> AppResult<u64> {
    let budget = Budget::new(max_bytes);
    let cursor = std::io::Cursor::new(bytes);

    let reader: Box<dyn Read> = match compression {
        Compression::None => Box::new(budget.wrap(cursor)),
        Compression::Gzip => Box::new(budget.wrap(flate2::read::GzDecoder::new(cursor))),
        Compression::Xz => Box::new(budget.wrap(xz2::read::XzDecoder::new(cursor))),
    };

    let mut archive = tar::Archive::new(reader);
    let mut total_written: u64 = 0;

    let entries = archive
        .entries()
        .map_err(|e| AppError::Extraction(format!("not a valid tar stream: {e}")))?;

    for entry in entries {
        let mut entry = entry.map_err(map_tar_io_error)?;
        let header = entry.header();
        let entry_type = header.entry_type();

        if !(entry_type.is_file() || entry_type.is_dir()) {
            // Symlinks, hardlinks, FIFOs, device nodes rejected outright.
            // PAX extended headers are consumed transparently by `tar`
            // before reaching this loop.
            return Err(AppError::Extraction(format!(
                "unsupported tar entry type: {entry_type:?}"
            )));
        }

        let path = entry
            .path()
            .map_err(|e| AppError::Extraction(format!("invalid tar entry path: {e}")))?
            .to_string_lossy()
            .to_string();
        let dest = safe_join(dest_root, &path)?;

        if entry_type.is_dir() {
            std::fs::create_dir_all(&dest)?;
            continue;
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&dest)?;
        let written = std::io::copy(&mut entry, &mut out).map_err(map_tar_io_error)?;
        total_written += written;
        if total_written > max_bytes {
            return Err(AppError::TooLarge);
        }
    }

    Ok(total_written)
}

fn map_tar_io_error(e: std::io::Error) -> AppError {
    if e.kind() == std::io::ErrorKind::Other {
        AppError::TooLarge
    } else {
        AppError::from(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *content).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn extracts_plain_tar() {
        let dir = tempfile::tempdir().unwrap();
        let tar_bytes = build_tar(&[("index.html", b"<html></html>")]);
        let written = extract(&tar_bytes, Compression::None, dir.path(), 1024 * 1024)
            .await
            .unwrap();
        assert!(written > 0);
        assert!(dir.path().join("index.html").exists());
    }

    #[tokio::test]
    async fn extracts_gzipped_tar() {
        let dir = tempfile::tempdir().unwrap();
        let tar_bytes = build_tar(&[("a/b.txt", b"hello")]);
        let gz = gzip(&tar_bytes);
        extract(&gz, Compression::Gzip, dir.path(), 1024 * 1024)
            .await
            .unwrap();
        assert!(dir.path().join("a/b.txt").exists());
    }

    #[tokio::test]
    async fn rejects_tar_slip_entry() {
        let dir = tempfile::tempdir().unwrap();
        let tar_bytes = build_tar(&[("../../escape.txt", b"oops")]);
        let err = extract(&tar_bytes, Compression::None, dir.path(), 1024 * 1024)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}
