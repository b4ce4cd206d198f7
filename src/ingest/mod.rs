//! Archive ingestion: turns an uploaded byte buffer into a populated
//! deployment content directory (spec.md §4.3).

pub mod limits;
pub mod path_safety;
pub mod single_file;
pub mod tarball;
pub mod zip;

use std::io::Read;
use std::path::Path;

use crate::config::site::RawSiteConfig;
use crate::error::{AppError, AppResult};

use self::limits::Budget;

const SITE_CONFIG_FILENAME: &str = "tspages.toml";

/// Caller-supplied hints used for format detection (spec.md §4.3).
#[derive(Debug, Default, Clone)]
pub struct IngestHints {
    pub declared_content_type: Option<String>,
    pub filename: Option<String>,
    pub format_query: Option<String>,
}

pub struct IngestResult {
    pub bytes_written: u64,
    /// Present if a `tspages.toml` was found at the archive root; it is
    /// stripped from the served content and returned so the caller can
    /// persist it alongside the deployment's metadata (spec.md §4.1).
    pub site_config: Option<RawSiteConfig>,
}

#[derive(Debug, PartialEq, Eq)]
enum Format {
    Markdown,
    Zip,
    /// A gzip stream (spec.md:9): may wrap a tar *or* a single file, e.g. a
    /// lone gzipped `index.html`. Which it is isn't knowable from the
    /// outer magic bytes alone — resolved after decompression in
    /// [`ingest`].
    Gzip,
    TarXz,
    Tar,
    Html,
    PlainText,
}

/// `ustar` at offset 257, the magic tar uses to mark a POSIX header
/// (spec.md §4.3 format detection rule 2). Shared between the outer
/// bare-tar check and the post-decompression check for a gzipped tar.
fn looks_like_tar(bytes: &[u8]) -> bool {
    bytes.len() > 262 && &bytes[257..262] == b"ustar"
}

/// Detects the upload format, first match wins (spec.md §4.3).
fn detect_format(bytes: &[u8], hints: &IngestHints) -> Format {
    if hints.format_query.as_deref() == Some("markdown")
        || hints
            .declared_content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("text/markdown"))
        || hints
            .filename
            .as_deref()
            .is_some_and(|name| name.ends_with(".md") || name.ends_with(".markdown"))
    {
        return Format::Markdown;
    }

    if bytes.starts_with(b"PK\x03\x04") {
        return Format::Zip;
    }
    if bytes.starts_with(&[0x1f, 0x8b]) {
        return Format::Gzip;
    }
    if bytes.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
        return Format::TarXz;
    }
    if looks_like_tar(bytes) {
        return Format::Tar;
    }

    if bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'<')
    {
        return Format::Html;
    }

    Format::PlainText
}

/// Extracts `bytes` into `dest_root` per the detected format and returns
/// the total decompressed bytes written plus any discovered site config.
pub async fn ingest(
    bytes: &[u8],
    hints: &IngestHints,
    dest_root: &Path,
    max_bytes: u64,
) -> AppResult<IngestResult> {
    let format = detect_format(bytes, hints);

    let bytes_written = match format {
        Format::Markdown => write_single_file(
            dest_root,
            &single_file::render_markdown(&String::from_utf8_lossy(bytes)),
        )
        .await?,
        Format::Html => {
            write_single_file(dest_root, &single_file::render_html(&String::from_utf8_lossy(bytes)))
                .await?
        }
        Format::PlainText => write_single_file(
            dest_root,
            &single_file::render_plain_text(&String::from_utf8_lossy(bytes)),
        )
        .await?,
        Format::Zip => zip::extract(bytes, dest_root, max_bytes).await?,
        Format::Tar => tarball::extract(bytes, tarball::Compression::None, dest_root, max_bytes).await?,
        Format::TarXz => tarball::extract(bytes, tarball::Compression::Xz, dest_root, max_bytes).await?,
        Format::Gzip => {
            let decompressed = decompress_gzip(bytes, max_bytes).await?;
            if looks_like_tar(&decompressed) {
                tarball::extract(&decompressed, tarball::Compression::None, dest_root, max_bytes).await?
            } else if decompressed
                .iter()
                .find(|b| !b.is_ascii_whitespace())
                .is_some_and(|b| *b == b'<')
            {
                write_single_file(dest_root, &single_file::render_html(&String::from_utf8_lossy(&decompressed))).await?
            } else {
                write_single_file(
                    dest_root,
                    &single_file::render_plain_text(&String::from_utf8_lossy(&decompressed)),
                )
                .await?
            }
        }
    };

    let site_config = extract_site_config(dest_root).await?;

    Ok(IngestResult {
        bytes_written,
        site_config,
    })
}

/// Fully decompresses a gzip stream under `max_bytes`, so the caller can
/// sniff whether it wraps a tar or a single file (spec.md §4.3 format
/// detection; "compressed-stream readers are wrapped in a size-limited
/// reader so a gzip/xz bomb cannot exhaust memory before the limit
/// triggers").
async fn decompress_gzip(bytes: &[u8], max_bytes: u64) -> AppResult<Vec<u8>> {
    let bytes = bytes.to_vec();
    tokio::task::spawn_blocking(move || {
        let budget = Budget::new(max_bytes);
        let cursor = std::io::Cursor::new(bytes);
        let mut reader = budget.wrap(flate2::read::GzDecoder::new(cursor));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).map_err(|e| {
            if e.kind() == std::io::ErrorKind::Other {
                AppError::TooLarge
            } else {
                AppError::from(e)
            }
        })?;
        Ok(out)
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?
}

async fn write_single_file(dest_root: &Path, rendered: &str) -> AppResult<u64> {
    tokio::fs::create_dir_all(dest_root).await?;
    let path = dest_root.join("index.html");
    tokio::fs::write(&path, rendered).await?;
    Ok(rendered.len() as u64)
}

/// Removes `tspages.toml` from the content root, if present, and parses it.
async fn extract_site_config(dest_root: &Path) -> AppResult<Option<RawSiteConfig>> {
    let path = dest_root.join(SITE_CONFIG_FILENAME);
    match tokio::fs::read_to_string(&path).await {
        Ok(body) => {
            tokio::fs::remove_file(&path).await?;
            let cfg: RawSiteConfig =
                toml::from_str(&body).map_err(|e| crate::error::AppError::InvalidInput(format!(
                    "invalid tspages.toml: {e}"
                )))?;
            Ok(Some(cfg))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_markdown_from_filename_hint() {
        let hints = IngestHints {
            filename: Some("README.md".to_string()),
            ..Default::default()
        };
        assert_eq!(detect_format(b"# hi", &hints), Format::Markdown);
    }

    #[test]
    fn detects_zip_magic_bytes() {
        let hints = IngestHints::default();
        assert_eq!(detect_format(b"PK\x03\x04rest", &hints), Format::Zip);
    }

    #[test]
    fn detects_gzip_magic_bytes_as_ambiguous() {
        let hints = IngestHints::default();
        assert_eq!(detect_format(&[0x1f, 0x8b, 0x08, 0x00], &hints), Format::Gzip);
    }

    #[test]
    fn detects_html_by_sniffing_first_byte() {
        let hints = IngestHints::default();
        assert_eq!(detect_format(b"   <html></html>", &hints), Format::Html);
    }

    #[test]
    fn falls_back_to_plain_text() {
        let hints = IngestHints::default();
        assert_eq!(detect_format(b"just some text", &hints), Format::PlainText);
    }

    #[tokio::test]
    async fn extracts_and_strips_site_config() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("tspages.toml"), b"spa_routing = true")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("index.html"), b"<html></html>")
            .await
            .unwrap();

        let cfg = extract_site_config(dir.path()).await.unwrap();
        assert_eq!(cfg.unwrap().spa_routing, Some(true));
        assert!(!dir.path().join("tspages.toml").exists());
        assert!(dir.path().join("index.html").exists());
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        use std::io::Write;
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// A bare gzipped HTML file (not a tar.gz) must be rendered as a
    /// single `index.html`, not fail tar extraction (spec.md:9).
    #[tokio::test]
    async fn gzip_wrapping_single_file_is_rendered_not_tar_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let gz = gzip(b"<html><body>hi</body></html>");

        let result = ingest(&gz, &IngestHints::default(), dir.path(), 1024 * 1024)
            .await
            .unwrap();
        assert!(result.bytes_written > 0);
        let content = tokio::fs::read_to_string(dir.path().join("index.html")).await.unwrap();
        assert!(content.contains("hi"));
    }

    #[tokio::test]
    async fn gzip_wrapping_tar_is_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "hello.txt", &b"world"[..]).unwrap();
        let tar_bytes = builder.into_inner().unwrap();
        let gz = gzip(&tar_bytes);

        ingest(&gz, &IngestHints::default(), dir.path(), 1024 * 1024)
            .await
            .unwrap();
        assert!(dir.path().join("hello.txt").exists());
    }
}
