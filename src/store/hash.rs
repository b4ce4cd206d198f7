//! Content hashing for deployment file listings and diffs (spec.md §4.2).

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

/// First 16 hex characters of the file's SHA-256. Collision at this
/// truncation is an accepted risk (spec.md §4.2).
pub async fn hash_file(path: &std::path::Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize();
    Ok(hex::encode(&digest[..8]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_is_16_hex_chars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();
        let h = hash_file(&path).await.unwrap();
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn same_content_same_hash() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        tokio::fs::write(&a, b"same content").await.unwrap();
        tokio::fs::write(&b, b"same content").await.unwrap();
        assert_eq!(hash_file(&a).await.unwrap(), hash_file(&b).await.unwrap());
    }
}
