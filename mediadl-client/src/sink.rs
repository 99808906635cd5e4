//! Where finished downloads end up.
//!
//! A [`FileSink`] plays the part of the browser's "save file" dialog: it is
//! handed either a URL to fetch on its own or a complete byte buffer.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

/// Destination for downloaded media.
#[async_trait]
pub trait FileSink: Send + Sync {
    /// Save whatever `url` points to under `filename`. Progress of this
    /// transfer is not observable by the caller.
    async fn save_url(&self, url: &str, filename: &str) -> io::Result<PathBuf>;

    /// Save a fully buffered file.
    async fn save_bytes(&self, filename: &str, bytes: Vec<u8>) -> io::Result<PathBuf>;
}

// ─── DirectorySink ────────────────────────────────────────────────────────────

/// Saves files into a local directory.
///
/// Names coming from the remote side are reduced to a bare file name, and an
/// existing file is never overwritten: `a.jpg` becomes `a (1).jpg`, `a (2).jpg`…
pub struct DirectorySink {
    dir:  PathBuf,
    http: reqwest::Client,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), http: reqwest::Client::new() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write_new(&self, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = unique_path(&self.dir, &sanitize_filename(filename)).await;

        let mut tmp_name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".part");
        let tmp = target.with_file_name(tmp_name);

        write_atomically(&tmp, &target, bytes).await?;
        tracing::debug!("[mediadl] Wrote {} bytes to {}", bytes.len(), target.display());
        Ok(target)
    }
}

#[async_trait]
impl FileSink for DirectorySink {
    async fn save_url(&self, url: &str, filename: &str) -> io::Result<PathBuf> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(io::Error::other)?;
        let body = response.bytes().await.map_err(io::Error::other)?;
        self.write_new(filename, &body).await
    }

    async fn save_bytes(&self, filename: &str, bytes: Vec<u8>) -> io::Result<PathBuf> {
        self.write_new(filename, &bytes).await
    }
}

/// Write `bytes` to `tmp` and move it onto `target`. `tmp` is gone afterwards
/// whichever step fails.
async fn write_atomically(tmp: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    let result = async {
        let mut file = tokio::fs::File::create(tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(tmp, target).await
    }
    .await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(tmp).await;
    }
    result
}

/// Strip directories and characters that are not portable in file names.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.');
    if cleaned.is_empty() { "file".to_string() } else { cleaned.to_string() }
}

async fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let first = dir.join(name);
    if !exists(&first).await {
        return first;
    }
    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _                => (name, ""),
    };
    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{stem} ({n}){ext}"));
        if !exists(&candidate).await {
            return candidate;
        }
        n += 1;
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_paths_and_reserved_chars() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\a:b.txt"), "a_b.txt");
        assert_eq!(sanitize_filename("..hidden"), "hidden");
        assert_eq!(sanitize_filename("dir/"), "file");
        assert_eq!(sanitize_filename(""), "file");
    }

    #[tokio::test]
    async fn save_bytes_never_overwrites() {
        let dir  = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("out"));

        let a = sink.save_bytes("photo_1.jpg", b"one".to_vec()).await.unwrap();
        let b = sink.save_bytes("photo_1.jpg", b"two".to_vec()).await.unwrap();
        let c = sink.save_bytes("photo_1.jpg", b"three".to_vec()).await.unwrap();

        assert_eq!(a.file_name().unwrap(), "photo_1.jpg");
        assert_eq!(b.file_name().unwrap(), "photo_1 (1).jpg");
        assert_eq!(c.file_name().unwrap(), "photo_1 (2).jpg");
        assert_eq!(std::fs::read(&a).unwrap(), b"one");
        assert_eq!(std::fs::read(&c).unwrap(), b"three");
    }

    #[tokio::test]
    async fn save_bytes_handles_names_without_extension() {
        let dir  = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());
        sink.save_bytes("file_42", vec![1]).await.unwrap();
        let second = sink.save_bytes("file_42", vec![2]).await.unwrap();
        assert_eq!(second.file_name().unwrap(), "file_42 (1)");
    }

    #[tokio::test]
    async fn failed_write_leaves_no_part_file() {
        let dir    = tempfile::tempdir().unwrap();
        let target = dir.path().join("occupied");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), b"x").unwrap();
        let tmp = dir.path().join("occupied.part");

        assert!(write_atomically(&tmp, &target, b"data").await.is_err());
        assert!(!tmp.exists());
        assert!(target.join("keep").exists());
    }
}
