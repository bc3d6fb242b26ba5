//! Artifact production for fetched documents.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{AppError, Result};
use crate::models::RendererConfig;

const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Turns raw document bytes into an artifact the gateway can deliver.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Returns a reference to the produced artifact.
    async fn render(&self, source_url: &str, bytes: &[u8]) -> Result<String>;
}

/// Stores documents content-addressed on disk.
///
/// Rendering the same bytes twice yields the same path and writes once.
pub struct ArtifactWriter {
    dir: PathBuf,
    require_pdf: bool,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>, require_pdf: bool) -> Self {
        Self {
            dir: dir.into(),
            require_pdf,
        }
    }

    pub fn from_config(config: &RendererConfig) -> Self {
        Self::new(&config.artifact_dir, config.require_pdf)
    }

    fn check(&self, source_url: &str, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Err(AppError::render(format!("{source_url}: empty document")));
        }
        if self.require_pdf && !bytes.starts_with(PDF_SIGNATURE) {
            return Err(AppError::render(format!(
                "{source_url}: missing PDF signature"
            )));
        }
        Ok(())
    }
}

/// Write `bytes` to a uniquely named temp file in `dir`, then rename it to
/// `path`. Concurrent writers of the same artifact never share a temp file.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.persist(path)?;
    Ok(())
}

#[async_trait]
impl Renderer for ArtifactWriter {
    async fn render(&self, source_url: &str, bytes: &[u8]) -> Result<String> {
        self.check(source_url, bytes)?;

        let name = format!("{}.pdf", hex::encode(Sha256::digest(bytes)));
        let path = self.dir.join(&name);
        if tokio::fs::try_exists(&path).await? {
            log::debug!("Artifact {} already present", name);
            return Ok(path.to_string_lossy().into_owned());
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let (dir, target, owned) = (self.dir.clone(), path.clone(), bytes.to_vec());
        tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &owned))
            .await
            .map_err(|e| AppError::render(format!("{source_url}: writer task failed: {e}")))??;

        log::debug!("Rendered {} -> {}", source_url, path.display());
        Ok(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_render_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(tmp.path(), true);
        let bytes = b"%PDF-1.4 schedule";

        let first = writer.render("https://example.com/a.pdf", bytes).await.unwrap();
        let second = writer.render("https://example.com/a.pdf", bytes).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(&first).unwrap(), bytes);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_renders_of_same_bytes() {
        let tmp = TempDir::new().unwrap();
        let writer = std::sync::Arc::new(ArtifactWriter::new(tmp.path(), true));
        let bytes: &'static [u8] = b"%PDF-1.4 shared schedule";

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let writer = writer.clone();
                tokio::spawn(async move {
                    writer.render("https://example.com/shared.pdf", bytes).await
                })
            })
            .collect();

        let mut paths = Vec::new();
        for handle in handles {
            paths.push(handle.await.unwrap().unwrap());
        }

        paths.dedup();
        assert_eq!(paths.len(), 1);
        assert_eq!(std::fs::read(&paths[0]).unwrap(), bytes);
        // No temp files left behind.
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_rejects_malformed_input() {
        let tmp = TempDir::new().unwrap();
        let writer = ArtifactWriter::new(tmp.path(), true);

        let empty = writer.render("https://example.com/a.pdf", b"").await;
        assert!(matches!(empty, Err(AppError::Render(_))));

        let html = writer
            .render("https://example.com/a.pdf", b"<html>404</html>")
            .await;
        assert!(matches!(html, Err(AppError::Render(_))));

        let lenient = ArtifactWriter::new(tmp.path(), false);
        assert!(lenient
            .render("https://example.com/a.doc", b"plain bytes")
            .await
            .is_ok());
    }
}
