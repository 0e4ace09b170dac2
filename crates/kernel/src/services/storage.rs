//! Local filesystem storage for uploads.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use keystone_sdk::FileStorage;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::UploadSettings;

/// Uploads stored under `uploads_path`, served from `uploads_url`.
pub struct LocalFileStorage {
    base_path: PathBuf,
    base_url: String,
    temp_path: PathBuf,
}

impl LocalFileStorage {
    pub fn new(settings: &UploadSettings) -> Self {
        Self {
            base_path: settings.uploads_path.clone(),
            base_url: settings.uploads_url.clone(),
            temp_path: settings.temp_path.clone(),
        }
    }

    /// Directory for in-progress uploads.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Rejects paths containing `..` components.
    fn parse_uri(&self, uri: &str) -> Result<PathBuf> {
        let path = uri
            .strip_prefix("local://")
            .context("invalid local URI, must start with local://")?;
        for component in Path::new(path).components() {
            if matches!(component, Component::ParentDir | Component::RootDir) {
                anyhow::bail!("directory traversal not allowed in storage URI");
            }
        }
        Ok(self.base_path.join(path))
    }

    /// Generate a storage URI for a new file.
    pub fn generate_uri(&self, filename: &str) -> String {
        let now = chrono::Utc::now();
        let unique_id = uuid::Uuid::now_v7().simple().to_string();
        format!(
            "local://{}/{}/{}_{}",
            now.format("%Y"),
            now.format("%m"),
            &unique_id[..8],
            sanitize_filename(filename)
        )
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn init(&self) -> Result<()> {
        for dir in [&self.base_path, &self.temp_path] {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        info!(path = %self.base_path.display(), url = %self.base_url, "local file storage ready");
        Ok(())
    }

    async fn write(&self, uri: &str, data: &[u8]) -> Result<()> {
        let path = self.parse_uri(uri)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("failed to create directories")?;
        }

        let mut file = fs::File::create(&path)
            .await
            .context("failed to create file")?;
        file.write_all(data).await.context("failed to write file")?;
        file.flush().await.context("failed to flush file")?;

        debug!(uri = %uri, path = ?path, size = data.len(), "file written");
        Ok(())
    }

    async fn read(&self, uri: &str) -> Result<Vec<u8>> {
        let path = self.parse_uri(uri)?;
        let data = fs::read(&path).await.context("failed to read file")?;
        debug!(uri = %uri, size = data.len(), "file read");
        Ok(data)
    }

    async fn delete(&self, uri: &str) -> Result<()> {
        let path = self.parse_uri(uri)?;

        if path.exists() {
            fs::remove_file(&path)
                .await
                .context("failed to delete file")?;
            debug!(uri = %uri, "file deleted");
        } else {
            warn!(uri = %uri, "file not found for deletion");
        }

        Ok(())
    }

    async fn exists(&self, uri: &str) -> Result<bool> {
        let path = self.parse_uri(uri)?;
        Ok(path.exists())
    }

    fn public_url(&self, uri: &str) -> String {
        let path = uri.strip_prefix("local://").unwrap_or(uri);
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn scheme(&self) -> &'static str {
        "local"
    }
}

impl std::fmt::Debug for LocalFileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFileStorage")
            .field("base_path", &self.base_path)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Keep only the file name, with unsafe characters replaced.
pub fn sanitize_filename(filename: &str) -> String {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .take(200)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn storage(dir: &Path) -> LocalFileStorage {
        LocalFileStorage::new(&UploadSettings {
            backend: "local".into(),
            uploads_path: dir.join("public/uploads"),
            uploads_url: "/uploads".into(),
            temp_path: dir.join("data/temp/uploads"),
        })
    }

    #[tokio::test]
    async fn init_creates_upload_and_temp_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());
        storage.init().await.unwrap();
        assert!(dir.path().join("public/uploads").is_dir());
        assert!(storage.temp_path().is_dir());
    }

    #[tokio::test]
    async fn write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());
        let uri = storage.generate_uri("My Photo.jpg");
        assert!(uri.ends_with("_My_Photo.jpg"));

        storage.write(&uri, b"jpeg").await.unwrap();
        assert!(storage.exists(&uri).await.unwrap());
        assert_eq!(storage.read(&uri).await.unwrap(), b"jpeg");

        storage.delete(&uri).await.unwrap();
        assert!(!storage.exists(&uri).await.unwrap());
    }

    #[test]
    fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());
        assert!(storage.parse_uri("local://../etc/passwd").is_err());
        assert!(storage.parse_uri("s3://bucket/key").is_err());
    }

    #[test]
    fn public_url_joins_base() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            storage(dir.path()).public_url("local://2026/01/a.png"),
            "/uploads/2026/01/a.png"
        );
    }

    #[test]
    fn sanitize_strips_paths_and_odd_chars() {
        assert_eq!(sanitize_filename("../../a b?.txt"), "a_b_.txt");
    }
}
