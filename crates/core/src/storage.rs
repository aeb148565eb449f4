use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::AppResult;

/// Local byte store for project files and organization logos.
///
/// Callers only ever see relative keys; the base directory stays private.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Key for a new project file: `project-files/{org}/{project}/{uuid}.{ext}`
    pub fn project_file_key(organization_id: Uuid, project_id: Uuid, extension: &str) -> String {
        format!(
            "project-files/{}/{}/{}.{}",
            organization_id,
            project_id,
            Uuid::new_v4(),
            extension
        )
    }

    /// Key for a new organization logo
    pub fn logo_key(organization_id: Uuid, extension: &str) -> String {
        format!("logos/{}/{}.{}", organization_id, Uuid::new_v4(), extension)
    }

    /// Resolve a key below the base directory, rejecting anything that could escape it
    fn resolve(&self, key: &str) -> io::Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid storage key: {}", key),
            ));
        }
        Ok(self.base_path.join(relative))
    }

    pub async fn put(&self, key: &str, bytes: &[u8]) -> AppResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }

    /// Bytes stored under `key`, or `None` if they are gone
    pub async fn read(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        match self.resolve(key) {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Remove the bytes under `key`. Missing bytes are not an error.
    pub async fn delete(&self, key: &str) -> AppResult<bool> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete and log instead of failing
    pub async fn delete_best_effort(&self, key: &str) {
        if let Err(e) = self.delete(key).await {
            tracing::warn!(key, error = %e, "Failed to delete stored file");
        }
    }
}
