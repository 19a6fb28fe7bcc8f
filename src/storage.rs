//! Media file storage for uploaded images
//!
//! Accepted uploads land under `<data_dir>/media/memories/` with generated
//! filenames; the database stores the path relative to the media root.

use crate::error::{CoreError, Result};
use std::path::{Component, Path, PathBuf};

/// Subdirectory for memory images, mirrored in stored relative paths
const MEMORIES_SUBDIR: &str = "memories";

/// File store rooted at the media directory
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(root.join(MEMORIES_SUBDIR))?;
        Ok(MediaStore { root })
    }

    /// Write image bytes under a generated filename; returns the relative
    /// path to persist alongside the memory record.
    pub async fn save(&self, filename: &str, bytes: &[u8]) -> Result<String> {
        let relative = format!("{}/{}", MEMORIES_SUBDIR, filename);
        let path = self.resolve(&relative)?;
        tokio::fs::write(&path, bytes).await?;
        Ok(relative)
    }

    /// Read back a stored image
    pub async fn read(&self, relative: &str) -> Result<Vec<u8>> {
        let path = self.resolve(relative)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CoreError::NotFound("Image", relative.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a stored image. A file that is already gone is not an error;
    /// the record it belonged to is being deleted either way.
    pub async fn delete(&self, relative: &str) -> Result<()> {
        let path = self.resolve(relative)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve a stored relative path under the media root, refusing
    /// anything that could escape it
    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let rel = Path::new(relative);
        let safe = rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !safe || rel.is_absolute() {
            return Err(CoreError::Storage(format!(
                "unsafe media path: {}",
                relative
            )));
        }
        Ok(self.root.join(rel))
    }
}
