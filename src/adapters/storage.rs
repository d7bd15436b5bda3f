use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::path::{Path, PathBuf};

/// Filesystem storage rooted at `base_path`. Absolute paths bypass the root.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base_path.join(Path::new(path))
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve(path);
        tracing::debug!("Reading {}", full_path.display());
        Ok(tokio::fs::read(full_path).await?)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.resolve(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tracing::debug!("Writing {} bytes to {}", data.len(), full_path.display());
        tokio::fs::write(full_path, data).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage.write_file("out/nested/a.csv", b"x,y").await.unwrap();
        let data = storage.read_file("out/nested/a.csv").await.unwrap();
        assert_eq!(data, b"x,y");
    }

    #[tokio::test]
    async fn test_absolute_path_ignores_root() {
        let dir = TempDir::new().unwrap();
        let absolute = dir.path().join("abs.csv");
        let storage = LocalStorage::new("/definitely/not/here");

        storage
            .write_file(absolute.to_str().unwrap(), b"1")
            .await
            .unwrap();
        assert!(absolute.exists());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let storage = LocalStorage::new(".");
        let result = tokio_test::block_on(storage.read_file("no-such-input.csv"));
        assert!(matches!(result, Err(crate::utils::error::EtlError::IoError(_))));
    }
}
