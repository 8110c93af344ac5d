use crate::domain::ports::Storage;
use crate::utils::error::{LagError, Result};
use std::path::{Path, PathBuf};

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
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.base_path.join(path);
        let data = tokio::fs::read(full_path).await?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.base_path.join(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(full_path, data).await?;
        Ok(())
    }

    fn base_path(&self) -> &Path {
        &self.base_path
    }
}

/// `Ok(None)` when the file does not exist.
pub async fn read_optional<S: Storage>(storage: &S, path: &str) -> Result<Option<Vec<u8>>> {
    match storage.read_file(path).await {
        Ok(data) => Ok(Some(data)),
        Err(LagError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parents_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage.write_file("results/pbmc/gc/x.txt", b"hello").await.unwrap();
        let data = storage.read_file("results/pbmc/gc/x.txt").await.unwrap();
        assert_eq!(data, b"hello");
        assert!(dir.path().join("results/pbmc/gc/x.txt").exists());
    }

    #[tokio::test]
    async fn test_read_optional_missing_file() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        assert!(read_optional(&storage, "nope.csv").await.unwrap().is_none());
    }
}
