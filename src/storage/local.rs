use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use super::{check_segment, StorageProvider};
use crate::types::{WorkerError, WorkerResult};

/// Writes artifacts under `<base>/<namespace>/<filename>` and returns the file path.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    async fn save(&self, namespace: &str, filename: &str, data: Bytes) -> WorkerResult<String> {
        check_segment("namespace", namespace)?;
        check_segment("filename", filename)?;

        let folder = self.base_path.join(namespace);
        fs::create_dir_all(&folder)
            .await
            .map_err(|e| WorkerError::Storage(format!("failed to create {}: {}", folder.display(), e)))?;

        let full_path = folder.join(filename);
        fs::write(&full_path, &data)
            .await
            .map_err(|e| WorkerError::Storage(format!("failed to write {}: {}", full_path.display(), e)))?;

        debug!(path = %full_path.display(), bytes = data.len(), "artifact written");
        Ok(full_path.to_string_lossy().into_owned())
    }
}
