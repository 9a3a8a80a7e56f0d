// Artifact storage (local filesystem or S3-compatible object store)

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::config::{StorageBackend, StorageConfig};
use crate::types::{WorkerError, WorkerResult};

pub mod local;
pub mod s3_client;

pub use local::LocalStorage;
pub use s3_client::S3Storage;

/// Persists a rendered artifact and returns a URL it can be retrieved from.
///
/// Implementations are shared by every in-flight job and must tolerate concurrent calls.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn save(&self, namespace: &str, filename: &str, data: Bytes) -> WorkerResult<String>;
}

/// Build the configured backend.
pub fn from_config(config: &StorageConfig) -> WorkerResult<Arc<dyn StorageProvider>> {
    match config.provider {
        StorageBackend::Local => {
            info!(path = %config.local_path.display(), "using local storage");
            Ok(Arc::new(LocalStorage::new(&config.local_path)))
        }
        StorageBackend::S3 => {
            info!(bucket = %config.s3_bucket, endpoint = ?config.s3_endpoint, "using object storage");
            Ok(Arc::new(S3Storage::from_config(config)?))
        }
    }
}

/// Namespaces and filenames are single path segments.
pub(crate) fn check_segment(kind: &str, segment: &str) -> WorkerResult<()> {
    let invalid = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\'])
        || segment.contains('\0');
    if invalid {
        return Err(WorkerError::Storage(format!("invalid {}: {:?}", kind, segment)));
    }
    Ok(())
}
