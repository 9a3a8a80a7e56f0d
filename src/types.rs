// Error types shared across the worker

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Queue error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid job id: {0}")]
    InvalidJobId(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown report type: {0}")]
    UnknownReportType(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("{0}")]
    Download(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Job panicked: {0}")]
    Panicked(String),

    #[error("Queue closed")]
    QueueClosed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WorkerError {
    /// Lookup failures abort a job before any status write.
    pub fn is_lookup(&self) -> bool {
        matches!(self, WorkerError::InvalidJobId(_) | WorkerError::NotFound(_))
    }
}

pub type WorkerResult<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_classification() {
        assert!(WorkerError::NotFound("report abc".into()).is_lookup());
        assert!(WorkerError::InvalidJobId("xyz".into()).is_lookup());
        assert!(!WorkerError::Storage("disk full".into()).is_lookup());
    }

    #[test]
    fn test_messages_keep_cause() {
        let err = WorkerError::Storage("disk full".into());
        assert_eq!(err.to_string(), "Storage error: disk full");

        let err = WorkerError::Download("failed to download image, status: 404".into());
        assert!(err.to_string().contains("404"));
    }
}
