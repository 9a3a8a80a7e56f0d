// Job handlers: fetch the record, transform it to bytes, store them, then write exactly
// one terminal status. Lookup failures abort without any write; re-runs overwrite.

pub mod image;
pub mod report;

#[cfg(test)]
pub(crate) mod testing;

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{error, info, warn};

use crate::db::JobRepository;
use crate::models::StatusUpdate;
use crate::types::{WorkerError, WorkerResult};

pub use image::{HttpImageFetcher, ImageFetcher, ImageHandler};
pub use report::ReportHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Report,
    Image,
}

impl JobKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            JobKind::Report => "report",
            JobKind::Image => "image",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn kind(&self) -> JobKind;

    /// Process one job record to a terminal status.
    ///
    /// `Ok(())` means the record was written as `completed`. An `Err` either means the
    /// record could not be loaded (nothing was written), the job was written as `failed`,
    /// or the terminal write itself failed.
    async fn handle(&self, job_id: &str) -> WorkerResult<()>;
}

/// Bound a transform stage by an optional deadline.
pub(crate) async fn with_deadline<T, F>(deadline: Option<Duration>, stage: F) -> WorkerResult<T>
where
    F: Future<Output = WorkerResult<T>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, stage)
            .await
            .map_err(|_| WorkerError::Timeout(limit))?,
        None => stage.await,
    }
}

/// Run a pipeline stage, turning a panic inside it into [`WorkerError::Panicked`] so the
/// job still reaches a terminal status.
pub(crate) async fn catch_panic<T, F>(stage: F) -> WorkerResult<T>
where
    F: Future<Output = WorkerResult<T>>,
{
    match AssertUnwindSafe(stage).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(WorkerError::Panicked(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Write the terminal status for a transform outcome.
pub(crate) async fn finalize<R>(
    repo: &R,
    kind: JobKind,
    job_id: &str,
    outcome: WorkerResult<String>,
) -> WorkerResult<()>
where
    R: JobRepository + ?Sized,
{
    match outcome {
        Ok(url) => {
            if let Err(e) = repo.update_status(job_id, &StatusUpdate::completed(&url)).await {
                error!(kind = %kind, job_id, error = %e, "failed to record completed status");
                return Err(e);
            }
            info!(kind = %kind, job_id, url = %url, "job completed");
            Ok(())
        }
        Err(cause) => {
            let message = cause.to_string();
            warn!(kind = %kind, job_id, error = %message, "job failed");
            if let Err(e) = repo.update_status(job_id, &StatusUpdate::failed(&message)).await {
                error!(kind = %kind, job_id, error = %e, "failed to record failed status");
                return Err(e);
            }
            Err(cause)
        }
    }
}

/// Await a blocking CPU stage, mapping a panic inside it to `on_panic`.
pub(crate) async fn run_blocking<T, F>(stage: F, on_panic: fn(String) -> WorkerError) -> WorkerResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> WorkerResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(stage)
        .await
        .map_err(|e| on_panic(format!("worker thread failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryRepository;
    use crate::models::{JobStatus, ReportRecord};
    use serde_json::json;

    #[tokio::test]
    async fn test_finalize_success_clears_error() {
        let repo = InMemoryRepository::<ReportRecord>::new();
        let mut record = ReportRecord::new("R1", "financial_summary", json!({}));
        record.error_msg = "previous failure".into();
        repo.insert(record).await;

        finalize(&repo, JobKind::Report, "R1", Ok("https://cdn/r1.pdf".into()))
            .await
            .unwrap();

        let stored = repo.get("R1").await.unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.file_url, "https://cdn/r1.pdf");
        assert_eq!(stored.error_msg, "");
    }

    #[tokio::test]
    async fn test_finalize_failure_returns_cause() {
        let repo = InMemoryRepository::<ReportRecord>::new();
        repo.insert(ReportRecord::new("R1", "financial_summary", json!({}))).await;

        let err = finalize(
            &repo,
            JobKind::Report,
            "R1",
            Err(WorkerError::Render("font missing".into())),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, WorkerError::Render(_)));
        let stored = repo.get("R1").await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error_msg, "Render error: font missing");
        assert_eq!(repo.updates().await.len(), 1);
    }

    #[tokio::test]
    async fn test_finalize_reports_write_failure() {
        // No record: the terminal write itself fails
        let repo = InMemoryRepository::<ReportRecord>::new();
        let err = finalize(&repo, JobKind::Report, "missing", Ok("url".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_with_deadline() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, WorkerError>(1)
        };
        let err = with_deadline(Some(Duration::from_millis(10)), slow).await.unwrap_err();
        assert!(matches!(err, WorkerError::Timeout(_)));

        let fast = async { Ok::<_, WorkerError>(2) };
        assert_eq!(with_deadline(None, fast).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_catch_panic_keeps_message() {
        let err = catch_panic::<(), _>(async { panic!("bucket vanished") })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Job panicked: bucket vanished");

        let ok = catch_panic(async { Ok::<_, WorkerError>(7) }).await.unwrap();
        assert_eq!(ok, 7);
    }

    #[tokio::test]
    async fn test_run_blocking_maps_panic() {
        let err = run_blocking::<(), _>(|| panic!("boom"), WorkerError::Render)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Render(_)));
    }
}
