use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use super::{catch_panic, finalize, run_blocking, with_deadline, JobHandler, JobKind};
use crate::db::{ReportDataSource, ReportRepository};
use crate::models::{ReportFilters, ReportRecord, ReportType};
use crate::render::ReportRenderer;
use crate::storage::StorageProvider;
use crate::types::{WorkerError, WorkerResult};

/// Aggregates, renders and stores one report.
pub struct ReportHandler {
    repo: Arc<ReportRepository>,
    data: Arc<dyn ReportDataSource>,
    renderer: Arc<dyn ReportRenderer>,
    storage: Arc<dyn StorageProvider>,
    deadline: Option<Duration>,
}

impl ReportHandler {
    pub fn new(
        repo: Arc<ReportRepository>,
        data: Arc<dyn ReportDataSource>,
        renderer: Arc<dyn ReportRenderer>,
        storage: Arc<dyn StorageProvider>,
    ) -> Self {
        Self {
            repo,
            data,
            renderer,
            storage,
            deadline: None,
        }
    }

    /// Fail jobs whose transform and store stages take longer than `deadline`.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    async fn produce(&self, record: &ReportRecord) -> WorkerResult<String> {
        let report_type: ReportType = record.report_type.parse()?;
        let filters = ReportFilters::from_value(&record.filters)?;

        let payload = self.data.fetch(report_type, &filters).await?;

        let renderer = Arc::clone(&self.renderer);
        let document = run_blocking(move || renderer.render(&payload), WorkerError::Render).await?;
        if document.is_empty() {
            return Err(WorkerError::Render("renderer produced an empty document".into()));
        }
        debug!(report_id = %record.id, bytes = document.len(), "report rendered");

        let filename = format!("{}-{}.pdf", report_type, record.id);
        self.storage
            .save(report_type.as_str(), &filename, Bytes::from(document))
            .await
    }
}

#[async_trait]
impl JobHandler for ReportHandler {
    fn kind(&self) -> JobKind {
        JobKind::Report
    }

    async fn handle(&self, job_id: &str) -> WorkerResult<()> {
        let record = match self.repo.get_by_id(job_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(report_id = job_id, error = %e, "report lookup failed, skipping");
                return Err(e);
            }
        };

        info!(report_id = job_id, report_type = %record.report_type, "generating report");
        let outcome = catch_panic(with_deadline(self.deadline, self.produce(&record))).await;
        finalize(self.repo.as_ref(), JobKind::Report, job_id, outcome).await
    }
}
