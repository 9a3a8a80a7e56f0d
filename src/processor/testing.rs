// Test doubles shared by the handler and dispatcher tests

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use crate::db::{JobRepository, ReportDataSource};
use crate::models::{FinancialReportData, ReportFilters, ReportPayload, ReportType, StatusUpdate};
use crate::render::ReportRenderer;
use crate::storage::StorageProvider;
use crate::types::{WorkerError, WorkerResult};

/// Records every save and answers with `https://cdn/<namespace>/<filename>`.
#[derive(Default)]
pub struct RecordingStorage {
    saves: Mutex<Vec<(String, String, usize)>>,
    // (filename fragment, message); an empty fragment fails every save
    failure: Option<(String, String)>,
}

impl RecordingStorage {
    pub fn failing(message: &str) -> Self {
        Self::failing_on("", message)
    }

    /// Fail only saves whose filename contains `fragment`.
    pub fn failing_on(fragment: &str, message: &str) -> Self {
        Self {
            saves: Mutex::new(Vec::new()),
            failure: Some((fragment.to_string(), message.to_string())),
        }
    }

    pub fn saves(&self) -> Vec<(String, String, usize)> {
        self.saves.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageProvider for RecordingStorage {
    async fn save(&self, namespace: &str, filename: &str, data: Bytes) -> WorkerResult<String> {
        self.saves
            .lock()
            .unwrap()
            .push((namespace.to_string(), filename.to_string(), data.len()));
        match &self.failure {
            Some((fragment, message)) if filename.contains(fragment.as_str()) => {
                Err(WorkerError::Storage(message.clone()))
            }
            _ => Ok(format!("https://cdn/{}/{}", namespace, filename)),
        }
    }
}

/// Panics on every save.
pub struct PanickingStorage;

#[async_trait]
impl StorageProvider for PanickingStorage {
    async fn save(&self, _namespace: &str, filename: &str, _data: Bytes) -> WorkerResult<String> {
        panic!("storage backend crashed while writing {}", filename)
    }
}

/// Answers every report type with the same small financial payload.
pub struct StaticReportData;

#[async_trait]
impl ReportDataSource for StaticReportData {
    async fn fetch(&self, _report_type: ReportType, _filters: &ReportFilters) -> WorkerResult<ReportPayload> {
        let now = Utc::now();
        Ok(ReportPayload::FinancialSummary(FinancialReportData {
            start_date: now,
            end_date: now,
            total_income: 1_000_000.0,
            total_in_kind_value: 0.0,
            total_expenses: 250_000.0,
            net_income: 750_000.0,
            expenses_by_category: vec![],
            income_by_source: vec![],
            top_donations: vec![],
        }))
    }
}

/// Returns a fixed non-empty document.
pub struct StubRenderer;

impl ReportRenderer for StubRenderer {
    fn render(&self, _payload: &ReportPayload) -> WorkerResult<Vec<u8>> {
        Ok(b"%PDF-1.5 stub".to_vec())
    }
}

/// Reads from the wrapped repository but rejects every status write.
pub struct RejectingWrites<R>(pub R);

#[async_trait]
impl<R: JobRepository> JobRepository for RejectingWrites<R> {
    type Record = R::Record;

    async fn get_by_id(&self, id: &str) -> WorkerResult<Self::Record> {
        self.0.get_by_id(id).await
    }

    async fn update_status(&self, _id: &str, _update: &StatusUpdate) -> WorkerResult<()> {
        Err(WorkerError::Database(sqlx::Error::PoolTimedOut))
    }
}
