use async_trait::async_trait;

use crate::models::{ImageJobRecord, ReportFilters, ReportPayload, ReportRecord, ReportType, StatusUpdate};
use crate::types::WorkerResult;

pub use aggregation::*;
pub use operations::*;
pub use pool::*;

pub mod aggregation;
#[cfg(test)]
pub(crate) mod memory;
pub mod operations;
pub mod pool;

/// Per-kind job persistence.
///
/// Updates are scoped to a single record, so concurrent jobs never contend on each other.
#[async_trait]
pub trait JobRepository: Send + Sync {
    type Record: Send;

    /// Load a record. Malformed ids are `InvalidJobId`, missing records `NotFound`.
    async fn get_by_id(&self, id: &str) -> WorkerResult<Self::Record>;

    /// Apply a terminal transition and refresh `updated_at`.
    async fn update_status(&self, id: &str, update: &StatusUpdate) -> WorkerResult<()>;
}

pub type ReportRepository = dyn JobRepository<Record = ReportRecord>;
pub type ImageJobRepository = dyn JobRepository<Record = ImageJobRecord>;

/// Builds the structured content of a report from organisation data.
#[async_trait]
pub trait ReportDataSource: Send + Sync {
    async fn fetch(&self, report_type: ReportType, filters: &ReportFilters) -> WorkerResult<ReportPayload>;
}
