// Artifact rendering: report PDFs and optimized images

pub mod chart;
pub mod image;
pub mod pdf;
pub mod report;

use chrono::Utc;

use crate::models::ReportPayload;
use crate::types::WorkerResult;

pub use self::image::{ImageTransformer, WebpTransformer};
pub use report::format_currency;

/// Turns aggregated report content into document bytes.
///
/// Rendering is CPU-bound; callers run it off the async executor.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, payload: &ReportPayload) -> WorkerResult<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct PdfReportRenderer {
    org_name: String,
}

impl PdfReportRenderer {
    pub fn new(org_name: impl Into<String>) -> Self {
        Self { org_name: org_name.into() }
    }
}

impl ReportRenderer for PdfReportRenderer {
    fn render(&self, payload: &ReportPayload) -> WorkerResult<Vec<u8>> {
        report::render_payload(payload, &self.org_name, Utc::now())
    }
}
