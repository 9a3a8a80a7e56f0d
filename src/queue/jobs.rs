// Job envelopes read from the task queue

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;
use thiserror::Error;

/// Task type discriminants understood by this worker.
pub mod task_types {
    pub const GENERATE_REPORT: &str = "generate_report";
    pub const PROCESS_IMAGE: &str = "process_image";
}

/// Wire-level queue entry. The payload stays raw until the task type is known.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(alias = "taskType")]
    pub task_type: String,
    #[serde(default)]
    pub payload: Option<Box<RawValue>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportJobPayload {
    #[serde(rename = "reportID", alias = "report_id", alias = "reportId")]
    pub report_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageJobPayload {
    #[serde(rename = "imageJobID", alias = "image_job_id", alias = "imageJobId")]
    pub image_job_id: String,
}

/// A decoded queue entry routed by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    GenerateReport(ReportJobPayload),
    ProcessImage(ImageJobPayload),
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("empty queue entry")]
    Empty,

    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("invalid {task_type} payload: {source}")]
    InvalidPayload {
        task_type: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl Task {
    /// Decode a raw queue entry.
    ///
    /// Unknown task types decode successfully into [`Task::Unknown`]; only malformed
    /// JSON or a payload that does not fit a known kind is an error.
    pub fn decode(raw: &str) -> Result<Task, EnvelopeError> {
        if raw.trim().is_empty() {
            return Err(EnvelopeError::Empty);
        }
        let envelope: Envelope = serde_json::from_str(raw).map_err(EnvelopeError::Malformed)?;
        let payload = envelope.payload.as_deref().map(RawValue::get).unwrap_or("null");

        match envelope.task_type.as_str() {
            task_types::GENERATE_REPORT => serde_json::from_str(payload)
                .map(Task::GenerateReport)
                .map_err(|source| EnvelopeError::InvalidPayload {
                    task_type: task_types::GENERATE_REPORT,
                    source,
                }),
            task_types::PROCESS_IMAGE => serde_json::from_str(payload)
                .map(Task::ProcessImage)
                .map_err(|source| EnvelopeError::InvalidPayload {
                    task_type: task_types::PROCESS_IMAGE,
                    source,
                }),
            _ => Ok(Task::Unknown(envelope.task_type)),
        }
    }

    pub fn task_type(&self) -> &str {
        match self {
            Task::GenerateReport(_) => task_types::GENERATE_REPORT,
            Task::ProcessImage(_) => task_types::PROCESS_IMAGE,
            Task::Unknown(kind) => kind,
        }
    }

    /// Id of the job record this task refers to.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Task::GenerateReport(p) => Some(&p.report_id),
            Task::ProcessImage(p) => Some(&p.image_job_id),
            Task::Unknown(_) => None,
        }
    }

    /// Encode a task the way producers enqueue it.
    pub fn encode(&self) -> Option<String> {
        let payload = match self {
            Task::GenerateReport(p) => serde_json::to_value(p).ok()?,
            Task::ProcessImage(p) => serde_json::to_value(p).ok()?,
            Task::Unknown(_) => return None,
        };
        Some(serde_json::json!({ "task_type": self.task_type(), "payload": payload }).to_string())
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.job_id() {
            Some(id) => write!(f, "{}({})", self.task_type(), id),
            None => write!(f, "{}", self.task_type()),
        }
    }
}
