use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{WorkerError, WorkerResult};

// Job records
// Note: ids are opaque strings at the repository boundary; Postgres stores them as uuid
// and the repositories select `id::text`.

/// Lifecycle status persisted on every job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized job status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for JobStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Older writers stored upper-case values
        match s.to_ascii_lowercase().as_str() {
            "pending" | "" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

impl TryFrom<String> for JobStatus {
    type Error = ParseStatusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReportRecord {
    pub id: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub report_type: String,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub file_url: String,
    pub error_msg: String,
    pub filters: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReportRecord {
    pub fn new(id: impl Into<String>, report_type: impl Into<String>, filters: Value) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            report_type: report_type.into(),
            status: JobStatus::Pending,
            file_url: String::new(),
            error_msg: String::new(),
            filters,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ImageJobRecord {
    pub id: String,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub source_image_url: String,
    pub output_image_url: String,
    pub error_msg: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImageJobRecord {
    pub fn new(id: impl Into<String>, source_image_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            source_image_url: source_image_url.into(),
            output_image_url: String::new(),
            error_msg: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// The fields written by a terminal transition.
///
/// `Completed` sets the output reference and clears the error; `Failed` sets the error
/// and leaves whatever output reference the record already had.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Completed { output_url: String },
    Failed { error_msg: String },
}

impl StatusUpdate {
    pub fn completed(output_url: impl Into<String>) -> Self {
        Self::Completed { output_url: output_url.into() }
    }

    pub fn failed(error_msg: impl Into<String>) -> Self {
        Self::Failed { error_msg: error_msg.into() }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn output_url(&self) -> Option<&str> {
        match self {
            Self::Completed { output_url } => Some(output_url),
            Self::Failed { .. } => None,
        }
    }

    pub fn error_msg(&self) -> &str {
        match self {
            Self::Completed { .. } => "",
            Self::Failed { error_msg } => error_msg,
        }
    }
}

// Reports

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    CommunityActivity,
    ParticipantDemographics,
    ProgramImpact,
    FinancialSummary,
}

impl ReportType {
    pub const ALL: [ReportType; 4] = [
        ReportType::CommunityActivity,
        ReportType::ParticipantDemographics,
        ReportType::ProgramImpact,
        ReportType::FinancialSummary,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CommunityActivity => "community_activity",
            Self::ParticipantDemographics => "participant_demographics",
            Self::ProgramImpact => "program_impact",
            Self::FinancialSummary => "financial_summary",
        }
    }

    pub const fn title(self) -> &'static str {
        match self {
            Self::CommunityActivity => "Community Activity Report",
            Self::ParticipantDemographics => "Participant Demographics Report",
            Self::ProgramImpact => "Program Impact Report",
            Self::FinancialSummary => "Financial Transparency Report",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| WorkerError::UnknownReportType(s.to_string()))
    }
}

/// Wildcard community name meaning "every community".
pub const ALL_COMMUNITIES: &str = "all";

/// Filter parameters stored on a report record.
#[derive(Debug, Clone, Default)]
pub struct ReportFilters {
    values: Map<String, Value>,
}

impl ReportFilters {
    pub fn from_value(value: &Value) -> WorkerResult<Self> {
        match value {
            Value::Object(map) => Ok(Self { values: map.clone() }),
            Value::Null => Ok(Self::default()),
            other => Err(WorkerError::InvalidFilter(format!(
                "filters must be an object, got {}",
                other
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// A list of strings, accepting either a JSON array or a single string.
    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        }
    }

    pub fn community_name(&self) -> WorkerResult<&str> {
        self.get_str("community_name")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                WorkerError::InvalidFilter("'community_name' is missing or not a string".into())
            })
    }

    /// `None` when the filter targets every community.
    pub fn community_scope(&self) -> WorkerResult<Option<&str>> {
        let name = self.community_name()?;
        Ok((name != ALL_COMMUNITIES).then_some(name))
    }

    pub fn date(&self, key: &str) -> WorkerResult<DateTime<Utc>> {
        let raw = self.get_str(key).unwrap_or_default();
        DateTime::parse_from_rfc3339(raw)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| WorkerError::InvalidFilter(format!("invalid '{}': {}", key, e)))
    }

    pub fn date_range(&self) -> WorkerResult<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.date("start_date")?;
        let end = self.date("end_date")?;
        if end < start {
            return Err(WorkerError::InvalidFilter(
                "'end_date' is before 'start_date'".into(),
            ));
        }
        Ok((start, end))
    }
}

// Report payloads produced by the aggregation layer

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CategoryCount {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CategoryAmount {
    pub label: String,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventDetail {
    pub name: String,
    pub date: DateTime<Utc>,
    pub tutor_name: String,
    pub participant_count: i64,
    pub documentation_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityActivityData {
    pub community_name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub new_member_count: i64,
    pub active_member_count: i64,
    pub events: Vec<EventDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantDemographicsData {
    pub community_name: String,
    pub total_participants: i64,
    pub by_status: Vec<CategoryCount>,
    pub by_age: Vec<CategoryCount>,
    pub by_location: Vec<CategoryCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ImpactHighlight {
    pub title: String,
    pub owner_name: String,
    pub summary: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramImpactData {
    pub community_name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub stats: Vec<CategoryCount>,
    pub highlights: Vec<ImpactHighlight>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TopDonation {
    pub source: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialReportData {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_income: f64,
    pub total_in_kind_value: f64,
    pub total_expenses: f64,
    pub net_income: f64,
    pub expenses_by_category: Vec<CategoryAmount>,
    pub income_by_source: Vec<CategoryAmount>,
    pub top_donations: Vec<TopDonation>,
}

/// Structured report content handed from aggregation to rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "report_type", rename_all = "snake_case")]
pub enum ReportPayload {
    CommunityActivity(CommunityActivityData),
    ParticipantDemographics(ParticipantDemographicsData),
    ProgramImpact(ProgramImpactData),
    FinancialSummary(FinancialReportData),
}

impl ReportPayload {
    pub fn report_type(&self) -> ReportType {
        match self {
            ReportPayload::CommunityActivity(_) => ReportType::CommunityActivity,
            ReportPayload::ParticipantDemographics(_) => ReportType::ParticipantDemographics,
            ReportPayload::ProgramImpact(_) => ReportType::ProgramImpact,
            ReportPayload::FinancialSummary(_) => ReportType::FinancialSummary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_parsing_accepts_legacy_case() {
        assert_eq!("COMPLETED".parse::<JobStatus>().unwrap(), JobStatus::Completed);
        assert_eq!("failed".parse::<JobStatus>().unwrap(), JobStatus::Failed);
        assert!("done".parse::<JobStatus>().is_err());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }

    #[test]
    fn test_report_type_round_trip() {
        for t in ReportType::ALL {
            assert_eq!(t.as_str().parse::<ReportType>().unwrap(), t);
        }
        let err = "weekly_digest".parse::<ReportType>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown report type: weekly_digest");
    }

    #[test]
    fn test_status_update_fields() {
        let done = StatusUpdate::completed("https://cdn/a.pdf");
        assert_eq!(done.status(), JobStatus::Completed);
        assert_eq!(done.output_url(), Some("https://cdn/a.pdf"));
        assert_eq!(done.error_msg(), "");

        let failed = StatusUpdate::failed("boom");
        assert_eq!(failed.status(), JobStatus::Failed);
        assert_eq!(failed.output_url(), None);
        assert_eq!(failed.error_msg(), "boom");
    }

    #[test]
    fn test_filters() {
        let filters = ReportFilters::from_value(&json!({
            "community_name": "all",
            "start_date": "2024-01-01T00:00:00Z",
            "end_date": "2024-03-31T23:59:59Z"
        }))
        .unwrap();

        assert_eq!(filters.community_scope().unwrap(), None);
        let (start, end) = filters.date_range().unwrap();
        assert!(start < end);

        let scoped = ReportFilters::from_value(&json!({ "community_name": "Riverside" })).unwrap();
        assert_eq!(scoped.community_scope().unwrap(), Some("Riverside"));
        assert!(matches!(scoped.date_range(), Err(WorkerError::InvalidFilter(_))));

        assert!(ReportFilters::from_value(&json!([1, 2])).is_err());
        assert!(ReportFilters::from_value(&json!(null)).unwrap().get("x").is_none());
        assert!(ReportFilters::from_value(&json!({})).unwrap().community_name().is_err());
    }

    #[test]
    fn test_string_lists() {
        let filters = ReportFilters::from_value(&json!({
            "ids": [" a ", "", null, "b"],
            "single": "c",
            "blank": "  "
        }))
        .unwrap();
        assert_eq!(filters.get_str_list("ids"), vec!["a", "b"]);
        assert_eq!(filters.get_str_list("single"), vec!["c"]);
        assert!(filters.get_str_list("blank").is_empty());
        assert!(filters.get_str_list("missing").is_empty());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let filters = ReportFilters::from_value(&json!({
            "start_date": "2024-05-01T00:00:00Z",
            "end_date": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(filters.date_range().is_err());
    }
}
