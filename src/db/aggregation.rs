// Report data aggregation over the organisation tables.
// A community name of "all" drops the community predicate (`$n::text IS NULL OR ...`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::db::ReportDataSource;
use crate::models::{
    CategoryAmount, CategoryCount, CommunityActivityData, EventDetail, FinancialReportData,
    ImpactHighlight, ParticipantDemographicsData, ProgramImpactData, ReportFilters, ReportPayload,
    ReportType, TopDonation,
};
use crate::types::WorkerResult;

const HIGHLIGHT_LIMIT: i64 = 3;
const LOCATION_LIMIT: i64 = 10;
const TOP_DONATION_LIMIT: i64 = 5;
const HIGHLIGHT_FILTER_KEYS: [&str; 3] = ["highlight_milestone_ids", "highlightMilestoneIds", "highlight_ids"];

#[derive(Debug, Clone, Copy)]
enum UserAttribute {
    EmploymentStatus,
    AgeCategory,
    Domicile,
}

impl UserAttribute {
    const fn column(self) -> &'static str {
        match self {
            UserAttribute::EmploymentStatus => "employment_status",
            UserAttribute::AgeCategory => "age_category",
            UserAttribute::Domicile => "domicile",
        }
    }
}

#[derive(Clone)]
pub struct PgReportDataSource {
    pool: PgPool,
}

impl PgReportDataSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn community_activity(&self, filters: &ReportFilters) -> WorkerResult<CommunityActivityData> {
        let community_name = filters.community_name()?.to_string();
        let scope = filters.community_scope()?;
        let (start, end) = filters.date_range()?;

        let new_member_count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM users
            WHERE created_at BETWEEN $1 AND $2
              AND ($3::text IS NULL OR $3 = ANY(communities))
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(scope)
        .fetch_one(&self.pool)
        .await?;

        // Documentation lists completed image-job outputs first, then plain URLs
        let events = sqlx::query_as::<_, EventDetail>(
            r#"
            SELECT e.name,
                   e.date,
                   COALESCE(NULLIF(TRIM(e.tutor_name), ''), NULLIF(TRIM(u.name), ''), 'N/A') AS tutor_name,
                   (SELECT COUNT(*) FROM attendances a WHERE a.event_id = e.id) AS participant_count,
                   ARRAY(
                       SELECT TRIM(ij.output_image_url)
                       FROM unnest(e.image_job_ids) WITH ORDINALITY AS j(job_id, ord)
                       JOIN image_jobs ij ON ij.id = j.job_id
                       WHERE lower(ij.status) = 'completed' AND TRIM(ij.output_image_url) <> ''
                       ORDER BY j.ord
                   ) || ARRAY(
                       SELECT TRIM(d)
                       FROM unnest(e.documentation_urls) AS d
                       WHERE TRIM(d) <> ''
                   ) AS documentation_urls
            FROM events e
            LEFT JOIN users u ON u.id = e.tutor_user_id
            WHERE e.date BETWEEN $1 AND $2
              AND ($3::text IS NULL OR e.community = $3)
            ORDER BY e.date
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(scope)
        .fetch_all(&self.pool)
        .await?;

        let active_member_count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT a.attendee_user_id)
            FROM attendances a
            JOIN events e ON e.id = a.event_id
            WHERE a.attendee_type = 'Member'
              AND a.attendee_user_id IS NOT NULL
              AND e.date BETWEEN $1 AND $2
              AND ($3::text IS NULL OR e.community = $3)
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(scope)
        .fetch_one(&self.pool)
        .await?;

        Ok(CommunityActivityData {
            community_name,
            start_date: start,
            end_date: end,
            new_member_count,
            active_member_count,
            events,
        })
    }

    async fn participant_demographics(
        &self,
        filters: &ReportFilters,
    ) -> WorkerResult<ParticipantDemographicsData> {
        let community_name = filters.community_name()?.to_string();
        let scope = filters.community_scope()?;

        let total_participants: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE ($1::text IS NULL OR $1 = ANY(communities))",
        )
        .bind(scope)
        .fetch_one(&self.pool)
        .await?;

        let by_status = self.count_users_by(UserAttribute::EmploymentStatus, scope, None).await?;
        let by_age = self.count_users_by(UserAttribute::AgeCategory, scope, None).await?;
        let by_location = self
            .count_users_by(UserAttribute::Domicile, scope, Some(LOCATION_LIMIT))
            .await?;

        Ok(ParticipantDemographicsData {
            community_name,
            total_participants,
            by_status,
            by_age,
            by_location,
        })
    }

    async fn count_users_by(
        &self,
        attribute: UserAttribute,
        scope: Option<&str>,
        limit: Option<i64>,
    ) -> WorkerResult<Vec<CategoryCount>> {
        // LIMIT NULL means no limit
        let sql = format!(
            r#"
            SELECT COALESCE(NULLIF(TRIM({column}), ''), 'Unknown') AS label, COUNT(*) AS count
            FROM users
            WHERE ($1::text IS NULL OR $1 = ANY(communities))
            GROUP BY 1
            ORDER BY count DESC, label
            LIMIT $2
            "#,
            column = attribute.column()
        );

        let rows = sqlx::query_as::<_, CategoryCount>(&sql)
            .bind(scope)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn program_impact(&self, filters: &ReportFilters) -> WorkerResult<ProgramImpactData> {
        let community_name = filters.community_name()?.to_string();
        let scope = filters.community_scope()?;
        let (start, end) = filters.date_range()?;

        let stats = sqlx::query_as::<_, CategoryCount>(
            r#"
            SELECT m.type AS label, COUNT(*) AS count
            FROM milestones m
            LEFT JOIN users u ON u.id = m.user_id
            WHERE m.date BETWEEN $1 AND $2
              AND ($3::text IS NULL OR $3 = ANY(u.communities))
            GROUP BY m.type
            ORDER BY count DESC, label
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(scope)
        .fetch_all(&self.pool)
        .await?;

        let highlights = self.impact_highlights(filters, scope, start, end).await?;

        Ok(ProgramImpactData {
            community_name,
            start_date: start,
            end_date: end,
            stats,
            highlights,
        })
    }

    async fn impact_highlights(
        &self,
        filters: &ReportFilters,
        scope: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> WorkerResult<Vec<ImpactHighlight>> {
        let pinned = pinned_milestones(filters);
        let limit = if pinned.is_empty() {
            HIGHLIGHT_LIMIT
        } else {
            pinned.len() as i64
        };

        let rows = sqlx::query_as::<_, ImpactHighlight>(
            r#"
            SELECT COALESCE(NULLIF(TRIM(m.title), ''), 'Project Highlight') AS title,
                   COALESCE(NULLIF(TRIM(u.name), ''), '-') AS owner_name,
                   COALESCE(NULLIF(TRIM(m.summary), ''), TRIM(m.description)) AS summary,
                   m.date
            FROM milestones m
            LEFT JOIN users u ON u.id = m.user_id
            WHERE m.type = 'project_submitted'
              AND m.date BETWEEN $1 AND $2
              AND ($3::text IS NULL OR m.community_name = $3)
              AND (cardinality($4::uuid[]) = 0 OR m.id = ANY($4))
            ORDER BY m.date DESC
            LIMIT $5
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(scope)
        .bind(&pinned)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn financial_summary(&self, filters: &ReportFilters) -> WorkerResult<FinancialReportData> {
        let (start, end) = filters.date_range()?;

        let (total_income, total_in_kind_value): (f64, f64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(CASE WHEN donation_type = 'Cash' THEN cash_amount ELSE 0 END), 0)::float8,
                   COALESCE(SUM(CASE WHEN donation_type = 'InKind' THEN in_kind_value ELSE 0 END), 0)::float8
            FROM donations
            WHERE date BETWEEN $1 AND $2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        let income_by_source = sqlx::query_as::<_, CategoryAmount>(
            r#"
            SELECT COALESCE(NULLIF(TRIM(source), ''), 'Unknown') AS label,
                   COALESCE(SUM(CASE WHEN donation_type = 'Cash' THEN cash_amount ELSE 0 END), 0)::float8 AS total
            FROM donations
            WHERE date BETWEEN $1 AND $2
            GROUP BY 1
            ORDER BY total DESC, label
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let top_donations = sqlx::query_as::<_, TopDonation>(
            r#"
            SELECT COALESCE(NULLIF(TRIM(source), ''), 'Unknown') AS source,
                   cash_amount AS amount,
                   date
            FROM donations
            WHERE donation_type = 'Cash' AND date BETWEEN $1 AND $2
            ORDER BY cash_amount DESC
            LIMIT $3
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(TOP_DONATION_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        let total_expenses: f64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::float8 FROM expenses WHERE date BETWEEN $1 AND $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        let expenses_by_category = sqlx::query_as::<_, CategoryAmount>(
            r#"
            SELECT COALESCE(NULLIF(TRIM(category), ''), 'Other') AS label,
                   COALESCE(SUM(amount), 0)::float8 AS total
            FROM expenses
            WHERE date BETWEEN $1 AND $2
            GROUP BY 1
            ORDER BY total DESC, label
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(FinancialReportData {
            start_date: start,
            end_date: end,
            total_income,
            total_in_kind_value,
            total_expenses,
            net_income: total_income - total_expenses,
            expenses_by_category,
            income_by_source,
            top_donations,
        })
    }
}

#[async_trait]
impl ReportDataSource for PgReportDataSource {
    async fn fetch(&self, report_type: ReportType, filters: &ReportFilters) -> WorkerResult<ReportPayload> {
        debug!(report_type = %report_type, "aggregating report data");

        let payload = match report_type {
            ReportType::CommunityActivity => {
                ReportPayload::CommunityActivity(self.community_activity(filters).await?)
            }
            ReportType::ParticipantDemographics => {
                ReportPayload::ParticipantDemographics(self.participant_demographics(filters).await?)
            }
            ReportType::ProgramImpact => ReportPayload::ProgramImpact(self.program_impact(filters).await?),
            ReportType::FinancialSummary => {
                ReportPayload::FinancialSummary(self.financial_summary(filters).await?)
            }
        };
        Ok(payload)
    }
}

/// Milestone ids pinned as highlights. The first key holding any valid id wins.
fn pinned_milestones(filters: &ReportFilters) -> Vec<Uuid> {
    for key in HIGHLIGHT_FILTER_KEYS {
        let ids: Vec<Uuid> = filters
            .get_str_list(key)
            .iter()
            .filter_map(|raw| Uuid::parse_str(raw).ok())
            .collect();
        if !ids.is_empty() {
            return ids;
        }
    }
    Vec::new()
}
