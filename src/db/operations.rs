use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::JobRepository;
use crate::models::{ImageJobRecord, ReportRecord, StatusUpdate};
use crate::types::{WorkerError, WorkerResult};

fn parse_id(id: &str) -> WorkerResult<Uuid> {
    Uuid::parse_str(id.trim()).map_err(|e| WorkerError::InvalidJobId(format!("{:?}: {}", id, e)))
}

/// `reports` table.
#[derive(Clone)]
pub struct PgReportRepository {
    pool: PgPool,
}

impl PgReportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PgReportRepository {
    type Record = ReportRecord;

    async fn get_by_id(&self, id: &str) -> WorkerResult<ReportRecord> {
        let report_id = parse_id(id)?;

        sqlx::query_as::<_, ReportRecord>(
            r#"
            SELECT id::text AS id, type, status, file_url, error_msg, filters, created_at, updated_at
            FROM reports
            WHERE id = $1
            "#,
        )
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| WorkerError::NotFound(format!("report {}", id)))
    }

    async fn update_status(&self, id: &str, update: &StatusUpdate) -> WorkerResult<()> {
        let report_id = parse_id(id)?;

        let result = sqlx::query(
            r#"
            UPDATE reports
            SET status = $2,
                file_url = COALESCE($3, file_url),
                error_msg = $4,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(report_id)
        .bind(update.status().as_str())
        .bind(update.output_url())
        .bind(update.error_msg())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WorkerError::NotFound(format!("report {}", id)));
        }
        Ok(())
    }
}

/// `image_jobs` table.
#[derive(Clone)]
pub struct PgImageJobRepository {
    pool: PgPool,
}

impl PgImageJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PgImageJobRepository {
    type Record = ImageJobRecord;

    async fn get_by_id(&self, id: &str) -> WorkerResult<ImageJobRecord> {
        let job_id = parse_id(id)?;

        sqlx::query_as::<_, ImageJobRecord>(
            r#"
            SELECT id::text AS id, status, source_image_url, output_image_url, error_msg,
                   created_at, updated_at
            FROM image_jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| WorkerError::NotFound(format!("image job {}", id)))
    }

    async fn update_status(&self, id: &str, update: &StatusUpdate) -> WorkerResult<()> {
        let job_id = parse_id(id)?;

        let result = sqlx::query(
            r#"
            UPDATE image_jobs
            SET status = $2,
                output_image_url = COALESCE($3, output_image_url),
                error_msg = $4,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(update.status().as_str())
        .bind(update.output_url())
        .bind(update.error_msg())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WorkerError::NotFound(format!("image job {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
        assert_eq!(parse_id(&format!(" {} ", id)).unwrap(), id);
        assert!(matches!(parse_id("R1"), Err(WorkerError::InvalidJobId(_))));
        assert!(matches!(parse_id("665f1c2e9b1e8a0012345678"), Err(WorkerError::InvalidJobId(_))));
    }

    #[tokio::test]
    async fn test_malformed_id_is_rejected_before_querying() {
        // connect_lazy never opens a connection, so this only passes if no query runs
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let repo = PgReportRepository::new(pool);

        let err = repo.get_by_id("not-a-uuid").await.unwrap_err();
        assert!(err.is_lookup());

        let err = repo
            .update_status("not-a-uuid", &StatusUpdate::failed("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::InvalidJobId(_)));
    }
}
