use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::models::prediction::TrustScore;
use crate::models::resume::{ProcessingStage, ResumeRecord};
use crate::pipeline::PipelineReport;
use crate::resumes::repository::{RepositoryError, ResumeRepository};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS resumes (
    id          UUID PRIMARY KEY,
    owner_id    UUID NOT NULL,
    filename    TEXT NOT NULL,
    stage       TEXT NOT NULL,
    uploaded_at TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL,
    error       TEXT,
    trust_score JSONB,
    report      JSONB
)
"#;

const CREATE_OWNER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS resumes_owner_uploaded_idx ON resumes (owner_id, uploaded_at DESC)";

#[derive(Debug, FromRow)]
struct ResumeRow {
    id: Uuid,
    owner_id: Uuid,
    filename: String,
    stage: String,
    uploaded_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    error: Option<String>,
    trust_score: Option<Json<TrustScore>>,
    report: Option<Json<PipelineReport>>,
}

impl TryFrom<ResumeRow> for ResumeRecord {
    type Error = RepositoryError;

    fn try_from(row: ResumeRow) -> Result<Self, Self::Error> {
        let stage: ProcessingStage = row.stage.parse().map_err(RepositoryError::Corrupt)?;
        Ok(ResumeRecord {
            id: row.id,
            owner_id: row.owner_id,
            filename: row.filename,
            stage,
            uploaded_at: row.uploaded_at,
            updated_at: row.updated_at,
            error: row.error,
            trust_score: row.trust_score.map(|j| j.0),
            report: row.report.map(|j| j.0),
        })
    }
}

/// PostgreSQL-backed store; the report is kept as JSONB.
#[derive(Clone)]
pub struct PgResumeRepository {
    pool: PgPool,
}

impl PgResumeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_OWNER_INDEX).execute(&self.pool).await?;
        info!("Resume table ready");
        Ok(())
    }
}

#[async_trait]
impl ResumeRepository for PgResumeRepository {
    async fn create(&self, record: ResumeRecord) -> Result<ResumeRecord, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO resumes
                (id, owner_id, filename, stage, uploaded_at, updated_at, error, trust_score, report)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.owner_id)
        .bind(&record.filename)
        .bind(record.stage.as_str())
        .bind(record.uploaded_at)
        .bind(record.updated_at)
        .bind(&record.error)
        .bind(record.trust_score.as_ref().map(Json))
        .bind(record.report.as_ref().map(Json))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(record.id));
        }
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ResumeRecord>, RepositoryError> {
        sqlx::query_as::<_, ResumeRow>("SELECT * FROM resumes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(ResumeRecord::try_from)
            .transpose()
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<ResumeRecord>, RepositoryError> {
        sqlx::query_as::<_, ResumeRow>(
            "SELECT * FROM resumes WHERE owner_id = $1 ORDER BY uploaded_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ResumeRecord::try_from)
        .collect()
    }

    async fn update(&self, record: &ResumeRecord) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE resumes
            SET stage = $2, updated_at = $3, error = $4, trust_score = $5, report = $6
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.stage.as_str())
        .bind(record.updated_at)
        .bind(&record.error)
        .bind(record.trust_score.as_ref().map(Json))
        .bind(record.report.as_ref().map(Json))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(record.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM resumes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, RepositoryError> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("DELETE FROM resumes WHERE uploaded_at < $1 RETURNING id")
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }
}
