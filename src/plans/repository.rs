use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use super::{PlanName, PlanRecord};
use crate::auth::SubjectId;

/// Errors from the plan persistence layer
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A row for this subject already exists (unique constraint on `subject_id`)
    #[error("Plan record already exists")]
    Duplicate,

    /// Connectivity or contention problem that may succeed on retry
    #[error("Plan storage temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Plan storage query failed: {0}")]
    Query(String),
}

impl RepositoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Unavailable(_))
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("23505") => RepositoryError::Duplicate,
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => RepositoryError::Unavailable(err.to_string()),
                _ => RepositoryError::Query(err.to_string()),
            },
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::WorkerCrashed => RepositoryError::Unavailable(err.to_string()),
            _ => RepositoryError::Query(err.to_string()),
        }
    }
}

/// Row-level plan storage. Each call is a single atomic statement; the
/// insert-or-fetch and update-or-insert sequences live in `PlanStore`.
#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn find(&self, subject: &SubjectId) -> Result<Option<PlanRecord>, RepositoryError>;

    /// Insert a new row. Must fail with `Duplicate` if the subject already has one.
    async fn insert(&self, subject: &SubjectId, plan: PlanName)
        -> Result<PlanRecord, RepositoryError>;

    /// Update an existing row, returning `None` when there is nothing to update.
    async fn update(
        &self,
        subject: &SubjectId,
        plan: PlanName,
    ) -> Result<Option<PlanRecord>, RepositoryError>;

    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Postgres-backed plan storage over the `user_plans` table
#[derive(Clone)]
pub struct PgPlanRepository {
    pool: PgPool,
}

impl PgPlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanRepository for PgPlanRepository {
    async fn find(&self, subject: &SubjectId) -> Result<Option<PlanRecord>, RepositoryError> {
        let record = sqlx::query_as::<_, PlanRecord>(
            r#"
            SELECT subject_id, plan, updated_at
            FROM user_plans
            WHERE subject_id = $1
            "#,
        )
        .bind(subject.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn insert(
        &self,
        subject: &SubjectId,
        plan: PlanName,
    ) -> Result<PlanRecord, RepositoryError> {
        let record = sqlx::query_as::<_, PlanRecord>(
            r#"
            INSERT INTO user_plans (subject_id, plan, updated_at)
            VALUES ($1, $2, now())
            RETURNING subject_id, plan, updated_at
            "#,
        )
        .bind(subject.as_str())
        .bind(plan.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update(
        &self,
        subject: &SubjectId,
        plan: PlanName,
    ) -> Result<Option<PlanRecord>, RepositoryError> {
        let record = sqlx::query_as::<_, PlanRecord>(
            r#"
            UPDATE user_plans
            SET plan = $2, updated_at = now()
            WHERE subject_id = $1
            RETURNING subject_id, plan, updated_at
            "#,
        )
        .bind(subject.as_str())
        .bind(plan.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
