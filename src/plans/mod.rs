pub mod repository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::SubjectId;
use crate::config::PlanStoreConfig;

pub use repository::{PgPlanRepository, PlanRepository, RepositoryError};

/// Plans a subject can be moved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanName {
    Free,
    Premium,
}

impl PlanName {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanName::Free => "free",
            PlanName::Premium => "premium",
        }
    }
}

impl std::fmt::Display for PlanName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid plan '{0}' (expected 'free' or 'premium')")]
pub struct UnknownPlan(pub String);

impl FromStr for PlanName {
    type Err = UnknownPlan;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(PlanName::Free),
            "premium" => Ok(PlanName::Premium),
            other => Err(UnknownPlan(other.to_string())),
        }
    }
}

/// One persisted plan assignment per subject.
///
/// `plan` is kept as stored text; entitlement resolution treats anything
/// unrecognised as the free plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlanRecord {
    pub subject_id: String,
    pub plan: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum PlanStoreError {
    #[error(transparent)]
    InvalidPlan(#[from] UnknownPlan),

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

/// Plan lookup and plan changes, with lazy provisioning of the default plan.
///
/// Concurrent first reads and plan changes for the same subject are reconciled
/// through the storage uniqueness constraint: a duplicate-key insert means another
/// request got there first, so the existing row is used.
#[derive(Clone)]
pub struct PlanStore {
    repo: Arc<dyn PlanRepository>,
    config: PlanStoreConfig,
}

impl PlanStore {
    pub fn new(repo: Arc<dyn PlanRepository>, config: PlanStoreConfig) -> Self {
        Self { repo, config }
    }

    /// Current plan for `subject`, creating a `free` record on first access.
    pub async fn get_plan(&self, subject: &SubjectId) -> Result<PlanRecord, PlanStoreError> {
        let record = self
            .with_retry("get_plan", || self.find_or_provision(subject))
            .await?;
        Ok(record)
    }

    /// Move `subject` to `plan`. Unknown plan names are rejected before any storage call.
    pub async fn set_plan(
        &self,
        subject: &SubjectId,
        plan: &str,
    ) -> Result<PlanRecord, PlanStoreError> {
        let plan: PlanName = plan.parse()?;
        let record = self
            .with_retry("set_plan", || self.update_or_insert(subject, plan))
            .await?;
        info!("Plan for '{}' set to '{}'", subject, record.plan);
        Ok(record)
    }

    pub async fn health_check(&self) -> Result<(), PlanStoreError> {
        self.repo.ping().await?;
        Ok(())
    }

    async fn find_or_provision(&self, subject: &SubjectId) -> Result<PlanRecord, RepositoryError> {
        if let Some(record) = self.repo.find(subject).await? {
            return Ok(record);
        }

        match self.repo.insert(subject, PlanName::Free).await {
            Ok(record) => {
                info!("Provisioned default plan for '{}'", subject);
                Ok(record)
            }
            Err(RepositoryError::Duplicate) => {
                debug!("Plan for '{}' provisioned concurrently; re-reading", subject);
                self.repo.find(subject).await?.ok_or_else(|| {
                    RepositoryError::Query(format!(
                        "plan for '{}' missing after duplicate insert",
                        subject
                    ))
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn update_or_insert(
        &self,
        subject: &SubjectId,
        plan: PlanName,
    ) -> Result<PlanRecord, RepositoryError> {
        if let Some(record) = self.repo.update(subject, plan).await? {
            return Ok(record);
        }

        match self.repo.insert(subject, plan).await {
            Ok(record) => Ok(record),
            Err(RepositoryError::Duplicate) => {
                debug!("Plan for '{}' created concurrently; updating it", subject);
                self.repo.update(subject, plan).await?.ok_or_else(|| {
                    RepositoryError::Query(format!(
                        "plan for '{}' missing after duplicate insert",
                        subject
                    ))
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Retry transient storage failures a bounded number of times
    async fn with_retry<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, RepositoryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        "{} attempt {}/{} failed, retrying: {}",
                        operation, attempt, max_attempts, e
                    );
                    tokio::time::sleep(self.config.retry_backoff() * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
