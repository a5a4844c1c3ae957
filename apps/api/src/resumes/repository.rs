use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::resume::ResumeRecord;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Resume {0} not found")]
    NotFound(Uuid),

    #[error("Resume {0} already exists")]
    Conflict(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored resume is malformed: {0}")]
    Corrupt(String),
}

/// Storage for resume records.
///
/// Records are created on upload, rewritten on every stage transition and
/// removed only by `delete` (explicit erasure) or `purge_older_than`
/// (retention).
#[async_trait]
pub trait ResumeRepository: Send + Sync {
    async fn create(&self, record: ResumeRecord) -> Result<ResumeRecord, RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Option<ResumeRecord>, RepositoryError>;

    /// Newest upload first.
    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<ResumeRecord>, RepositoryError>;

    /// Replaces a stored record. Fails with `NotFound` once it was deleted.
    async fn update(&self, record: &ResumeRecord) -> Result<(), RepositoryError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError>;

    /// Removes records uploaded before `cutoff` and returns their ids.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, RepositoryError>;
}

/// Process-local store used when no database is configured.
#[derive(Default)]
pub struct InMemoryResumeRepository {
    records: RwLock<HashMap<Uuid, ResumeRecord>>,
}

impl InMemoryResumeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResumeRepository for InMemoryResumeRepository {
    async fn create(&self, record: ResumeRecord) -> Result<ResumeRecord, RepositoryError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(RepositoryError::Conflict(record.id));
        }
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ResumeRecord>, RepositoryError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<ResumeRecord>, RepositoryError> {
        let mut owned: Vec<ResumeRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(owned)
    }

    async fn update(&self, record: &ResumeRecord) -> Result<(), RepositoryError> {
        match self.records.write().await.get_mut(&record.id) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(record.id)),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        Ok(self.records.write().await.remove(&id).is_some())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, RepositoryError> {
        let mut records = self.records.write().await;
        let expired: Vec<Uuid> = records
            .values()
            .filter(|r| r.uploaded_at < cutoff)
            .map(|r| r.id)
            .collect();
        for id in &expired {
            records.remove(id);
        }
        Ok(expired)
    }
}
