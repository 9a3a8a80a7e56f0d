// In-memory repositories for tests; every applied update is also kept in a history

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::db::JobRepository;
use crate::models::{ImageJobRecord, ReportRecord, StatusUpdate};
use crate::types::{WorkerError, WorkerResult};

/// A job record that can absorb a terminal transition.
pub trait JobDocument: Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn id(&self) -> &str;

    fn apply(&mut self, update: &StatusUpdate);
}

impl JobDocument for ReportRecord {
    const KIND: &'static str = "report";

    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&mut self, update: &StatusUpdate) {
        self.status = update.status();
        if let Some(url) = update.output_url() {
            self.file_url = url.to_string();
        }
        self.error_msg = update.error_msg().to_string();
        self.updated_at = Utc::now();
    }
}

impl JobDocument for ImageJobRecord {
    const KIND: &'static str = "image job";

    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&mut self, update: &StatusUpdate) {
        self.status = update.status();
        if let Some(url) = update.output_url() {
            self.output_image_url = url.to_string();
        }
        self.error_msg = update.error_msg().to_string();
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Default)]
struct RepositoryState<R> {
    records: HashMap<String, R>,
    history: Vec<(String, StatusUpdate)>,
}

#[derive(Clone)]
pub struct InMemoryRepository<R> {
    state: Arc<RwLock<RepositoryState<R>>>,
}

impl<R: JobDocument> Default for InMemoryRepository<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: JobDocument> InMemoryRepository<R> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(RepositoryState {
                records: HashMap::new(),
                history: Vec::new(),
            })),
        }
    }

    pub async fn insert(&self, record: R) {
        let mut state = self.state.write().await;
        state.records.insert(record.id().to_string(), record);
    }

    pub async fn get(&self, id: &str) -> Option<R> {
        self.state.read().await.records.get(id).cloned()
    }

    pub async fn all(&self) -> Vec<R> {
        self.state.read().await.records.values().cloned().collect()
    }

    /// Every update applied so far, oldest first.
    pub async fn updates(&self) -> Vec<(String, StatusUpdate)> {
        self.state.read().await.history.clone()
    }

    pub async fn updates_for(&self, id: &str) -> Vec<StatusUpdate> {
        self.state
            .read()
            .await
            .history
            .iter()
            .filter(|(record_id, _)| record_id == id)
            .map(|(_, update)| update.clone())
            .collect()
    }
}

#[async_trait]
impl<R: JobDocument> JobRepository for InMemoryRepository<R> {
    type Record = R;

    async fn get_by_id(&self, id: &str) -> WorkerResult<R> {
        if id.trim().is_empty() {
            return Err(WorkerError::InvalidJobId(id.to_string()));
        }
        self.get(id)
            .await
            .ok_or_else(|| WorkerError::NotFound(format!("{} {}", R::KIND, id)))
    }

    async fn update_status(&self, id: &str, update: &StatusUpdate) -> WorkerResult<()> {
        let mut state = self.state.write().await;
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| WorkerError::NotFound(format!("{} {}", R::KIND, id)))?;
        record.apply(update);
        state.history.push((id.to_string(), update.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobStatus;

    #[tokio::test]
    async fn test_failed_update_keeps_previous_output() {
        let repo = InMemoryRepository::<ImageJobRecord>::new();
        repo.insert(ImageJobRecord::new("img-1", "https://src/cat.png")).await;

        repo.update_status("img-1", &StatusUpdate::completed("https://cdn/optimized/cat-optimized.webp"))
            .await
            .unwrap();
        repo.update_status("img-1", &StatusUpdate::failed("failed to download image, status: 404"))
            .await
            .unwrap();

        let record = repo.get("img-1").await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.output_image_url, "https://cdn/optimized/cat-optimized.webp");
        assert_eq!(record.error_msg, "failed to download image, status: 404");
        assert_eq!(repo.updates_for("img-1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_lookup_errors() {
        let repo = InMemoryRepository::<ReportRecord>::new();
        assert!(matches!(repo.get_by_id("nope").await, Err(WorkerError::NotFound(_))));
        assert!(matches!(repo.get_by_id(" ").await, Err(WorkerError::InvalidJobId(_))));
        assert!(repo
            .update_status("nope", &StatusUpdate::failed("x"))
            .await
            .is_err());
        assert!(repo.updates().await.is_empty());
    }
}
