//! Persistence seam for analysis records.
//!
//! Every mutation goes through [`AnalysisStore::update`], which applies a
//! closure to the current record under the store's write lock. Concurrent
//! feedback appends and run transitions therefore never overwrite each other.

use std::collections::HashMap;

use async_trait::async_trait;
use physio_core::analysis::{Analysis, AnalysisKey, AnalysisStatus};
use physio_core::error::CoreError;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Mutation applied atomically to a stored record.
pub type UpdateFn = Box<dyn FnOnce(&mut Analysis) -> Result<(), CoreError> + Send>;

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn get(&self, key: &AnalysisKey) -> Result<Option<Analysis>, StoreError>;

    /// Insert a record, replacing any existing record for the same key.
    async fn put(&self, analysis: Analysis) -> Result<(), StoreError>;

    /// Apply `f` to the record and return the updated copy. If `f` fails the
    /// stored record is left untouched.
    async fn update(&self, key: &AnalysisKey, f: UpdateFn) -> Result<Analysis, StoreError>;

    /// The user's most recent completed analysis, by session date. Between
    /// records sharing a latest date, the one with the longer score history
    /// wins.
    async fn latest_completed_for_user(&self, user_id: &str) -> Result<Option<Analysis>, StoreError>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Analysis>, StoreError>;
}

/// `RwLock<HashMap>`-backed store for tests and the file worker.
#[derive(Default)]
pub struct InMemoryAnalysisStore {
    records: RwLock<HashMap<AnalysisKey, Analysis>>,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

/// Order of completed analyses: latest session date, then history length,
/// then last update.
fn session_order(analysis: &Analysis) -> (physio_core::types::Timestamp, usize, physio_core::types::Timestamp) {
    let progress = analysis.progress_tracking();
    let date = progress
        .and_then(|p| p.latest())
        .map(|e| e.date)
        .unwrap_or_else(|| analysis.created_at());
    let sessions = progress.map_or(0, |p| p.previous_scores.len());
    (date, sessions, analysis.updated_at())
}

#[async_trait]
impl AnalysisStore for InMemoryAnalysisStore {
    async fn get(&self, key: &AnalysisKey) -> Result<Option<Analysis>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put(&self, analysis: Analysis) -> Result<(), StoreError> {
        self.records.write().await.insert(analysis.key(), analysis);
        Ok(())
    }

    async fn update(&self, key: &AnalysisKey, f: UpdateFn) -> Result<Analysis, StoreError> {
        let mut records = self.records.write().await;
        let current = records
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let mut next = current.clone();
        f(&mut next)?;
        *current = next.clone();
        Ok(next)
    }

    async fn latest_completed_for_user(&self, user_id: &str) -> Result<Option<Analysis>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|a| a.user_id() == user_id && a.status() == AnalysisStatus::Completed)
            .max_by_key(|a| session_order(a))
            .cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Analysis>, StoreError> {
        let records = self.records.read().await;
        let mut list: Vec<Analysis> = records
            .values()
            .filter(|a| a.user_id() == user_id)
            .cloned()
            .collect();
        list.sort_by_key(|a| a.created_at());
        Ok(list)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
