#![allow(dead_code)]

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use media_ingestion_application::{
    CacheError, CacheStore, ChangedIdsSource, ChangesPage, ClaimOutcome, DetailsSource,
    DetailsTransformer, MediaActivityRepository, MediaRecord, MediaRepository, ProviderError,
    RepositoryError, RunId, TaskRunRepository, TaskRunState, TaskRunStateError, Transaction, TransactionContext,
    TransactionError, TransactionManager, TransformError,
};
use media_ingestion_domain::{MediaType, ProviderKind, TaskReport};
use serde_json::{json, Value};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    pub sets: AtomicUsize,
    pub fail_sets: bool,
}

impl InMemoryCache {
    pub fn failing_sets() -> Self {
        Self {
            fail_sets: true,
            ..Self::default()
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    pub async fn put_raw(&self, key: &str, raw: &[u8]) {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), raw.to_vec());
    }

    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_sets {
            return Err(CacheError::Backend("cache is read-only".to_string()));
        }
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// Serves scripted pages; a page without a script fails with a 500.
pub struct ScriptedChanges {
    pages: HashMap<u32, ChangesPage>,
    total_pages: u32,
    pub calls: AtomicUsize,
}

impl ScriptedChanges {
    /// `failing` pages return an error, every other page returns ids
    /// `page * 100 + 0..per_page`.
    pub fn new(total_pages: u32, per_page: i64, failing: &[u32]) -> Self {
        let failing: HashSet<u32> = failing.iter().copied().collect();
        let pages = (1..=total_pages)
            .filter(|page| !failing.contains(page))
            .map(|page| {
                let ids = (0..per_page).map(|i| page as i64 * 100 + i).collect();
                (
                    page,
                    ChangesPage {
                        ids,
                        total_pages: Some(total_pages),
                    },
                )
            })
            .collect();
        Self {
            pages,
            total_pages,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }
}

#[async_trait]
impl ChangedIdsSource for ScriptedChanges {
    async fn changed_ids_page(&self, page: u32) -> Result<ChangesPage, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages.get(&page).cloned().ok_or(ProviderError::Api {
            status: 500,
            body: format!("page {} unavailable", page),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    Begin(usize),
    Commit(usize),
    Rollback(usize),
}

#[derive(Default)]
pub struct RecordingTransactions {
    next: AtomicUsize,
    events: Arc<std::sync::Mutex<Vec<TxEvent>>>,
}

impl RecordingTransactions {
    pub fn events(&self) -> Vec<TxEvent> {
        self.events.lock().unwrap().clone()
    }
}

pub struct RecordingTransaction {
    pub id: usize,
    events: Arc<std::sync::Mutex<Vec<TxEvent>>>,
}

#[async_trait]
impl TransactionManager for RecordingTransactions {
    async fn begin(&self) -> Result<Box<dyn Transaction>, TransactionError> {
        let id = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        self.events.lock().unwrap().push(TxEvent::Begin(id));
        Ok(Box::new(RecordingTransaction {
            id,
            events: self.events.clone(),
        }))
    }
}

#[async_trait]
impl Transaction for RecordingTransaction {
    async fn commit(self: Box<Self>) -> Result<(), TransactionError> {
        self.events.lock().unwrap().push(TxEvent::Commit(self.id));
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransactionError> {
        self.events.lock().unwrap().push(TxEvent::Rollback(self.id));
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Transaction id the context is bound to, as seen by a repository.
pub async fn tx_id(tx: &TransactionContext) -> Result<usize, RepositoryError> {
    let mut guard = tx.acquire().await;
    Ok(guard.downcast_mut::<RecordingTransaction>()?.id)
}

#[derive(Default)]
pub struct FakeMediaRepository {
    pub orphans: Mutex<HashMap<MediaType, Vec<i64>>>,
    pub stored: Mutex<HashMap<MediaType, Vec<String>>>,
    pub stale: Mutex<HashMap<MediaType, Vec<String>>>,
    pub failing_types: Mutex<HashSet<MediaType>>,
    pub removed: Mutex<Vec<(usize, MediaType, Vec<i64>)>>,
    pub upserts: Mutex<Vec<(usize, MediaType, MediaRecord)>>,
}

impl FakeMediaRepository {
    pub async fn with_orphans(self, media_type: MediaType, ids: Vec<i64>) -> Self {
        self.orphans.lock().await.insert(media_type, ids);
        self
    }

    pub async fn with_stored(self, media_type: MediaType, api_ids: &[&str]) -> Self {
        self.stored
            .lock()
            .await
            .insert(media_type, api_ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub async fn with_stale(self, media_type: MediaType, api_ids: &[&str]) -> Self {
        self.stale
            .lock()
            .await
            .insert(media_type, api_ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub async fn failing_on(self, media_type: MediaType) -> Self {
        self.failing_types.lock().await.insert(media_type);
        self
    }
}

#[async_trait]
impl MediaRepository for FakeMediaRepository {
    async fn orphaned_media_ids(
        &self,
        tx: &TransactionContext,
        media_type: MediaType,
    ) -> Result<Vec<i64>, RepositoryError> {
        tx_id(tx).await?;
        Ok(self
            .orphans
            .lock()
            .await
            .get(&media_type)
            .cloned()
            .unwrap_or_default())
    }

    async fn remove_media_by_ids(
        &self,
        tx: &TransactionContext,
        media_type: MediaType,
        ids: &[i64],
    ) -> Result<u64, RepositoryError> {
        let id = tx_id(tx).await?;
        if self.failing_types.lock().await.contains(&media_type) {
            return Err(RepositoryError::Backend(format!(
                "cannot delete {}",
                media_type
            )));
        }
        self.removed
            .lock()
            .await
            .push((id, media_type, ids.to_vec()));
        Ok(ids.len() as u64)
    }

    async fn upsert_media(
        &self,
        tx: &TransactionContext,
        media_type: MediaType,
        record: &MediaRecord,
    ) -> Result<i64, RepositoryError> {
        let id = tx_id(tx).await?;
        let mut upserts = self.upserts.lock().await;
        upserts.push((id, media_type, record.clone()));
        Ok(upserts.len() as i64)
    }

    async fn stored_api_ids(&self, media_type: MediaType) -> Result<Vec<String>, RepositoryError> {
        Ok(self
            .stored
            .lock()
            .await
            .get(&media_type)
            .cloned()
            .unwrap_or_default())
    }

    async fn api_ids_to_refresh(
        &self,
        media_type: MediaType,
        _stale_after: chrono::Duration,
    ) -> Result<Vec<String>, RepositoryError> {
        Ok(self
            .stale
            .lock()
            .await
            .get(&media_type)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeActivityRepository {
    pub deleted_updates: Mutex<Vec<(MediaType, Vec<i64>)>>,
    pub deleted_notifications: Mutex<Vec<(MediaType, Vec<i64>)>>,
}

#[async_trait]
impl MediaActivityRepository for FakeActivityRepository {
    async fn delete_media_updates(
        &self,
        tx: &TransactionContext,
        media_type: MediaType,
        ids: &[i64],
    ) -> Result<u64, RepositoryError> {
        tx_id(tx).await?;
        self.deleted_updates
            .lock()
            .await
            .push((media_type, ids.to_vec()));
        Ok(ids.len() as u64)
    }

    async fn delete_media_notifications(
        &self,
        tx: &TransactionContext,
        media_type: MediaType,
        ids: &[i64],
    ) -> Result<u64, RepositoryError> {
        tx_id(tx).await?;
        self.deleted_notifications
            .lock()
            .await
            .push((media_type, ids.to_vec()));
        Ok(0)
    }
}

/// Details keyed by api id; unknown ids fail with a 404.
#[derive(Default)]
pub struct StubDetails {
    pub items: HashMap<String, Value>,
    pub calls: AtomicUsize,
}

impl StubDetails {
    pub fn with_items(api_ids: &[&str]) -> Self {
        let items = api_ids
            .iter()
            .map(|id| (id.to_string(), json!({ "id": id, "title": format!("Item {}", id) })))
            .collect();
        Self {
            items,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DetailsSource for StubDetails {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Tmdb
    }

    async fn fetch_details(&self, api_id: &str) -> Result<Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.items.get(api_id).cloned().ok_or(ProviderError::Api {
            status: 404,
            body: format!("{} not found", api_id),
        })
    }
}

pub struct TitleTransformer;

impl DetailsTransformer for TitleTransformer {
    fn transform(&self, raw: &Value) -> Result<MediaRecord, TransformError> {
        let api_id = raw
            .get("id")
            .and_then(Value::as_str)
            .ok_or(TransformError::MissingField("id"))?;
        let name = raw
            .get("title")
            .and_then(Value::as_str)
            .ok_or(TransformError::MissingField("title"))?;
        Ok(MediaRecord {
            api_id: api_id.to_string(),
            name: name.to_string(),
            release_date: None,
            synopsis: None,
            genres: Vec::new(),
            payload: raw.clone(),
        })
    }
}

#[derive(Default)]
pub struct InMemoryTaskRuns {
    states: Mutex<HashMap<String, TaskRunState>>,
    pub heartbeats: AtomicUsize,
}

impl InMemoryTaskRuns {
    pub async fn insert(&self, state: TaskRunState) {
        self.states
            .lock()
            .await
            .insert(state.task_name.clone(), state);
    }

    pub async fn snapshot(&self, task_name: &str) -> Option<TaskRunState> {
        self.states.lock().await.get(task_name).cloned()
    }

    pub fn heartbeat_count(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskRunRepository for InMemoryTaskRuns {
    async fn get(&self, task_name: &str) -> Result<Option<TaskRunState>, TaskRunStateError> {
        Ok(self.states.lock().await.get(task_name).cloned())
    }

    async fn upsert(&self, task_name: &str, state: &TaskRunState) -> Result<(), TaskRunStateError> {
        self.states
            .lock()
            .await
            .insert(task_name.to_string(), state.clone());
        Ok(())
    }

    async fn try_claim(
        &self,
        task_name: &str,
        state: &TaskRunState,
        stale_after: chrono::Duration,
    ) -> Result<ClaimOutcome, TaskRunStateError> {
        // Give other callers a chance to interleave, as a network round trip would.
        tokio::task::yield_now().await;
        let mut states = self.states.lock().await;
        let outcome = ClaimOutcome::decide(states.get(task_name), Utc::now(), stale_after);
        if outcome.is_claimed() {
            states.insert(task_name.to_string(), state.clone());
        }
        Ok(outcome)
    }

    async fn heartbeat(
        &self,
        task_name: &str,
        run_id: &RunId,
        heartbeat_at: DateTime<Utc>,
    ) -> Result<(), TaskRunStateError> {
        let mut states = self.states.lock().await;
        let state = states
            .get_mut(task_name)
            .ok_or_else(|| TaskRunStateError::NotFound(task_name.to_string()))?;
        if &state.run_id != run_id {
            return Err(TaskRunStateError::StaleInstance(task_name.to_string()));
        }
        state.heartbeat_at = heartbeat_at;
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn finish(
        &self,
        task_name: &str,
        run_id: &RunId,
        report: &TaskReport,
    ) -> Result<(), TaskRunStateError> {
        let mut states = self.states.lock().await;
        let state = states
            .get_mut(task_name)
            .ok_or_else(|| TaskRunStateError::NotFound(task_name.to_string()))?;
        if &state.run_id != run_id {
            return Err(TaskRunStateError::StaleInstance(task_name.to_string()));
        }
        state.status = report.status;
        state.last_error = report.error.clone();
        state.report = Some(report.clone());
        Ok(())
    }
}
