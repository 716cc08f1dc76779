//! In-process document store honouring the full live-subscription contract.
//!
//! Used when no database is configured and by the test-suite, which relies on
//! the fault injection helpers to exercise degraded mode.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast, broadcast::error::RecvError};
use uuid::Uuid;

use super::{
    DocumentStore, GroupDocument, ScoreDocument, SnapshotStream, collect_scores,
};
use crate::dao::{
    models::{GroupEntity, GroupWrite, ScoreEntity, ScoreQuery, ScoreWrite},
    storage::{StorageError, StorageResult},
};

const BACKEND: &str = "memory";
const SIGNAL_CAPACITY: usize = 64;

/// Collections held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Scores,
    Groups,
}

#[derive(Debug, Clone)]
enum Signal {
    Changed(Collection),
    Fault(Collection, String),
}

/// Failure produced by the in-memory backend when faults are injected.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MemoryStoreError(String);

#[derive(Default)]
struct MemoryData {
    scores: IndexMap<String, ScoreDocument>,
    groups: IndexMap<String, GroupDocument>,
    last_timestamp: Option<SystemTime>,
    write_failure: Option<String>,
    group_writes: usize,
}

impl MemoryData {
    /// Server clock: strictly increasing across writes.
    fn next_timestamp(&mut self) -> SystemTime {
        let now = SystemTime::now();
        let stamp = match self.last_timestamp {
            Some(last) if last >= now => last + Duration::from_micros(1),
            _ => now,
        };
        self.last_timestamp = Some(stamp);
        stamp
    }

    fn check_writable(&self) -> StorageResult<()> {
        match &self.write_failure {
            Some(message) => Err(StorageError::unavailable(
                BACKEND,
                message.clone(),
                MemoryStoreError(message.clone()),
            )),
            None => Ok(()),
        }
    }
}

struct MemoryInner {
    data: Mutex<MemoryData>,
    signals: broadcast::Sender<Signal>,
}

impl MemoryInner {
    async fn score_snapshot(&self, query: ScoreQuery) -> Vec<ScoreEntity> {
        let documents: Vec<(String, ScoreDocument)> = {
            let data = self.data.lock().await;
            data.scores
                .iter()
                .map(|(id, document)| (id.clone(), document.clone()))
                .collect()
        };
        collect_scores(BACKEND, query, documents)
    }

    async fn group_snapshot(&self) -> Vec<GroupEntity> {
        let data = self.data.lock().await;
        data.groups
            .iter()
            .map(|(id, document)| document.clone().into_entity(id.clone()))
            .collect()
    }

    fn signal(&self, signal: Signal) {
        // No receivers simply means nobody is subscribed yet.
        let _ = self.signals.send(signal);
    }
}

/// Document store living entirely in process memory.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        let (signals, _receiver) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                data: Mutex::new(MemoryData::default()),
                signals,
            }),
        }
    }

    /// Deliver a subscription error to every live stream of `collection`.
    pub fn inject_fault(&self, collection: Collection, message: impl Into<String>) {
        self.inner.signal(Signal::Fault(collection, message.into()));
    }

    /// Re-deliver the current result set of `collection` to every live stream.
    pub fn notify(&self, collection: Collection) {
        self.inner.signal(Signal::Changed(collection));
    }

    /// Make every subsequent write fail with `message`, or succeed again with `None`.
    pub async fn fail_writes(&self, message: Option<String>) {
        self.inner.data.lock().await.write_failure = message;
    }

    /// Number of group writes accepted so far.
    pub async fn group_write_count(&self) -> usize {
        self.inner.data.lock().await.group_writes
    }

    async fn create_score(&self, write: ScoreWrite) -> StorageResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        {
            let mut data = self.inner.data.lock().await;
            data.check_writable()?;
            let now = data.next_timestamp();
            let mut document = ScoreDocument::default();
            document.merge(write, now);
            data.scores.insert(id.clone(), document);
        }
        self.inner.signal(Signal::Changed(Collection::Scores));
        Ok(id)
    }

    async fn merge_score(&self, id: String, write: ScoreWrite) -> StorageResult<()> {
        {
            let mut data = self.inner.data.lock().await;
            data.check_writable()?;
            let now = data.next_timestamp();
            data.scores.entry(id).or_default().merge(write, now);
        }
        self.inner.signal(Signal::Changed(Collection::Scores));
        Ok(())
    }

    async fn delete_score(&self, id: String) -> StorageResult<()> {
        let removed = {
            let mut data = self.inner.data.lock().await;
            data.check_writable()?;
            data.scores.shift_remove(&id).is_some()
        };
        if removed {
            self.inner.signal(Signal::Changed(Collection::Scores));
        }
        Ok(())
    }

    async fn merge_group(&self, id: String, write: GroupWrite) -> StorageResult<()> {
        {
            let mut data = self.inner.data.lock().await;
            data.check_writable()?;
            data.group_writes += 1;
            data.groups.entry(id).or_default().merge(write);
        }
        self.inner.signal(Signal::Changed(Collection::Groups));
        Ok(())
    }

    async fn delete_group(&self, id: String) -> StorageResult<()> {
        let removed = {
            let mut data = self.inner.data.lock().await;
            data.check_writable()?;
            data.groups.shift_remove(&id).is_some()
        };
        if removed {
            self.inner.signal(Signal::Changed(Collection::Groups));
        }
        Ok(())
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn watch_scores(&self, query: ScoreQuery) -> SnapshotStream<ScoreEntity> {
        let inner = self.inner.clone();
        Box::pin(async_stream::stream! {
            // Subscribe before reading so no change slips between the two.
            let mut signals = inner.signals.subscribe();
            yield Ok(inner.score_snapshot(query).await);

            loop {
                match signals.recv().await {
                    Ok(Signal::Changed(Collection::Scores)) | Err(RecvError::Lagged(_)) => {
                        yield Ok(inner.score_snapshot(query).await);
                    }
                    Ok(Signal::Fault(Collection::Scores, message)) => {
                        yield Err(StorageError::unavailable(
                            BACKEND,
                            message.clone(),
                            MemoryStoreError(message),
                        ));
                    }
                    Ok(_) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn watch_groups(&self) -> SnapshotStream<GroupEntity> {
        let inner = self.inner.clone();
        Box::pin(async_stream::stream! {
            let mut signals = inner.signals.subscribe();
            yield Ok(inner.group_snapshot().await);

            loop {
                match signals.recv().await {
                    Ok(Signal::Changed(Collection::Groups)) | Err(RecvError::Lagged(_)) => {
                        yield Ok(inner.group_snapshot().await);
                    }
                    Ok(Signal::Fault(Collection::Groups, message)) => {
                        yield Err(StorageError::unavailable(
                            BACKEND,
                            message.clone(),
                            MemoryStoreError(message),
                        ));
                    }
                    Ok(_) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn create_score(&self, score: ScoreWrite) -> BoxFuture<'static, StorageResult<String>> {
        let store = self.clone();
        Box::pin(async move { store.create_score(score).await })
    }

    fn merge_score(&self, id: String, score: ScoreWrite) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.merge_score(id, score).await })
    }

    fn delete_score(&self, id: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.delete_score(id).await })
    }

    fn merge_group(&self, id: String, group: GroupWrite) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.merge_group(id, group).await })
    }

    fn delete_group(&self, id: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.delete_group(id).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::dao::models::{Category, ItemType, ScoreFields};

    fn fields(group: &str, score: i64, category: Category) -> ScoreWrite {
        ScoreFields {
            student_name: "A".into(),
            item_name: "Solo Dance".into(),
            item_type: ItemType::Individual,
            group: group.into(),
            score,
            category,
        }
        .into()
    }

    #[tokio::test]
    async fn stream_delivers_initial_and_updated_snapshots() {
        let store = MemoryDocumentStore::new();
        let mut scores = store.watch_scores(ScoreQuery::default());

        let initial = scores.next().await.unwrap().unwrap();
        assert!(initial.is_empty());

        let id = DocumentStore::create_score(&store, fields("Nishan", 10, Category::Arts))
            .await
            .unwrap();
        let next = scores.next().await.unwrap().unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].id, id);
        assert_eq!(next[0].score, 10);
    }

    #[tokio::test]
    async fn filtered_stream_orders_newest_first() {
        let store = MemoryDocumentStore::new();
        let first = DocumentStore::create_score(&store, fields("Nishan", 1, Category::Arts))
            .await
            .unwrap();
        DocumentStore::create_score(&store, fields("Nishan", 2, Category::Sports))
            .await
            .unwrap();
        let third = DocumentStore::create_score(&store, fields("Nagara", 3, Category::Arts))
            .await
            .unwrap();

        let mut scores = store.watch_scores(ScoreQuery {
            category: Some(Category::Arts),
        });
        let snapshot = scores.next().await.unwrap().unwrap();
        let ids: Vec<_> = snapshot.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec![third, first]);
        assert!(snapshot[0].timestamp > snapshot[1].timestamp);
    }

    #[tokio::test]
    async fn merge_on_missing_id_creates_document() {
        let store = MemoryDocumentStore::new();
        DocumentStore::merge_score(
            &store,
            "manual".into(),
            fields("Dhankul", 7, Category::Arts),
        )
        .await
        .unwrap();

        let mut scores = store.watch_scores(ScoreQuery::default());
        let snapshot = scores.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "manual");
    }

    #[tokio::test]
    async fn deleting_missing_documents_succeeds() {
        let store = MemoryDocumentStore::new();
        DocumentStore::delete_score(&store, "nope".into())
            .await
            .unwrap();
        DocumentStore::delete_group(&store, "nope".into())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn injected_fault_surfaces_as_stream_error() {
        let store = MemoryDocumentStore::new();
        let mut groups = store.watch_groups();
        groups.next().await.unwrap().unwrap();

        store.inject_fault(Collection::Groups, "permission denied");
        let err = groups.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("permission denied"));
    }

    #[tokio::test]
    async fn failing_writes_are_reported_and_not_applied() {
        let store = MemoryDocumentStore::new();
        store.fail_writes(Some("quota exceeded".into())).await;

        let result = DocumentStore::merge_group(
            &store,
            "Nishan".into(),
            GroupWrite {
                name: Some("Nishan".into()),
                color: Some("#ef4444".into()),
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(store.group_write_count().await, 0);
    }
}
