#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::{Duration, SystemTime};

use futures::{future::BoxFuture, stream::BoxStream};
use tracing::warn;

use crate::dao::{
    models::{
        Category, GroupEntity, GroupWrite, ItemType, ScoreEntity, ScoreQuery, ScoreWrite,
        sort_by_recency,
    },
    storage::StorageResult,
};

/// Live stream of full result sets. Every `Ok` item supersedes the previous one;
/// an `Err` item reports a subscription failure while the stream keeps trying
/// to recover. Dropping the stream cancels the subscription.
pub type SnapshotStream<T> = BoxStream<'static, StorageResult<Vec<T>>>;

/// Contract of the remote realtime document store holding the `scores` and
/// `groups` collections.
pub trait DocumentStore: Send + Sync {
    /// Subscribe to the score collection ordered by `timestamp` descending.
    fn watch_scores(&self, query: ScoreQuery) -> SnapshotStream<ScoreEntity>;
    /// Subscribe to the whole group collection.
    fn watch_groups(&self) -> SnapshotStream<GroupEntity>;
    /// Create a score document and return the id assigned by the store.
    fn create_score(&self, score: ScoreWrite) -> BoxFuture<'static, StorageResult<String>>;
    /// Merge the supplied fields into a score document, creating it when missing.
    fn merge_score(&self, id: String, score: ScoreWrite) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete a score document. Missing documents are not an error.
    fn delete_score(&self, id: String) -> BoxFuture<'static, StorageResult<()>>;
    /// Merge the supplied fields into a group document, creating it when missing.
    fn merge_group(&self, id: String, group: GroupWrite) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete a group document. Missing documents are not an error.
    fn delete_group(&self, id: String) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Score document as stored, where every field may be absent.
///
/// Merge updates against unknown ids can leave such partial documents behind;
/// they are kept in the store but never surface in snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreDocument {
    pub student_name: Option<String>,
    pub item_name: Option<String>,
    pub item_type: Option<ItemType>,
    pub group: Option<String>,
    pub score: Option<i64>,
    pub category: Option<Category>,
    pub timestamp: Option<SystemTime>,
}

impl ScoreDocument {
    /// Apply a partial write, stamping the timestamp with `now` when requested.
    pub fn merge(&mut self, write: ScoreWrite, now: SystemTime) {
        if let Some(value) = write.student_name {
            self.student_name = Some(value);
        }
        if let Some(value) = write.item_name {
            self.item_name = Some(value);
        }
        if let Some(value) = write.item_type {
            self.item_type = Some(value);
        }
        if let Some(value) = write.group {
            self.group = Some(value);
        }
        if let Some(value) = write.score {
            self.score = Some(value);
        }
        if let Some(value) = write.category {
            self.category = Some(value);
        }
        if write.timestamp.is_some() {
            self.timestamp = Some(now);
        }
    }

    /// Build a full record, or `None` when a required field is missing.
    pub fn into_entity(self, id: String) -> Option<ScoreEntity> {
        Some(ScoreEntity {
            id,
            student_name: self.student_name?,
            item_name: self.item_name?,
            item_type: self.item_type?,
            group: self.group?,
            score: self.score?,
            category: self.category?,
            timestamp: self.timestamp?,
        })
    }
}

/// Group document as stored. Partial documents still count as groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDocument {
    pub name: Option<String>,
    pub color: Option<String>,
}

impl GroupDocument {
    pub fn merge(&mut self, write: GroupWrite) {
        if let Some(name) = write.name {
            self.name = Some(name);
        }
        if let Some(color) = write.color {
            self.color = Some(color);
        }
    }

    /// Build a record, labelling nameless groups with their id.
    pub fn into_entity(self, id: String) -> GroupEntity {
        GroupEntity {
            name: self.name.unwrap_or_else(|| id.clone()),
            color: self.color.unwrap_or_else(|| NEUTRAL_GROUP_COLOR.to_string()),
            id,
        }
    }
}

/// Color used for groups whose document carries none.
pub const NEUTRAL_GROUP_COLOR: &str = "#ffffff";

/// Turn raw documents into the ordered result set of `query`.
pub fn collect_scores<I>(backend: &'static str, query: ScoreQuery, documents: I) -> Vec<ScoreEntity>
where
    I: IntoIterator<Item = (String, ScoreDocument)>,
{
    let mut records: Vec<ScoreEntity> = documents
        .into_iter()
        .filter_map(|(id, document)| {
            let entity = document.into_entity(id.clone());
            if entity.is_none() {
                warn!(backend, id = %id, "skipping incomplete score document");
            }
            entity
        })
        .filter(|record| query.matches(record.category))
        .collect();
    sort_by_recency(&mut records);
    records
}

/// Backoff applied by live streams between reconnection attempts.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectPolicy {
    const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
    const MAX_DELAY: Duration = Duration::from_secs(10);

    pub fn new() -> Self {
        Self {
            delay: Self::INITIAL_DELAY,
        }
    }

    /// Delay to wait before the next attempt; doubles up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let current = self.delay;
        self.delay = (self.delay * 2).min(Self::MAX_DELAY);
        current
    }

    /// Forget previous failures after a healthy delivery.
    pub fn reset(&mut self) {
        self.delay = Self::INITIAL_DELAY;
    }
}
