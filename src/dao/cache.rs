//! Durable key/value cache holding the last score snapshot seen per filter.
//!
//! Values are opaque strings; the typed helpers at the bottom encode score
//! lists as JSON.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use futures::future::BoxFuture;
use thiserror::Error;

use crate::dao::models::{Category, ScoreEntity};

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache key `{key}` contains unsupported characters")]
    InvalidKey { key: String },
    #[error("cache I/O failed on `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cached value under `{key}` is not valid JSON")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode value for `{key}`")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Local persistent string storage surviving restarts.
pub trait LocalCache: Send + Sync {
    /// Read the value stored under `key`, `None` when never written.
    fn get(&self, key: &str) -> BoxFuture<'static, CacheResult<Option<String>>>;
    /// Replace the value stored under `key`.
    fn set(&self, key: &str, value: String) -> BoxFuture<'static, CacheResult<()>>;
}

/// Cache storing one JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: Arc<PathBuf>,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Arc::new(dir.into()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> CacheResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(CacheError::InvalidKey {
                key: key.to_owned(),
            });
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl LocalCache for FileCache {
    fn get(&self, key: &str) -> BoxFuture<'static, CacheResult<Option<String>>> {
        let path = self.path_for(key);
        Box::pin(async move {
            let path = path?;
            match tokio::fs::read_to_string(&path).await {
                Ok(contents) => Ok(Some(contents)),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
                Err(source) => Err(CacheError::Io { path, source }),
            }
        })
    }

    fn set(&self, key: &str, value: String) -> BoxFuture<'static, CacheResult<()>> {
        let dir = Arc::clone(&self.dir);
        let path = self.path_for(key);
        Box::pin(async move {
            let path = path?;
            tokio::fs::create_dir_all(dir.as_path())
                .await
                .map_err(|source| CacheError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;

            // Readers never observe a half-written file.
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, value)
                .await
                .map_err(|source| CacheError::Io {
                    path: tmp.clone(),
                    source,
                })?;
            tokio::fs::rename(&tmp, &path)
                .await
                .map_err(|source| CacheError::Io { path, source })
        })
    }
}

/// Process-local cache, used by tests and when no cache directory is configured.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> BoxFuture<'static, CacheResult<Option<String>>> {
        let value = self
            .entries
            .lock()
            .map(|entries| entries.get(key).cloned())
            .unwrap_or_else(|poisoned| poisoned.into_inner().get(key).cloned());
        Box::pin(async move { Ok(value) })
    }

    fn set(&self, key: &str, value: String) -> BoxFuture<'static, CacheResult<()>> {
        match self.entries.lock() {
            Ok(mut entries) => entries.insert(key.to_owned(), value),
            Err(poisoned) => poisoned.into_inner().insert(key.to_owned(), value),
        };
        Box::pin(async { Ok(()) })
    }
}

/// Cache key for the score snapshot of a subscription filter.
pub fn scores_cache_key(filter: Option<Category>) -> &'static str {
    match filter {
        Some(Category::Arts) => "arts_data",
        Some(Category::Sports) => "sports_data",
        None => "scores_data",
    }
}

/// Persist a score snapshot under `key`.
pub async fn store_scores(
    cache: &dyn LocalCache,
    key: &str,
    scores: &[ScoreEntity],
) -> CacheResult<()> {
    let encoded = serde_json::to_string(scores).map_err(|source| CacheError::Encode {
        key: key.to_owned(),
        source,
    })?;
    cache.set(key, encoded).await
}

/// Load the last persisted score snapshot under `key`.
pub async fn load_scores(cache: &dyn LocalCache, key: &str) -> CacheResult<Option<Vec<ScoreEntity>>> {
    let Some(raw) = cache.get(key).await? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| CacheError::Decode {
            key: key.to_owned(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::dao::models::ItemType;

    fn score(id: &str) -> ScoreEntity {
        ScoreEntity {
            id: id.into(),
            student_name: "Asha".into(),
            item_name: "Solo Song".into(),
            item_type: ItemType::Individual,
            group: "Nishan".into(),
            score: 10,
            category: Category::Arts,
            timestamp: SystemTime::UNIX_EPOCH + Duration::from_secs(42),
        }
    }

    #[tokio::test]
    async fn file_cache_round_trips_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("nested"));

        assert_eq!(cache.get("arts_data").await.unwrap(), None);

        cache.set("arts_data", "first".into()).await.unwrap();
        cache.set("arts_data", "second".into()).await.unwrap();
        assert_eq!(
            cache.get("arts_data").await.unwrap().as_deref(),
            Some("second")
        );
        assert!(!dir.path().join("nested/arts_data.json.tmp").exists());
    }

    #[tokio::test]
    async fn file_cache_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path());

        let err = cache.set("../escape", "x".into()).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidKey { .. }));
    }

    #[tokio::test]
    async fn score_snapshots_survive_a_new_cache_handle() {
        let dir = tempfile::tempdir().unwrap();
        let scores = vec![score("a"), score("b")];

        store_scores(&FileCache::new(dir.path()), "arts_data", &scores)
            .await
            .unwrap();
        let loaded = load_scores(&FileCache::new(dir.path()), "arts_data")
            .await
            .unwrap();

        assert_eq!(loaded, Some(scores));
    }

    #[tokio::test]
    async fn corrupt_entries_surface_as_decode_errors() {
        let cache = MemoryCache::new();
        cache.set("scores_data", "{not json".into()).await.unwrap();

        let err = load_scores(&cache, "scores_data").await.unwrap_err();
        assert!(matches!(err, CacheError::Decode { .. }));
    }

    #[test]
    fn keys_follow_the_subscription_filter() {
        assert_eq!(scores_cache_key(Some(Category::Arts)), "arts_data");
        assert_eq!(scores_cache_key(Some(Category::Sports)), "sports_data");
        assert_eq!(scores_cache_key(None), "scores_data");
    }
}
