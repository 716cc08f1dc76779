//! Live synchronization between the remote store and the in-memory read model.
//!
//! A [`SyncCoordinator`] owns the score ledger and group registry snapshots.
//! [`SyncCoordinator::start`] opens the two live subscriptions and applies
//! every notification on a single task; readers observe the result through a
//! `watch` channel carrying immutable snapshots. Admin mutations go straight
//! to the store and come back through the subscriptions; they are accepted
//! in degraded mode too.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use futures::StreamExt;
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::{
    dao::{
        cache::{LocalCache, load_scores, scores_cache_key, store_scores},
        document_store::DocumentStore,
        models::{
            Category, GroupEntity, GroupWrite, ScoreEntity, ScoreQuery, ScoreWrite,
            group_id_from_name,
        },
        storage::{StorageError, StorageResult},
    },
    dto::admin::{CreateGroupRequest, ScoreInput, UpdateGroupRequest},
    error::ServiceError,
    state::{ledger::ScoreLedger, registry::GroupRegistry},
};

/// Connectivity of the score subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Started, no live score snapshot received yet.
    Connecting,
    /// The last score notification was a live snapshot.
    Live,
    /// The score subscription failed; data may come from the local cache.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub mode: SyncMode,
    /// Last subscription failure, cleared by the next live score snapshot.
    pub last_error: Option<String>,
}

/// Consistent point-in-time read model.
#[derive(Debug, Clone)]
pub struct SyncView {
    pub ledger: Arc<ScoreLedger>,
    pub registry: Arc<GroupRegistry>,
    pub status: SyncStatus,
}

impl SyncView {
    /// Empty ledger and the default groups, until a group snapshot arrives.
    fn initial(default_groups: &[GroupEntity]) -> Self {
        Self {
            ledger: Arc::new(ScoreLedger::empty()),
            registry: Arc::new(GroupRegistry::from_batch(default_groups.iter().cloned())),
            status: SyncStatus {
                mode: SyncMode::Connecting,
                last_error: None,
            },
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.status.mode == SyncMode::Degraded
    }
}

/// Gate between the delivery task and [`SyncHandle::dispose`]; once closed no
/// notification is published.
#[derive(Debug, Default)]
struct DeliveryGate {
    open: Mutex<bool>,
}

impl DeliveryGate {
    fn opened() -> Arc<Self> {
        Arc::new(Self {
            open: Mutex::new(true),
        })
    }

    /// Run `apply` only while the gate is open, holding it for the duration.
    fn deliver(&self, apply: impl FnOnce()) -> bool {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if *open {
            apply();
        }
        *open
    }

    fn close(&self) {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }
}

/// Handle to a running synchronization. Dropping it disposes it.
pub struct SyncHandle {
    gate: Arc<DeliveryGate>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Stop delivery. Once this returns no further notification is applied;
    /// both subscriptions are dropped with the delivery task. Idempotent.
    pub fn dispose(&mut self) {
        self.gate.close();
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("sync subscriptions disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.task.is_none()
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Owner of the live subscriptions, the snapshots and the mutation API.
pub struct SyncCoordinator {
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn LocalCache>,
    default_groups: Vec<GroupEntity>,
    view: watch::Sender<SyncView>,
    seeded: AtomicBool,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<dyn LocalCache>,
        default_groups: Vec<GroupEntity>,
    ) -> Arc<Self> {
        let (view, _receiver) = watch::channel(SyncView::initial(&default_groups));
        Arc::new(Self {
            store,
            cache,
            default_groups,
            view,
            seeded: AtomicBool::new(false),
        })
    }

    /// Current snapshot of the read model.
    pub fn view(&self) -> SyncView {
        self.view.borrow().clone()
    }

    /// Receiver notified whenever the read model changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncView> {
        self.view.subscribe()
    }

    pub fn default_groups(&self) -> &[GroupEntity] {
        &self.default_groups
    }

    /// Remote store the mutations are issued against.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Open the score subscription (optionally restricted to `filter`) and the
    /// group subscription, applying their notifications until disposal.
    ///
    /// The last cached score snapshot is published first so consumers have
    /// data while the live connection establishes.
    pub async fn start(self: &Arc<Self>, filter: Option<Category>) -> SyncHandle {
        let cache_key = scores_cache_key(filter);
        let gate = DeliveryGate::opened();

        let cached = self.load_cached(cache_key).await;
        gate.deliver(|| {
            self.view.send_modify(|view| {
                if let Some(records) = cached {
                    info!(count = records.len(), key = cache_key, "warm start from local cache");
                    view.ledger = Arc::new(ScoreLedger::from_snapshot(records));
                }
                view.status.mode = SyncMode::Connecting;
            });
        });

        let mut scores = self.store.watch_scores(ScoreQuery { category: filter });
        let mut groups = self.store.watch_groups();
        let coordinator = Arc::clone(self);
        let task_gate = Arc::clone(&gate);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(batch) = scores.next() => {
                        coordinator.apply_scores(&task_gate, cache_key, batch).await;
                    }
                    Some(batch) = groups.next() => {
                        coordinator.apply_groups(&task_gate, batch);
                    }
                    else => break,
                }
            }
            debug!("sync subscriptions ended");
        });

        info!(filter = ?filter, "sync started");
        SyncHandle {
            gate,
            task: Some(task),
        }
    }

    async fn apply_scores(
        &self,
        gate: &DeliveryGate,
        cache_key: &'static str,
        batch: StorageResult<Vec<ScoreEntity>>,
    ) {
        match batch {
            Ok(records) => {
                let ledger = Arc::new(ScoreLedger::from_snapshot(records));
                let applied = gate.deliver(|| {
                    self.view.send_modify(|view| {
                        view.ledger = Arc::clone(&ledger);
                        view.status = SyncStatus {
                            mode: SyncMode::Live,
                            last_error: None,
                        };
                    });
                });
                if !applied {
                    return;
                }
                debug!(count = ledger.len(), "score snapshot applied");

                if let Err(err) = store_scores(self.cache.as_ref(), cache_key, ledger.records()).await {
                    warn!(key = cache_key, error = %err, "failed to persist score snapshot");
                }
            }
            Err(err) => {
                warn!(backend = err.backend(), error = %err, "score subscription failed; falling back to cache");
                let message = err.to_string();
                let applied = gate.deliver(|| {
                    self.view.send_modify(|view| {
                        view.status = SyncStatus {
                            mode: SyncMode::Degraded,
                            last_error: Some(message),
                        };
                    });
                });
                if !applied {
                    return;
                }

                let Some(records) = self.load_cached(cache_key).await else {
                    info!(key = cache_key, "no cached scores; keeping current ledger");
                    return;
                };
                let count = records.len();
                let ledger = Arc::new(ScoreLedger::from_snapshot(records));
                gate.deliver(|| {
                    self.view.send_modify(|view| {
                        // A live snapshot may have arrived meanwhile.
                        if view.status.mode == SyncMode::Degraded {
                            view.ledger = ledger;
                        }
                    });
                });
                info!(key = cache_key, count, "ledger restored from local cache");
            }
        }
    }

    fn apply_groups(&self, gate: &DeliveryGate, batch: StorageResult<Vec<GroupEntity>>) {
        match batch {
            Ok(groups) if groups.is_empty() && !self.seeded.swap(true, Ordering::AcqRel) => {
                let applied = gate.deliver(|| {
                    self.view.send_modify(|view| {
                        view.registry = Arc::new(GroupRegistry::from_batch(
                            self.default_groups.iter().cloned(),
                        ));
                    });
                });
                if applied {
                    self.seed_default_groups();
                }
            }
            Ok(groups) => {
                let registry = Arc::new(GroupRegistry::from_batch(groups));
                gate.deliver(|| {
                    debug!(count = registry.len(), "group snapshot applied");
                    self.view.send_modify(|view| view.registry = registry);
                });
            }
            Err(err) => {
                warn!(backend = err.backend(), error = %err, "group subscription failed; keeping registry");
                let message = err.to_string();
                gate.deliver(|| {
                    self.view
                        .send_modify(|view| view.status.last_error = Some(message));
                });
            }
        }
    }

    /// Write every default group back to the store without waiting for the result.
    fn seed_default_groups(&self) {
        info!(count = self.default_groups.len(), "group collection empty; seeding defaults");
        for group in &self.default_groups {
            let store = Arc::clone(&self.store);
            let id = group.id.clone();
            let write = GroupWrite::from(group.clone());
            tokio::spawn(async move {
                if let Err(err) = store.merge_group(id.clone(), write).await {
                    warn!(group_id = %id, error = %err, "failed to seed default group");
                }
            });
        }
    }

    async fn load_cached(&self, key: &str) -> Option<Vec<ScoreEntity>> {
        match load_scores(self.cache.as_ref(), key).await {
            Ok(records) => records,
            Err(err) => {
                warn!(key, error = %err, "local cache unreadable; treating as empty");
                None
            }
        }
    }

    /// Validate `input` and create a new score stamped by the store clock.
    pub async fn submit_score(&self, input: &ScoreInput) -> Result<String, ServiceError> {
        let fields = input.to_fields()?;
        let id = self
            .store
            .create_score(ScoreWrite::from(fields))
            .await
            .map_err(|err| write_failed("submit score", err))?;
        info!(score_id = %id, "score submitted");
        Ok(id)
    }

    /// Validate `input` and merge it into score `id`. A missing id is created.
    pub async fn update_score(&self, id: &str, input: &ScoreInput) -> Result<(), ServiceError> {
        let id = require_id(id)?;
        let fields = input.to_fields()?;
        self.store
            .merge_score(id.clone(), ScoreWrite::from(fields))
            .await
            .map_err(|err| write_failed("update score", err))?;
        info!(score_id = %id, "score updated");
        Ok(())
    }

    /// Delete score `id`. Deleting an unknown id succeeds.
    pub async fn delete_score(&self, id: &str) -> Result<(), ServiceError> {
        let id = require_id(id)?;
        self.store
            .delete_score(id.clone())
            .await
            .map_err(|err| write_failed("delete score", err))?;
        info!(score_id = %id, "score deleted");
        Ok(())
    }

    /// Merge the supplied fields into group `id`, creating it when missing.
    pub async fn upsert_group(
        &self,
        id: &str,
        request: &UpdateGroupRequest,
    ) -> Result<(), ServiceError> {
        let id = require_id(id)?;
        let write = request.to_write()?;
        self.store
            .merge_group(id.clone(), write)
            .await
            .map_err(|err| write_failed("upsert group", err))?;
        info!(group_id = %id, "group upserted");
        Ok(())
    }

    /// Create a group whose id is its name without whitespace.
    ///
    /// An existing group with the same derived id is overwritten.
    pub async fn create_group(&self, request: &CreateGroupRequest) -> Result<String, ServiceError> {
        validator::Validate::validate(request)?;
        let name = request.name.trim().to_owned();
        let id = group_id_from_name(&name);
        if self.view.borrow().registry.contains(&id) {
            warn!(group_id = %id, "group id already exists; overwriting");
        }

        let write = GroupWrite {
            name: Some(name),
            color: Some(request.color.trim().to_owned()),
        };
        self.store
            .merge_group(id.clone(), write)
            .await
            .map_err(|err| write_failed("create group", err))?;
        info!(group_id = %id, "group created");
        Ok(id)
    }

    /// Delete group `id`. Scores referencing it are left untouched.
    pub async fn delete_group(&self, id: &str) -> Result<(), ServiceError> {
        let id = require_id(id)?;
        self.store
            .delete_group(id.clone())
            .await
            .map_err(|err| write_failed("delete group", err))?;
        info!(group_id = %id, "group deleted");
        Ok(())
    }
}

fn require_id(id: &str) -> Result<String, ServiceError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ServiceError::InvalidInput("id must not be empty".into()));
    }
    Ok(id.to_owned())
}

fn write_failed(operation: &'static str, err: StorageError) -> ServiceError {
    warn!(operation, backend = err.backend(), error = %err, "store write failed");
    ServiceError::Unavailable(err)
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        time::{Duration, SystemTime},
    };

    use futures::{future::BoxFuture, stream};
    use tokio::time::timeout;

    use super::*;
    use crate::{
        dao::{
            cache::MemoryCache,
            document_store::{
                SnapshotStream,
                memory::{Collection, MemoryDocumentStore},
            },
            models::ItemType,
        },
        state::{
            registry::default_groups,
            standings::{GroupUniverse, compute_standings},
        },
    };

    /// Store that cannot be reached: both subscriptions fail straight away
    /// and every write is rejected.
    struct UnreachableStore;

    fn unreachable() -> StorageError {
        StorageError::unavailable(
            "unreachable",
            "network is down".into(),
            io::Error::other("network is down"),
        )
    }

    fn failing_stream<T: Send + 'static>() -> SnapshotStream<T> {
        stream::once(async { Err(unreachable()) })
            .chain(stream::pending())
            .boxed()
    }

    impl DocumentStore for UnreachableStore {
        fn watch_scores(&self, _query: ScoreQuery) -> SnapshotStream<ScoreEntity> {
            failing_stream()
        }
        fn watch_groups(&self) -> SnapshotStream<GroupEntity> {
            failing_stream()
        }
        fn create_score(&self, _score: ScoreWrite) -> BoxFuture<'static, StorageResult<String>> {
            Box::pin(async { Err(unreachable()) })
        }
        fn merge_score(
            &self,
            _id: String,
            _score: ScoreWrite,
        ) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Err(unreachable()) })
        }
        fn delete_score(&self, _id: String) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Err(unreachable()) })
        }
        fn merge_group(
            &self,
            _id: String,
            _group: GroupWrite,
        ) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Err(unreachable()) })
        }
        fn delete_group(&self, _id: String) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Err(unreachable()) })
        }
        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Err(unreachable()) })
        }
    }

    const WAIT: Duration = Duration::from_secs(2);

    fn input(group: &str, score: &str) -> ScoreInput {
        ScoreInput {
            student_name: Some("A".into()),
            item_name: Some("Solo Dance".into()),
            item_type: Some("Individual".into()),
            group: Some(group.into()),
            score: Some(score.into()),
            category: Some("Arts".into()),
        }
    }

    fn coordinator(store: &MemoryDocumentStore, cache: &MemoryCache) -> Arc<SyncCoordinator> {
        SyncCoordinator::new(
            Arc::new(store.clone()),
            Arc::new(cache.clone()),
            default_groups(),
        )
    }

    async fn wait_until(
        receiver: &mut watch::Receiver<SyncView>,
        predicate: impl FnMut(&SyncView) -> bool,
    ) -> SyncView {
        timeout(WAIT, receiver.wait_for(predicate))
            .await
            .expect("timed out waiting for sync view")
            .expect("coordinator dropped")
            .clone()
    }

    #[tokio::test]
    async fn empty_group_collection_is_seeded_exactly_once() {
        let store = MemoryDocumentStore::new();
        let sync = coordinator(&store, &MemoryCache::new());
        let mut view = sync.subscribe();
        let _handle = sync.start(None).await;

        let seeded = wait_until(&mut view, |v| v.registry.len() == 4).await;
        let ids: Vec<_> = seeded.registry.ids().map(str::to_owned).collect();
        assert_eq!(ids, vec!["Nishan", "Nagara", "Dhankul", "Bansuri"]);

        // The echoed writes land in the store; deleting them all yields an
        // empty batch again, which must not trigger a second seeding.
        timeout(WAIT, async {
            while store.group_write_count().await < 4 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        for group in default_groups() {
            sync.delete_group(&group.id).await.unwrap();
        }
        wait_until(&mut view, |v| v.registry.is_empty()).await;
        assert_eq!(store.group_write_count().await, 4);
    }

    #[tokio::test]
    async fn score_snapshots_replace_the_ledger_and_reach_the_cache() {
        let store = MemoryDocumentStore::new();
        let cache = MemoryCache::new();
        let sync = coordinator(&store, &cache);
        let mut view = sync.subscribe();
        let _handle = sync.start(Some(Category::Arts)).await;

        let id = sync.submit_score(&input("Nishan", "10")).await.unwrap();
        let live = wait_until(&mut view, |v| v.ledger.len() == 1).await;
        assert_eq!(live.status.mode, SyncMode::Live);
        assert_eq!(live.ledger.records()[0].id, id);
        assert_eq!(live.ledger.records()[0].item_type, ItemType::Individual);

        sync.delete_score(&id).await.unwrap();
        sync.delete_score(&id).await.unwrap();
        wait_until(&mut view, |v| v.ledger.is_empty()).await;

        let cached = load_scores(&cache, "arts_data").await.unwrap();
        assert_eq!(cached, Some(Vec::new()));
    }

    #[tokio::test]
    async fn subscription_failure_falls_back_to_cache_then_recovers() {
        let store = MemoryDocumentStore::new();
        let cache = MemoryCache::new();
        let sync = coordinator(&store, &cache);
        let mut view = sync.subscribe();
        let _handle = sync.start(None).await;

        sync.submit_score(&input("Nishan", "10")).await.unwrap();
        wait_until(&mut view, |v| v.ledger.len() == 1 && v.status.mode == SyncMode::Live).await;

        store.inject_fault(Collection::Scores, "permission denied");
        let degraded = wait_until(&mut view, |v| v.is_degraded()).await;
        assert!(
            degraded
                .status
                .last_error
                .as_deref()
                .is_some_and(|e| e.contains("permission denied"))
        );
        let degraded = wait_until(&mut view, |v| v.is_degraded() && v.ledger.len() == 1).await;
        assert_eq!(degraded.ledger.records()[0].group, "Nishan");

        store.notify(Collection::Scores);
        let live = wait_until(&mut view, |v| v.status.mode == SyncMode::Live).await;
        assert!(live.status.last_error.is_none());
        assert_eq!(live.ledger.len(), 1);
    }

    #[tokio::test]
    async fn warm_start_publishes_cached_scores_before_live_data() {
        let store = MemoryDocumentStore::new();
        let cache = MemoryCache::new();

        let first = coordinator(&store, &cache);
        let mut view = first.subscribe();
        let mut handle = first.start(None).await;
        first.submit_score(&input("Nagara", "15")).await.unwrap();
        wait_until(&mut view, |v| v.ledger.len() == 1).await;
        handle.dispose();

        let cached = load_scores(&cache, "scores_data").await.unwrap().unwrap();
        let offline = MemoryDocumentStore::new();
        let second = coordinator(&offline, &cache);
        let mut handle = second.start(None).await;
        assert_eq!(second.view().ledger.records(), cached.as_slice());
        handle.dispose();
    }

    #[tokio::test]
    async fn validation_failures_never_reach_the_store() {
        let store = MemoryDocumentStore::new();
        let sync = coordinator(&store, &MemoryCache::new());

        let mut bad = input("Nishan", "ten");
        bad.student_name = None;
        let err = sync.submit_score(&bad).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let mut scores = store.watch_scores(ScoreQuery::default());
        assert!(scores.next().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_failures_are_returned_without_retry() {
        let store = MemoryDocumentStore::new();
        let sync = coordinator(&store, &MemoryCache::new());
        store.fail_writes(Some("quota exceeded".into())).await;

        let err = sync.submit_score(&input("Nishan", "1")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
        let err = sync.delete_group("Nishan").await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn disposed_handle_stops_delivery() {
        let store = MemoryDocumentStore::new();
        let sync = coordinator(&store, &MemoryCache::new());
        let mut view = sync.subscribe();
        let mut handle = sync.start(None).await;
        wait_until(&mut view, |v| v.status.mode == SyncMode::Live).await;

        handle.dispose();
        handle.dispose();
        assert!(handle.is_disposed());

        sync.submit_score(&input("Nishan", "10")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sync.view().ledger.is_empty());
    }

    #[tokio::test]
    async fn offline_start_ranks_cached_scores_over_default_groups() {
        let cache = MemoryCache::new();
        let cached = ScoreEntity {
            id: "cached-1".into(),
            student_name: "A".into(),
            item_name: "Solo Dance".into(),
            item_type: ItemType::Individual,
            group: "Nishan".into(),
            score: 10,
            category: Category::Arts,
            timestamp: SystemTime::now(),
        };
        store_scores(&cache, "scores_data", std::slice::from_ref(&cached))
            .await
            .unwrap();

        let sync = SyncCoordinator::new(
            Arc::new(UnreachableStore),
            Arc::new(cache.clone()),
            default_groups(),
        );
        let mut view = sync.subscribe();
        let _handle = sync.start(None).await;

        let offline = wait_until(&mut view, |v| {
            v.is_degraded() && v.status.last_error.is_some() && v.ledger.len() == 1
        })
        .await;
        assert_eq!(offline.registry.len(), 4);

        let universe = GroupUniverse::Registry.ids(&offline.registry, sync.default_groups());
        let standings =
            compute_standings(&offline.registry, &offline.ledger, Category::Arts, &universe);
        let totals: Vec<_> = standings
            .iter()
            .map(|s| (s.group_id.as_str(), s.total_score))
            .collect();
        assert_eq!(
            totals,
            vec![("Nishan", 10), ("Nagara", 0), ("Dhankul", 0), ("Bansuri", 0)]
        );
    }

    #[tokio::test]
    async fn writes_issued_while_degraded_land_once_the_subscription_recovers() {
        let store = MemoryDocumentStore::new();
        let sync = coordinator(&store, &MemoryCache::new());
        let mut view = sync.subscribe();
        let _handle = sync.start(None).await;
        wait_until(&mut view, |v| v.status.mode == SyncMode::Live).await;

        store.inject_fault(Collection::Scores, "listener lost");
        wait_until(&mut view, |v| v.is_degraded()).await;

        // Degraded mode does not block mutations; the store accepts them.
        let id = sync.submit_score(&input("Dhankul", "6")).await.unwrap();

        let live = wait_until(&mut view, |v| v.status.mode == SyncMode::Live).await;
        assert_eq!(live.ledger.len(), 1);
        assert_eq!(live.ledger.records()[0].id, id);
        assert_eq!(live.ledger.records()[0].score, 6);
    }
}
