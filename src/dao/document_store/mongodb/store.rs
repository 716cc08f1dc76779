use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database, IndexModel,
    bson::{Document, doc, oid::ObjectId},
    options::IndexOptions,
};
use tokio::time::sleep;
use tracing::{info, warn};

use super::{
    config::MongoConfig,
    connection::{build_client, ping},
    error::{MongoDaoError, MongoResult},
    models::{MongoGroupDocument, MongoScoreDocument, group_update, score_update},
};
use crate::dao::{
    document_store::{DocumentStore, ReconnectPolicy, SnapshotStream, collect_scores},
    models::{GroupEntity, GroupWrite, ScoreEntity, ScoreQuery, ScoreWrite},
    storage::{StorageError, StorageResult},
};

const BACKEND: &str = "mongodb";
const SCORE_COLLECTION_NAME: &str = "scores";
const GROUP_COLLECTION_NAME: &str = "groups";

/// Document store backed by MongoDB. Live snapshots are driven by change
/// streams, which require a replica set or sharded deployment.
#[derive(Clone)]
pub struct MongoDocumentStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: Database,
}

impl MongoDocumentStore {
    /// Build the store. The driver connects lazily, so this never waits on the network.
    pub fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = build_client(&config.options, &config.database_name)?;
        Ok(Self {
            inner: Arc::new(MongoInner { database }),
        })
    }

    /// Create the index backing the `timestamp` ordering of score subscriptions.
    pub async fn ensure_indexes(&self) -> MongoResult<()> {
        let index = IndexModel::builder()
            .keys(doc! {"category": 1, "timestamp": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("score_category_timestamp_idx".to_owned()))
                    .build(),
            )
            .build();

        self.inner
            .database
            .collection::<Document>(SCORE_COLLECTION_NAME)
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SCORE_COLLECTION_NAME,
                index: "category,timestamp",
                source,
            })?;

        info!("MongoDB indexes ensured");
        Ok(())
    }

    fn score_collection(&self) -> Collection<MongoScoreDocument> {
        self.inner
            .database
            .collection::<MongoScoreDocument>(SCORE_COLLECTION_NAME)
    }

    fn group_collection(&self) -> Collection<MongoGroupDocument> {
        self.inner
            .database
            .collection::<MongoGroupDocument>(GROUP_COLLECTION_NAME)
    }

    async fn query_scores(&self, query: ScoreQuery) -> MongoResult<Vec<ScoreEntity>> {
        let filter = match query.category {
            Some(category) => doc! {"category": category.as_str()},
            None => doc! {},
        };

        let documents: Vec<MongoScoreDocument> = self
            .score_collection()
            .find(filter)
            .sort(doc! {"timestamp": -1})
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: SCORE_COLLECTION_NAME,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: SCORE_COLLECTION_NAME,
                source,
            })?;

        Ok(collect_scores(
            BACKEND,
            query,
            documents.into_iter().map(MongoScoreDocument::into_parts),
        ))
    }

    async fn query_groups(&self) -> MongoResult<Vec<GroupEntity>> {
        let documents: Vec<MongoGroupDocument> = self
            .group_collection()
            .find(doc! {})
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: GROUP_COLLECTION_NAME,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: GROUP_COLLECTION_NAME,
                source,
            })?;

        Ok(documents
            .into_iter()
            .map(|document| {
                let (id, document) = document.into_parts();
                document.into_entity(id)
            })
            .collect())
    }

    async fn upsert(
        &self,
        collection: &'static str,
        id: String,
        update: Option<Document>,
    ) -> MongoResult<()> {
        let Some(update) = update else {
            return Ok(());
        };

        self.inner
            .database
            .collection::<Document>(collection)
            .update_one(doc! {"_id": &id}, update)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection,
                id,
                source,
            })?;
        Ok(())
    }

    async fn delete(&self, collection: &'static str, id: String) -> MongoResult<()> {
        self.inner
            .database
            .collection::<Document>(collection)
            .delete_one(doc! {"_id": &id})
            .await
            .map_err(|source| MongoDaoError::Delete {
                collection,
                id,
                source,
            })?;
        Ok(())
    }

    /// Re-query `fetch` after every change reported on `collection`.
    ///
    /// When the change stream breaks the error is yielded and the stream is
    /// re-opened with backoff; the first delivery after that is a fresh snapshot.
    fn live_snapshots<T, F>(&self, collection: &'static str, fetch: F) -> SnapshotStream<T>
    where
        T: Send + 'static,
        F: Fn() -> BoxFuture<'static, MongoResult<Vec<T>>> + Send + 'static,
    {
        let database = self.inner.database.clone();
        Box::pin(async_stream::stream! {
            let mut policy = ReconnectPolicy::new();
            loop {
                let watched = database.collection::<Document>(collection);
                let changes = match watched.watch().await {
                    Ok(changes) => changes,
                    Err(source) => {
                        yield Err(StorageError::from(MongoDaoError::Watch { collection, source }));
                        sleep(policy.next_delay()).await;
                        continue;
                    }
                };
                let mut changes = Box::pin(changes);

                match fetch().await {
                    Ok(snapshot) => {
                        policy.reset();
                        yield Ok(snapshot);
                    }
                    Err(err) => {
                        yield Err(StorageError::from(err));
                        sleep(policy.next_delay()).await;
                        continue;
                    }
                }

                while let Some(event) = changes.next().await {
                    if let Err(source) = event {
                        yield Err(StorageError::from(MongoDaoError::Watch { collection, source }));
                        break;
                    }
                    match fetch().await {
                        Ok(snapshot) => {
                            yield Ok(snapshot);
                        }
                        Err(err) => {
                            yield Err(StorageError::from(err));
                            break;
                        }
                    }
                }

                warn!(collection, "MongoDB change stream ended; reopening");
                sleep(policy.next_delay()).await;
            }
        })
    }
}

impl DocumentStore for MongoDocumentStore {
    fn watch_scores(&self, query: ScoreQuery) -> SnapshotStream<ScoreEntity> {
        let store = self.clone();
        self.live_snapshots(SCORE_COLLECTION_NAME, move || {
            let store = store.clone();
            Box::pin(async move { store.query_scores(query).await })
        })
    }

    fn watch_groups(&self) -> SnapshotStream<GroupEntity> {
        let store = self.clone();
        self.live_snapshots(GROUP_COLLECTION_NAME, move || {
            let store = store.clone();
            Box::pin(async move { store.query_groups().await })
        })
    }

    fn create_score(&self, score: ScoreWrite) -> BoxFuture<'static, StorageResult<String>> {
        let store = self.clone();
        Box::pin(async move {
            let id = ObjectId::new().to_hex();
            store
                .upsert(SCORE_COLLECTION_NAME, id.clone(), score_update(score))
                .await?;
            Ok(id)
        })
    }

    fn merge_score(&self, id: String, score: ScoreWrite) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert(SCORE_COLLECTION_NAME, id, score_update(score))
                .await
                .map_err(Into::into)
        })
    }

    fn delete_score(&self, id: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete(SCORE_COLLECTION_NAME, id)
                .await
                .map_err(Into::into)
        })
    }

    fn merge_group(&self, id: String, group: GroupWrite) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert(GROUP_COLLECTION_NAME, id, group_update(group))
                .await
                .map_err(Into::into)
        })
    }

    fn delete_group(&self, id: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete(GROUP_COLLECTION_NAME, id)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { ping(&store.inner.database).await.map_err(Into::into) })
    }
}
