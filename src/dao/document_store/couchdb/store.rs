use std::{sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dao::{
    document_store::{
        DocumentStore, ReconnectPolicy, ScoreDocument, SnapshotStream, collect_scores,
    },
    models::{GroupEntity, GroupWrite, ScoreEntity, ScoreQuery, ScoreWrite},
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, ChangesResponse, CouchGroupDocument, CouchScoreDocument, DatabaseInfo,
        END_SUFFIX, GROUP_PREFIX, SCORE_PREFIX, group_doc_id, score_doc_id, seq_param,
    },
};

const BACKEND: &str = "couchdb";
const CHANGES: &str = "_changes";
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Document store backed by a single CouchDB database. Scores and groups
/// share the database and are told apart by their id prefix.
#[derive(Clone)]
pub struct CouchDocumentStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
    changes_timeout_ms: Arc<str>,
}

impl CouchDocumentStore {
    /// Build the HTTP client. No request is issued until the store is used.
    pub fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .credentials
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));
        let changes_timeout_ms = Arc::<str>::from(config.changes_timeout.as_millis().to_string());

        Ok(Self {
            client,
            base_url,
            database,
            auth,
            changes_timeout_ms,
        })
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.database_url(), path);
        self.with_auth(self.client.request(method, url))
    }

    /// Create the database when it does not exist yet.
    pub async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .with_auth(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .with_auth(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    info!(database = %database, "CouchDB database created");
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn database_info(&self) -> CouchResult<DatabaseInfo> {
        let database = self.database.to_string();
        let response = self
            .with_auth(self.client.get(self.database_url()))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::DatabaseStatus {
                database,
                status: response.status(),
            });
        }

        response
            .json::<DatabaseInfo>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: database,
                source,
            })
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// PUT a document. Returns `false` when CouchDB reports a revision conflict.
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<bool>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Ok(false),
            status if status.is_success() => Ok(true),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn delete_document(&self, doc_id: &str) -> CouchResult<()> {
        #[derive(serde::Deserialize)]
        struct Revision {
            #[serde(rename = "_rev")]
            rev: String,
        }

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let Some(current) = self.get_document::<Revision>(doc_id).await? else {
                return Ok(());
            };

            let response = self
                .request(Method::DELETE, doc_id)
                .query(&[("rev", current.rev.as_str())])
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: doc_id.to_string(),
                    source,
                })?;

            match response.status() {
                StatusCode::NOT_FOUND => return Ok(()),
                StatusCode::CONFLICT => continue,
                status if status.is_success() => return Ok(()),
                other => {
                    return Err(CouchDaoError::RequestStatus {
                        path: doc_id.to_string(),
                        status: other,
                    });
                }
            }
        }

        Err(CouchDaoError::Conflict {
            path: doc_id.to_string(),
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{}\"", prefix)),
            ("endkey", format!("\"{}{}\"", prefix, END_SUFFIX)),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        let documents = payload
            .rows
            .into_iter()
            .filter_map(|row| {
                let doc = row.doc?;
                match from_value(doc) {
                    Ok(parsed) => Some(parsed),
                    Err(err) => {
                        warn!(backend = BACKEND, id = %row.id, error = %err, "skipping undecodable document");
                        None
                    }
                }
            })
            .collect();

        Ok(documents)
    }

    /// Block on the longpoll changes feed until something changes after `since`.
    async fn wait_for_changes(&self, since: &str) -> CouchResult<ChangesResponse> {
        let response = self
            .request(Method::GET, CHANGES)
            .query(&[
                ("feed", "longpoll"),
                ("since", since),
                ("timeout", self.changes_timeout_ms.as_ref()),
            ])
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: CHANGES.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: CHANGES.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<ChangesResponse>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: CHANGES.to_string(),
                source,
            })
    }

    async fn query_scores(&self, query: ScoreQuery) -> CouchResult<Vec<ScoreEntity>> {
        let documents = self
            .list_documents::<CouchScoreDocument>(SCORE_PREFIX)
            .await?;
        Ok(collect_scores(
            BACKEND,
            query,
            documents
                .into_iter()
                .filter_map(CouchScoreDocument::into_parts),
        ))
    }

    async fn query_groups(&self) -> CouchResult<Vec<GroupEntity>> {
        let documents = self
            .list_documents::<CouchGroupDocument>(GROUP_PREFIX)
            .await?;
        Ok(documents
            .into_iter()
            .filter_map(CouchGroupDocument::into_parts)
            .map(|(id, document)| document.into_entity(id))
            .collect())
    }

    async fn merge_score_document(&self, id: &str, write: ScoreWrite) -> CouchResult<()> {
        let doc_id = score_doc_id(id);
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let existing = self.get_document::<CouchScoreDocument>(&doc_id).await?;
            let (rev, mut document) = match existing {
                Some(existing) => (existing.rev, ScoreDocument::from(existing.score)),
                None => (None, ScoreDocument::default()),
            };
            document.merge(write.clone(), SystemTime::now());

            let stored = CouchScoreDocument {
                id: doc_id.clone(),
                rev,
                score: document.into(),
            };
            if self.put_document(&doc_id, &stored).await? {
                return Ok(());
            }
        }

        Err(CouchDaoError::Conflict {
            path: doc_id,
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    async fn merge_group_document(&self, id: &str, write: GroupWrite) -> CouchResult<()> {
        let doc_id = group_doc_id(id);
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut stored = self
                .get_document::<CouchGroupDocument>(&doc_id)
                .await?
                .unwrap_or_else(|| CouchGroupDocument {
                    id: doc_id.clone(),
                    rev: None,
                    name: None,
                    color: None,
                });
            if let Some(name) = write.name.clone() {
                stored.name = Some(name);
            }
            if let Some(color) = write.color.clone() {
                stored.color = Some(color);
            }

            if self.put_document(&doc_id, &stored).await? {
                return Ok(());
            }
        }

        Err(CouchDaoError::Conflict {
            path: doc_id,
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    /// Re-query `fetch` whenever the changes feed reports a document under `prefix`.
    fn live_snapshots<T, F>(&self, prefix: &'static str, fetch: F) -> SnapshotStream<T>
    where
        T: Send + 'static,
        F: Fn() -> BoxFuture<'static, CouchResult<Vec<T>>> + Send + 'static,
    {
        let store = self.clone();
        Box::pin(async_stream::stream! {
            let mut policy = ReconnectPolicy::new();
            loop {
                let mut since = match store.database_info().await {
                    Ok(info) => seq_param(&info.update_seq),
                    Err(err) => {
                        yield Err(StorageError::from(err));
                        sleep(policy.next_delay()).await;
                        continue;
                    }
                };

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

                loop {
                    let changes = match store.wait_for_changes(&since).await {
                        Ok(changes) => changes,
                        Err(err) => {
                            yield Err(StorageError::from(err));
                            break;
                        }
                    };
                    since = seq_param(&changes.last_seq);
                    if !changes.touches(prefix) {
                        continue;
                    }
                    match fetch().await {
                        Ok(snapshot) => yield Ok(snapshot),
                        Err(err) => {
                            yield Err(StorageError::from(err));
                            break;
                        }
                    }
                }

                warn!(prefix, "CouchDB changes feed interrupted; resubscribing");
                sleep(policy.next_delay()).await;
            }
        })
    }
}

impl DocumentStore for CouchDocumentStore {
    fn watch_scores(&self, query: ScoreQuery) -> SnapshotStream<ScoreEntity> {
        let store = self.clone();
        self.live_snapshots(SCORE_PREFIX, move || {
            let store = store.clone();
            Box::pin(async move { store.query_scores(query).await })
        })
    }

    fn watch_groups(&self) -> SnapshotStream<GroupEntity> {
        let store = self.clone();
        self.live_snapshots(GROUP_PREFIX, move || {
            let store = store.clone();
            Box::pin(async move { store.query_groups().await })
        })
    }

    fn create_score(&self, score: ScoreWrite) -> BoxFuture<'static, StorageResult<String>> {
        let store = self.clone();
        Box::pin(async move {
            let id = Uuid::new_v4().simple().to_string();
            store.merge_score_document(&id, score).await?;
            Ok(id)
        })
    }

    fn merge_score(&self, id: String, score: ScoreWrite) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .merge_score_document(&id, score)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_score(&self, id: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_document(&score_doc_id(&id))
                .await
                .map_err(Into::into)
        })
    }

    fn merge_group(&self, id: String, group: GroupWrite) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .merge_group_document(&id, group)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_group(&self, id: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_document(&group_doc_id(&id))
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.database_info().await?;
            Ok(())
        })
    }
}
