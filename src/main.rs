//! Scoreboard Back binary entrypoint wiring the document store, the sync
//! coordinator, REST and SSE layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scoreboard_back::{
    config::AppConfig,
    dao::{
        cache::{FileCache, LocalCache, MemoryCache},
        document_store::{DocumentStore, memory::MemoryDocumentStore},
    },
    routes,
    services::{sse_events::spawn_view_broadcaster, sync_coordinator::SyncCoordinator},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = build_store().await?;
    let cache: Arc<dyn LocalCache> = match &config.cache_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "using file cache");
            Arc::new(FileCache::new(dir.clone()))
        }
        None => Arc::new(MemoryCache::new()),
    };

    let admin_token = env::var("ADMIN_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty());
    if admin_token.is_none() {
        warn!("ADMIN_TOKEN is not set; admin routes will reject every request");
    }

    let sync = SyncCoordinator::new(store, cache, config.default_groups.clone());
    let app_state = AppState::new(config, sync, admin_token);
    app_state.start_sync().await;
    spawn_view_broadcaster(app_state.clone());

    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    app_state.stop_sync().await;
    Ok(())
}

/// Select the document store from `STORE_BACKEND` (`memory`, `mongo`, `couch`).
async fn build_store() -> anyhow::Result<Arc<dyn DocumentStore>> {
    let backend = env::var("STORE_BACKEND").unwrap_or_else(|_| "memory".into());
    match backend.trim().to_ascii_lowercase().as_str() {
        "memory" => {
            info!("using in-memory document store");
            Ok(Arc::new(MemoryDocumentStore::new()))
        }
        #[cfg(feature = "mongo-store")]
        "mongo" | "mongodb" => {
            use scoreboard_back::dao::document_store::mongodb::{MongoConfig, MongoDocumentStore};

            let config = MongoConfig::from_env()
                .await
                .context("reading MongoDB configuration")?;
            let store = MongoDocumentStore::connect(config).context("building MongoDB client")?;
            let indexed = store.clone();
            tokio::spawn(async move {
                if let Err(err) = indexed.ensure_indexes().await {
                    error!(%err, "failed to ensure MongoDB indexes");
                }
            });
            info!("using MongoDB document store");
            Ok(Arc::new(store))
        }
        #[cfg(feature = "couch-store")]
        "couch" | "couchdb" => {
            use scoreboard_back::dao::document_store::couchdb::{CouchConfig, CouchDocumentStore};

            let config = CouchConfig::from_env().context("reading CouchDB configuration")?;
            let store = CouchDocumentStore::connect(config).context("building CouchDB client")?;
            let prepared = store.clone();
            tokio::spawn(async move {
                if let Err(err) = prepared.ensure_database().await {
                    error!(%err, "failed to ensure CouchDB database");
                }
            });
            info!("using CouchDB document store");
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("unsupported STORE_BACKEND `{other}`"),
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(%err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
