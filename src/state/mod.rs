pub mod ledger;
pub mod registry;
mod sse;
pub mod standings;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::{
    config::AppConfig,
    services::sync_coordinator::{SyncCoordinator, SyncHandle, SyncView},
};

pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

const PUBLIC_SSE_CAPACITY: usize = 32;

/// Central application state shared by every route.
pub struct AppState {
    config: AppConfig,
    sync: Arc<SyncCoordinator>,
    sync_handle: Mutex<Option<SyncHandle>>,
    public_sse: SseHub,
    admin_token: Option<String>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// Synchronization is not running until [`AppState::start_sync`] is called.
    pub fn new(
        config: AppConfig,
        sync: Arc<SyncCoordinator>,
        admin_token: Option<String>,
    ) -> SharedState {
        Arc::new(Self {
            config,
            sync,
            sync_handle: Mutex::new(None),
            public_sse: SseHub::new(PUBLIC_SSE_CAPACITY),
            admin_token,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Coordinator owning the live read model and the mutation API.
    pub fn sync(&self) -> &Arc<SyncCoordinator> {
        &self.sync
    }

    /// Current read model snapshot.
    pub fn view(&self) -> SyncView {
        self.sync.view()
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        &self.public_sse
    }

    /// Token expected in the admin header, if admin access is enabled.
    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref()
    }

    /// Start the live subscriptions for the configured category scope,
    /// disposing any previous run first.
    pub async fn start_sync(&self) {
        let mut guard = self.sync_handle.lock().await;
        if let Some(mut previous) = guard.take() {
            previous.dispose();
        }
        let handle = self.sync.start(self.config.category_filter).await;
        *guard = Some(handle);
    }

    /// Dispose the running synchronization, if any.
    pub async fn stop_sync(&self) {
        if let Some(mut handle) = self.sync_handle.lock().await.take() {
            handle.dispose();
            info!("synchronization stopped");
        }
    }
}
