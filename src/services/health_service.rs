use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the store and report whether scores are served live.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let store_reachable = match state.sync().store().health_check().await {
        Ok(()) => true,
        Err(err) => {
            warn!(backend = err.backend(), error = %err, "storage health check failed");
            false
        }
    };

    HealthResponse::new(store_reachable, state.view().status.mode)
}
