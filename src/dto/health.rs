use serde::Serialize;
use utoipa::ToSchema;

use crate::services::sync_coordinator::SyncMode;

/// Body of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the store is unreachable or scores come from the cache.
    pub status: String,
    /// Whether the store answered the ping.
    pub store_reachable: bool,
    pub sync_mode: SyncMode,
}

impl HealthResponse {
    pub fn new(store_reachable: bool, sync_mode: SyncMode) -> Self {
        let healthy = store_reachable && sync_mode != SyncMode::Degraded;
        Self {
            status: if healthy { "ok" } else { "degraded" }.to_owned(),
            store_reachable,
            sync_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_store_or_cache_fallback_is_degraded() {
        assert_eq!(HealthResponse::new(true, SyncMode::Live).status, "ok");
        assert_eq!(HealthResponse::new(true, SyncMode::Connecting).status, "ok");
        assert_eq!(HealthResponse::new(false, SyncMode::Live).status, "degraded");
        assert_eq!(HealthResponse::new(true, SyncMode::Degraded).status, "degraded");
    }
}
