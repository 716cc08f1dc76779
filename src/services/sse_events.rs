use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    dao::models::Category,
    dto::{
        public::{GroupsResponse, SyncStatusResponse},
        sse::ServerEvent,
    },
    services::{
        public_service::{category_standings, scores_page},
        sync_coordinator::SyncView,
    },
    state::SharedState,
};

const EVENT_STANDINGS: &str = "standings";
const EVENT_SCORES: &str = "scores";
const EVENT_GROUPS: &str = "groups";
const EVENT_SYNC_STATUS: &str = "sync.status";

/// Events describing `view`: standings per category, the first ledger page,
/// the group registry and the sync status.
pub fn view_events(state: &SharedState, view: &SyncView) -> Vec<ServerEvent> {
    let mut events = Vec::with_capacity(Category::ALL.len() + 3);
    for category in Category::ALL {
        push_event(
            &mut events,
            EVENT_STANDINGS,
            &category_standings(state, view, category),
        );
    }
    push_event(
        &mut events,
        EVENT_SCORES,
        &scores_page(state, view, None, 0, None),
    );
    push_event(
        &mut events,
        EVENT_GROUPS,
        &GroupsResponse::from(view.registry.as_ref()),
    );
    push_event(&mut events, EVENT_SYNC_STATUS, &SyncStatusResponse::from(view));
    events
}

/// Broadcast the events of `view` on the public stream. Nothing is built
/// while no client is connected.
pub fn broadcast_view(state: &SharedState, view: &SyncView) {
    let hub = state.public_sse();
    if hub.listeners() == 0 {
        return;
    }
    hub.publish(view_events(state, view));
}

/// Forward every change of the read model to the public SSE stream.
pub fn spawn_view_broadcaster(state: SharedState) -> JoinHandle<()> {
    let mut receiver = state.sync().subscribe();
    tokio::spawn(async move {
        while receiver.changed().await.is_ok() {
            let view = receiver.borrow_and_update().clone();
            debug!(
                scores = view.ledger.len(),
                groups = view.registry.len(),
                "broadcasting sync view"
            );
            broadcast_view(&state, &view);
        }
    })
}

fn push_event(events: &mut Vec<ServerEvent>, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => events.push(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}
