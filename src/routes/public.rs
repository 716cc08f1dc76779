use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::{
    dto::public::{
        CategoryQuery, GroupsResponse, ScorePageQuery, ScorePageResponse, StandingsResponse,
        SyncStatusResponse,
    },
    services::public_service,
    state::SharedState,
};

/// Public read-only endpoints exposing the leaderboard read model.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/public/standings", get(get_standings))
        .route("/public/scores", get(get_scores))
        .route("/public/groups", get(get_groups))
        .route("/public/status", get(get_status))
}

#[utoipa::path(
    get,
    path = "/public/standings",
    tag = "public",
    params(CategoryQuery),
    responses((status = 200, description = "Ranked group totals per category", body = StandingsResponse))
)]
/// Return the standings of one category, or of every category.
pub async fn get_standings(
    State(state): State<SharedState>,
    Query(query): Query<CategoryQuery>,
) -> Json<StandingsResponse> {
    Json(public_service::get_standings(&state, query.category))
}

#[utoipa::path(
    get,
    path = "/public/scores",
    tag = "public",
    params(ScorePageQuery),
    responses((status = 200, description = "Page of scores, newest first", body = ScorePageResponse))
)]
/// Return a window over the scores ordered by recency.
pub async fn get_scores(
    State(state): State<SharedState>,
    Query(query): Query<ScorePageQuery>,
) -> Json<ScorePageResponse> {
    Json(public_service::get_scores_page(
        &state,
        query.category,
        query.offset,
        query.limit,
    ))
}

#[utoipa::path(
    get,
    path = "/public/groups",
    tag = "public",
    responses((status = 200, description = "Groups in display order", body = GroupsResponse))
)]
pub async fn get_groups(State(state): State<SharedState>) -> Json<GroupsResponse> {
    Json(public_service::get_groups(&state))
}

#[utoipa::path(
    get,
    path = "/public/status",
    tag = "public",
    responses((status = 200, description = "Synchronization status", body = SyncStatusResponse))
)]
/// Report whether scores are live or served from the local cache.
pub async fn get_status(State(state): State<SharedState>) -> Json<SyncStatusResponse> {
    Json(public_service::get_status(&state))
}
