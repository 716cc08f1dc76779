//! Read-only projections over the current sync view.

use crate::{
    dao::models::Category,
    dto::public::{
        CategoryStandings, GroupsResponse, ScorePageResponse, StandingSummary,
        StandingsResponse, SyncStatusResponse,
    },
    services::sync_coordinator::SyncView,
    state::{SharedState, standings::compute_standings},
};

/// Ranked standings of `category` for a given view.
pub fn category_standings(state: &SharedState, view: &SyncView, category: Category) -> CategoryStandings {
    let config = state.config();
    let universe = config
        .group_universe
        .ids(&view.registry, &config.default_groups);
    let standings = compute_standings(&view.registry, &view.ledger, category, &universe)
        .into_iter()
        .map(StandingSummary::from)
        .collect();

    CategoryStandings {
        category,
        standings,
    }
}

/// Standings of one category, or of every category when none is given.
pub fn get_standings(state: &SharedState, category: Option<Category>) -> StandingsResponse {
    let view = state.view();
    let categories = match category {
        Some(category) => vec![category_standings(state, &view, category)],
        None => Category::ALL
            .iter()
            .map(|category| category_standings(state, &view, *category))
            .collect(),
    };
    StandingsResponse { categories }
}

/// Page of the ledger; `limit` defaults to the configured page size.
pub fn get_scores_page(
    state: &SharedState,
    category: Option<Category>,
    offset: Option<usize>,
    limit: Option<usize>,
) -> ScorePageResponse {
    let view = state.view();
    scores_page(state, &view, category, offset.unwrap_or(0), limit)
}

pub(crate) fn scores_page(
    state: &SharedState,
    view: &SyncView,
    category: Option<Category>,
    offset: usize,
    limit: Option<usize>,
) -> ScorePageResponse {
    let limit = limit
        .filter(|limit| *limit > 0)
        .unwrap_or(state.config().page_size);
    let page = view.ledger.page(category, offset, limit);
    ScorePageResponse::from_page(page, &view.registry)
}

pub fn get_groups(state: &SharedState) -> GroupsResponse {
    GroupsResponse::from(state.view().registry.as_ref())
}

pub fn get_status(state: &SharedState) -> SyncStatusResponse {
    SyncStatusResponse::from(&state.view())
}
