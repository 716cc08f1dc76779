//! Business logic powering the admin REST routes. Every mutation is
//! forwarded to the sync coordinator; results reach readers through the
//! live subscriptions.

use crate::{
    dao::models::Category,
    dto::{
        admin::{
            CreateGroupRequest, CreatedScoreResponse, GroupWriteResponse, ScoreInput,
            UpdateGroupRequest,
        },
        public::{ScoreSummary, ScoresResponse},
    },
    error::ServiceError,
    state::SharedState,
};

/// Full ledger, newest first, for the admin table.
pub fn list_scores(state: &SharedState, category: Option<Category>) -> ScoresResponse {
    let view = state.view();
    ScoresResponse {
        scores: view
            .ledger
            .filtered(category)
            .map(|record| ScoreSummary::from_record(record, &view.registry))
            .collect(),
    }
}

pub async fn submit_score(
    state: &SharedState,
    input: ScoreInput,
) -> Result<CreatedScoreResponse, ServiceError> {
    let id = state.sync().submit_score(&input).await?;
    Ok(CreatedScoreResponse { id })
}

pub async fn update_score(
    state: &SharedState,
    id: String,
    input: ScoreInput,
) -> Result<(), ServiceError> {
    state.sync().update_score(&id, &input).await
}

pub async fn delete_score(state: &SharedState, id: String) -> Result<(), ServiceError> {
    state.sync().delete_score(&id).await
}

pub async fn create_group(
    state: &SharedState,
    request: CreateGroupRequest,
) -> Result<GroupWriteResponse, ServiceError> {
    let id = state.sync().create_group(&request).await?;
    Ok(GroupWriteResponse { id })
}

pub async fn update_group(
    state: &SharedState,
    id: String,
    request: UpdateGroupRequest,
) -> Result<GroupWriteResponse, ServiceError> {
    state.sync().upsert_group(&id, &request).await?;
    Ok(GroupWriteResponse { id })
}

pub async fn delete_group(state: &SharedState, id: String) -> Result<(), ServiceError> {
    state.sync().delete_group(&id).await
}
