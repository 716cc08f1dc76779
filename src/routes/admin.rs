use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};

use crate::{
    dto::{
        admin::{
            CreateGroupRequest, CreatedScoreResponse, GroupWriteResponse, ScoreInput,
            UpdateGroupRequest,
        },
        public::{CategoryQuery, ScoresResponse},
    },
    error::AppError,
    services::admin_service,
    state::SharedState,
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Admin-only endpoints mutating scores and groups.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/admin/scores", get(list_scores).post(submit_score))
        .route("/admin/scores/{id}", put(update_score).delete(delete_score))
        .route("/admin/groups", post(create_group))
        .route("/admin/groups/{id}", put(update_group).delete(delete_group))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

/// List every score, newest first.
#[utoipa::path(
    get,
    path = "/admin/scores",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token"), CategoryQuery),
    responses((status = 200, description = "Scores ordered by recency", body = ScoresResponse))
)]
pub async fn list_scores(
    State(state): State<SharedState>,
    Query(query): Query<CategoryQuery>,
) -> Json<ScoresResponse> {
    Json(admin_service::list_scores(&state, query.category))
}

/// Record a new score; the store assigns its id and timestamp.
#[utoipa::path(
    post,
    path = "/admin/scores",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token")),
    request_body = ScoreInput,
    responses(
        (status = 201, description = "Score created", body = CreatedScoreResponse),
        (status = 400, description = "Missing or malformed field"),
        (status = 503, description = "Store write failed")
    )
)]
pub async fn submit_score(
    State(state): State<SharedState>,
    Json(input): Json<ScoreInput>,
) -> Result<(StatusCode, Json<CreatedScoreResponse>), AppError> {
    let created = admin_service::submit_score(&state, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Merge new values into a score. Unknown ids are created.
#[utoipa::path(
    put,
    path = "/admin/scores/{id}",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token"),
    ("id" = String, Path, description = "Identifier of the score to update")),
    request_body = ScoreInput,
    responses(
        (status = 204, description = "Score updated"),
        (status = 400, description = "Missing or malformed field"),
        (status = 503, description = "Store write failed")
    )
)]
pub async fn update_score(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(input): Json<ScoreInput>,
) -> Result<StatusCode, AppError> {
    admin_service::update_score(&state, id, input).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a score. Deleting an unknown id succeeds.
#[utoipa::path(
    delete,
    path = "/admin/scores/{id}",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token"),
    ("id" = String, Path, description = "Identifier of the score to delete")),
    responses(
        (status = 204, description = "Score deleted"),
        (status = 503, description = "Store write failed")
    )
)]
pub async fn delete_score(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    admin_service::delete_score(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create a group identified by its name without whitespace.
#[utoipa::path(
    post,
    path = "/admin/groups",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token")),
    request_body = CreateGroupRequest,
    responses(
        (status = 201, description = "Group written; an existing group with the same id is overwritten", body = GroupWriteResponse),
        (status = 400, description = "Missing name or malformed color"),
        (status = 503, description = "Store write failed")
    )
)]
pub async fn create_group(
    State(state): State<SharedState>,
    Json(request): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupWriteResponse>), AppError> {
    let created = admin_service::create_group(&state, request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Rename or recolor a group. The id never changes.
#[utoipa::path(
    put,
    path = "/admin/groups/{id}",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token"),
    ("id" = String, Path, description = "Identifier of the group to update")),
    request_body = UpdateGroupRequest,
    responses(
        (status = 200, description = "Group updated", body = GroupWriteResponse),
        (status = 400, description = "Malformed field"),
        (status = 503, description = "Store write failed")
    )
)]
pub async fn update_group(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateGroupRequest>,
) -> Result<Json<GroupWriteResponse>, AppError> {
    Ok(Json(admin_service::update_group(&state, id, request).await?))
}

/// Delete a group. Scores referencing it are kept.
#[utoipa::path(
    delete,
    path = "/admin/groups/{id}",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token"),
    ("id" = String, Path, description = "Identifier of the group to delete")),
    responses(
        (status = 204, description = "Group deleted"),
        (status = 503, description = "Store write failed")
    )
)]
pub async fn delete_group(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    admin_service::delete_group(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| {
            AppError::Unauthorized("missing admin token header `X-Admin-Token`".into())
        })?;

    match state.admin_token() {
        Some(token) if token == provided => Ok(next.run(req).await),
        Some(_) => Err(AppError::Unauthorized("invalid admin token".into())),
        None => Err(AppError::Unauthorized(
            "admin access disabled: ADMIN_TOKEN is not configured".into(),
        )),
    }
}
