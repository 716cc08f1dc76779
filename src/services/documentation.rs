use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for Scoreboard Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::public::get_standings,
        crate::routes::public::get_scores,
        crate::routes::public::get_groups,
        crate::routes::public::get_status,
        crate::routes::admin::list_scores,
        crate::routes::admin::submit_score,
        crate::routes::admin::update_score,
        crate::routes::admin::delete_score,
        crate::routes::admin::create_group,
        crate::routes::admin::update_group,
        crate::routes::admin::delete_group,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::sse::Handshake,
            crate::dto::public::ScoreSummary,
            crate::dto::public::ScorePageResponse,
            crate::dto::public::ScoresResponse,
            crate::dto::public::StandingSummary,
            crate::dto::public::CategoryStandings,
            crate::dto::public::StandingsResponse,
            crate::dto::public::GroupSummary,
            crate::dto::public::GroupsResponse,
            crate::dto::public::SyncStatusResponse,
            crate::dto::admin::ScoreInput,
            crate::dto::admin::CreateGroupRequest,
            crate::dto::admin::UpdateGroupRequest,
            crate::dto::admin::CreatedScoreResponse,
            crate::dto::admin::GroupWriteResponse,
            crate::dao::models::Category,
            crate::dao::models::ItemType,
            crate::services::sync_coordinator::SyncMode,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "public", description = "Read-only leaderboard projections"),
        (name = "admin", description = "Score and group mutations guarded by the admin token"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/sse/public",
            "/public/standings",
            "/public/scores",
            "/admin/scores",
            "/admin/scores/{id}",
            "/admin/groups/{id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
