use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    dao::models::{Category, GroupEntity, ItemType, ScoreEntity},
    dto::format_system_time,
    services::sync_coordinator::{SyncMode, SyncView},
    state::{ledger::LedgerPage, registry::GroupRegistry, standings::Standing},
};

/// Optional category restriction.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CategoryQuery {
    /// `Arts` or `Sports`; omitted means every category.
    pub category: Option<Category>,
}

/// Paging window over the ledger.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScorePageQuery {
    pub category: Option<Category>,
    /// Number of records to skip, newest first.
    pub offset: Option<usize>,
    /// Page size; defaults to the configured page size.
    pub limit: Option<usize>,
}

/// Score record as rendered in tables, with its group label resolved.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub id: String,
    pub student_name: String,
    pub item_name: String,
    pub item_type: ItemType,
    pub group: String,
    /// Registry name of `group`, or the raw id when the group is unknown.
    pub group_name: String,
    pub group_color: String,
    pub score: i64,
    pub category: Category,
    /// RFC 3339 store timestamp.
    pub timestamp: String,
}

impl ScoreSummary {
    pub fn from_record(record: &ScoreEntity, registry: &GroupRegistry) -> Self {
        let label = registry.badge(&record.group);
        Self {
            id: record.id.clone(),
            student_name: record.student_name.clone(),
            item_name: record.item_name.clone(),
            item_type: record.item_type,
            group: record.group.clone(),
            group_name: label.name.to_owned(),
            group_color: label.color.to_owned(),
            score: record.score,
            category: record.category,
            timestamp: format_system_time(record.timestamp),
        }
    }
}

/// One page of the score ledger.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScorePageResponse {
    pub items: Vec<ScoreSummary>,
    pub offset: usize,
    pub limit: usize,
    pub total: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

impl ScorePageResponse {
    pub fn from_page(page: LedgerPage, registry: &GroupRegistry) -> Self {
        Self {
            items: page
                .items
                .iter()
                .map(|record| ScoreSummary::from_record(record, registry))
                .collect(),
            offset: page.offset,
            limit: page.limit,
            total: page.total,
            has_previous: page.has_previous,
            has_next: page.has_next,
        }
    }
}

/// Full ledger listing used by the admin table.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoresResponse {
    pub scores: Vec<ScoreSummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StandingSummary {
    pub group_id: String,
    pub name: String,
    pub color: String,
    pub total_score: i64,
}

impl From<Standing> for StandingSummary {
    fn from(standing: Standing) -> Self {
        Self {
            group_id: standing.group_id,
            name: standing.name,
            color: standing.color,
            total_score: standing.total_score,
        }
    }
}

/// Ranked standings of one category, best first.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CategoryStandings {
    pub category: Category,
    pub standings: Vec<StandingSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StandingsResponse {
    pub categories: Vec<CategoryStandings>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupSummary {
    pub id: String,
    pub name: String,
    pub color: String,
}

impl From<&GroupEntity> for GroupSummary {
    fn from(group: &GroupEntity) -> Self {
        Self {
            id: group.id.clone(),
            name: group.name.clone(),
            color: group.color.clone(),
        }
    }
}

/// Group registry in display order.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupsResponse {
    pub groups: Vec<GroupSummary>,
}

impl From<&GroupRegistry> for GroupsResponse {
    fn from(registry: &GroupRegistry) -> Self {
        Self {
            groups: registry.groups().map(GroupSummary::from).collect(),
        }
    }
}

/// Connectivity of the live synchronization.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    pub mode: SyncMode,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub score_count: usize,
    pub group_count: usize,
}

impl From<&SyncView> for SyncStatusResponse {
    fn from(view: &SyncView) -> Self {
        Self {
            mode: view.status.mode,
            degraded: view.is_degraded(),
            last_error: view.status.last_error.clone(),
            score_count: view.ledger.len(),
            group_count: view.registry.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    #[test]
    fn orphaned_scores_render_with_raw_group_id() {
        let record = ScoreEntity {
            id: "s1".into(),
            student_name: "A".into(),
            item_name: "Relay".into(),
            item_type: ItemType::Group,
            group: "Vanished".into(),
            score: 8,
            category: Category::Sports,
            timestamp: SystemTime::UNIX_EPOCH + Duration::from_secs(60),
        };

        let summary = ScoreSummary::from_record(&record, &GroupRegistry::empty());
        assert_eq!(summary.group_name, "Vanished");
        assert_eq!(summary.group_color, "#94a3b8");
        assert_eq!(summary.timestamp, "1970-01-01T00:01:00Z");

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["studentName"], "A");
        assert_eq!(json["itemType"], "Group");
    }
}
