use std::{fmt, str::FromStr, time::SystemTime};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Competition partition a score belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Category {
    Arts,
    Sports,
}

impl Category {
    /// Every partition, in display order.
    pub const ALL: [Category; 2] = [Category::Arts, Category::Sports];

    /// Canonical name stored in documents.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Arts => "Arts",
            Category::Sports => "Sports",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an enum from free text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for Category {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arts" => Ok(Category::Arts),
            "sports" => Ok(Category::Sports),
            _ => Err(UnknownVariant {
                kind: "category",
                value: s.to_string(),
            }),
        }
    }
}

/// Whether a score was earned by a single student or a group performance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ItemType {
    Individual,
    Group,
}

impl ItemType {
    /// Canonical name stored in documents.
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Individual => "Individual",
            ItemType::Group => "Group",
        }
    }
}

impl FromStr for ItemType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "individual" => Ok(ItemType::Individual),
            "group" => Ok(ItemType::Group),
            _ => Err(UnknownVariant {
                kind: "item type",
                value: s.to_string(),
            }),
        }
    }
}

/// Score record as observed through the `scores` subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntity {
    /// Store-assigned identifier, immutable after creation.
    pub id: String,
    pub student_name: String,
    pub item_name: String,
    pub item_type: ItemType,
    /// Group id this score counts towards. May reference a deleted group.
    pub group: String,
    pub score: i64,
    pub category: Category,
    /// Server-assigned time of the last create or update.
    pub timestamp: SystemTime,
}

/// Group metadata as observed through the `groups` subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupEntity {
    /// Identifier derived from the display name at creation time.
    pub id: String,
    pub name: String,
    /// Hex-like color string, e.g. `#ef4444`.
    pub color: String,
}

/// Sentinel asking the store to stamp a field with its own clock at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTimestamp;

/// Validated score fields issued by admin mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreFields {
    pub student_name: String,
    pub item_name: String,
    pub item_type: ItemType,
    pub group: String,
    pub score: i64,
    pub category: Category,
}

/// Partial score document sent to the store.
///
/// `None` fields are left untouched by merge updates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreWrite {
    pub student_name: Option<String>,
    pub item_name: Option<String>,
    pub item_type: Option<ItemType>,
    pub group: Option<String>,
    pub score: Option<i64>,
    pub category: Option<Category>,
    pub timestamp: Option<ServerTimestamp>,
}

impl From<ScoreFields> for ScoreWrite {
    fn from(fields: ScoreFields) -> Self {
        Self {
            student_name: Some(fields.student_name),
            item_name: Some(fields.item_name),
            item_type: Some(fields.item_type),
            group: Some(fields.group),
            score: Some(fields.score),
            category: Some(fields.category),
            timestamp: Some(ServerTimestamp),
        }
    }
}

/// Partial group document sent to the store with merge semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupWrite {
    pub name: Option<String>,
    pub color: Option<String>,
}

impl From<GroupEntity> for GroupWrite {
    fn from(group: GroupEntity) -> Self {
        Self {
            name: Some(group.name),
            color: Some(group.color),
        }
    }
}

/// Query driving a live score subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreQuery {
    /// Restrict the result set to one partition.
    pub category: Option<Category>,
}

impl ScoreQuery {
    /// Whether a record belongs to the result set.
    pub fn matches(&self, category: Category) -> bool {
        self.category.is_none_or(|wanted| wanted == category)
    }
}

/// Derive a group id from its display name by removing every whitespace character.
pub fn group_id_from_name(name: &str) -> String {
    name.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Sort score records newest first. Ties keep their relative order.
pub fn sort_by_recency(records: &mut [ScoreEntity]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_id_strips_all_whitespace() {
        assert_eq!(group_id_from_name("New Team"), "NewTeam");
        assert_eq!(group_id_from_name("  Blue\tWave  Crew "), "BlueWaveCrew");
        assert_eq!(group_id_from_name("Nishan"), "Nishan");
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("arts".parse::<Category>(), Ok(Category::Arts));
        assert_eq!(" Sports ".parse::<Category>(), Ok(Category::Sports));
        assert!("music".parse::<Category>().is_err());
    }

    #[test]
    fn item_type_rejects_unknown_values() {
        assert_eq!("Group".parse::<ItemType>(), Ok(ItemType::Group));
        assert!("duo".parse::<ItemType>().is_err());
    }

    #[test]
    fn unfiltered_query_matches_everything() {
        let query = ScoreQuery::default();
        assert!(query.matches(Category::Arts));
        assert!(query.matches(Category::Sports));

        let arts = ScoreQuery {
            category: Some(Category::Arts),
        };
        assert!(arts.matches(Category::Arts));
        assert!(!arts.matches(Category::Sports));
    }
}
