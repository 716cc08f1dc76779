use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{TimestampMilliSeconds, serde_as};

use crate::dao::{
    document_store::{GroupDocument, ScoreDocument},
    models::{Category, ItemType},
};

pub const SCORE_PREFIX: &str = "score::";
pub const GROUP_PREFIX: &str = "group::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Subset of the database info document used to seed the changes feed.
#[derive(Debug, Deserialize)]
pub struct DatabaseInfo {
    pub update_seq: Value,
}

#[derive(Debug, Deserialize)]
pub struct ChangesResponse {
    #[serde(default)]
    pub results: Vec<ChangeRow>,
    pub last_seq: Value,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRow {
    pub id: String,
}

impl ChangesResponse {
    /// Whether any change in the batch touched a document under `prefix`.
    pub fn touches(&self, prefix: &str) -> bool {
        self.results.iter().any(|row| row.id.starts_with(prefix))
    }
}

/// Render a sequence token for the `since` query parameter.
///
/// CouchDB 1.x reports integers, later releases opaque strings.
pub fn seq_param(seq: &Value) -> String {
    match seq {
        Value::String(token) => token.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchScoreDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub score: ScoreBody,
}

/// Stored score fields. The timestamp is written as epoch milliseconds taken
/// from the writer's clock at merge time.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<ItemType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<SystemTime>,
}

impl From<ScoreBody> for ScoreDocument {
    fn from(body: ScoreBody) -> Self {
        Self {
            student_name: body.student_name,
            item_name: body.item_name,
            item_type: body.item_type,
            group: body.group,
            score: body.score,
            category: body.category,
            timestamp: body.timestamp,
        }
    }
}

impl From<ScoreDocument> for ScoreBody {
    fn from(document: ScoreDocument) -> Self {
        Self {
            student_name: document.student_name,
            item_name: document.item_name,
            item_type: document.item_type,
            group: document.group,
            score: document.score,
            category: document.category,
            timestamp: document.timestamp,
        }
    }
}

impl CouchScoreDocument {
    /// Split into the public id and the backend-neutral document.
    pub fn into_parts(self) -> Option<(String, ScoreDocument)> {
        let id = self.id.strip_prefix(SCORE_PREFIX)?.to_owned();
        Some((id, self.score.into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchGroupDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl CouchGroupDocument {
    pub fn into_parts(self) -> Option<(String, GroupDocument)> {
        let id = self.id.strip_prefix(GROUP_PREFIX)?.to_owned();
        Some((
            id,
            GroupDocument {
                name: self.name,
                color: self.color,
            },
        ))
    }
}

pub fn score_doc_id(id: &str) -> String {
    format!("{SCORE_PREFIX}{id}")
}

pub fn group_doc_id(id: &str) -> String {
    format!("{GROUP_PREFIX}{id}")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    #[test]
    fn score_timestamp_round_trips_as_epoch_millis() {
        let document = CouchScoreDocument {
            id: score_doc_id("abc"),
            rev: None,
            score: ScoreBody {
                student_name: Some("A".into()),
                score: Some(10),
                timestamp: Some(SystemTime::UNIX_EPOCH + Duration::from_millis(1_700)),
                ..ScoreBody::default()
            },
        };

        let value = serde_json::to_value(&document).unwrap();
        assert_eq!(value["_id"], "score::abc");
        assert_eq!(value["studentName"], "A");
        assert_eq!(value["timestamp"], 1_700);
        assert!(value.get("_rev").is_none());
        assert!(value.get("itemName").is_none());
    }

    #[test]
    fn partial_documents_deserialize_with_missing_fields() {
        let document: CouchScoreDocument = serde_json::from_value(json!({
            "_id": "score::x",
            "_rev": "1-abc",
            "score": 4
        }))
        .unwrap();

        let (id, body) = document.into_parts().unwrap();
        assert_eq!(id, "x");
        assert_eq!(body.score, Some(4));
        assert!(body.timestamp.is_none());
    }

    #[test]
    fn foreign_documents_are_ignored() {
        let document = CouchGroupDocument {
            id: "design::views".into(),
            rev: None,
            name: None,
            color: None,
        };
        assert!(document.into_parts().is_none());
    }

    #[test]
    fn changes_feed_filters_by_prefix() {
        let changes: ChangesResponse = serde_json::from_value(json!({
            "results": [{"id": "group::Nishan"}],
            "last_seq": "12-g1AAAA"
        }))
        .unwrap();

        assert!(changes.touches(GROUP_PREFIX));
        assert!(!changes.touches(SCORE_PREFIX));
        assert_eq!(seq_param(&changes.last_seq), "12-g1AAAA");
        assert_eq!(seq_param(&json!(7)), "7");
    }
}
