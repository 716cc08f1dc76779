use mongodb::bson::{DateTime, Document, doc};
use serde::Deserialize;

use crate::dao::{
    document_store::{GroupDocument, ScoreDocument},
    models::{GroupWrite, ScoreWrite},
};

/// Raw score document. Fields are optional because merge updates may have
/// created partial documents.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoScoreDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime>,
}

impl MongoScoreDocument {
    /// Split into id and backend-neutral document. Unknown enum values are dropped.
    pub fn into_parts(self) -> (String, ScoreDocument) {
        let document = ScoreDocument {
            student_name: self.student_name,
            item_name: self.item_name,
            item_type: self.item_type.and_then(|raw| raw.parse().ok()),
            group: self.group,
            score: self.score,
            category: self.category.and_then(|raw| raw.parse().ok()),
            timestamp: self.timestamp.map(DateTime::to_system_time),
        };
        (self.id, document)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoGroupDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl MongoGroupDocument {
    pub fn into_parts(self) -> (String, GroupDocument) {
        (
            self.id,
            GroupDocument {
                name: self.name,
                color: self.color,
            },
        )
    }
}

/// Build an update document applying `write` with merge semantics.
///
/// The server timestamp sentinel maps onto `$currentDate`.
pub fn score_update(write: ScoreWrite) -> Option<Document> {
    let mut set = Document::new();
    if let Some(value) = write.student_name {
        set.insert("studentName", value);
    }
    if let Some(value) = write.item_name {
        set.insert("itemName", value);
    }
    if let Some(value) = write.item_type {
        set.insert("itemType", value.as_str());
    }
    if let Some(value) = write.group {
        set.insert("group", value);
    }
    if let Some(value) = write.score {
        set.insert("score", value);
    }
    if let Some(value) = write.category {
        set.insert("category", value.as_str());
    }

    let mut update = Document::new();
    if !set.is_empty() {
        update.insert("$set", set);
    }
    if write.timestamp.is_some() {
        update.insert("$currentDate", doc! { "timestamp": true });
    }
    (!update.is_empty()).then_some(update)
}

pub fn group_update(write: GroupWrite) -> Option<Document> {
    let mut set = Document::new();
    if let Some(name) = write.name {
        set.insert("name", name);
    }
    if let Some(color) = write.color {
        set.insert("color", color);
    }
    (!set.is_empty()).then(|| doc! { "$set": set })
}
