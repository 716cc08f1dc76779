use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{Category, GroupWrite, ItemType, ScoreFields},
    dto::validation::{RawScore, parse_score, require_text, require_variant, validate_color},
};

/// Score form submitted by an operator. Every field is required.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreInput {
    pub student_name: Option<String>,
    pub item_name: Option<String>,
    /// `Individual` or `Group`.
    pub item_type: Option<String>,
    /// Id of the group the points count towards.
    pub group: Option<String>,
    /// Whole number, either as a JSON number or as numeric text.
    #[schema(value_type = Option<String>, example = "10")]
    pub score: Option<RawScore>,
    /// `Arts` or `Sports`.
    pub category: Option<String>,
}

impl ScoreInput {
    /// Validate every field and produce the normalized score fields.
    pub fn to_fields(&self) -> Result<ScoreFields, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let student_name = require_text("studentName", self.student_name.as_deref())
            .map_err(|e| errors.add("studentName", e))
            .ok();
        let item_name = require_text("itemName", self.item_name.as_deref())
            .map_err(|e| errors.add("itemName", e))
            .ok();
        let item_type = require_variant::<ItemType>("itemType", self.item_type.as_deref())
            .map_err(|e| errors.add("itemType", e))
            .ok();
        let group = require_text("group", self.group.as_deref())
            .map_err(|e| errors.add("group", e))
            .ok();
        let score = match &self.score {
            Some(raw) => parse_score(raw).map_err(|e| errors.add("score", e)).ok(),
            None => {
                if let Err(e) = require_text("score", None) {
                    errors.add("score", e);
                }
                None
            }
        };
        let category = require_variant::<Category>("category", self.category.as_deref())
            .map_err(|e| errors.add("category", e))
            .ok();

        match (student_name, item_name, item_type, group, score, category) {
            (
                Some(student_name),
                Some(item_name),
                Some(item_type),
                Some(group),
                Some(score),
                Some(category),
            ) if errors.is_empty() => Ok(ScoreFields {
                student_name,
                item_name,
                item_type,
                group,
                score,
                category,
            }),
            _ => Err(errors),
        }
    }
}

impl Validate for ScoreInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.to_fields().map(|_| ())
    }
}

/// Payload creating a group whose id is derived from `name`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateGroupRequest {
    pub name: String,
    /// Hex color, e.g. `#ef4444`.
    pub color: String,
}

impl Validate for CreateGroupRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = require_text("name", Some(&self.name)) {
            errors.add("name", e);
        }
        if let Err(e) = validate_color(self.color.trim()) {
            errors.add("color", e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Partial group update; omitted fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateGroupRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl UpdateGroupRequest {
    /// Validate and normalize into a merge write.
    pub fn to_write(&self) -> Result<GroupWrite, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let name = match self.name.as_deref() {
            Some(name) => require_text("name", Some(name))
                .map_err(|e| errors.add("name", e))
                .ok(),
            None => None,
        };
        let color = match self.color.as_deref().map(str::trim) {
            Some(color) => validate_color(color)
                .map(|_| color.to_owned())
                .map_err(|e| errors.add("color", e))
                .ok(),
            None => None,
        };

        if errors.is_empty() {
            Ok(GroupWrite { name, color })
        } else {
            Err(errors)
        }
    }
}

impl Validate for UpdateGroupRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.to_write().map(|_| ())
    }
}

/// Response returned after a score was created.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedScoreResponse {
    /// Identifier assigned by the store.
    pub id: String,
}

/// Response returned after a group write.
#[derive(Debug, Serialize, ToSchema)]
pub struct GroupWriteResponse {
    /// Id of the group document written.
    pub id: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn scenario_input() -> ScoreInput {
        serde_json::from_value(json!({
            "studentName": "A",
            "itemName": "Solo Dance",
            "itemType": "Individual",
            "group": "Nishan",
            "score": "10",
            "category": "Arts"
        }))
        .unwrap()
    }

    #[test]
    fn form_text_is_parsed_into_typed_fields() {
        let fields = scenario_input().to_fields().unwrap();
        assert_eq!(fields.score, 10);
        assert_eq!(fields.item_type, ItemType::Individual);
        assert_eq!(fields.category, Category::Arts);
        assert_eq!(fields.group, "Nishan");
    }

    #[test]
    fn numeric_json_scores_are_accepted() {
        let mut input = scenario_input();
        input.score = Some(RawScore::from(-5));
        assert_eq!(input.to_fields().unwrap().score, -5);
    }

    #[test]
    fn every_missing_field_is_reported() {
        let errors = ScoreInput::default().to_fields().unwrap_err();
        let fields = errors.field_errors();
        for name in [
            "studentName",
            "itemName",
            "itemType",
            "group",
            "score",
            "category",
        ] {
            assert!(fields.contains_key(name), "missing error for {name}");
        }
    }

    #[test]
    fn non_numeric_score_is_rejected() {
        let mut input = scenario_input();
        input.score = Some(RawScore::from("lots"));
        let errors = input.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("score"));
    }

    #[test]
    fn group_requests_validate_colors() {
        let request = CreateGroupRequest {
            name: "New Team".into(),
            color: "blue".into(),
        };
        assert!(request.validate().is_err());

        let update = UpdateGroupRequest {
            name: None,
            color: Some(" #112233 ".into()),
        };
        assert_eq!(
            update.to_write().unwrap(),
            GroupWrite {
                name: None,
                color: Some("#112233".into())
            }
        );
    }
}
