//! Current set of groups as delivered by the `groups` subscription.

use indexmap::IndexMap;

use crate::dao::models::{GroupEntity, group_id_from_name};

/// Badge color for scores referencing a group the registry does not know.
pub const ORPHAN_BADGE_COLOR: &str = "#94a3b8";
/// Color of standings computed for ids missing from the registry.
pub const UNKNOWN_STANDING_COLOR: &str = "#ffffff";

/// Groups seeded into an empty collection, in display order.
pub const DEFAULT_GROUPS: [(&str, &str); 4] = [
    ("Nishan", "#ef4444"),
    ("Nagara", "#22c55e"),
    ("Dhankul", "#3b82f6"),
    ("Bansuri", "#a855f7"),
];

/// Build the baked-in default groups with ids derived from their names.
pub fn default_groups() -> Vec<GroupEntity> {
    DEFAULT_GROUPS
        .iter()
        .map(|(name, color)| GroupEntity {
            id: group_id_from_name(name),
            name: (*name).to_owned(),
            color: (*color).to_owned(),
        })
        .collect()
}

/// Name and color used to render a group reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLabel<'a> {
    pub name: &'a str,
    pub color: &'a str,
}

/// Immutable group snapshot keyed by id, preserving batch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupRegistry {
    groups: IndexMap<String, GroupEntity>,
}

impl GroupRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a registry from a full batch. A repeated id keeps its first
    /// position and its last record.
    pub fn from_batch(batch: impl IntoIterator<Item = GroupEntity>) -> Self {
        let mut groups = IndexMap::new();
        for group in batch {
            groups.insert(group.id.clone(), group);
        }
        Self { groups }
    }

    pub fn get(&self, id: &str) -> Option<&GroupEntity> {
        self.groups.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.groups.contains_key(id)
    }

    /// Group ids in registry order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupEntity> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Label for a score's group reference, falling back to the raw id.
    pub fn badge<'a>(&'a self, id: &'a str) -> GroupLabel<'a> {
        match self.groups.get(id) {
            Some(group) => GroupLabel {
                name: &group.name,
                color: &group.color,
            },
            None => GroupLabel {
                name: id,
                color: ORPHAN_BADGE_COLOR,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: &str, name: &str, color: &str) -> GroupEntity {
        GroupEntity {
            id: id.into(),
            name: name.into(),
            color: color.into(),
        }
    }

    #[test]
    fn defaults_match_the_seeded_set() {
        let defaults = default_groups();
        let ids: Vec<_> = defaults.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["Nishan", "Nagara", "Dhankul", "Bansuri"]);
        assert_eq!(defaults[0].color, "#ef4444");
        assert_eq!(defaults[3].color, "#a855f7");
    }

    #[test]
    fn batch_order_is_preserved_and_duplicates_collapse() {
        let registry = GroupRegistry::from_batch(vec![
            group("B", "Bee", "#000001"),
            group("A", "Ay", "#000002"),
            group("B", "Bee 2", "#000003"),
        ]);

        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["B", "A"]);
        assert_eq!(registry.get("B").map(|g| g.name.as_str()), Some("Bee 2"));
    }

    #[test]
    fn unknown_references_render_with_raw_id() {
        let registry = GroupRegistry::from_batch(vec![group("Nishan", "Nishan", "#ef4444")]);

        assert_eq!(
            registry.badge("Nishan"),
            GroupLabel {
                name: "Nishan",
                color: "#ef4444"
            }
        );
        assert_eq!(
            registry.badge("Ghost"),
            GroupLabel {
                name: "Ghost",
                color: ORPHAN_BADGE_COLOR
            }
        );
    }
}
