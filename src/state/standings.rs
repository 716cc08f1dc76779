//! Ranked per-group totals derived from the registry and ledger snapshots.

use std::collections::HashMap;

use serde::Deserialize;

use crate::{
    dao::models::{Category, GroupEntity},
    state::{
        ledger::ScoreLedger,
        registry::{GroupRegistry, UNKNOWN_STANDING_COLOR},
    },
};

/// Total points of one group within a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub group_id: String,
    pub name: String,
    pub color: String,
    pub total_score: i64,
}

/// Which group ids receive a standing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupUniverse {
    /// Every id currently in the registry, in registry order.
    #[default]
    Registry,
    /// The configured default groups, in their configured order.
    Defaults,
}

impl GroupUniverse {
    /// Resolve the ordered id set for the current registry snapshot.
    pub fn ids(self, registry: &GroupRegistry, defaults: &[GroupEntity]) -> Vec<String> {
        match self {
            GroupUniverse::Registry => registry.ids().map(str::to_owned).collect(),
            GroupUniverse::Defaults => defaults.iter().map(|group| group.id.clone()).collect(),
        }
    }
}

/// Rank the groups of `universe` by their total score in `category`.
///
/// Scores are summed in a single pass; scores referencing ids outside the
/// universe are ignored and ids without scores total zero. Ties keep the
/// universe order.
pub fn compute_standings(
    registry: &GroupRegistry,
    ledger: &ScoreLedger,
    category: Category,
    universe: &[String],
) -> Vec<Standing> {
    let mut totals: HashMap<&str, i64> = HashMap::with_capacity(universe.len());
    let mut order: Vec<&str> = Vec::with_capacity(universe.len());
    for id in universe {
        if totals.insert(id.as_str(), 0).is_none() {
            order.push(id.as_str());
        }
    }

    for record in ledger.filtered(Some(category)) {
        if let Some(total) = totals.get_mut(record.group.as_str()) {
            *total = total.saturating_add(record.score);
        }
    }

    let mut standings: Vec<Standing> = order
        .into_iter()
        .map(|id| {
            let total_score = totals.get(id).copied().unwrap_or_default();
            match registry.get(id) {
                Some(group) => Standing {
                    group_id: id.to_owned(),
                    name: group.name.clone(),
                    color: group.color.clone(),
                    total_score,
                },
                None => Standing {
                    group_id: id.to_owned(),
                    name: id.to_owned(),
                    color: UNKNOWN_STANDING_COLOR.to_owned(),
                    total_score,
                },
            }
        })
        .collect();

    standings.sort_by(|a, b| b.total_score.cmp(&a.total_score));
    standings
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::{
        dao::models::{ItemType, ScoreEntity},
        state::registry::default_groups,
    };

    fn score(id: &str, group: &str, points: i64, category: Category) -> ScoreEntity {
        ScoreEntity {
            id: id.into(),
            student_name: "A".into(),
            item_name: "Solo Dance".into(),
            item_type: ItemType::Individual,
            group: group.into(),
            score: points,
            category,
            timestamp: SystemTime::UNIX_EPOCH + Duration::from_secs(1),
        }
    }

    fn totals(standings: &[Standing]) -> Vec<(&str, i64)> {
        standings
            .iter()
            .map(|s| (s.group_id.as_str(), s.total_score))
            .collect()
    }

    #[test]
    fn ranks_descending_and_keeps_universe_order_on_ties() {
        let registry = GroupRegistry::from_batch(default_groups());
        let ledger = ScoreLedger::from_snapshot(vec![
            score("1", "Nishan", 10, Category::Arts),
            score("2", "Nagara", 15, Category::Arts),
            score("3", "Bansuri", 50, Category::Sports),
        ]);
        let universe = GroupUniverse::Registry.ids(&registry, &[]);

        let standings = compute_standings(&registry, &ledger, Category::Arts, &universe);
        assert_eq!(
            totals(&standings),
            vec![("Nagara", 15), ("Nishan", 10), ("Dhankul", 0), ("Bansuri", 0)]
        );
        assert_eq!(standings[0].color, "#22c55e");
        assert_eq!(
            standings,
            compute_standings(&registry, &ledger, Category::Arts, &universe)
        );
    }

    #[test]
    fn orphaned_scores_contribute_nothing() {
        let registry = GroupRegistry::from_batch(default_groups());
        let ledger = ScoreLedger::from_snapshot(vec![
            score("1", "Deleted", 99, Category::Arts),
            score("2", "Nishan", -3, Category::Arts),
        ]);
        let universe = GroupUniverse::Registry.ids(&registry, &[]);

        let standings = compute_standings(&registry, &ledger, Category::Arts, &universe);
        assert_eq!(standings.iter().map(|s| s.total_score).sum::<i64>(), -3);
        assert_eq!(standings.last().map(|s| s.group_id.as_str()), Some("Nishan"));
    }

    #[test]
    fn default_universe_labels_missing_groups_with_their_id() {
        let registry = GroupRegistry::empty();
        let ledger = ScoreLedger::from_snapshot(vec![score("1", "Dhankul", 7, Category::Sports)]);
        let universe = GroupUniverse::Defaults.ids(&registry, &default_groups());

        let standings = compute_standings(&registry, &ledger, Category::Sports, &universe);
        assert_eq!(standings.len(), 4);
        assert_eq!(standings[0].group_id, "Dhankul");
        assert_eq!(standings[0].name, "Dhankul");
        assert_eq!(standings[0].color, UNKNOWN_STANDING_COLOR);
    }

    #[test]
    fn totals_saturate() {
        let registry = GroupRegistry::from_batch(default_groups());
        let ledger = ScoreLedger::from_snapshot(vec![
            score("1", "Nishan", i64::MAX, Category::Arts),
            score("2", "Nishan", 5, Category::Arts),
        ]);
        let universe = GroupUniverse::Registry.ids(&registry, &[]);

        let standings = compute_standings(&registry, &ledger, Category::Arts, &universe);
        assert_eq!(standings[0].total_score, i64::MAX);
    }
}
