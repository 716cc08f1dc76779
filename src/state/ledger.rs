//! Current score snapshot ordered by recency, with paging over it.

use std::collections::HashSet;

use tracing::warn;

use crate::dao::models::{Category, ScoreEntity, sort_by_recency};

/// Immutable score snapshot, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreLedger {
    records: Vec<ScoreEntity>,
}

/// Window over the ledger ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerPage {
    pub items: Vec<ScoreEntity>,
    pub offset: usize,
    pub limit: usize,
    /// Number of records matching the filter across all pages.
    pub total: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

impl ScoreLedger {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Materialize a snapshot delivered by the store or the cache.
    ///
    /// Records are re-sorted by timestamp so cached and live data share one
    /// ordering; a repeated id keeps its first occurrence.
    pub fn from_snapshot(records: Vec<ScoreEntity>) -> Self {
        let mut seen = HashSet::with_capacity(records.len());
        let mut records: Vec<ScoreEntity> = records
            .into_iter()
            .filter(|record| {
                let fresh = seen.insert(record.id.clone());
                if !fresh {
                    warn!(id = %record.id, "dropping duplicate score id from snapshot");
                }
                fresh
            })
            .collect();
        sort_by_recency(&mut records);
        Self { records }
    }

    /// Every record, newest first.
    pub fn records(&self) -> &[ScoreEntity] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ScoreEntity> {
        self.records.iter().find(|record| record.id == id)
    }

    /// Records of one partition, or all of them, newest first.
    pub fn filtered(&self, category: Option<Category>) -> impl Iterator<Item = &ScoreEntity> {
        self.records
            .iter()
            .filter(move |record| category.is_none_or(|wanted| record.category == wanted))
    }

    /// Page `[offset, offset + limit)` of the filtered ordering.
    ///
    /// The same snapshot always yields the same window.
    pub fn page(&self, category: Option<Category>, offset: usize, limit: usize) -> LedgerPage {
        let total = self.filtered(category).count();
        let items: Vec<ScoreEntity> = self
            .filtered(category)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        LedgerPage {
            has_previous: offset > 0 && total > 0,
            has_next: offset.saturating_add(limit) < total,
            items,
            offset,
            limit,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::dao::models::ItemType;

    fn record(id: &str, category: Category, at: u64) -> ScoreEntity {
        ScoreEntity {
            id: id.into(),
            student_name: format!("student-{id}"),
            item_name: "Quiz".into(),
            item_type: ItemType::Individual,
            group: "Nishan".into(),
            score: 1,
            category,
            timestamp: SystemTime::UNIX_EPOCH + Duration::from_secs(at),
        }
    }

    fn ids(items: &[ScoreEntity]) -> Vec<&str> {
        items.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn snapshot_is_ordered_newest_first_without_duplicates() {
        let ledger = ScoreLedger::from_snapshot(vec![
            record("a", Category::Arts, 1),
            record("b", Category::Arts, 3),
            record("a", Category::Arts, 9),
            record("c", Category::Sports, 2),
        ]);

        assert_eq!(ids(ledger.records()), vec!["b", "c", "a"]);
        assert_eq!(ledger.get("a").map(|r| r.timestamp), Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1)));
    }

    #[test]
    fn pages_walk_the_filtered_ordering() {
        let records = (0..25)
            .map(|i| record(&format!("s{i:02}"), Category::Arts, i))
            .chain(std::iter::once(record("sport", Category::Sports, 100)))
            .collect();
        let ledger = ScoreLedger::from_snapshot(records);

        let first = ledger.page(Some(Category::Arts), 0, 10);
        assert_eq!(first.total, 25);
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.items[0].id, "s24");
        assert!(!first.has_previous);
        assert!(first.has_next);

        let last = ledger.page(Some(Category::Arts), 20, 10);
        assert_eq!(ids(&last.items), vec!["s04", "s03", "s02", "s01", "s00"]);
        assert!(last.has_previous);
        assert!(!last.has_next);

        assert_eq!(ledger.page(Some(Category::Arts), 10, 10), ledger.page(Some(Category::Arts), 10, 10));
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let ledger = ScoreLedger::from_snapshot(vec![record("a", Category::Arts, 1)]);

        let page = ledger.page(None, 10, 10);
        assert!(page.items.is_empty());
        assert_eq!(page.total, 1);
        assert!(page.has_previous);
        assert!(!page.has_next);
    }
}
