use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};

/// Category a price level was derived from.
///
/// Carries an explicit display priority so weekly references sort ahead of
/// everything else without string matching on level names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelCategory {
    Weekly,
    WeeklyPivot,
    Daily,
    DailyPivot,
    AsianSession,
}

impl LevelCategory {
    /// Lower sorts first in notifications and touched-level lists
    pub fn priority(&self) -> u8 {
        match self {
            LevelCategory::Weekly => 0,
            LevelCategory::WeeklyPivot => 1,
            LevelCategory::Daily => 2,
            LevelCategory::DailyPivot => 3,
            LevelCategory::AsianSession => 4,
        }
    }
}

/// A named reference price tagged with its origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub name: String,
    pub value: f64,
    pub category: LevelCategory,
    /// Calendar date of the refresh cycle that produced this level
    pub valid_date: NaiveDate,
}

/// Merged view of all level categories for one symbol.
///
/// A category is replaced wholesale on refresh; a missing category simply
/// contributes no keys. Null placeholder values never appear.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelSet {
    levels: BTreeMap<String, PriceLevel>,
}

impl LevelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, level: PriceLevel) {
        self.levels.insert(level.name.clone(), level);
    }

    pub fn extend<I: IntoIterator<Item = PriceLevel>>(&mut self, levels: I) {
        for level in levels {
            self.insert(level);
        }
    }

    pub fn get(&self, name: &str) -> Option<&PriceLevel> {
        self.levels.get(name)
    }

    pub fn values(&self) -> btree_map::Values<'_, String, PriceLevel> {
        self.levels.values()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl<'a> IntoIterator for &'a LevelSet {
    type Item = &'a PriceLevel;
    type IntoIter = btree_map::Values<'a, String, PriceLevel>;

    fn into_iter(self) -> Self::IntoIter {
        self.levels.values()
    }
}
