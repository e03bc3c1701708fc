use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::CanonicalKey;

/// Multiplier applied to every historical weight when a user starts a new list
pub const DECAY_FACTOR: f64 = 0.6;
/// Weight added per occurrence while the user is on their first list of a category
pub const FIRST_LIST_INCREMENT: f64 = 1.0;
/// Weight added per occurrence on every later list
pub const REPEAT_LIST_INCREMENT: f64 = 0.4;

/// Lifetime item counts for one user and one list category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserCategoryAggregate {
    pub user_id: String,
    pub category: CanonicalKey,
    /// Number of times each item was ever placed on a list, never decayed
    pub raw_counts: HashMap<CanonicalKey, i64>,
    /// Number of distinct lists of this category the user has started
    pub list_instance_count: i64,
    pub last_updated: DateTime<Utc>,
}

impl UserCategoryAggregate {
    /// Creates an empty aggregate
    pub fn new(user_id: impl Into<String>, category: CanonicalKey) -> Self {
        Self {
            user_id: user_id.into(),
            category,
            raw_counts: HashMap::new(),
            list_instance_count: 0,
            last_updated: Utc::now(),
        }
    }

    /// Counts every item once per occurrence and bumps the list counter for new lists
    pub fn record(&mut self, items: &[CanonicalKey], is_new_list: bool) {
        for item in items {
            *self.raw_counts.entry(item.clone()).or_insert(0) += 1;
        }
        if is_new_list {
            self.list_instance_count += 1;
        }
        self.last_updated = Utc::now();
    }

    pub fn count(&self, item: &CanonicalKey) -> i64 {
        self.raw_counts.get(item).copied().unwrap_or(0)
    }
}

/// Decayed, signed item weights for one user and one list category
///
/// Weights are the fractional companion of [`UserCategoryAggregate`]: they fade by
/// [`DECAY_FACTOR`] each time a new list is started, and negative feedback may push them
/// below zero. Negative values mean active dislike and are kept as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserCategoryWeights {
    pub user_id: String,
    pub category: CanonicalKey,
    pub weights: HashMap<CanonicalKey, f64>,
    /// Mirrors the aggregate's list counter
    pub list_instance_count: i64,
    pub last_updated: DateTime<Utc>,
}

impl UserCategoryWeights {
    /// Creates an empty weight map
    pub fn new(user_id: impl Into<String>, category: CanonicalKey) -> Self {
        Self {
            user_id: user_id.into(),
            category,
            weights: HashMap::new(),
            list_instance_count: 0,
            last_updated: Utc::now(),
        }
    }

    /// Weights for a user's first event in a category
    ///
    /// Every item starts at [`FIRST_LIST_INCREMENT`], even when the event is an update to a
    /// list that was never marked new.
    pub fn from_first_event(
        user_id: impl Into<String>,
        category: CanonicalKey,
        items: &[CanonicalKey],
        list_instance_count: i64,
    ) -> Self {
        let mut weights = Self::new(user_id, category);
        weights.list_instance_count = list_instance_count;
        weights.add_to_each(items, FIRST_LIST_INCREMENT);
        weights
    }

    /// Increment for the current list, keyed purely off the list counter
    pub fn increment_value(&self) -> f64 {
        if self.list_instance_count == 1 {
            FIRST_LIST_INCREMENT
        } else {
            REPEAT_LIST_INCREMENT
        }
    }

    /// Scales every stored weight, touched or not
    pub fn decay(&mut self, factor: f64) {
        for weight in self.weights.values_mut() {
            *weight *= factor;
        }
    }

    /// Applies one list event after the aggregate has been updated
    ///
    /// A new list decays the full map before the counter mirror is refreshed and any
    /// increment is added.
    pub fn apply_list(&mut self, items: &[CanonicalKey], list_instance_count: i64, is_new_list: bool) {
        if is_new_list {
            self.decay(DECAY_FACTOR);
        }
        self.list_instance_count = list_instance_count;
        let increment = self.increment_value();
        self.add_to_each(items, increment);
    }

    /// Subtracts the current increment from each item without touching the list counter
    pub fn apply_penalty(&mut self, items: &[CanonicalKey]) {
        let penalty = -self.increment_value();
        self.add_to_each(items, penalty);
    }

    fn add_to_each(&mut self, items: &[CanonicalKey], delta: f64) {
        for item in items {
            *self.weights.entry(item.clone()).or_insert(0.0) += delta;
        }
        self.last_updated = Utc::now();
    }

    pub fn weight(&self, item: &CanonicalKey) -> f64 {
        self.weights.get(item).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> CanonicalKey {
        CanonicalKey::from_stem(s)
    }

    fn weights_after_first_list(items: &[&str]) -> UserCategoryWeights {
        let mut weights = UserCategoryWeights::new("1", key("groceri"));
        let items: Vec<CanonicalKey> = items.iter().map(|s| key(s)).collect();
        weights.apply_list(&items, 1, true);
        weights
    }

    #[test]
    fn test_aggregate_counts_every_occurrence() {
        let mut aggregate = UserCategoryAggregate::new("1", key("groceri"));
        aggregate.record(&[key("appl"), key("appl"), key("banana")], true);
        aggregate.record(&[key("appl")], false);

        assert_eq!(aggregate.count(&key("appl")), 3);
        assert_eq!(aggregate.count(&key("banana")), 1);
        assert_eq!(aggregate.count(&key("carrot")), 0);
        assert_eq!(aggregate.list_instance_count, 1);
    }

    #[test]
    fn test_first_list_increment_is_one() {
        let weights = weights_after_first_list(&["appl"]);
        assert_eq!(weights.weight(&key("appl")), 1.0);
    }

    #[test]
    fn test_update_on_first_list_keeps_full_increment() {
        let mut weights = weights_after_first_list(&["appl"]);
        weights.apply_list(&[key("appl")], 1, false);
        assert_eq!(weights.weight(&key("appl")), 2.0);
    }

    #[test]
    fn test_new_list_decays_untouched_items() {
        let mut weights = weights_after_first_list(&["appl", "banana"]);
        weights.apply_list(&[key("banana")], 2, true);

        assert!((weights.weight(&key("appl")) - 0.6).abs() < 1e-9);
        assert!((weights.weight(&key("banana")) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_penalty_can_go_negative() {
        let mut weights = weights_after_first_list(&["appl"]);
        weights.apply_list(&[key("appl")], 2, true);
        weights.apply_penalty(&[key("carrot"), key("appl")]);

        assert!((weights.weight(&key("carrot")) + 0.4).abs() < 1e-9);
        assert!((weights.weight(&key("appl")) - 0.6).abs() < 1e-9);
        assert_eq!(weights.list_instance_count, 2);
    }

    #[test]
    fn test_first_event_starts_at_full_increment() {
        let weights =
            UserCategoryWeights::from_first_event("1", key("groceri"), &[key("appl"), key("appl")], 0);
        assert_eq!(weights.weight(&key("appl")), 2.0);
        assert_eq!(weights.list_instance_count, 0);
    }

    #[test]
    fn test_penalty_on_first_list_uses_first_increment() {
        let mut weights = weights_after_first_list(&["appl"]);
        weights.apply_penalty(&[key("appl")]);
        assert_eq!(weights.weight(&key("appl")), 0.0);
    }
}
