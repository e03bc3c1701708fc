use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::CanonicalKey;

/// Reverse mapping from canonical keys to the last original word seen for them
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StemDictionary {
    pub words: HashMap<CanonicalKey, String>,
}

impl StemDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins
    pub fn insert(&mut self, key: CanonicalKey, word: impl Into<String>) {
        self.words.insert(key, word.into());
    }

    pub fn get(&self, key: &CanonicalKey) -> Option<&str> {
        self.words.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Every canonical key ever recorded for a list category, across all users
///
/// Kept sorted so the iteration order directly gives matrix column indices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UniqueItemRegistry {
    pub category: CanonicalKey,
    pub items: BTreeSet<CanonicalKey>,
}

impl UniqueItemRegistry {
    pub fn new(category: CanonicalKey) -> Self {
        Self {
            category,
            items: BTreeSet::new(),
        }
    }

    /// Adds keys; the registry only ever grows
    pub fn extend<'a, I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = &'a CanonicalKey>,
    {
        self.items.extend(keys.into_iter().cloned());
    }

    /// Items in column order
    pub fn sorted_items(&self) -> Vec<CanonicalKey> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
