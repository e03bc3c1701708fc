use serde::{Deserialize, Serialize};
use std::fmt::Display;

mod aggregate;
mod dictionary;
mod prediction;

pub use aggregate::{
    UserCategoryAggregate, UserCategoryWeights, DECAY_FACTOR, FIRST_LIST_INCREMENT,
    REPEAT_LIST_INCREMENT,
};
pub use dictionary::{StemDictionary, UniqueItemRegistry};
pub use prediction::PredictionRow;

/// Normalized item or category name produced by the stemmer
///
/// Lower-cased with all whitespace removed. This is the only key used for aggregate maps
/// and matrix columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    /// Normalizes raw stemmer output into a key
    pub fn from_stem(stem: &str) -> Self {
        let normalized: String = stem
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CanonicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CanonicalKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Which stem dictionary a remembered word goes into
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictionaryScope {
    /// Words as a specific user typed them
    User(String),
    /// Process-wide fallback shared by all users
    Universal,
}

impl Display for DictionaryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DictionaryScope::User(user_id) => write!(f, "user:{}", user_id),
            DictionaryScope::Universal => write!(f, "universal"),
        }
    }
}

/// One ranked suggestion rendered back to the user's own wording
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub key: CanonicalKey,
    pub item: String,
    pub score: f64,
}

impl Recommendation {
    pub fn new(key: CanonicalKey, item: impl Into<String>, score: f64) -> Self {
        Self {
            key,
            item: item.into(),
            score,
        }
    }
}
