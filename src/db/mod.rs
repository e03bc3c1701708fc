//! Persistence for aggregates, dictionaries and predictions
//!
//! The engine only depends on the [`RecommendationStore`] trait. Every method is an
//! atomic operation on a single logical entity; nothing spans entities, so a failure
//! between two calls loses at most the later write.

use std::fmt::Display;

use crate::{
    error::RecResult,
    models::{
        CanonicalKey, DictionaryScope, PredictionRow, StemDictionary, UniqueItemRegistry,
        UserCategoryAggregate, UserCategoryWeights,
    },
};

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::{create_redis_client, RedisStore};

/// Logical keyspaces addressed by `(category, user_id)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    StemDictionary(DictionaryScope),
    Aggregate(CanonicalKey, String),
    Weights(CanonicalKey, String),
    CategoryUsers(CanonicalKey),
    UniqueItems(CanonicalKey),
    Predictions(CanonicalKey, String),
}

impl Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKey::StemDictionary(scope) => write!(f, "stemdict:{}", scope),
            StoreKey::Aggregate(category, user_id) => write!(f, "agg:{}:{}", category, user_id),
            StoreKey::Weights(category, user_id) => write!(f, "frac:{}:{}", category, user_id),
            StoreKey::CategoryUsers(category) => write!(f, "frac-users:{}", category),
            StoreKey::UniqueItems(category) => write!(f, "unique:{}", category),
            StoreKey::Predictions(category, user_id) => {
                write!(f, "pred:{}:{}", category, user_id)
            }
        }
    }
}

/// Storage backend for the recommendation engine
#[async_trait::async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Records key -> original word pairs, overwriting earlier words for the same key
    async fn remember_words(
        &self,
        scope: &DictionaryScope,
        entries: &[(CanonicalKey, String)],
    ) -> RecResult<()>;

    /// Loads a stem dictionary; a scope that was never written is empty
    async fn load_dictionary(&self, scope: &DictionaryScope) -> RecResult<StemDictionary>;

    async fn load_aggregate(
        &self,
        category: &CanonicalKey,
        user_id: &str,
    ) -> RecResult<Option<UserCategoryAggregate>>;

    async fn save_aggregate(&self, aggregate: &UserCategoryAggregate) -> RecResult<()>;

    async fn load_weights(
        &self,
        category: &CanonicalKey,
        user_id: &str,
    ) -> RecResult<Option<UserCategoryWeights>>;

    async fn save_weights(&self, weights: &UserCategoryWeights) -> RecResult<()>;

    /// All users' weights for a category, ordered by user id
    async fn load_category_weights(
        &self,
        category: &CanonicalKey,
    ) -> RecResult<Vec<UserCategoryWeights>>;

    /// The category's registry; empty if nothing was recorded yet
    async fn load_unique_items(&self, category: &CanonicalKey) -> RecResult<UniqueItemRegistry>;

    /// Merges keys into the category's registry
    async fn add_unique_items(&self, category: &CanonicalKey, items: &[CanonicalKey])
        -> RecResult<()>;

    async fn load_predictions(
        &self,
        category: &CanonicalKey,
        user_id: &str,
    ) -> RecResult<Option<PredictionRow>>;

    /// Replaces the user's stored prediction row
    async fn save_predictions(&self, row: &PredictionRow) -> RecResult<()>;
}
