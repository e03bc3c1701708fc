use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    error::RecResult,
    models::{
        CanonicalKey, DictionaryScope, PredictionRow, StemDictionary, UniqueItemRegistry,
        UserCategoryAggregate, UserCategoryWeights,
    },
};

use super::RecommendationStore;

type EntityKey = (CanonicalKey, String);

/// Process-local store
///
/// Each logical table has its own lock. Weights are kept in a `BTreeMap` ordered by
/// `(category, user_id)` so a category scan comes out sorted by user.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryTables>,
}

#[derive(Default)]
struct MemoryTables {
    dictionaries: RwLock<HashMap<DictionaryScope, StemDictionary>>,
    aggregates: RwLock<HashMap<EntityKey, UserCategoryAggregate>>,
    weights: RwLock<BTreeMap<EntityKey, UserCategoryWeights>>,
    unique_items: RwLock<HashMap<CanonicalKey, UniqueItemRegistry>>,
    predictions: RwLock<HashMap<EntityKey, PredictionRow>>,
}

impl MemoryStore {
    /// Creates a new empty store
    pub fn new() -> Self {
        Self::default()
    }
}

fn entity_key(category: &CanonicalKey, user_id: &str) -> EntityKey {
    (category.clone(), user_id.to_string())
}

#[async_trait::async_trait]
impl RecommendationStore for MemoryStore {
    async fn remember_words(
        &self,
        scope: &DictionaryScope,
        entries: &[(CanonicalKey, String)],
    ) -> RecResult<()> {
        let mut dictionaries = self.inner.dictionaries.write().await;
        let dictionary = dictionaries.entry(scope.clone()).or_default();
        for (key, word) in entries {
            dictionary.insert(key.clone(), word.clone());
        }
        Ok(())
    }

    async fn load_dictionary(&self, scope: &DictionaryScope) -> RecResult<StemDictionary> {
        let dictionaries = self.inner.dictionaries.read().await;
        Ok(dictionaries.get(scope).cloned().unwrap_or_default())
    }

    async fn load_aggregate(
        &self,
        category: &CanonicalKey,
        user_id: &str,
    ) -> RecResult<Option<UserCategoryAggregate>> {
        let aggregates = self.inner.aggregates.read().await;
        Ok(aggregates.get(&entity_key(category, user_id)).cloned())
    }

    async fn save_aggregate(&self, aggregate: &UserCategoryAggregate) -> RecResult<()> {
        let mut aggregates = self.inner.aggregates.write().await;
        aggregates.insert(
            entity_key(&aggregate.category, &aggregate.user_id),
            aggregate.clone(),
        );
        Ok(())
    }

    async fn load_weights(
        &self,
        category: &CanonicalKey,
        user_id: &str,
    ) -> RecResult<Option<UserCategoryWeights>> {
        let weights = self.inner.weights.read().await;
        Ok(weights.get(&entity_key(category, user_id)).cloned())
    }

    async fn save_weights(&self, weights: &UserCategoryWeights) -> RecResult<()> {
        let mut table = self.inner.weights.write().await;
        table.insert(
            entity_key(&weights.category, &weights.user_id),
            weights.clone(),
        );
        Ok(())
    }

    async fn load_category_weights(
        &self,
        category: &CanonicalKey,
    ) -> RecResult<Vec<UserCategoryWeights>> {
        let table = self.inner.weights.read().await;
        let rows = table
            .range((category.clone(), String::new())..)
            .take_while(|((row_category, _), _)| row_category == category)
            .map(|(_, weights)| weights.clone())
            .collect();
        Ok(rows)
    }

    async fn load_unique_items(&self, category: &CanonicalKey) -> RecResult<UniqueItemRegistry> {
        let registries = self.inner.unique_items.read().await;
        Ok(registries
            .get(category)
            .cloned()
            .unwrap_or_else(|| UniqueItemRegistry::new(category.clone())))
    }

    async fn add_unique_items(
        &self,
        category: &CanonicalKey,
        items: &[CanonicalKey],
    ) -> RecResult<()> {
        let mut registries = self.inner.unique_items.write().await;
        registries
            .entry(category.clone())
            .or_insert_with(|| UniqueItemRegistry::new(category.clone()))
            .extend(items);
        Ok(())
    }

    async fn load_predictions(
        &self,
        category: &CanonicalKey,
        user_id: &str,
    ) -> RecResult<Option<PredictionRow>> {
        let predictions = self.inner.predictions.read().await;
        Ok(predictions.get(&entity_key(category, user_id)).cloned())
    }

    async fn save_predictions(&self, row: &PredictionRow) -> RecResult<()> {
        let mut predictions = self.inner.predictions.write().await;
        predictions.insert(entity_key(&row.category, &row.user_id), row.clone());
        Ok(())
    }
}
