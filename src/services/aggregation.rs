use std::sync::Arc;

use crate::{
    db::RecommendationStore,
    error::RecResult,
    models::{UserCategoryAggregate, UserCategoryWeights},
};

use super::canonicalizer::Canonicalizer;

/// Maintains raw counts, decayed weights and the unique-item registry
///
/// Each call is treated as one transaction at the API boundary, but the backing store
/// only guarantees atomicity per entity. A failure part way through leaves the earlier
/// writes in place (for example the aggregate without the matching weights update).
#[derive(Clone)]
pub struct AggregationService {
    store: Arc<dyn RecommendationStore>,
    canonicalizer: Canonicalizer,
}

impl AggregationService {
    pub fn new(store: Arc<dyn RecommendationStore>, canonicalizer: Canonicalizer) -> Self {
        Self {
            store,
            canonicalizer,
        }
    }

    /// Records items placed on a list
    ///
    /// `is_new_list` marks the first update of a fresh list instance. An empty item list
    /// is ignored entirely, including its list counter.
    #[tracing::instrument(skip(self, items), fields(items = items.len()))]
    pub async fn record_list_event(
        &self,
        user_id: &str,
        category: &str,
        items: &[String],
        is_new_list: bool,
    ) -> RecResult<()> {
        if items.is_empty() {
            tracing::debug!("Skipping list event with no items");
            return Ok(());
        }

        let category = self.canonicalizer.canonicalize(category);
        let keys = self.canonicalizer.remember_for_user(user_id, items).await?;

        let mut aggregate = self
            .store
            .load_aggregate(&category, user_id)
            .await?
            .unwrap_or_else(|| UserCategoryAggregate::new(user_id, category.clone()));
        aggregate.record(&keys, is_new_list);

        let weights = match self.store.load_weights(&category, user_id).await? {
            Some(mut weights) => {
                weights.apply_list(&keys, aggregate.list_instance_count, is_new_list);
                weights
            }
            None => UserCategoryWeights::from_first_event(
                user_id,
                category.clone(),
                &keys,
                aggregate.list_instance_count,
            ),
        };

        self.store.save_aggregate(&aggregate).await?;
        self.store.save_weights(&weights).await?;
        self.store.add_unique_items(&category, &keys).await?;

        tracing::info!(
            category = %category,
            list_instance_count = aggregate.list_instance_count,
            "Recorded list event"
        );
        Ok(())
    }

    /// Pushes item weights down without touching counts
    ///
    /// The penalty equals the increment the user's next positive update would get. A user
    /// with no row yet gets one created here, with a list count of zero.
    #[tracing::instrument(skip(self, items), fields(items = items.len()))]
    pub async fn record_negative_feedback(
        &self,
        user_id: &str,
        category: &str,
        items: &[String],
    ) -> RecResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let category = self.canonicalizer.canonicalize(category);
        let mut weights = self
            .store
            .load_weights(&category, user_id)
            .await?
            .unwrap_or_else(|| UserCategoryWeights::new(user_id, category.clone()));

        let keys = self.canonicalizer.remember_for_user(user_id, items).await?;
        weights.apply_penalty(&keys);

        self.store.save_weights(&weights).await?;
        self.store.add_unique_items(&category, &keys).await?;

        tracing::info!(category = %category, "Recorded negative feedback");
        Ok(())
    }
}
