use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ndarray::Array2;

use crate::{
    config::Config,
    db::RecommendationStore,
    error::{RecError, RecResult},
    models::{CanonicalKey, PredictionRow, Recommendation, UserCategoryWeights},
};

use super::{
    aggregation::AggregationService,
    canonicalizer::{Canonicalizer, Stemmer, Vocabulary},
    factorization::{cross_user_latent_features, MatrixFactorizer, RatingMatrix},
};

/// Tunables for the orchestrator, usually taken from [`Config`]
#[derive(Debug, Clone)]
pub struct RecommendationSettings {
    pub seed: u64,
    pub factorization_timeout: Option<Duration>,
    pub latent_features: usize,
    pub min_past_lists: i64,
    pub min_population: usize,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for RecommendationSettings {
    fn from(config: &Config) -> Self {
        Self {
            seed: config.factorization_seed,
            factorization_timeout: config.factorization_timeout(),
            latent_features: config.latent_features,
            min_past_lists: config.min_past_lists,
            min_population: config.min_population,
        }
    }
}

/// How many latent features a category factorization uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatentFeatures {
    /// `ceil(sqrt(min(users, items)))`
    CrossUser,
    /// The configured default
    Configured,
    Fixed(usize),
}

/// A factorized category: the input layout plus the dense reconstruction
#[derive(Debug, Clone)]
pub struct CategoryPredictions {
    pub category: CanonicalKey,
    pub matrix: RatingMatrix,
    pub predictions: Array2<f64>,
}

impl CategoryPredictions {
    pub fn row_for(&self, user_id: &str) -> Option<PredictionRow> {
        self.matrix.row_of(user_id).map(|row| {
            PredictionRow::new(
                user_id,
                self.category.clone(),
                self.matrix.scores_for_row(&self.predictions, row),
            )
        })
    }
}

/// Entry point for the conversational layer
///
/// Owns the canonicalizer and aggregation service over one shared store. Past
/// recommendations read decayed weights directly; cross-user recommendations factorize
/// every user's weights for the category.
#[derive(Clone)]
pub struct RecommendationService {
    store: Arc<dyn RecommendationStore>,
    canonicalizer: Canonicalizer,
    aggregation: AggregationService,
    settings: RecommendationSettings,
}

impl RecommendationService {
    pub fn new(
        store: Arc<dyn RecommendationStore>,
        stemmer: Arc<dyn Stemmer>,
        settings: RecommendationSettings,
    ) -> Self {
        let canonicalizer = Canonicalizer::new(stemmer, store.clone());
        let aggregation = AggregationService::new(store.clone(), canonicalizer.clone());
        Self {
            store,
            canonicalizer,
            aggregation,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecommendationStore> {
        &self.store
    }

    pub fn canonicalizer(&self) -> &Canonicalizer {
        &self.canonicalizer
    }

    pub fn settings(&self) -> &RecommendationSettings {
        &self.settings
    }

    /// Records a list update; no recommendations are computed here
    pub async fn record_event(
        &self,
        user_id: &str,
        category: &str,
        items: &[String],
        is_new_list: bool,
    ) -> RecResult<()> {
        self.aggregation
            .record_list_event(user_id, category, items, is_new_list)
            .await
    }

    pub async fn record_negative_feedback(
        &self,
        user_id: &str,
        category: &str,
        items: &[String],
    ) -> RecResult<()> {
        self.aggregation
            .record_negative_feedback(user_id, category, items)
            .await
    }

    /// The user's own decayed weights, highest first
    #[tracing::instrument(skip(self))]
    pub async fn get_past_recommendations(
        &self,
        user_id: &str,
        category: &str,
    ) -> RecResult<Vec<Recommendation>> {
        let category = self.canonicalizer.canonicalize(category);
        let weights = self.store.load_weights(&category, user_id).await?;
        let lists = weights.as_ref().map_or(0, |w| w.list_instance_count);

        if lists < self.settings.min_past_lists {
            return Err(RecError::InsufficientHistory {
                category: category.to_string(),
                lists,
                required: self.settings.min_past_lists,
            });
        }

        let weights = weights.map(|w| w.weights).unwrap_or_default();
        let vocabulary = self.canonicalizer.vocabulary(user_id).await?;
        rank(&weights, &vocabulary)
    }

    /// Factorizes the category and ranks the requester's reconstructed row
    ///
    /// The requester's prediction row is persisted before ranking.
    #[tracing::instrument(skip(self))]
    pub async fn get_cross_user_recommendations(
        &self,
        user_id: &str,
        category: &str,
    ) -> RecResult<Vec<Recommendation>> {
        let category = self.canonicalizer.canonicalize(category);
        let rows = self.load_population(&category).await?;

        if !rows.iter().any(|row| row.user_id == user_id) {
            return Err(RecError::InsufficientHistory {
                category: category.to_string(),
                lists: 0,
                required: 1,
            });
        }

        let computed = self
            .factorize_rows(&category, &rows, LatentFeatures::CrossUser)
            .await?;
        let row = computed.row_for(user_id).ok_or_else(|| {
            RecError::Internal(format!("user {} missing from factorized matrix", user_id))
        })?;
        self.store.save_predictions(&row).await?;

        let vocabulary = self.canonicalizer.vocabulary(user_id).await?;
        rank(&row.scores, &vocabulary)
    }

    /// Factorizes a category once and stores a prediction row for every user in it
    ///
    /// Returns the number of rows written.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_category_predictions(&self, category: &str) -> RecResult<usize> {
        let computed = self
            .factorize_category(category, LatentFeatures::CrossUser)
            .await?;

        for user_id in &computed.matrix.users {
            if let Some(row) = computed.row_for(user_id) {
                self.store.save_predictions(&row).await?;
            }
        }

        tracing::info!(
            category = %computed.category,
            users = computed.matrix.num_users(),
            items = computed.matrix.num_items(),
            "Refreshed category predictions"
        );
        Ok(computed.matrix.num_users())
    }

    /// Ranks the last persisted prediction row without recomputing it
    pub async fn get_stored_predictions(
        &self,
        user_id: &str,
        category: &str,
    ) -> RecResult<Vec<Recommendation>> {
        let category = self.canonicalizer.canonicalize(category);
        let row = self
            .store
            .load_predictions(&category, user_id)
            .await?
            .ok_or_else(|| RecError::InsufficientHistory {
                category: category.to_string(),
                lists: 0,
                required: 1,
            })?;

        let vocabulary = self.canonicalizer.vocabulary(user_id).await?;
        rank(&row.scores, &vocabulary)
    }

    /// Factorizes every user's weights for a category without persisting anything
    pub async fn factorize_category(
        &self,
        category: &str,
        latent_features: LatentFeatures,
    ) -> RecResult<CategoryPredictions> {
        let category = self.canonicalizer.canonicalize(category);
        let rows = self.load_population(&category).await?;
        self.factorize_rows(&category, &rows, latent_features).await
    }

    /// Rows of users who have recorded at least one list of the category
    ///
    /// Rows made only by negative feedback stay out of the matrix and the population count.
    async fn load_population(&self, category: &CanonicalKey) -> RecResult<Vec<UserCategoryWeights>> {
        let mut rows = self.store.load_category_weights(category).await?;
        rows.retain(|row| row.list_instance_count >= 1);
        if rows.len() < self.settings.min_population {
            return Err(RecError::InsufficientPopulation {
                category: category.to_string(),
                users: rows.len(),
                required: self.settings.min_population,
            });
        }
        Ok(rows)
    }

    async fn factorize_rows(
        &self,
        category: &CanonicalKey,
        rows: &[UserCategoryWeights],
        latent_features: LatentFeatures,
    ) -> RecResult<CategoryPredictions> {
        let registry = self.store.load_unique_items(category).await?;
        let matrix = RatingMatrix::build(rows, &registry.sorted_items());

        let k = match latent_features {
            LatentFeatures::CrossUser => {
                cross_user_latent_features(matrix.num_users(), matrix.num_items())
            }
            LatentFeatures::Configured => self.settings.latent_features,
            LatentFeatures::Fixed(k) => k,
        };
        if k == 0 {
            return Err(RecError::InvalidInput(format!(
                "category '{}' has no items to factorize",
                category
            )));
        }

        tracing::info!(
            category = %category,
            users = matrix.num_users(),
            items = matrix.num_items(),
            k,
            "Factorizing category"
        );
        let predictions = self.run_factorization(matrix.data.clone(), k).await?;

        Ok(CategoryPredictions {
            category: category.clone(),
            matrix,
            predictions,
        })
    }

    /// Runs the CPU-bound factorization on a blocking worker, under the configured timeout
    async fn run_factorization(&self, data: Array2<f64>, k: usize) -> RecResult<Array2<f64>> {
        let factorizer = MatrixFactorizer::new(k, self.settings.seed);
        let task = tokio::task::spawn_blocking(move || factorizer.factorize(&data));

        let joined = match self.settings.factorization_timeout {
            Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| {
                tracing::warn!(?limit, "Matrix factorization timed out");
                RecError::FactorizationTimeout(limit)
            })?,
            None => task.await,
        };

        joined.map_err(|e| RecError::Internal(format!("factorization task failed: {}", e)))?
    }
}

/// Sorts scores descending and renders each key in the user's own words
///
/// Equal scores fall back to key order so repeated calls agree.
pub fn rank(
    scores: &HashMap<CanonicalKey, f64>,
    vocabulary: &Vocabulary,
) -> RecResult<Vec<Recommendation>> {
    let mut entries: Vec<(&CanonicalKey, f64)> =
        scores.iter().map(|(key, score)| (key, *score)).collect();
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });

    entries
        .into_iter()
        .map(|(key, score)| {
            let word = vocabulary.resolve(key)?;
            Ok(Recommendation::new(key.clone(), word, score))
        })
        .collect()
}
