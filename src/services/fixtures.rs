//! JSON-lines fixture loading for demo and test databases
//!
//! One record per line, tagged by `kind`. Lines that are blank or start with `#` are
//! skipped. Item names are written as users would type them and canonicalized on load,
//! so the stem dictionaries are filled in along the way.
//!
//! ```text
//! # user 1 has three grocery lists
//! {"kind":"weights","user_id":"1","category":"grocery","list_instance_count":3,"weights":{"apples":1.6}}
//! {"kind":"aggregate","user_id":"1","category":"grocery","list_instance_count":3,"raw_counts":{"apples":3}}
//! {"kind":"unique_items","category":"grocery","items":["kale"]}
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::{
    error::{RecError, RecResult},
    models::{CanonicalKey, DictionaryScope, UserCategoryAggregate, UserCategoryWeights},
};

use super::recommendations::RecommendationService;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixtureRecord {
    Aggregate {
        user_id: String,
        category: String,
        list_instance_count: i64,
        raw_counts: HashMap<String, i64>,
    },
    Weights {
        user_id: String,
        category: String,
        list_instance_count: i64,
        weights: HashMap<String, f64>,
    },
    UniqueItems {
        category: String,
        items: Vec<String>,
    },
}

impl FixtureRecord {
    fn category(&self) -> &str {
        match self {
            FixtureRecord::Aggregate { category, .. }
            | FixtureRecord::Weights { category, .. }
            | FixtureRecord::UniqueItems { category, .. } => category,
        }
    }
}

/// What a seeding run wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub records: usize,
    pub categories: usize,
    /// Categories whose predictions were refreshed successfully
    pub refreshed: usize,
}

pub fn parse_fixtures(content: &str) -> RecResult<Vec<FixtureRecord>> {
    let mut records = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|e| {
            RecError::InvalidInput(format!("fixture line {}: {}", index + 1, e))
        })?;
        records.push(record);
    }
    Ok(records)
}

pub async fn seed_from_file(service: &RecommendationService, path: &Path) -> RecResult<SeedSummary> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        RecError::InvalidInput(format!("cannot read fixture file {}: {}", path.display(), e))
    })?;
    tracing::info!(path = %path.display(), "Loading fixtures");
    seed_from_str(service, &content).await
}

/// Loads fixture records and then refreshes predictions for every seeded category
///
/// Refuses to run when the first record's entity already exists, so a seeded store is
/// never seeded twice. Refresh failures the caller could degrade from (too few users,
/// divergence) are logged and skipped.
pub async fn seed_from_str(service: &RecommendationService, content: &str) -> RecResult<SeedSummary> {
    let records = parse_fixtures(content)?;
    let Some(first) = records.first() else {
        return Ok(SeedSummary::default());
    };
    if already_present(service, first).await? {
        return Err(RecError::InvalidInput(
            "store already holds fixture data, refusing to seed".to_string(),
        ));
    }

    // canonical category -> name as written in the fixture
    let mut categories: BTreeMap<CanonicalKey, String> = BTreeMap::new();
    for record in &records {
        let category = service.canonicalizer().canonicalize(record.category());
        categories
            .entry(category)
            .or_insert_with(|| record.category().to_string());
        apply(service, record).await?;
    }

    let mut refreshed = 0;
    for (category, name) in &categories {
        match service.refresh_category_predictions(name).await {
            Ok(_) => refreshed += 1,
            Err(err) if err.is_recoverable() => {
                tracing::warn!(category = %category, error = %err, "Skipping prediction refresh");
            }
            Err(err) => return Err(err),
        }
    }

    let summary = SeedSummary {
        records: records.len(),
        categories: categories.len(),
        refreshed,
    };
    tracing::info!(
        records = summary.records,
        categories = summary.categories,
        refreshed = summary.refreshed,
        "Fixtures loaded"
    );
    Ok(summary)
}

async fn already_present(service: &RecommendationService, record: &FixtureRecord) -> RecResult<bool> {
    let store = service.store();
    let category = service.canonicalizer().canonicalize(record.category());
    Ok(match record {
        FixtureRecord::Aggregate { user_id, .. } => {
            store.load_aggregate(&category, user_id).await?.is_some()
        }
        FixtureRecord::Weights { user_id, .. } => {
            store.load_weights(&category, user_id).await?.is_some()
        }
        FixtureRecord::UniqueItems { .. } => !store.load_unique_items(&category).await?.is_empty(),
    })
}

async fn apply(service: &RecommendationService, record: &FixtureRecord) -> RecResult<()> {
    let store = service.store();
    let canonicalizer = service.canonicalizer();
    let category = canonicalizer.canonicalize(record.category());

    match record {
        FixtureRecord::Aggregate {
            user_id,
            list_instance_count,
            raw_counts,
            ..
        } => {
            let words: Vec<String> = raw_counts.keys().cloned().collect();
            let keys = canonicalizer.remember_for_user(user_id, &words).await?;

            let mut aggregate = UserCategoryAggregate::new(user_id.as_str(), category.clone());
            aggregate.list_instance_count = *list_instance_count;
            for (key, word) in keys.iter().zip(&words) {
                *aggregate.raw_counts.entry(key.clone()).or_insert(0) += raw_counts[word];
            }
            store.save_aggregate(&aggregate).await?;
            store.add_unique_items(&category, &keys).await?;
        }
        FixtureRecord::Weights {
            user_id,
            list_instance_count,
            weights,
            ..
        } => {
            let words: Vec<String> = weights.keys().cloned().collect();
            let keys = canonicalizer.remember_for_user(user_id, &words).await?;

            let mut entity = UserCategoryWeights::new(user_id.as_str(), category.clone());
            entity.list_instance_count = *list_instance_count;
            for (key, word) in keys.iter().zip(&words) {
                *entity.weights.entry(key.clone()).or_insert(0.0) += weights[word];
            }
            store.save_weights(&entity).await?;
            store.add_unique_items(&category, &keys).await?;
        }
        FixtureRecord::UniqueItems { items, .. } => {
            let keys = canonicalizer
                .remember_all(&DictionaryScope::Universal, items)
                .await?;
            store.add_unique_items(&category, &keys).await?;
        }
    }
    Ok(())
}
