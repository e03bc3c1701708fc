use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::CanonicalKey;

/// Factorization output for one user, replaced wholesale on every recomputation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionRow {
    pub user_id: String,
    pub category: CanonicalKey,
    pub scores: HashMap<CanonicalKey, f64>,
    pub computed_at: DateTime<Utc>,
}

impl PredictionRow {
    pub fn new(
        user_id: impl Into<String>,
        category: CanonicalKey,
        scores: HashMap<CanonicalKey, f64>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            category,
            scores,
            computed_at: Utc::now(),
        }
    }
}
