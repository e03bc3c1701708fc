//! Regularized matrix factorization over per-user item weights
//!
//! This is a sparse, observed-cells-only gradient descent (Funk style), not an SVD.
//! Cells whose magnitude is within [`OBSERVED_THRESHOLD`] of zero are treated as
//! unobserved: they never contribute error, and their reconstructed values are the
//! model's predictions.

use std::collections::HashMap;

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{
    error::{RecError, RecResult},
    models::{CanonicalKey, UserCategoryWeights},
};

/// Cells with `|value| <= OBSERVED_THRESHOLD` carry no data
pub const OBSERVED_THRESHOLD: f64 = 0.01;
/// Latent features used when k is not sized from the population
pub const DEFAULT_LATENT_FEATURES: usize = 2;

/// Whether a cell holds real data to fit against
///
/// Negative weights from feedback are data as long as they clear the threshold.
pub fn is_observed(value: f64) -> bool {
    value.abs() > OBSERVED_THRESHOLD
}

/// Latent feature count for a cross-user factorization: `ceil(sqrt(min(users, items)))`
pub fn cross_user_latent_features(num_users: usize, num_items: usize) -> usize {
    (num_users.min(num_items) as f64).sqrt().ceil() as usize
}

/// Dense user x item matrix with the ids behind each row and column
#[derive(Debug, Clone)]
pub struct RatingMatrix {
    pub data: Array2<f64>,
    /// Row index -> user id
    pub users: Vec<String>,
    /// Column index -> item key
    pub items: Vec<CanonicalKey>,
}

impl RatingMatrix {
    /// Lays out one row per weights entity and one column per item
    ///
    /// `items` must already be in column order. Missing weights become 0.0, i.e.
    /// unobserved. Weight keys that have no column are skipped.
    pub fn build(rows: &[UserCategoryWeights], items: &[CanonicalKey]) -> Self {
        let columns: HashMap<&CanonicalKey, usize> =
            items.iter().enumerate().map(|(i, key)| (key, i)).collect();
        let mut data = Array2::<f64>::zeros((rows.len(), items.len()));

        for (row, weights) in rows.iter().enumerate() {
            for (key, weight) in &weights.weights {
                match columns.get(key) {
                    Some(&col) => data[[row, col]] = *weight,
                    None => tracing::warn!(
                        user_id = %weights.user_id,
                        item = %key,
                        "Weight key missing from unique item registry, skipping"
                    ),
                }
            }
        }

        Self {
            data,
            users: rows.iter().map(|w| w.user_id.clone()).collect(),
            items: items.to_vec(),
        }
    }

    pub fn num_users(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_items(&self) -> usize {
        self.data.ncols()
    }

    pub fn row_of(&self, user_id: &str) -> Option<usize> {
        self.users.iter().position(|u| u == user_id)
    }

    /// Pairs one row of a same-shaped prediction matrix with the item keys
    pub fn scores_for_row(&self, predictions: &Array2<f64>, row: usize) -> HashMap<CanonicalKey, f64> {
        self.items
            .iter()
            .cloned()
            .zip(predictions.row(row).iter().copied())
            .collect()
    }
}

/// Learning schedule and stopping rules
#[derive(Debug, Clone)]
pub struct FactorizationParams {
    pub max_steps: usize,
    /// Step `s` uses `max(alpha_start / sqrt(s + 1), alpha_floor)`
    pub alpha_start: f64,
    pub alpha_floor: f64,
    /// L2 regularization strength (beta)
    pub regularization: f64,
    /// Stop once the regularized squared error falls below this
    pub convergence_threshold: f64,
    /// Features start uniform in `[-init_range, init_range]`
    pub init_range: f64,
}

impl Default for FactorizationParams {
    fn default() -> Self {
        Self {
            max_steps: 10_000,
            alpha_start: 0.1,
            alpha_floor: 0.005,
            regularization: 0.02,
            convergence_threshold: 0.001,
            init_range: 2.0,
        }
    }
}

impl FactorizationParams {
    fn learning_rate(&self, step: usize) -> f64 {
        (self.alpha_start / ((step + 1) as f64).sqrt()).max(self.alpha_floor)
    }
}

/// Seeded factorizer with a fixed number of latent features
#[derive(Debug, Clone)]
pub struct MatrixFactorizer {
    latent_features: usize,
    seed: u64,
    params: FactorizationParams,
}

impl MatrixFactorizer {
    pub fn new(latent_features: usize, seed: u64) -> Self {
        Self {
            latent_features,
            seed,
            params: FactorizationParams::default(),
        }
    }

    pub fn with_params(mut self, params: FactorizationParams) -> Self {
        self.params = params;
        self
    }

    pub fn latent_features(&self) -> usize {
        self.latent_features
    }

    /// Learns user and item features for `data` and returns their product
    ///
    /// Runs synchronously to completion; callers that serve requests should move it
    /// onto a blocking worker.
    pub fn factorize(&self, data: &Array2<f64>) -> RecResult<Array2<f64>> {
        let (user_features, item_features) = self.initial_features(data.nrows(), data.ncols());
        self.factorize_from(data, user_features, item_features)
    }

    /// Uniform random features drawn from a generator seeded with `self.seed`
    pub fn initial_features(&self, num_users: usize, num_items: usize) -> (Array2<f64>, Array2<f64>) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let range = self.params.init_range;
        let user_features =
            Array2::from_shape_fn((num_users, self.latent_features), |_| {
                rng.gen_range(-range..=range)
            });
        let item_features =
            Array2::from_shape_fn((self.latent_features, num_items), |_| {
                rng.gen_range(-range..=range)
            });
        (user_features, item_features)
    }

    /// Gradient descent from caller-supplied starting features
    ///
    /// `user_features` is `users x k`, `item_features` is `k x items`.
    pub fn factorize_from(
        &self,
        data: &Array2<f64>,
        mut user_features: Array2<f64>,
        mut item_features: Array2<f64>,
    ) -> RecResult<Array2<f64>> {
        let k = self.latent_features;
        if user_features.dim() != (data.nrows(), k) || item_features.dim() != (k, data.ncols()) {
            return Err(RecError::InvalidInput(format!(
                "feature shapes {:?} and {:?} do not fit a {:?} matrix with k = {}",
                user_features.dim(),
                item_features.dim(),
                data.dim(),
                k
            )));
        }

        let beta = self.params.regularization;
        tracing::debug!(
            users = data.nrows(),
            items = data.ncols(),
            k,
            "Starting matrix factorization"
        );

        for step in 0..self.params.max_steps {
            let alpha = self.params.learning_rate(step);

            for ((u, i), &value) in data.indexed_iter() {
                if !is_observed(value) {
                    continue;
                }
                let error = value - user_features.row(u).dot(&item_features.column(i));
                for j in 0..k {
                    // Both updates read the values from before this cell's update
                    let user_value = user_features[[u, j]];
                    let item_value = item_features[[j, i]];
                    user_features[[u, j]] =
                        user_value + alpha * (2.0 * error * item_value - beta * user_value);
                    item_features[[j, i]] =
                        item_value + alpha * (2.0 * error * user_value - beta * item_value);
                }
            }

            let estimate = user_features.dot(&item_features);
            if estimate.iter().any(|v| !v.is_finite()) {
                tracing::error!(step, "Matrix factorization produced non-finite values");
                return Err(RecError::NumericDivergence { step });
            }

            let total_error = self.total_error(data, &estimate, &user_features, &item_features);
            if total_error < self.params.convergence_threshold {
                tracing::info!(step, total_error, "Matrix factorization converged");
                return Ok(estimate);
            }
        }

        tracing::debug!(
            steps = self.params.max_steps,
            "Matrix factorization finished without early stop"
        );
        Ok(user_features.dot(&item_features))
    }

    /// Squared error over observed cells plus the L2 penalty of the features they touch
    fn total_error(
        &self,
        data: &Array2<f64>,
        estimate: &Array2<f64>,
        user_features: &Array2<f64>,
        item_features: &Array2<f64>,
    ) -> f64 {
        let half_beta = self.params.regularization / 2.0;
        let mut total = 0.0;
        for ((u, i), &value) in data.indexed_iter() {
            if !is_observed(value) {
                continue;
            }
            total += (value - estimate[[u, i]]).powi(2);
            for j in 0..self.latent_features {
                total += half_beta * (user_features[[u, j]].powi(2) + item_features[[j, i]].powi(2));
            }
        }
        total
    }
}
