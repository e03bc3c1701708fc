use std::time::Duration;

use serde::Deserialize;

/// Which persistence backend holds the aggregates
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Persistence backend for aggregates and predictions
    #[serde(default = "default_store_backend")]
    pub store_backend: StoreBackend,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Prefix for every Redis key written by the store
    #[serde(default = "default_redis_namespace")]
    pub redis_namespace: String,

    /// Seed for the factorization's random feature initialization
    #[serde(default = "default_factorization_seed")]
    pub factorization_seed: u64,

    /// Wall-clock limit for one factorization run, 0 disables it
    #[serde(default = "default_factorization_timeout_secs")]
    pub factorization_timeout_secs: u64,

    /// Latent features for factorizations that do not size k from the population
    #[serde(default = "default_latent_features")]
    pub latent_features: usize,

    /// Lists a user must have started before past recommendations are offered
    #[serde(default = "default_min_past_lists")]
    pub min_past_lists: i64,

    /// Users that must share a category before cross-user recommendations are offered
    #[serde(default = "default_min_population")]
    pub min_population: usize,

    /// Optional JSON-lines fixture file loaded at startup
    #[serde(default)]
    pub seed_file: Option<String>,
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Memory
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_namespace() -> String {
    "listrec".to_string()
}

fn default_factorization_seed() -> u64 {
    1
}

fn default_factorization_timeout_secs() -> u64 {
    30
}

fn default_latent_features() -> usize {
    2
}

fn default_min_past_lists() -> i64 {
    3
}

fn default_min_population() -> usize {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_backend: default_store_backend(),
            redis_url: default_redis_url(),
            redis_namespace: default_redis_namespace(),
            factorization_seed: default_factorization_seed(),
            factorization_timeout_secs: default_factorization_timeout_secs(),
            latent_features: default_latent_features(),
            min_past_lists: default_min_past_lists(),
            min_population: default_min_population(),
            seed_file: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from an explicit set of variables
    pub fn from_vars<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Config>(vars)
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.latent_features == 0 {
            anyhow::bail!("LATENT_FEATURES must be at least 1");
        }
        if self.min_population == 0 {
            anyhow::bail!("MIN_POPULATION must be at least 1");
        }
        Ok(())
    }

    /// Timeout applied around each factorization run
    pub fn factorization_timeout(&self) -> Option<Duration> {
        match self.factorization_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = Config::from_vars(Vec::new()).unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.redis_url, "redis://localhost:6379");
        assert_eq!(config.factorization_seed, 1);
        assert_eq!(config.latent_features, 2);
        assert_eq!(config.min_past_lists, 3);
        assert_eq!(config.min_population, 4);
        assert_eq!(config.factorization_timeout(), Some(Duration::from_secs(30)));
        assert!(config.seed_file.is_none());
    }

    #[test]
    fn test_overrides_from_vars() {
        let config = Config::from_vars(vars(&[
            ("STORE_BACKEND", "redis"),
            ("FACTORIZATION_SEED", "42"),
            ("FACTORIZATION_TIMEOUT_SECS", "0"),
            ("SEED_FILE", "fixtures/groceri.jsonl"),
        ]))
        .unwrap();
        assert_eq!(config.store_backend, StoreBackend::Redis);
        assert_eq!(config.factorization_seed, 42);
        assert_eq!(config.factorization_timeout(), None);
        assert_eq!(config.seed_file.as_deref(), Some("fixtures/groceri.jsonl"));
    }

    #[test]
    fn test_rejects_zero_latent_features() {
        let result = Config::from_vars(vars(&[("LATENT_FEATURES", "0")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let result = Config::from_vars(vars(&[("STORE_BACKEND", "postgres")]));
        assert!(result.is_err());
    }
}
