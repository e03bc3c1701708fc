use std::path::Path;
use std::sync::Arc;

use listrec::{
    config::{Config, StoreBackend},
    db::{create_redis_client, MemoryStore, RecommendationStore, RedisStore},
    services::{fixtures, RecommendationService, RecommendationSettings, SnowballStemmer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("listrec=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // Build the configured store
    let store: Arc<dyn RecommendationStore> = match config.store_backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Redis => {
            let client = create_redis_client(&config.redis_url)?;
            Arc::new(RedisStore::new(client, config.redis_namespace.clone()).await?)
        }
    };
    tracing::info!(backend = ?config.store_backend, "Store ready");

    let service = RecommendationService::new(
        store,
        Arc::new(SnowballStemmer::default()),
        RecommendationSettings::from(&config),
    );

    match &config.seed_file {
        Some(path) => {
            let summary = fixtures::seed_from_file(&service, Path::new(path)).await?;
            tracing::info!(
                records = summary.records,
                categories = summary.categories,
                refreshed = summary.refreshed,
                "Seeding complete"
            );
        }
        None => tracing::info!("No SEED_FILE set, nothing to load"),
    }

    Ok(())
}
