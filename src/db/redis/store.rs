use std::collections::HashMap;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use redis::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::{RecommendationStore, StoreKey};
use crate::error::RecResult;
use crate::models::{
    CanonicalKey, DictionaryScope, PredictionRow, StemDictionary, UniqueItemRegistry,
    UserCategoryAggregate, UserCategoryWeights,
};

/// Opens a Redis client; the connection itself is made by [`RedisStore::new`]
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Redis-backed keyspace store
///
/// Entities are JSON strings, stem dictionaries are hashes, and the per-category user
/// index and unique-item registry are sets, so concurrent writers to different users
/// never clobber each other's registry or dictionary entries.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    namespace: String,
}

impl RedisStore {
    /// Connects a store whose keys are all prefixed with `namespace`
    pub async fn new(redis_client: Client, namespace: impl Into<String>) -> RecResult<Self> {
        let conn = ConnectionManager::new(redis_client).await?;
        Ok(Self {
            conn,
            namespace: namespace.into(),
        })
    }

    fn key(&self, key: &StoreKey) -> String {
        format!("{}:{}", self.namespace, key)
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &StoreKey) -> RecResult<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.key(key)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize>(&self, key: &StoreKey, value: &T) -> RecResult<()> {
        let json = serde_json::to_string(value)?;
        let mut conn = self.conn.clone();
        let _: () = conn.set(self.key(key), json).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecommendationStore for RedisStore {
    #[tracing::instrument(skip_all, fields(scope = %scope, entries = entries.len()))]
    async fn remember_words(
        &self,
        scope: &DictionaryScope,
        entries: &[(CanonicalKey, String)],
    ) -> RecResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let fields: Vec<(String, String)> = entries
            .iter()
            .map(|(key, word)| (key.to_string(), word.clone()))
            .collect();
        let mut conn = self.conn.clone();
        let _: () = conn
            .hset_multiple(
                self.key(&StoreKey::StemDictionary(scope.clone())),
                fields.as_slice(),
            )
            .await?;
        Ok(())
    }

    async fn load_dictionary(&self, scope: &DictionaryScope) -> RecResult<StemDictionary> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn
            .hgetall(self.key(&StoreKey::StemDictionary(scope.clone())))
            .await?;
        let mut dictionary = StemDictionary::new();
        for (key, word) in raw {
            dictionary.insert(CanonicalKey::from_stem(&key), word);
        }
        Ok(dictionary)
    }

    async fn load_aggregate(
        &self,
        category: &CanonicalKey,
        user_id: &str,
    ) -> RecResult<Option<UserCategoryAggregate>> {
        self.get_json(&StoreKey::Aggregate(category.clone(), user_id.to_string()))
            .await
    }

    async fn save_aggregate(&self, aggregate: &UserCategoryAggregate) -> RecResult<()> {
        let key = StoreKey::Aggregate(aggregate.category.clone(), aggregate.user_id.clone());
        self.set_json(&key, aggregate).await
    }

    async fn load_weights(
        &self,
        category: &CanonicalKey,
        user_id: &str,
    ) -> RecResult<Option<UserCategoryWeights>> {
        self.get_json(&StoreKey::Weights(category.clone(), user_id.to_string()))
            .await
    }

    #[tracing::instrument(skip_all, fields(user_id = %weights.user_id, category = %weights.category))]
    async fn save_weights(&self, weights: &UserCategoryWeights) -> RecResult<()> {
        let json = serde_json::to_string(weights)?;
        let entity_key = self.key(&StoreKey::Weights(
            weights.category.clone(),
            weights.user_id.clone(),
        ));
        let users_key = self.key(&StoreKey::CategoryUsers(weights.category.clone()));

        // The entity and its index entry go in together
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .set(entity_key, json)
            .ignore()
            .sadd(users_key, &weights.user_id)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(category = %category))]
    async fn load_category_weights(
        &self,
        category: &CanonicalKey,
    ) -> RecResult<Vec<UserCategoryWeights>> {
        let mut conn = self.conn.clone();
        let mut user_ids: Vec<String> = conn
            .smembers(self.key(&StoreKey::CategoryUsers(category.clone())))
            .await?;
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        user_ids.sort();

        let keys: Vec<String> = user_ids
            .iter()
            .map(|user_id| self.key(&StoreKey::Weights(category.clone(), user_id.clone())))
            .collect();
        let raw: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let mut rows = Vec::with_capacity(raw.len());
        for (user_id, json) in user_ids.iter().zip(raw) {
            match json {
                Some(json) => rows.push(serde_json::from_str(&json)?),
                None => {
                    tracing::warn!(user_id = %user_id, "Indexed user has no weights entity");
                }
            }
        }
        Ok(rows)
    }

    async fn load_unique_items(&self, category: &CanonicalKey) -> RecResult<UniqueItemRegistry> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn
            .smembers(self.key(&StoreKey::UniqueItems(category.clone())))
            .await?;
        let keys: Vec<CanonicalKey> = members
            .iter()
            .map(|member| CanonicalKey::from_stem(member))
            .collect();
        let mut registry = UniqueItemRegistry::new(category.clone());
        registry.extend(&keys);
        Ok(registry)
    }

    async fn add_unique_items(
        &self,
        category: &CanonicalKey,
        items: &[CanonicalKey],
    ) -> RecResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let members: Vec<String> = items.iter().map(|item| item.to_string()).collect();
        let mut conn = self.conn.clone();
        let _: () = conn
            .sadd(self.key(&StoreKey::UniqueItems(category.clone())), members)
            .await?;
        Ok(())
    }

    async fn load_predictions(
        &self,
        category: &CanonicalKey,
        user_id: &str,
    ) -> RecResult<Option<PredictionRow>> {
        self.get_json(&StoreKey::Predictions(category.clone(), user_id.to_string()))
            .await
    }

    async fn save_predictions(&self, row: &PredictionRow) -> RecResult<()> {
        let key = StoreKey::Predictions(row.category.clone(), row.user_id.clone());
        self.set_json(&key, row).await
    }
}

// These tests need a live Redis server; run with `cargo test -- --ignored`.

#[cfg(test)]
mod tests {
    use super::*;

    async fn connect(namespace: &str) -> RedisStore {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let client = create_redis_client(&redis_url).unwrap();
        RedisStore::new(client, namespace).await.unwrap()
    }

    async fn clean_up(store: &RedisStore, keys: &[StoreKey]) {
        let mut conn = store.conn.clone();
        for key in keys {
            let _: () = conn.del(store.key(key)).await.unwrap();
        }
    }

    fn key(s: &str) -> CanonicalKey {
        CanonicalKey::from_stem(s)
    }

    #[tokio::test]
    #[ignore]
    async fn test_weights_round_trip_through_category_index() {
        let store = connect("listrec-test-weights").await;
        let category = key("groceri");

        let mut first = UserCategoryWeights::new("2", category.clone());
        first.apply_list(&[key("appl")], 1, true);
        let second = UserCategoryWeights::new("1", category.clone());

        store.save_weights(&first).await.unwrap();
        store.save_weights(&second).await.unwrap();

        let rows = store.load_category_weights(&category).await.unwrap();
        let users: Vec<&str> = rows.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(users, vec!["1", "2"]);
        assert_eq!(rows[1].weight(&key("appl")), 1.0);

        clean_up(
            &store,
            &[
                StoreKey::Weights(category.clone(), "1".to_string()),
                StoreKey::Weights(category.clone(), "2".to_string()),
                StoreKey::CategoryUsers(category),
            ],
        )
        .await;
    }

    #[tokio::test]
    #[ignore]
    async fn test_dictionary_hash_overwrites_per_key() {
        let store = connect("listrec-test-dict").await;
        let scope = DictionaryScope::Universal;
        let berry = key("berri");

        store
            .remember_words(&scope, &[(berry.clone(), "berries".to_string())])
            .await
            .unwrap();
        store
            .remember_words(&scope, &[(berry.clone(), "berry".to_string())])
            .await
            .unwrap();

        let dictionary = store.load_dictionary(&scope).await.unwrap();
        assert_eq!(dictionary.get(&berry), Some("berry"));

        clean_up(&store, &[StoreKey::StemDictionary(scope)]).await;
    }

    #[tokio::test]
    #[ignore]
    async fn test_unique_items_accumulate() {
        let store = connect("listrec-test-unique").await;
        let category = key("shop");

        store
            .add_unique_items(&category, &[key("book"), key("chocol")])
            .await
            .unwrap();
        store
            .add_unique_items(&category, &[key("book")])
            .await
            .unwrap();

        let registry = store.load_unique_items(&category).await.unwrap();
        assert_eq!(registry.sorted_items(), vec![key("book"), key("chocol")]);

        clean_up(&store, &[StoreKey::UniqueItems(category)]).await;
    }
}
