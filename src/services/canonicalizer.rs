use std::sync::Arc;

use rust_stemmers::{Algorithm, Stemmer as SnowballAlgorithm};

use crate::{
    db::RecommendationStore,
    error::{RecError, RecResult},
    models::{CanonicalKey, DictionaryScope, StemDictionary},
};

/// Reduces a word to its stem
///
/// Implementations must be deterministic for a given input; nothing else is assumed.
#[cfg_attr(test, mockall::automock)]
pub trait Stemmer: Send + Sync {
    fn stem(&self, word: &str) -> String;
}

/// Snowball English stemmer, the production default
pub struct SnowballStemmer {
    algorithm: SnowballAlgorithm,
}

impl Default for SnowballStemmer {
    fn default() -> Self {
        Self {
            algorithm: SnowballAlgorithm::create(Algorithm::English),
        }
    }
}

impl Stemmer for SnowballStemmer {
    fn stem(&self, word: &str) -> String {
        self.algorithm.stem(&word.to_lowercase()).into_owned()
    }
}

/// Adapts a plain function into a [`Stemmer`]
pub struct StemFn<F>(pub F);

impl<F> Stemmer for StemFn<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn stem(&self, word: &str) -> String {
        (self.0)(word)
    }
}

/// Maps free-text item names to canonical keys and back
///
/// Reverse lookups go through the user's own dictionary first and fall back to the
/// universal one, which every user writes to. Both dictionaries live in the injected
/// store; there is no hidden global state.
#[derive(Clone)]
pub struct Canonicalizer {
    stemmer: Arc<dyn Stemmer>,
    store: Arc<dyn RecommendationStore>,
}

impl Canonicalizer {
    pub fn new(stemmer: Arc<dyn Stemmer>, store: Arc<dyn RecommendationStore>) -> Self {
        Self { stemmer, store }
    }

    /// Stems, lower-cases and strips whitespace
    pub fn canonicalize(&self, word: &str) -> CanonicalKey {
        CanonicalKey::from_stem(&self.stemmer.stem(word))
    }

    pub fn canonicalize_all(&self, words: &[String]) -> Vec<CanonicalKey> {
        words.iter().map(|word| self.canonicalize(word)).collect()
    }

    /// Records `canonicalize(word) -> word` in one dictionary
    pub async fn remember(&self, scope: &DictionaryScope, word: &str) -> RecResult<CanonicalKey> {
        let mut keys = self.remember_all(scope, &[word.to_string()]).await?;
        keys.pop()
            .ok_or_else(|| RecError::Internal("remember produced no key".to_string()))
    }

    /// Records every word in one dictionary with a single store write
    ///
    /// When a batch repeats a key, the later word wins.
    pub async fn remember_all(
        &self,
        scope: &DictionaryScope,
        words: &[String],
    ) -> RecResult<Vec<CanonicalKey>> {
        let entries: Vec<(CanonicalKey, String)> = words
            .iter()
            .map(|word| (self.canonicalize(word), word.clone()))
            .collect();
        self.store.remember_words(scope, &entries).await?;
        Ok(entries.into_iter().map(|(key, _)| key).collect())
    }

    /// Records words in both the user's dictionary and the universal one
    pub async fn remember_for_user(
        &self,
        user_id: &str,
        words: &[String],
    ) -> RecResult<Vec<CanonicalKey>> {
        let keys = self
            .remember_all(&DictionaryScope::User(user_id.to_string()), words)
            .await?;
        self.remember_all(&DictionaryScope::Universal, words).await?;
        Ok(keys)
    }

    /// Original word for a key, as this user would write it
    pub async fn resolve(&self, user_id: &str, key: &CanonicalKey) -> RecResult<String> {
        self.vocabulary(user_id).await?.resolve(key)
    }

    /// Loads both dictionaries once for resolving many keys
    pub async fn vocabulary(&self, user_id: &str) -> RecResult<Vocabulary> {
        let user = self
            .store
            .load_dictionary(&DictionaryScope::User(user_id.to_string()))
            .await?;
        let universal = self.store.load_dictionary(&DictionaryScope::Universal).await?;
        Ok(Vocabulary { user, universal })
    }
}

/// A snapshot of one user's dictionary plus the universal fallback
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    user: StemDictionary,
    universal: StemDictionary,
}

impl Vocabulary {
    pub fn resolve(&self, key: &CanonicalKey) -> RecResult<String> {
        self.user
            .get(key)
            .or_else(|| self.universal.get(key))
            .map(str::to_string)
            .ok_or_else(|| RecError::UnknownCanonicalKey(key.to_string()))
    }
}
