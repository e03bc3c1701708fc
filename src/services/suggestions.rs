use std::collections::HashSet;

use crate::{
    error::{RecError, RecResult},
    models::{CanonicalKey, Recommendation},
};

/// Past recommendations must score strictly above this to be offered
pub const PAST_SUGGESTION_THRESHOLD: f64 = 0.49;
/// Cross-user recommendations must score strictly above this to be offered
pub const CROSS_USER_SUGGESTION_THRESHOLD: f64 = 0.4;
pub const MAX_SUGGESTIONS: usize = 3;

/// Picks the few ranked items worth saying out loud
#[derive(Debug, Clone)]
pub struct SuggestionFilter {
    threshold: f64,
    limit: usize,
    exclude: HashSet<CanonicalKey>,
}

impl SuggestionFilter {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            limit: MAX_SUGGESTIONS,
            exclude: HashSet::new(),
        }
    }

    pub fn past() -> Self {
        Self::new(PAST_SUGGESTION_THRESHOLD)
    }

    /// Cross-user filter that skips whatever is already on the current list
    pub fn cross_user<'a, I>(current_items: I) -> Self
    where
        I: IntoIterator<Item = &'a CanonicalKey>,
    {
        Self::new(CROSS_USER_SUGGESTION_THRESHOLD).excluding(current_items)
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn excluding<'a, I>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = &'a CanonicalKey>,
    {
        self.exclude.extend(keys.into_iter().cloned());
        self
    }

    /// Keeps ranking order; fails when nothing survives the filter
    pub fn select<'a>(&self, ranked: &'a [Recommendation]) -> RecResult<Vec<&'a Recommendation>> {
        let selected: Vec<&Recommendation> = ranked
            .iter()
            .filter(|r| r.score > self.threshold && !self.exclude.contains(&r.key))
            .take(self.limit)
            .collect();

        if selected.is_empty() {
            return Err(RecError::NoSuggestions {
                threshold: self.threshold,
            });
        }
        Ok(selected)
    }

    /// Selects and renders in one go
    pub fn phrase(&self, ranked: &[Recommendation]) -> RecResult<String> {
        let selected = self.select(ranked)?;
        let words: Vec<&str> = selected.iter().map(|r| r.item.as_str()).collect();
        Ok(join_phrase(&words))
    }
}

/// `a`, `a and b`, `a, b, and c`
pub fn join_phrase(words: &[&str]) -> String {
    match words {
        [] => String::new(),
        [only] => only.to_string(),
        [first, second] => format!("{} and {}", first, second),
        [init @ .., last] => format!("{}, and {}", init.join(", "), last),
    }
}
