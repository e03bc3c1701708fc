use std::time::Duration;

/// Recommendation engine errors
#[derive(thiserror::Error, Debug)]
pub enum RecError {
    #[error("Insufficient history: {lists} past list(s) of '{category}', need {required}")]
    InsufficientHistory {
        category: String,
        lists: i64,
        required: i64,
    },

    #[error("Insufficient population: {users} user(s) share '{category}', need {required}")]
    InsufficientPopulation {
        category: String,
        users: usize,
        required: usize,
    },

    #[error("No original word remembered for canonical key '{0}'")]
    UnknownCanonicalKey(String),

    #[error("No suggestions scored above {threshold}")]
    NoSuggestions { threshold: f64 },

    #[error("Matrix factorization diverged at step {step}")]
    NumericDivergence { step: usize },

    #[error("Matrix factorization did not finish within {0:?}")]
    FactorizationTimeout(Duration),

    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RecError {
    /// Whether the calling agent can degrade gracefully (usually by offering no suggestions).
    ///
    /// `UnknownCanonicalKey` means a resolve happened without a matching remember, which is a
    /// bug in the call sequence rather than a data condition.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RecError::UnknownCanonicalKey(_) | RecError::Internal(_))
    }
}

pub type RecResult<T> = Result<T, RecError>;
