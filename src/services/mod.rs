pub mod aggregation;
pub mod canonicalizer;
pub mod factorization;
pub mod fixtures;
pub mod recommendations;
pub mod suggestions;

pub use aggregation::AggregationService;
pub use canonicalizer::{Canonicalizer, SnowballStemmer, StemFn, Stemmer, Vocabulary};
pub use factorization::{MatrixFactorizer, RatingMatrix};
pub use recommendations::{
    CategoryPredictions, LatentFeatures, RecommendationService, RecommendationSettings,
};
pub use suggestions::{join_phrase, SuggestionFilter};
