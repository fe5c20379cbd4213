//! Content-based song recommendation engine.
//!
//! Raw catalog rows are normalized against a [`FieldSpec`], composed into one
//! weighted text document per row, and fitted into a TF-IDF [`VectorIndex`].
//! Queries run against an immutable [`Recommender`] snapshot owned by a
//! [`RecommenderHandle`].

pub mod catalog;
pub mod compose;
pub mod config;
pub mod errors;
pub mod index;
pub mod matcher;
pub mod ranking;
pub mod search;
pub mod service;
pub mod similarity;

pub use catalog::{
    normalize, CatalogItem, CatalogPreset, FieldSpec, ItemSummary, NormalizedTable, NumericField,
    NumericRange, RawRow, TextField, TextKind,
};
pub use compose::{compose, FeatureComposer, Thresholds, WeightSpec};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use errors::RecommendError;
pub use index::{IndexConfig, SparseVector, StopWords, StopWordsMode, VectorIndex};
pub use matcher::{
    AttributePreference, FeatureRangeMatcher, FeatureWeights, FeatureWindow, FeatureWindows,
    KeywordFilter, MatcherSettings, RangeMatch, RangeQuery,
};
pub use ranking::ScoredRow;
pub use search::{BrowseMode, CatalogStats, ValueCount};
pub use service::{
    BuildStats, EngineSettings, RangeRecommendations, Recommendation, Recommender,
    RecommenderHandle,
};
