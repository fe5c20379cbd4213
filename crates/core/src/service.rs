//! Recommender snapshot and the handle that owns the current one.
//!
//! A [`Recommender`] bundles one normalized catalog with the vector index
//! fitted over it and is never mutated after [`Recommender::build`]. The
//! serving layer owns a [`RecommenderHandle`]; queries clone the current
//! `Arc` and run without holding any lock, while [`RecommenderHandle::rebuild`]
//! fits a replacement off to the side and swaps the reference in one step.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{normalize, FieldSpec, ItemSummary, NormalizedTable, RawRow};
use crate::compose::{compose, Thresholds, WeightSpec};
use crate::errors::RecommendError;
use crate::index::{IndexConfig, VectorIndex};
use crate::matcher::{
    FeatureRangeMatcher, FeatureWeights, FeatureWindows, MatcherSettings, RangeQuery,
};
use crate::ranking::ScoredRow;
use crate::search::{self, BrowseMode, CatalogStats};
use crate::similarity;

/// Everything besides the rows that shapes a build.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineSettings {
    pub weights: WeightSpec,
    pub thresholds: Thresholds,
    pub index: IndexConfig,
    pub matcher: MatcherSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Recommendation {
    #[serde(flatten)]
    pub item: ItemSummary,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RangeRecommendations {
    pub recommendations: Vec<Recommendation>,
    pub widened: bool,
    pub applied_windows: FeatureWindows,
    pub keyword_filters_applied: Vec<String>,
    pub preference_applied: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BuildStats {
    pub raw_rows: usize,
    pub rows: usize,
    pub duplicates_dropped: usize,
    pub vocabulary_size: usize,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Recommender {
    table: NormalizedTable,
    index: VectorIndex,
    matcher: FeatureRangeMatcher,
    stats: BuildStats,
}

impl Recommender {
    pub fn build(
        rows: &[RawRow],
        spec: &FieldSpec,
        settings: &EngineSettings,
    ) -> Result<Self, RecommendError> {
        let table = normalize(rows, spec)?;
        let table = compose(table, &settings.weights, settings.thresholds);
        let index = VectorIndex::build(table.documents(), &settings.index)?;

        let stats = BuildStats {
            raw_rows: rows.len(),
            rows: table.len(),
            duplicates_dropped: table.duplicates_dropped(),
            vocabulary_size: index.vocabulary_size(),
            built_at: Utc::now(),
        };

        info!(
            event_name = "recommender.build.completed",
            rows = stats.rows,
            duplicates_dropped = stats.duplicates_dropped,
            vocabulary_size = stats.vocabulary_size,
            "recommender snapshot built"
        );

        Ok(Self { table, index, matcher: FeatureRangeMatcher::new(settings.matcher), stats })
    }

    pub fn table(&self) -> &NormalizedTable {
        &self.table
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn build_stats(&self) -> &BuildStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn recommend(&self, title: &str, k: usize) -> Result<Vec<Recommendation>, RecommendError> {
        let ranked = similarity::recommend(&self.index, &self.table, title, k)?;
        Ok(self.hydrate(ranked))
    }

    /// Feature-window retrieval; an empty list is a valid answer.
    pub fn match_by_feature_ranges(
        &self,
        windows: &FeatureWindows,
        weights: &FeatureWeights,
        k: usize,
    ) -> Vec<Recommendation> {
        self.match_ranges(&RangeQuery::new(windows.clone(), weights.clone(), k)).recommendations
    }

    pub fn match_ranges(&self, query: &RangeQuery) -> RangeRecommendations {
        let matched = self.matcher.match_ranges(&self.table, query);
        RangeRecommendations {
            recommendations: self.hydrate(matched.rows),
            widened: matched.widened,
            applied_windows: matched.applied_windows,
            keyword_filters_applied: matched.keyword_filters_applied,
            preference_applied: matched.preference_applied,
        }
    }

    pub fn search(&self, query: &str, limit: usize) -> Vec<ItemSummary> {
        self.summaries(search::search(&self.table, query, limit))
    }

    pub fn browse(
        &self,
        field: &str,
        value: &str,
        mode: BrowseMode,
        limit: usize,
    ) -> Result<Vec<ItemSummary>, RecommendError> {
        Ok(self.summaries(search::browse(&self.table, field, value, mode, limit)?))
    }

    pub fn stats(&self, count_field: Option<&str>) -> Result<CatalogStats, RecommendError> {
        search::stats(&self.table, &self.index, count_field)
    }

    fn hydrate(&self, ranked: Vec<ScoredRow>) -> Vec<Recommendation> {
        ranked
            .into_iter()
            .filter_map(|scored| {
                self.table.summary(scored.row).map(|item| Recommendation { item, score: scored.score })
            })
            .collect()
    }

    fn summaries(&self, rows: Vec<usize>) -> Vec<ItemSummary> {
        rows.into_iter().filter_map(|row| self.table.summary(row)).collect()
    }
}

/// Owner of the current snapshot.
#[derive(Debug)]
pub struct RecommenderHandle {
    current: RwLock<Arc<Recommender>>,
    settings: EngineSettings,
}

impl RecommenderHandle {
    pub fn new(recommender: Recommender, settings: EngineSettings) -> Self {
        Self { current: RwLock::new(Arc::new(recommender)), settings }
    }

    pub fn build(
        rows: &[RawRow],
        spec: &FieldSpec,
        settings: EngineSettings,
    ) -> Result<Self, RecommendError> {
        let recommender = Recommender::build(rows, spec, &settings)?;
        Ok(Self::new(recommender, settings))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The snapshot queries should run against. Later rebuilds do not affect it.
    pub fn snapshot(&self) -> Arc<Recommender> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the snapshot. On error the previous snapshot stays current.
    pub fn rebuild(&self, rows: &[RawRow], spec: &FieldSpec) -> Result<(), RecommendError> {
        let fresh = match Recommender::build(rows, spec, &self.settings) {
            Ok(fresh) => Arc::new(fresh),
            Err(error) => {
                warn!(
                    event_name = "recommender.rebuild.failed",
                    error_class = error.error_class(),
                    error = %error,
                    "rebuild failed; keeping previous snapshot"
                );
                return Err(error);
            }
        };

        let rows = fresh.len();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        info!(event_name = "recommender.rebuild.swapped", rows, "recommender snapshot swapped");
        Ok(())
    }

    pub fn recommend(&self, title: &str, k: usize) -> Result<Vec<Recommendation>, RecommendError> {
        self.snapshot().recommend(title, k)
    }

    pub fn match_by_feature_ranges(
        &self,
        windows: &FeatureWindows,
        weights: &FeatureWeights,
        k: usize,
    ) -> Vec<Recommendation> {
        self.snapshot().match_by_feature_ranges(windows, weights, k)
    }

    pub fn search(&self, query: &str, limit: usize) -> Vec<ItemSummary> {
        self.snapshot().search(query, limit)
    }
}
