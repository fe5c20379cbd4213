//! Feature-range retrieval: filter rows by numeric windows derived from an
//! external signal (weather, mood), narrow them by soft keyword filters on
//! text fields, then rank by closeness to each window's midpoint blended with
//! a popularity prior.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::{NormalizedTable, NumericRange};
use crate::ranking::{top_k, ScoredRow};

pub const DEFAULT_WIDEN_MARGIN: f64 = 0.2;
pub const DEFAULT_MATCH_WEIGHT: f64 = 0.7;
pub const DEFAULT_POPULARITY_WEIGHT: f64 = 0.3;
const POPULARITY_SCALE: f64 = 100.0;

/// Inclusive `[min, max]` window on one numeric feature.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureWindow {
    pub min: f64,
    pub max: f64,
}

impl FeatureWindow {
    /// Swapped bounds are reordered.
    pub fn new(min: f64, max: f64) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn widened(&self, margin: f64, range: NumericRange) -> Self {
        let (min, max) = (self.min - margin, self.max + margin);
        match range {
            NumericRange::Unit => Self { min: min.max(0.0), max: max.min(1.0) },
            NumericRange::Unbounded => Self { min, max },
        }
    }

    /// Shifts both bounds, clamping unit-bounded windows back into `[0, 1]`.
    pub fn shifted(&self, delta: f64, range: NumericRange) -> Self {
        let shifted = Self::new(self.min + delta, self.max + delta);
        match range {
            NumericRange::Unit => {
                Self::new(shifted.min.clamp(0.0, 1.0), shifted.max.clamp(0.0, 1.0))
            }
            NumericRange::Unbounded => shifted,
        }
    }
}

pub type FeatureWindows = BTreeMap<String, FeatureWindow>;
pub type FeatureWeights = BTreeMap<String, f64>;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatcherSettings {
    pub widen_margin: f64,
    pub match_weight: f64,
    pub popularity_weight: f64,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            widen_margin: DEFAULT_WIDEN_MARGIN,
            match_weight: DEFAULT_MATCH_WEIGHT,
            popularity_weight: DEFAULT_POPULARITY_WEIGHT,
        }
    }
}

/// Soft filter on a text field, kept only when enough rows survive it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributePreference {
    pub field: String,
    pub value: String,
}

/// Keeps rows whose `field` contains any keyword. Skipped when it would leave
/// no rows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordFilter {
    pub field: String,
    pub keywords: Vec<String>,
}

impl KeywordFilter {
    /// Keywords are trimmed and lower-cased; blanks and repeats are dropped.
    pub fn new<I, S>(field: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for keyword in keywords {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if !keyword.is_empty() && !normalized.contains(&keyword) {
                normalized.push(keyword);
            }
        }
        Self { field: field.into(), keywords: normalized }
    }

    fn accepts(&self, value: &str) -> bool {
        let value = value.to_lowercase();
        self.keywords.iter().any(|keyword| value.contains(keyword.as_str()))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RangeQuery {
    pub windows: FeatureWindows,
    pub weights: FeatureWeights,
    pub k: usize,
    /// Applied in order after the window filter.
    pub keyword_filters: Vec<KeywordFilter>,
    pub preference: Option<AttributePreference>,
}

impl RangeQuery {
    pub fn new(windows: FeatureWindows, weights: FeatureWeights, k: usize) -> Self {
        Self { windows, weights, k, keyword_filters: Vec::new(), preference: None }
    }

    pub fn with_keywords(mut self, filter: KeywordFilter) -> Self {
        self.keyword_filters.push(filter);
        self
    }

    pub fn with_preference(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.preference = Some(AttributePreference { field: field.into(), value: value.into() });
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RangeMatch {
    #[serde(skip)]
    pub rows: Vec<ScoredRow>,
    /// Whether the fallback widening pass produced the candidate set.
    pub widened: bool,
    /// Windows the final filter used, keyed by declared feature name.
    pub applied_windows: FeatureWindows,
    /// Fields whose keyword filter narrowed the candidates.
    pub keyword_filters_applied: Vec<String>,
    pub preference_applied: bool,
}

struct ActiveWindow {
    name: String,
    column: usize,
    range: NumericRange,
    requested: FeatureWindow,
    weight: f64,
}

#[derive(Clone, Debug, Default)]
pub struct FeatureRangeMatcher {
    settings: MatcherSettings,
}

impl FeatureRangeMatcher {
    pub fn new(settings: MatcherSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MatcherSettings {
        &self.settings
    }

    pub fn match_ranges(&self, table: &NormalizedTable, query: &RangeQuery) -> RangeMatch {
        let active = self.active_windows(table, query);

        let requested: Vec<FeatureWindow> = active.iter().map(|window| window.requested).collect();
        let mut candidates = filter_rows(table, &active, &requested);
        let mut applied = requested;
        let mut widened = false;

        if candidates.is_empty() && !active.is_empty() {
            applied = active
                .iter()
                .map(|window| window.requested.widened(self.settings.widen_margin, window.range))
                .collect();
            candidates = filter_rows(table, &active, &applied);
            widened = true;
        }

        let mut keyword_filters_applied = Vec::new();
        for filter in &query.keyword_filters {
            let Some(column) = table.present_text_index(&filter.field) else {
                debug!(
                    event_name = "matcher.keywords.skipped",
                    field = %filter.field,
                    "keyword filter names a field the catalog does not carry"
                );
                continue;
            };
            let kept: Vec<usize> = candidates
                .iter()
                .copied()
                .filter(|row| text_value(table, *row, column).is_some_and(|v| filter.accepts(v)))
                .collect();
            if !kept.is_empty() {
                candidates = kept;
                keyword_filters_applied.push(table.spec().text_fields[column].name.clone());
            }
        }

        let mut preference_applied = false;
        if let Some(preference) = &query.preference {
            match table.present_text_index(&preference.field) {
                Some(column) => {
                    let wanted = preference.value.trim().to_lowercase();
                    let preferred: Vec<usize> = candidates
                        .iter()
                        .copied()
                        .filter(|row| {
                            text_value(table, *row, column)
                                .is_some_and(|value| value.to_lowercase() == wanted)
                        })
                        .collect();
                    if preferred.len() >= query.k && !preferred.is_empty() {
                        candidates = preferred;
                        preference_applied = true;
                    }
                }
                None => warn!(
                    event_name = "matcher.preference.ignored",
                    field = %preference.field,
                    "preference names a field the catalog does not carry"
                ),
            }
        }

        let scored = candidates
            .into_iter()
            .map(|row| ScoredRow::new(row, self.combined_score(table, &active, row)))
            .collect();
        let rows = top_k(scored, query.k);

        debug!(
            event_name = "matcher.match_ranges",
            windows = active.len(),
            widened,
            keyword_filters = keyword_filters_applied.len(),
            preference_applied,
            returned = rows.len(),
            "feature-range query served"
        );

        RangeMatch {
            rows,
            widened,
            applied_windows: active
                .iter()
                .zip(applied)
                .map(|(window, applied)| (window.name.clone(), applied))
                .collect(),
            keyword_filters_applied,
            preference_applied,
        }
    }

    fn active_windows(&self, table: &NormalizedTable, query: &RangeQuery) -> Vec<ActiveWindow> {
        let mut active: Vec<ActiveWindow> = Vec::with_capacity(query.windows.len());
        for (name, window) in &query.windows {
            let Some(column) = table.present_numeric_index(name) else {
                warn!(
                    event_name = "matcher.window.ignored",
                    feature = %name,
                    "window names a feature the catalog does not carry"
                );
                continue;
            };
            let weight = query
                .weights
                .iter()
                .find(|(weight_name, _)| weight_name.eq_ignore_ascii_case(name))
                .map(|(_, weight)| weight.max(0.0))
                .filter(|weight| weight.is_finite())
                .unwrap_or(0.0);
            let field = &table.spec().numeric_fields[column];
            active.push(ActiveWindow {
                name: field.name.clone(),
                column,
                range: field.range,
                requested: FeatureWindow::new(window.min, window.max),
                weight,
            });
        }

        let total: f64 = active.iter().map(|window| window.weight).sum();
        let count = active.len() as f64;
        for window in &mut active {
            window.weight = if total > 0.0 { window.weight / total } else { 1.0 / count };
        }
        active
    }

    fn combined_score(&self, table: &NormalizedTable, active: &[ActiveWindow], row: usize) -> f64 {
        let match_score: f64 = active
            .iter()
            .map(|window| {
                let value = table.numeric(row, window.column).unwrap_or(0.0);
                window.weight * (1.0 - (value - window.requested.midpoint()).abs())
            })
            .sum();
        self.settings.match_weight * match_score
            + self.settings.popularity_weight * table.popularity(row) / POPULARITY_SCALE
    }
}

fn text_value(table: &NormalizedTable, row: usize, column: usize) -> Option<&str> {
    table.item(row).and_then(|item| item.text.get(column)).map(String::as_str)
}

fn filter_rows(
    table: &NormalizedTable,
    active: &[ActiveWindow],
    windows: &[FeatureWindow],
) -> Vec<usize> {
    (0..table.len())
        .filter(|row| {
            active.iter().zip(windows).all(|(window, bounds)| {
                table.numeric(*row, window.column).is_some_and(|value| bounds.contains(value))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        FeatureRangeMatcher, FeatureWeights, FeatureWindow, FeatureWindows, KeywordFilter,
        MatcherSettings, RangeQuery,
    };
    use crate::catalog::{normalize, FieldSpec, NormalizedTable, NumericRange, RawRow, TextKind};

    fn table(values: serde_json::Value) -> NormalizedTable {
        let rows: Vec<RawRow> = values
            .as_array()
            .map(|items| items.iter().filter_map(|item| item.as_object().cloned()).collect())
            .unwrap_or_default();
        let spec = FieldSpec::new("song", "singer")
            .with_text("language", TextKind::Categorical)
            .with_unit_feature("energy", None)
            .with_unit_feature("valence", None)
            .with_popularity("popularity");
        normalize(&rows, &spec).expect("normalize")
    }

    fn windows(entries: &[(&str, f64, f64)]) -> FeatureWindows {
        entries
            .iter()
            .map(|(name, min, max)| ((*name).to_owned(), FeatureWindow::new(*min, *max)))
            .collect()
    }

    fn weights(entries: &[(&str, f64)]) -> FeatureWeights {
        entries.iter().map(|(name, weight)| ((*name).to_owned(), *weight)).collect()
    }

    fn calm_catalog() -> NormalizedTable {
        table(json!([
            {"song": "Low", "singer": "A", "energy": 0.1, "popularity": 10},
            {"song": "Mid", "singer": "B", "energy": 0.45, "popularity": 50},
            {"song": "Upper", "singer": "C", "energy": 0.55, "popularity": 0}
        ]))
    }

    #[test]
    fn empty_primary_filter_widens_once() {
        let table = calm_catalog();
        let query =
            RangeQuery::new(windows(&[("energy", 0.6, 1.0)]), weights(&[("energy", 1.0)]), 5);
        let result = FeatureRangeMatcher::default().match_ranges(&table, &query);

        assert!(result.widened);
        let applied = result.applied_windows["energy"];
        assert!((applied.min - 0.4).abs() < 1e-9);
        assert!((applied.max - 1.0).abs() < 1e-9);
        let rows: Vec<usize> = result.rows.iter().map(|row| row.row).collect();
        // Scored against the requested midpoint 0.8: Upper 0.525, Mid 0.605.
        assert_eq!(rows, vec![1, 2]);
        assert!((result.rows[0].score - 0.605).abs() < 1e-9);
    }

    #[test]
    fn empty_after_widening_is_an_empty_list() {
        let table = calm_catalog();
        let query =
            RangeQuery::new(windows(&[("energy", 0.9, 1.0)]), weights(&[("energy", 1.0)]), 5);
        let result = FeatureRangeMatcher::default().match_ranges(&table, &query);
        assert!(result.widened);
        assert!(result.rows.is_empty());
    }

    #[test]
    fn weights_are_normalized_and_default_to_equal() {
        let table = table(json!([
            {"song": "S", "singer": "A", "energy": 0.5, "valence": 1.0}
        ]));
        let ranges = windows(&[("energy", 0.0, 1.0), ("valence", 0.0, 1.0)]);
        let settings =
            MatcherSettings { match_weight: 1.0, popularity_weight: 0.0, ..MatcherSettings::default() };
        let matcher = FeatureRangeMatcher::new(settings);

        let equal = matcher.match_ranges(&table, &RangeQuery::new(ranges.clone(), weights(&[]), 1));
        assert!((equal.rows[0].score - 0.75).abs() < 1e-9);

        let skewed = matcher.match_ranges(
            &table,
            &RangeQuery::new(ranges, weights(&[("energy", 3.0), ("valence", 1.0)]), 1),
        );
        assert!((skewed.rows[0].score - 0.875).abs() < 1e-9);
    }

    #[test]
    fn unknown_features_are_ignored() {
        let table = calm_catalog();
        let query = RangeQuery::new(
            windows(&[("tempo", 100.0, 120.0), ("energy", 0.0, 0.2)]),
            weights(&[("tempo", 1.0), ("energy", 1.0)]),
            5,
        );
        let result = FeatureRangeMatcher::default().match_ranges(&table, &query);
        assert!(!result.widened);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].row, 0);
        assert!(!result.applied_windows.contains_key("tempo"));
    }

    #[test]
    fn preference_applies_only_when_it_keeps_k_rows() {
        let table = table(json!([
            {"song": "One", "singer": "A", "language": "Hindi", "energy": 0.8, "popularity": 90},
            {"song": "Two", "singer": "B", "language": "Tamil", "energy": 0.8, "popularity": 10},
            {"song": "Three", "singer": "C", "language": "Tamil", "energy": 0.8, "popularity": 20}
        ]));
        let ranges = windows(&[("energy", 0.6, 1.0)]);

        let kept = FeatureRangeMatcher::default().match_ranges(
            &table,
            &RangeQuery::new(ranges.clone(), weights(&[]), 2).with_preference("language", "tamil"),
        );
        assert!(kept.preference_applied);
        let rows: Vec<usize> = kept.rows.iter().map(|row| row.row).collect();
        assert_eq!(rows, vec![2, 1]);

        let skipped = FeatureRangeMatcher::default().match_ranges(
            &table,
            &RangeQuery::new(ranges, weights(&[]), 2).with_preference("language", "Hindi"),
        );
        assert!(!skipped.preference_applied);
        assert_eq!(skipped.rows[0].row, 0);
    }

    fn lyrics_table(values: serde_json::Value) -> NormalizedTable {
        let rows: Vec<RawRow> = values
            .as_array()
            .map(|items| items.iter().filter_map(|item| item.as_object().cloned()).collect())
            .unwrap_or_default();
        let spec = FieldSpec::new("song", "artist")
            .with_text("genre", TextKind::Categorical)
            .with_text("mood", TextKind::Categorical)
            .with_unit_feature("energy", None);
        normalize(&rows, &spec).expect("normalize")
    }

    #[test]
    fn keyword_filters_narrow_text_only_catalogs() {
        let table = lyrics_table(json!([
            {"song": "Party Hit", "artist": "A", "genre": "pop", "mood": "happy"},
            {"song": "Blue Night", "artist": "B", "genre": "jazz", "mood": "melancholic"},
            {"song": "Soul Rain", "artist": "C", "genre": "Neo Soul", "mood": "Melancholic, slow"}
        ]));
        let query = RangeQuery::new(windows(&[("valence", 0.2, 0.5)]), weights(&[]), 3)
            .with_keywords(KeywordFilter::new("mood", ["melancholic", "calm"]))
            .with_keywords(KeywordFilter::new("genre", ["soul", "blues"]));
        let result = FeatureRangeMatcher::default().match_ranges(&table, &query);

        let rows: Vec<usize> = result.rows.iter().map(|row| row.row).collect();
        assert_eq!(rows, vec![2]);
        assert_eq!(result.keyword_filters_applied, vec!["mood".to_owned(), "genre".to_owned()]);
    }

    #[test]
    fn keyword_filter_leaving_no_rows_is_skipped() {
        let table = lyrics_table(json!([
            {"song": "Party Hit", "artist": "A", "genre": "pop", "mood": "happy"},
            {"song": "Blue Night", "artist": "B", "genre": "jazz", "mood": "melancholic"}
        ]));
        let query = RangeQuery::new(FeatureWindows::new(), weights(&[]), 2)
            .with_keywords(KeywordFilter::new("genre", ["metal"]))
            .with_keywords(KeywordFilter::new("mood", [" Melancholic "]))
            .with_keywords(KeywordFilter::new("lyrics", ["rain"]));
        let result = FeatureRangeMatcher::default().match_ranges(&table, &query);

        let rows: Vec<usize> = result.rows.iter().map(|row| row.row).collect();
        assert_eq!(rows, vec![1]);
        assert_eq!(result.keyword_filters_applied, vec!["mood".to_owned()]);
    }

    #[test]
    fn keyword_filter_runs_after_the_window_filter() {
        let table = lyrics_table(json!([
            {"song": "Slow Jazz", "artist": "A", "genre": "jazz", "energy": 0.2},
            {"song": "Loud Jazz", "artist": "B", "genre": "jazz", "energy": 0.9},
            {"song": "Loud Pop", "artist": "C", "genre": "pop", "energy": 0.8}
        ]));
        let query = RangeQuery::new(windows(&[("energy", 0.7, 1.0)]), weights(&[]), 5)
            .with_keywords(KeywordFilter::new("genre", ["jazz"]));
        let result = FeatureRangeMatcher::default().match_ranges(&table, &query);

        let rows: Vec<usize> = result.rows.iter().map(|row| row.row).collect();
        assert_eq!(rows, vec![1]);
    }

    #[test]
    fn windows_reorder_and_clamp() {
        let window = FeatureWindow::new(0.9, 0.1);
        assert_eq!(window, FeatureWindow { min: 0.1, max: 0.9 });
        assert_eq!(window.widened(0.2, NumericRange::Unit), FeatureWindow { min: 0.0, max: 1.0 });
        let tempo = FeatureWindow::new(100.0, 120.0).widened(0.2, NumericRange::Unbounded);
        assert!((tempo.min - 99.8).abs() < 1e-9);
        let shifted = FeatureWindow::new(0.7, 1.0).shifted(0.2, NumericRange::Unit);
        assert!((shifted.min - 0.9).abs() < 1e-9);
        assert_eq!(shifted.max, 1.0);
    }
}
