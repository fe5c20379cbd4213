//! Item-to-item recommendations over the fitted vector index.

use tracing::debug;

use crate::catalog::NormalizedTable;
use crate::errors::RecommendError;
use crate::index::VectorIndex;
use crate::ranking::{top_k, ScoredRow};

/// Row whose title matches `query`: exact (case-insensitive) first, then the
/// first title containing it.
pub fn resolve_query(table: &NormalizedTable, query: &str) -> Result<usize, RecommendError> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Err(RecommendError::NotFound { query: query.to_owned() });
    }

    let titles = table.title_keys();
    titles
        .iter()
        .position(|title| *title == needle)
        .or_else(|| titles.iter().position(|title| title.contains(&needle)))
        .ok_or_else(|| RecommendError::NotFound { query: query.to_owned() })
}

pub fn recommend(
    index: &VectorIndex,
    table: &NormalizedTable,
    query: &str,
    k: usize,
) -> Result<Vec<ScoredRow>, RecommendError> {
    let row = resolve_query(table, query)?;
    let ranked = recommend_row(index, row, k);
    debug!(
        event_name = "similarity.recommend",
        query = %query,
        resolved_row = row,
        k,
        returned = ranked.len(),
        "similarity query served"
    );
    Ok(ranked)
}

/// Top `k` rows most similar to `row`, excluding `row` itself.
pub fn recommend_row(index: &VectorIndex, row: usize, k: usize) -> Vec<ScoredRow> {
    let Some(scores) = index.similarities(row) else {
        return Vec::new();
    };

    let candidates = scores
        .into_iter()
        .enumerate()
        .filter(|(other, _)| *other != row)
        .map(|(other, score)| ScoredRow::new(other, f64::from(score).clamp(0.0, 1.0)))
        .collect();

    top_k(candidates, k)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{recommend, recommend_row, resolve_query};
    use crate::catalog::{normalize, FieldSpec, NormalizedTable, RawRow, TextKind};
    use crate::compose::{compose, Thresholds, WeightSpec};
    use crate::errors::RecommendError;
    use crate::index::{IndexConfig, VectorIndex};

    fn build(values: serde_json::Value) -> (NormalizedTable, VectorIndex) {
        let rows: Vec<RawRow> = values
            .as_array()
            .map(|items| items.iter().filter_map(|item| item.as_object().cloned()).collect())
            .unwrap_or_default();
        let spec = FieldSpec::new("title", "artist")
            .with_text("lyrics", TextKind::FreeText)
            .with_text("artist", TextKind::Categorical);
        let table = compose(
            normalize(&rows, &spec).expect("normalize"),
            &WeightSpec::default(),
            Thresholds::default(),
        );
        let index = VectorIndex::build(table.documents(), &IndexConfig::default()).expect("index");
        (table, index)
    }

    fn three_songs() -> (NormalizedTable, VectorIndex) {
        build(json!([
            {"title": "Song A", "artist": "X", "lyrics": "sun bright happy"},
            {"title": "Song B", "artist": "X", "lyrics": "sun bright happy"},
            {"title": "Song C", "artist": "Y", "lyrics": "rain dark sad"}
        ]))
    }

    #[test]
    fn identical_documents_rank_first() {
        let (table, index) = three_songs();
        let ranked = recommend(&index, &table, "Song A", 2).expect("song a resolves");
        let rows: Vec<usize> = ranked.iter().map(|row| row.row).collect();
        assert_eq!(rows, vec![1, 2]);
        assert!((ranked[0].score - 1.0).abs() < 1e-6);
        assert_eq!(ranked[1].score, 0.0);
    }

    #[test]
    fn query_row_is_never_returned_and_size_is_bounded() {
        let (table, index) = three_songs();
        for k in [0, 1, 2, 5] {
            let ranked = recommend_row(&index, 0, k);
            assert!(ranked.iter().all(|row| row.row != 0));
            assert_eq!(ranked.len(), k.min(table.len() - 1));
        }
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let (table, index) = build(json!([
            {"title": "One", "artist": "X", "lyrics": "love night love"},
            {"title": "Two", "artist": "X", "lyrics": "love day"},
            {"title": "Three", "artist": "Z", "lyrics": "night drive"},
            {"title": "Four", "artist": "Z", "lyrics": "drive love night"}
        ]));
        for row in 0..table.len() {
            for scored in recommend_row(&index, row, 10) {
                assert!((0.0..=1.0).contains(&scored.score));
            }
        }
    }

    #[test]
    fn ties_break_on_ascending_row() {
        let (_, index) = build(json!([
            {"title": "Query", "artist": "Q", "lyrics": "ocean waves"},
            {"title": "Far", "artist": "F", "lyrics": "desert"},
            {"title": "Twin 1", "artist": "T", "lyrics": "ocean waves"},
            {"title": "Twin 2", "artist": "T", "lyrics": "ocean waves"}
        ]));
        let rows: Vec<usize> = recommend_row(&index, 0, 3).iter().map(|row| row.row).collect();
        assert_eq!(rows, vec![2, 3, 1]);
    }

    #[test]
    fn resolution_prefers_exact_then_substring() {
        let (table, _) = build(json!([
            {"title": "Hello Again", "artist": "X", "lyrics": "one"},
            {"title": "hello", "artist": "Y", "lyrics": "two"},
            {"title": "Goodbye", "artist": "Z", "lyrics": "three"}
        ]));
        assert_eq!(resolve_query(&table, "HELLO"), Ok(1));
        assert_eq!(resolve_query(&table, "again"), Ok(0));
        assert_eq!(resolve_query(&table, "  goodbye "), Ok(2));
    }

    #[test]
    fn unknown_and_blank_queries_are_not_found() {
        let (table, index) = three_songs();
        let missing = recommend(&index, &table, "Song Z", 2).expect_err("no such song");
        assert_eq!(missing, RecommendError::NotFound { query: "Song Z".to_owned() });
        assert!(resolve_query(&table, "   ").expect_err("blank").is_not_found());
    }
}
