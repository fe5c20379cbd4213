//! Catalog lookups that do not go through the vector index.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::catalog::NormalizedTable;
use crate::errors::RecommendError;
use crate::index::VectorIndex;

pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Rows whose title or attribution contains `query`, case-insensitively, in
/// row order. A blank query lists the first `limit` rows.
pub fn search(table: &NormalizedTable, query: &str, limit: usize) -> Vec<usize> {
    let needle = query.trim().to_lowercase();
    table
        .title_keys()
        .iter()
        .zip(table.attribution_keys())
        .enumerate()
        .filter(|(_, (title, attribution))| {
            needle.is_empty() || title.contains(&needle) || attribution.contains(&needle)
        })
        .map(|(row, _)| row)
        .take(limit)
        .collect()
}

/// How [`browse`] compares a field against the wanted value. Both modes
/// ignore case.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowseMode {
    #[default]
    Exact,
    /// Substring match, for multi-valued fields such as `indie pop`.
    Contains,
}

impl BrowseMode {
    fn accepts(self, found: &str, wanted: &str) -> bool {
        let found = found.to_lowercase();
        match self {
            Self::Exact => found == wanted,
            Self::Contains => found.contains(wanted),
        }
    }
}

/// Rows whose `field` matches `value` under `mode`, in row order.
///
/// `field` may name a declared text field or either identity field; a field
/// the catalog declares but never carried matches nothing.
pub fn browse(
    table: &NormalizedTable,
    field: &str,
    value: &str,
    mode: BrowseMode,
    limit: usize,
) -> Result<Vec<usize>, RecommendError> {
    let wanted = value.trim().to_lowercase();
    let column = FieldColumn::resolve(table, field)?;

    Ok((0..table.len())
        .filter(|row| column.value(table, *row).is_some_and(|found| mode.accepts(found, &wanted)))
        .take(limit)
        .collect())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CatalogStats {
    pub rows: usize,
    pub duplicates_dropped: usize,
    pub vocabulary_size: usize,
    pub distinct_attributions: usize,
    pub text_fields: Vec<String>,
    pub numeric_fields: Vec<String>,
    pub feature_medians: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_counts: Option<Vec<ValueCount>>,
}

/// Catalog summary; `count_field` adds a value histogram for that field,
/// most frequent first.
pub fn stats(
    table: &NormalizedTable,
    index: &VectorIndex,
    count_field: Option<&str>,
) -> Result<CatalogStats, RecommendError> {
    let spec = table.spec();
    let distinct_attributions =
        table.attribution_keys().iter().map(String::as_str).collect::<HashSet<_>>().len();

    let value_counts = match count_field {
        Some(field) => {
            let column = FieldColumn::resolve(table, field)?;
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for row in 0..table.len() {
                if let Some(value) = column.value(table, row) {
                    *counts.entry(value).or_insert(0) += 1;
                }
            }
            let mut counts: Vec<ValueCount> = counts
                .into_iter()
                .map(|(value, count)| ValueCount { value: value.to_owned(), count })
                .collect();
            counts.sort_by(|left, right| right.count.cmp(&left.count));
            Some(counts)
        }
        None => None,
    };

    Ok(CatalogStats {
        rows: table.len(),
        duplicates_dropped: table.duplicates_dropped(),
        vocabulary_size: index.vocabulary_size(),
        distinct_attributions,
        text_fields: spec
            .text_fields
            .iter()
            .enumerate()
            .filter(|(column, _)| table.has_text_field(*column))
            .map(|(_, field)| field.name.clone())
            .collect(),
        numeric_fields: spec
            .numeric_fields
            .iter()
            .enumerate()
            .filter(|(column, _)| table.has_numeric_field(*column))
            .map(|(_, field)| field.name.clone())
            .collect(),
        feature_medians: spec
            .numeric_fields
            .iter()
            .enumerate()
            .filter(|(column, _)| table.has_numeric_field(*column))
            .filter_map(|(column, field)| {
                table.median(column).map(|median| (field.name.clone(), median))
            })
            .collect(),
        value_counts,
    })
}

enum FieldColumn {
    Title,
    Attribution,
    Text(usize),
    Absent,
}

impl FieldColumn {
    fn resolve(table: &NormalizedTable, field: &str) -> Result<Self, RecommendError> {
        let spec = table.spec();
        if let Some(column) = spec.text_field_index(field) {
            return Ok(if table.has_text_field(column) { Self::Text(column) } else { Self::Absent });
        }
        if spec.title.eq_ignore_ascii_case(field) {
            return Ok(Self::Title);
        }
        if spec.attribution.eq_ignore_ascii_case(field) {
            return Ok(Self::Attribution);
        }
        Err(RecommendError::Schema(format!("`{field}` is not a declared text field")))
    }

    fn value<'a>(&self, table: &'a NormalizedTable, row: usize) -> Option<&'a str> {
        let item = table.item(row)?;
        match self {
            Self::Title => Some(item.title.as_str()),
            Self::Attribution => Some(item.attribution.as_str()),
            Self::Text(column) => item.text.get(*column).map(String::as_str),
            Self::Absent => None,
        }
    }
}
