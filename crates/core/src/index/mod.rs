//! TF-IDF vector index over composed catalog documents.
//!
//! The fitted matrix is kept twice: row-major for `vector_for`, and as
//! per-term postings so a similarity query only touches rows that share a
//! term with the query row. Both layouts are immutable after `build`.

mod stopwords;
mod tokenize;

use std::collections::HashMap;

use tracing::info;

use crate::errors::RecommendError;

pub use stopwords::{StopWords, StopWordsMode};
pub use tokenize::{ngrams, tokenize};

pub const DEFAULT_MAX_FEATURES: usize = 5000;

#[derive(Clone, Debug, PartialEq)]
pub struct IndexConfig {
    /// `None` keeps every surviving term.
    pub max_features: Option<usize>,
    pub ngram_range: (usize, usize),
    pub stop_words: StopWords,
    /// Minimum number of documents a term must appear in.
    pub min_df: usize,
    /// Maximum fraction of documents a term may appear in.
    pub max_df: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_features: Some(DEFAULT_MAX_FEATURES),
            ngram_range: (1, 2),
            stop_words: StopWords::english(),
            min_df: 1,
            max_df: 1.0,
        }
    }
}

/// Sparse row: ascending column indices with their weights.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn norm(&self) -> f32 {
        self.values.iter().map(|value| value * value).sum::<f32>().sqrt()
    }

    pub fn dot(&self, other: &SparseVector) -> f32 {
        sparse_dot(&self.indices, &self.values, &other.indices, &other.values)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }
}

#[derive(Clone, Debug)]
pub struct VectorIndex {
    terms: Vec<String>,
    vocabulary: HashMap<String, u32>,
    idf: Vec<f32>,
    row_offsets: Vec<usize>,
    row_columns: Vec<u32>,
    row_values: Vec<f32>,
    posting_offsets: Vec<usize>,
    posting_rows: Vec<u32>,
    posting_values: Vec<f32>,
}

#[derive(Clone, Copy, Debug, Default)]
struct TermStats {
    document_frequency: u32,
    total_count: u64,
}

impl VectorIndex {
    pub fn build<S: AsRef<str>>(
        documents: &[S],
        config: &IndexConfig,
    ) -> Result<Self, RecommendError> {
        if documents.is_empty() {
            return Err(RecommendError::EmptyVocabulary("catalog contains no documents".to_owned()));
        }

        let row_count = documents.len();
        let mut stats: HashMap<String, TermStats> = HashMap::new();
        let mut any_terms = false;

        for document in documents {
            let counts = term_counts(document.as_ref(), config);
            any_terms |= !counts.is_empty();
            for (term, count) in counts {
                let entry = stats.entry(term).or_default();
                entry.document_frequency += 1;
                entry.total_count += u64::from(count);
            }
        }

        if !any_terms {
            return Err(RecommendError::EmptyVocabulary(
                "every document is empty after stopword removal".to_owned(),
            ));
        }

        let max_document_count = config.max_df * row_count as f64;
        let mut selected: Vec<(String, TermStats)> = stats
            .into_iter()
            .filter(|(_, stat)| {
                stat.document_frequency as usize >= config.min_df
                    && f64::from(stat.document_frequency) <= max_document_count
            })
            .collect();

        if let Some(max_features) = config.max_features {
            if selected.len() > max_features {
                selected.sort_by(|(left_term, left), (right_term, right)| {
                    right
                        .total_count
                        .cmp(&left.total_count)
                        .then(right.document_frequency.cmp(&left.document_frequency))
                        .then_with(|| left_term.cmp(right_term))
                });
                selected.truncate(max_features);
            }
        }

        if selected.is_empty() {
            return Err(RecommendError::EmptyVocabulary(
                "no terms survive document-frequency pruning".to_owned(),
            ));
        }

        selected.sort_by(|(left, _), (right, _)| left.cmp(right));

        let smoothed_rows = (1 + row_count) as f64;
        let idf: Vec<f32> = selected
            .iter()
            .map(|(_, stat)| {
                ((smoothed_rows / (1.0 + f64::from(stat.document_frequency))).ln() + 1.0) as f32
            })
            .collect();
        let terms: Vec<String> = selected.into_iter().map(|(term, _)| term).collect();
        let vocabulary: HashMap<String, u32> =
            terms.iter().enumerate().map(|(column, term)| (term.clone(), column as u32)).collect();

        let mut row_offsets = Vec::with_capacity(row_count + 1);
        let mut row_columns = Vec::new();
        let mut row_values = Vec::new();
        row_offsets.push(0);

        for document in documents {
            let mut weighted: Vec<(u32, f32)> = term_counts(document.as_ref(), config)
                .into_iter()
                .filter_map(|(term, count)| {
                    vocabulary
                        .get(&term)
                        .map(|column| (*column, count as f32 * idf[*column as usize]))
                })
                .collect();
            weighted.sort_by_key(|(column, _)| *column);

            let norm = weighted.iter().map(|(_, value)| value * value).sum::<f32>().sqrt();
            for (column, value) in weighted {
                row_columns.push(column);
                row_values.push(if norm > 0.0 { value / norm } else { value });
            }
            row_offsets.push(row_columns.len());
        }

        let (posting_offsets, posting_rows, posting_values) =
            transpose(terms.len(), &row_offsets, &row_columns, &row_values);

        let index = Self {
            terms,
            vocabulary,
            idf,
            row_offsets,
            row_columns,
            row_values,
            posting_offsets,
            posting_rows,
            posting_values,
        };

        info!(
            event_name = "index.build.completed",
            rows = index.row_count(),
            vocabulary_size = index.vocabulary_size(),
            non_zero = index.row_values.len(),
            "vector index built"
        );

        Ok(index)
    }

    pub fn row_count(&self) -> usize {
        self.row_offsets.len().saturating_sub(1)
    }

    pub fn vocabulary_size(&self) -> usize {
        self.terms.len()
    }

    /// Vocabulary terms in column order.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn term_index(&self, term: &str) -> Option<usize> {
        self.vocabulary.get(term).map(|column| *column as usize)
    }

    pub fn idf(&self, term: &str) -> Option<f32> {
        self.term_index(term).map(|column| self.idf[column])
    }

    pub fn vector_for(&self, row: usize) -> Option<SparseVector> {
        let (indices, values) = self.row_slices(row)?;
        Some(SparseVector { indices: indices.to_vec(), values: values.to_vec() })
    }

    /// Dot product of `row` against every row, indexed by row.
    ///
    /// One sparse-matrix × sparse-vector product over the postings; rows that
    /// share no term with `row` keep a score of zero.
    pub fn similarities(&self, row: usize) -> Option<Vec<f32>> {
        let (indices, values) = self.row_slices(row)?;
        let mut scores = vec![0.0f32; self.row_count()];

        for (column, weight) in indices.iter().zip(values) {
            let column = *column as usize;
            let range = self.posting_offsets[column]..self.posting_offsets[column + 1];
            for (other, other_weight) in
                self.posting_rows[range.clone()].iter().zip(&self.posting_values[range])
            {
                scores[*other as usize] += weight * other_weight;
            }
        }

        Some(scores)
    }

    pub fn dot(&self, left: usize, right: usize) -> Option<f32> {
        let (left_indices, left_values) = self.row_slices(left)?;
        let (right_indices, right_values) = self.row_slices(right)?;
        Some(sparse_dot(left_indices, left_values, right_indices, right_values))
    }

    fn row_slices(&self, row: usize) -> Option<(&[u32], &[f32])> {
        if row >= self.row_count() {
            return None;
        }
        let range = self.row_offsets[row]..self.row_offsets[row + 1];
        Some((&self.row_columns[range.clone()], &self.row_values[range]))
    }
}

fn term_counts(document: &str, config: &IndexConfig) -> HashMap<String, u32> {
    let tokens = tokenize(document, &config.stop_words);
    let mut counts = HashMap::new();
    for term in ngrams(&tokens, config.ngram_range) {
        *counts.entry(term).or_insert(0) += 1;
    }
    counts
}

fn transpose(
    columns: usize,
    row_offsets: &[usize],
    row_columns: &[u32],
    row_values: &[f32],
) -> (Vec<usize>, Vec<u32>, Vec<f32>) {
    let mut offsets = vec![0usize; columns + 1];
    for column in row_columns {
        offsets[*column as usize + 1] += 1;
    }
    for column in 0..columns {
        offsets[column + 1] += offsets[column];
    }

    let mut cursor = offsets.clone();
    let mut rows = vec![0u32; row_columns.len()];
    let mut values = vec![0.0f32; row_columns.len()];
    for row in 0..row_offsets.len().saturating_sub(1) {
        for position in row_offsets[row]..row_offsets[row + 1] {
            let column = row_columns[position] as usize;
            rows[cursor[column]] = row as u32;
            values[cursor[column]] = row_values[position];
            cursor[column] += 1;
        }
    }

    (offsets, rows, values)
}

fn sparse_dot(
    left_indices: &[u32],
    left_values: &[f32],
    right_indices: &[u32],
    right_values: &[f32],
) -> f32 {
    let (mut i, mut j, mut total) = (0, 0, 0.0f32);
    while i < left_indices.len() && j < right_indices.len() {
        match left_indices[i].cmp(&right_indices[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                total += left_values[i] * right_values[j];
                i += 1;
                j += 1;
            }
        }
    }
    total
}
