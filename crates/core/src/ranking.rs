//! Shared top-k selection for every query path.

use std::cmp::Ordering;

/// One candidate row with its score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoredRow {
    pub row: usize,
    pub score: f64,
}

impl ScoredRow {
    pub fn new(row: usize, score: f64) -> Self {
        Self { row, score }
    }
}

/// Score descending, row ascending. NaN scores sort last.
pub fn rank_order(left: &ScoredRow, right: &ScoredRow) -> Ordering {
    match (left.score.is_nan(), right.score.is_nan()) {
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }
    right
        .score
        .partial_cmp(&left.score)
        .unwrap_or(Ordering::Equal)
        .then(left.row.cmp(&right.row))
}

/// The best `k` candidates in rank order.
///
/// Partitions with `select_nth_unstable_by` before sorting so large catalogs
/// only pay a full sort over the kept prefix.
pub fn top_k(mut candidates: Vec<ScoredRow>, k: usize) -> Vec<ScoredRow> {
    if k == 0 || candidates.is_empty() {
        return Vec::new();
    }
    if candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, rank_order);
        candidates.truncate(k);
    }
    candidates.sort_by(rank_order);
    candidates
}

#[cfg(test)]
mod tests {
    use super::{top_k, ScoredRow};

    fn rows(scores: &[f64]) -> Vec<ScoredRow> {
        scores.iter().enumerate().map(|(row, score)| ScoredRow::new(row, *score)).collect()
    }

    #[test]
    fn keeps_highest_scores_with_row_tie_break() {
        let ranked = top_k(rows(&[0.2, 0.9, 0.5, 0.9, 0.1]), 3);
        let order: Vec<usize> = ranked.iter().map(|row| row.row).collect();
        assert_eq!(order, vec![1, 3, 2]);
    }

    #[test]
    fn zero_k_and_short_inputs() {
        assert!(top_k(rows(&[0.5]), 0).is_empty());
        assert_eq!(top_k(rows(&[0.1, 0.3]), 10).len(), 2);
    }

    #[test]
    fn equal_scores_follow_row_order() {
        let ranked = top_k(rows(&[0.0, 0.0, 0.0, 0.0]), 2);
        assert_eq!(ranked, vec![ScoredRow::new(0, 0.0), ScoredRow::new(1, 0.0)]);
    }

    #[test]
    fn nan_scores_rank_last() {
        let ranked = top_k(rows(&[f64::NAN, 0.1]), 2);
        assert_eq!(ranked[0].row, 1);
    }
}
