//! Uniqueness evaluation of column combinations via composite keys

use crate::dataset::Dataset;
use crate::error::{DatasetSide, Result};
use crate::KEY_SEPARATOR;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Evaluation result for one column combination against one dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateKey {
    /// Ordered column names forming the composite key
    pub columns: Vec<String>,
    pub total_rows: u64,
    pub distinct_count: u64,
    pub duplicate_count: u64,
    /// distinct/total × 100; 0 for an empty dataset. Always in [0, 100].
    pub uniqueness_score: f64,
    pub is_unique_key: bool,
    /// True when the evaluation ran on a sample rather than the full dataset
    pub sampled: bool,
}

impl CandidateKey {
    pub fn from_counts(columns: Vec<String>, total_rows: u64, distinct_count: u64) -> Self {
        let uniqueness_score = if total_rows > 0 {
            distinct_count as f64 / total_rows as f64 * 100.0
        } else {
            0.0
        };
        Self {
            columns,
            total_rows,
            distinct_count,
            duplicate_count: total_rows.saturating_sub(distinct_count),
            uniqueness_score,
            is_unique_key: total_rows > 0 && distinct_count == total_rows,
            sampled: false,
        }
    }

    /// Normalized (sorted) tuple identifying this combination regardless of
    /// the order columns were requested in
    pub fn normalized(&self) -> Vec<String> {
        normalize_combination(&self.columns)
    }
}

/// Sorted copy of a combination, the dedup identity for requested combos
pub fn normalize_combination(columns: &[String]) -> Vec<String> {
    let mut sorted = columns.to_vec();
    sorted.sort();
    sorted
}

/// Join the selected fields of a row into a composite key. Nulls (empty
/// fields) are ordinary values: two rows that are both null in a key column
/// agree on it.
pub fn composite_key(row: &[String], indices: &[usize]) -> String {
    let mut key = String::new();
    for (n, &i) in indices.iter().enumerate() {
        if n > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(&row[i]);
    }
    key
}

/// Streams a dataset and counts distinct composite keys for a combination
pub struct UniquenessEvaluator {
    chunk_size: usize,
}

impl UniquenessEvaluator {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    /// Evaluate `columns` against `dataset`, scanning at most `sample` rows
    /// when given. Empty datasets score 0 and never error.
    pub fn evaluate(
        &self,
        dataset: &Dataset,
        side: DatasetSide,
        columns: &[String],
        sample: Option<u64>,
    ) -> Result<CandidateKey> {
        let indices = dataset.resolve_columns(side, columns)?;

        let mut reader = match sample {
            Some(cap) => dataset.chunks_capped(self.chunk_size, cap)?,
            None => dataset.chunks(self.chunk_size)?,
        };

        let mut keys: HashSet<String> = HashSet::new();
        let mut total_rows = 0u64;
        while let Some(chunk) = reader.next_chunk()? {
            for row in &chunk.rows {
                keys.insert(composite_key(row, &indices));
            }
            total_rows += chunk.rows.len() as u64;
        }

        let mut candidate =
            CandidateKey::from_counts(columns.to_vec(), total_rows, keys.len() as u64);
        candidate.sampled = sample.is_some();
        Ok(candidate)
    }

    /// Re-run the top `n` sampled candidates on the full dataset, replacing
    /// their sampled counts. Removes sampling bias before final reporting;
    /// the returned list is re-ranked by the verified scores.
    pub fn verify_top(
        &self,
        dataset: &Dataset,
        side: DatasetSide,
        candidates: &[CandidateKey],
        n: usize,
    ) -> Result<Vec<CandidateKey>> {
        let mut verified = Vec::with_capacity(candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            if i < n && candidate.sampled {
                verified.push(self.evaluate(dataset, side, &candidate.columns, None)?);
            } else {
                verified.push(candidate.clone());
            }
        }
        verified.sort_by(|a, b| {
            b.uniqueness_score
                .partial_cmp(&a.uniqueness_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.columns.len().cmp(&b.columns.len()))
                .then(a.columns.cmp(&b.columns))
        });
        Ok(verified)
    }
}
