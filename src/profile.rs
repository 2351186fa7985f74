//! Column profiling: scores columns as candidate key building blocks

use crate::dataset::Dataset;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tagged value classification used only for profiling heuristics. Composite
/// keys are always built from raw text, so a misclassification here can skew
/// search ranking but never corrupt matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Text,
    Number,
    Date,
}

impl ValueKind {
    pub fn classify(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return ValueKind::Null;
        }
        if trimmed.parse::<f64>().is_ok() {
            return ValueKind::Number;
        }
        if parse_date(trimmed) {
            return ValueKind::Date;
        }
        ValueKind::Text
    }
}

/// Column-level type signature derived from name and value heuristics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Identifier,
    Date,
    Numeric,
    Text,
}

/// Profile of one column over the sampled rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    /// Original header position, used for deterministic tie-breaking
    pub position: usize,
    pub distinct_estimate: u64,
    pub null_ratio: f64,
    pub cardinality_ratio: f64,
    pub kind: ColumnKind,
    pub score: f64,
}

/// Profiles for every column of a dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub columns: Vec<ColumnProfile>,
    pub rows_sampled: u64,
}

impl DatasetProfile {
    /// Top-K columns by score as seeds for key discovery. Ties resolve to the
    /// earlier header position. Returns all columns when fewer than K exist.
    pub fn top_seeds(&self, k: usize) -> Vec<&ColumnProfile> {
        let mut ranked: Vec<&ColumnProfile> = self.columns.iter().collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        ranked.truncate(k);
        ranked
    }

    pub fn null_ratio_of(&self, column: &str) -> f64 {
        self.columns
            .iter()
            .find(|p| p.name == column)
            .map(|p| p.null_ratio)
            .unwrap_or(0.0)
    }
}

/// Profiles columns from a bounded sample of rows
pub struct ColumnProfiler {
    sample_size: u64,
}

impl ColumnProfiler {
    pub fn new(sample_size: u64) -> Self {
        Self { sample_size }
    }

    /// Profile every column of `dataset` over at most `sample_size` rows.
    /// An empty dataset yields an empty (zero-row) profile, not an error.
    pub fn profile(&self, dataset: &Dataset) -> Result<DatasetProfile> {
        let column_count = dataset.column_count();
        if column_count == 0 {
            return Ok(DatasetProfile {
                columns: Vec::new(),
                rows_sampled: 0,
            });
        }

        let mut distinct: Vec<HashSet<String>> = vec![HashSet::new(); column_count];
        let mut nulls = vec![0u64; column_count];
        let mut dates = vec![0u64; column_count];
        let mut numbers = vec![0u64; column_count];
        let mut rows_sampled = 0u64;

        let chunk_size = dataset.default_chunk_size();
        let mut reader = dataset.chunks_capped(chunk_size, self.sample_size)?;
        while let Some(chunk) = reader.next_chunk()? {
            for row in &chunk.rows {
                rows_sampled += 1;
                for (i, value) in row.iter().enumerate() {
                    match ValueKind::classify(value) {
                        ValueKind::Null => nulls[i] += 1,
                        ValueKind::Date => dates[i] += 1,
                        ValueKind::Number => numbers[i] += 1,
                        ValueKind::Text => {}
                    }
                    distinct[i].insert(value.clone());
                }
            }
        }

        let columns = dataset
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let distinct_estimate = distinct[i].len() as u64;
                let (null_ratio, cardinality_ratio, date_ratio, number_ratio) =
                    if rows_sampled > 0 {
                        let n = rows_sampled as f64;
                        (
                            nulls[i] as f64 / n,
                            distinct_estimate as f64 / n,
                            dates[i] as f64 / n,
                            numbers[i] as f64 / n,
                        )
                    } else {
                        (0.0, 0.0, 0.0, 0.0)
                    };

                let kind = classify_column(name, null_ratio, date_ratio, number_ratio);
                let mut score = cardinality_ratio * 100.0 - 50.0 * null_ratio;
                if kind == ColumnKind::Identifier {
                    score += 50.0;
                }
                if kind == ColumnKind::Date {
                    score += 30.0;
                }

                ColumnProfile {
                    name: name.clone(),
                    position: i,
                    distinct_estimate,
                    null_ratio,
                    cardinality_ratio,
                    kind,
                    score,
                }
            })
            .collect();

        log::debug!(
            "Profiled {} columns over {} sampled rows of {}",
            column_count,
            rows_sampled,
            dataset.path.display()
        );

        Ok(DatasetProfile {
            columns,
            rows_sampled,
        })
    }
}

fn classify_column(name: &str, null_ratio: f64, date_ratio: f64, number_ratio: f64) -> ColumnKind {
    if name_suggests_identifier(name) {
        return ColumnKind::Identifier;
    }
    let non_null = 1.0 - null_ratio;
    if non_null > 0.0 && date_ratio / non_null >= 0.8 {
        return ColumnKind::Date;
    }
    if non_null > 0.0 && number_ratio / non_null >= 0.8 {
        return ColumnKind::Numeric;
    }
    ColumnKind::Text
}

fn name_suggests_identifier(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower == "id"
        || lower == "key"
        || lower == "uuid"
        || lower == "guid"
        || lower.ends_with("_id")
        || lower.ends_with("id")
        || lower.ends_with("_key")
        || lower.ends_with("_code")
        || lower.ends_with("_no")
        || lower.ends_with("number")
}

fn parse_date(value: &str) -> bool {
    const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y"];
    const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

    DATE_FORMATS
        .iter()
        .any(|fmt| chrono::NaiveDate::parse_from_str(value, fmt).is_ok())
        || DATETIME_FORMATS
            .iter()
            .any(|fmt| chrono::NaiveDateTime::parse_from_str(value, fmt).is_ok())
}
