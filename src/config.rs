//! Validated configuration for discovery and comparison runs
//!
//! All inputs are checked up front so invalid configurations are rejected
//! before any data file is opened.

use crate::error::{KeydiffError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the candidate key discovery search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Target combination size N
    pub target_size: usize,
    /// Maximum number of candidate combinations returned
    pub max_results: usize,
    /// Combinations retained per beam-search level
    pub beam_width: usize,
    /// Seed columns taken from the profiler
    pub seed_count: usize,
    /// Rows sampled per evaluation during search
    pub sample_size: u64,
    /// Hard ceiling on uniqueness evaluations per run
    pub eval_budget: usize,
    /// When false, only explicitly supplied combinations are evaluated
    pub enabled: bool,
    /// Column count below which search is skipped even when enabled
    pub trigger_threshold: usize,
    /// Combinations always evaluated in addition to search output
    pub include: Vec<Vec<String>>,
    /// Combinations never generated or evaluated
    pub exclude: Vec<Vec<String>>,
    /// Top candidates re-verified on the full dataset after search
    pub verify_top: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            target_size: 1,
            max_results: crate::DEFAULT_MAX_RESULTS,
            beam_width: crate::DEFAULT_BEAM_WIDTH,
            seed_count: crate::DEFAULT_SEED_COLUMNS,
            sample_size: crate::DEFAULT_SAMPLE_SIZE as u64,
            eval_budget: crate::DEFAULT_EVAL_BUDGET,
            enabled: true,
            trigger_threshold: crate::DEFAULT_TRIGGER_THRESHOLD,
            include: Vec::new(),
            exclude: Vec::new(),
            verify_top: crate::DEFAULT_VERIFY_TOP,
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.target_size == 0 {
            return Err(KeydiffError::config("target combination size must be >= 1"));
        }
        if self.max_results == 0 {
            return Err(KeydiffError::config("max_results must be >= 1"));
        }
        if self.beam_width == 0 {
            return Err(KeydiffError::config("beam_width must be >= 1"));
        }
        if self.seed_count == 0 {
            return Err(KeydiffError::config("seed_count must be >= 1"));
        }
        if self.sample_size == 0 {
            return Err(KeydiffError::config("sample_size must be >= 1"));
        }
        if self.eval_budget == 0 {
            return Err(KeydiffError::config("eval_budget must be >= 1"));
        }
        for combo in self.include.iter().chain(self.exclude.iter()) {
            if combo.is_empty() {
                return Err(KeydiffError::config(
                    "include/exclude combinations must not be empty",
                ));
            }
        }
        Ok(())
    }
}

/// Per-category export row caps. A capped category halts deterministically at
/// the cap, independent of the other categories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryCaps {
    pub matched: Option<u64>,
    pub only_a: Option<u64>,
    pub only_b: Option<u64>,
}

/// Configuration for the chunked export writer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Rows per segment before a new segment is started
    pub segment_rows: u64,
    pub caps: CategoryCaps,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            segment_rows: crate::DEFAULT_SEGMENT_ROWS,
            caps: CategoryCaps::default(),
        }
    }
}

impl ExportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.segment_rows == 0 {
            return Err(KeydiffError::config("segment_rows must be >= 1"));
        }
        Ok(())
    }
}

/// Configuration for one comparison job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareConfig {
    /// Key columns, required in both datasets
    pub key_columns: Vec<String>,
    /// Rows per chunk; None picks a per-dataset default from the row count
    pub chunk_size: Option<usize>,
    /// Optional cap on rows extracted per dataset
    pub max_rows: Option<u64>,
    /// Accumulated-key budget per dataset; exceeding it at a chunk boundary
    /// terminates the job with a resource exhaustion error
    pub max_distinct_keys: Option<u64>,
    pub export: ExportConfig,
}

impl CompareConfig {
    pub fn new(key_columns: Vec<String>) -> Self {
        Self {
            key_columns,
            chunk_size: None,
            max_rows: None,
            max_distinct_keys: None,
            export: ExportConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_columns.is_empty() {
            return Err(KeydiffError::config(
                "at least one key column must be specified",
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for column in &self.key_columns {
            if !seen.insert(column) {
                return Err(KeydiffError::config(format!(
                    "duplicate key column: '{}'",
                    column
                )));
            }
        }
        if self.chunk_size == Some(0) {
            return Err(KeydiffError::config("chunk_size must be >= 1"));
        }
        self.export.validate()
    }
}
