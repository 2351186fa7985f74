//! Chunked comparison engine: exact three-way key partition of two datasets
//!
//! Streams each dataset in bounded row chunks, accumulating composite keys in
//! per-dataset sets (memory is O(distinct keys), not O(rows)), then computes
//! matched / only-A / only-B by exact set algebra. Results are independent of
//! the chunk size used.

use crate::config::CompareConfig;
use crate::dataset::Dataset;
use crate::error::{DatasetSide, KeydiffError, Result};
use crate::evaluate::composite_key;
use crate::progress::{NullSink, ProgressSink, Stage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Comparison category of a composite key (and of the rows carrying it)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Matched,
    OnlyA,
    OnlyB,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Matched => "matched",
            Category::OnlyA => "only_a",
            Category::OnlyB => "only_b",
        }
    }

    pub fn all() -> [Category; 3] {
        [Category::Matched, Category::OnlyA, Category::OnlyB]
    }
}

/// States of a comparison job. Failed is reachable from every other state;
/// Cancelled is terminal and distinct from Done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Init,
    ExtractA,
    ExtractB,
    ComputeSets,
    Export,
    Done,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }
}

/// Per-job context threaded through every phase: cancellation flag, progress
/// sink, and the current state. Jobs share nothing mutable with each other.
pub struct JobContext {
    cancel: AtomicBool,
    sink: Arc<dyn ProgressSink>,
    state: Mutex<JobState>,
}

impl JobContext {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            cancel: AtomicBool::new(false),
            sink,
            state: Mutex::new(JobState::Init),
        }
    }

    /// Context with no progress reporting, for tests and embedded use
    pub fn headless() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Request cancellation; takes effect before the next chunk read.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> JobState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, state: JobState) {
        let mut current = self.state.lock().unwrap();
        log::debug!("Job state: {:?} -> {:?}", *current, state);
        *current = state;
    }

    pub fn emit(&self, stage: Stage, percent: f64, message: &str) {
        self.sink.event(stage, percent.clamp(0.0, 100.0), message);
    }
}

/// Keys accumulated from one dataset
#[derive(Debug)]
pub struct ExtractedKeys {
    pub keys: HashSet<String>,
    pub rows: u64,
    pub malformed: u64,
}

/// Exact three-way partition of the key universe of a dataset pair
#[derive(Debug)]
pub struct ComparisonResult {
    pub matched: HashSet<String>,
    pub only_a: HashSet<String>,
    pub only_b: HashSet<String>,
    pub rows_a: u64,
    pub rows_b: u64,
    pub malformed_a: u64,
    pub malformed_b: u64,
}

impl ComparisonResult {
    pub fn count(&self, category: Category) -> u64 {
        match category {
            Category::Matched => self.matched.len() as u64,
            Category::OnlyA => self.only_a.len() as u64,
            Category::OnlyB => self.only_b.len() as u64,
        }
    }

    /// Distinct keys seen in A: matched + only_a by the partition invariant
    pub fn keys_a(&self) -> u64 {
        (self.matched.len() + self.only_a.len()) as u64
    }

    /// Distinct keys seen in B: matched + only_b by the partition invariant
    pub fn keys_b(&self) -> u64 {
        (self.matched.len() + self.only_b.len()) as u64
    }

    pub fn category_of(&self, key: &str) -> Option<Category> {
        if self.matched.contains(key) {
            Some(Category::Matched)
        } else if self.only_a.contains(key) {
            Some(Category::OnlyA)
        } else if self.only_b.contains(key) {
            Some(Category::OnlyB)
        } else {
            None
        }
    }
}

/// The comparison engine for one dataset pair
pub struct ComparisonEngine {
    config: CompareConfig,
    parallel: bool,
}

impl ComparisonEngine {
    pub fn new(config: CompareConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            parallel: false,
        })
    }

    /// Extract A and B side by side. Each side stays internally sequential,
    /// so memory remains bounded and results are identical to a serial run.
    pub fn with_parallel_extract(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn config(&self) -> &CompareConfig {
        &self.config
    }

    /// Run extraction and set computation. Export is a separate pass driven
    /// by the caller (see [`crate::export`]).
    pub fn run(
        &self,
        dataset_a: &Dataset,
        dataset_b: &Dataset,
        ctx: &JobContext,
    ) -> Result<ComparisonResult> {
        let (keys_a, keys_b) = if self.parallel {
            ctx.set_state(JobState::ExtractA);
            let (ra, rb) = rayon::join(
                || self.extract(dataset_a, DatasetSide::A, ctx),
                || self.extract(dataset_b, DatasetSide::B, ctx),
            );
            (ra?, rb?)
        } else {
            ctx.set_state(JobState::ExtractA);
            let keys_a = self.extract(dataset_a, DatasetSide::A, ctx)?;
            ctx.set_state(JobState::ExtractB);
            let keys_b = self.extract(dataset_b, DatasetSide::B, ctx)?;
            (keys_a, keys_b)
        };

        ctx.set_state(JobState::ComputeSets);
        ctx.emit(
            Stage::ComputeSets,
            100.0,
            &format!(
                "Computing set partition over {} + {} keys",
                keys_a.keys.len(),
                keys_b.keys.len()
            ),
        );
        Ok(compute_sets(keys_a, keys_b))
    }

    /// Stream one dataset and accumulate its composite keys. Key columns are
    /// resolved once up front; malformed rows are counted, never fatal alone.
    pub fn extract(
        &self,
        dataset: &Dataset,
        side: DatasetSide,
        ctx: &JobContext,
    ) -> Result<ExtractedKeys> {
        let indices = dataset.resolve_columns(side, &self.config.key_columns)?;
        let chunk_size = self
            .config
            .chunk_size
            .unwrap_or_else(|| dataset.default_chunk_size());

        let mut reader = match self.config.max_rows {
            Some(cap) => dataset.chunks_capped(chunk_size, cap)?,
            None => dataset.chunks(chunk_size)?,
        };

        let stage = match side {
            DatasetSide::A => Stage::ExtractA,
            DatasetSide::B => Stage::ExtractB,
        };

        let mut keys: HashSet<String> = HashSet::new();
        let mut rows = 0u64;
        let mut malformed = 0u64;

        loop {
            if ctx.is_cancelled() {
                return Err(KeydiffError::Cancelled);
            }
            let chunk = match reader.next_chunk()? {
                Some(chunk) => chunk,
                None => break,
            };

            for row in &chunk.rows {
                keys.insert(composite_key(row, &indices));
            }
            rows += chunk.rows.len() as u64;
            malformed += chunk.malformed;

            // Memory pressure is surfaced at chunk boundaries so the job
            // dies cleanly without taking the process with it.
            if let Some(budget) = self.config.max_distinct_keys {
                if keys.len() as u64 > budget {
                    return Err(KeydiffError::resource_exhaustion(
                        side,
                        chunk.index,
                        format!("accumulated {} keys, budget {}", keys.len(), budget),
                    ));
                }
            }

            let percent = dataset
                .row_count
                .filter(|&n| n > 0)
                .map(|n| rows as f64 / n as f64 * 100.0)
                .unwrap_or(0.0);
            ctx.emit(
                stage,
                percent,
                &format!("{} rows processed, {} unique keys", rows, keys.len()),
            );
        }

        if malformed > 0 {
            log::warn!(
                "Dataset {}: skipped {} malformed rows during extraction",
                side,
                malformed
            );
        }

        Ok(ExtractedKeys {
            keys,
            rows,
            malformed,
        })
    }
}

fn compute_sets(a: ExtractedKeys, b: ExtractedKeys) -> ComparisonResult {
    let mut matched = HashSet::new();
    let mut only_a = HashSet::new();
    for key in a.keys {
        if b.keys.contains(&key) {
            matched.insert(key);
        } else {
            only_a.insert(key);
        }
    }
    let only_b: HashSet<String> = b
        .keys
        .into_iter()
        .filter(|key| !matched.contains(key))
        .collect();

    ComparisonResult {
        matched,
        only_a,
        only_b,
        rows_a: a.rows,
        rows_b: b.rows,
        malformed_a: a.malformed,
        malformed_b: b.malformed,
    }
}
