//! # keydiff
//!
//! Key discovery and exact chunked comparison for large delimited datasets:
//! finds column combinations that uniquely identify rows, then computes exact
//! matched / only-in-A / only-in-B partitions between two files, streaming both
//! in bounded chunks so neither is ever fully resident in memory.

pub mod compare;
pub mod config;
pub mod dataset;
pub mod discovery;
pub mod error;
pub mod evaluate;
pub mod export;
pub mod job;
pub mod profile;
pub mod progress;
pub mod store;
pub mod workspace;

pub use error::{KeydiffError, Result};
pub use workspace::KeydiffWorkspace;

/// Current format version for keydiff metadata files
pub const FORMAT_VERSION: &str = "1.0.0";

/// Default chunk size (rows) when a dataset declares no row count
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Default sample size for candidate evaluation during discovery
pub const DEFAULT_SAMPLE_SIZE: usize = 50_000;

/// Default number of seed columns kept by the profiler
pub const DEFAULT_SEED_COLUMNS: usize = 30;

/// Default beam width retained per level during discovery
pub const DEFAULT_BEAM_WIDTH: usize = 20;

/// Default maximum number of candidate combinations returned
pub const DEFAULT_MAX_RESULTS: usize = 50;

/// Default ceiling on uniqueness evaluations per discovery run
pub const DEFAULT_EVAL_BUDGET: usize = 2_000;

/// Column count below which discovery is skipped by default
pub const DEFAULT_TRIGGER_THRESHOLD: usize = 50;

/// Default rows per export segment
pub const DEFAULT_SEGMENT_ROWS: u64 = 200_000;

/// Default number of top candidates re-verified on the full dataset
pub const DEFAULT_VERIFY_TOP: usize = 5;

/// Separator joining column values into a composite key. The unit separator
/// cannot appear in decoded delimited fields the way printable characters can,
/// so distinct tuples never collide.
pub const KEY_SEPARATOR: char = '\u{1F}';
