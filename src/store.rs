//! Result/metadata store contract and a file-backed implementation
//!
//! The engine depends on the [`ResultStore`] trait only. [`JsonResultStore`]
//! persists one JSON document per job and serves paged reads of exported
//! segments through a cumulative [`PageIndex`], so page access never rescans
//! earlier segments.

use crate::compare::{Category, JobState};
use crate::error::{KeydiffError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Attempts made to acquire the per-job write lock before giving up
const RETRY_ATTEMPTS: u32 = 10;
/// Base backoff between lock attempts; grows linearly per attempt
const RETRY_BASE_MS: u64 = 20;

/// Metadata for one completed export segment. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub category: Category,
    /// Zero-based, contiguous within a category
    pub sequence: u64,
    pub row_count: u64,
    pub byte_size: u64,
    pub location: PathBuf,
}

/// Distinct-key counts per category
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub matched: u64,
    pub only_a: u64,
    pub only_b: u64,
}

impl CategoryCounts {
    pub fn get(&self, category: Category) -> u64 {
        match category {
            Category::Matched => self.matched,
            Category::OnlyA => self.only_a,
            Category::OnlyB => self.only_b,
        }
    }
}

/// Persistent record of a comparison job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub format_version: String,
    pub id: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub finished: Option<DateTime<Utc>>,
    pub state: JobState,
    pub dataset_a: PathBuf,
    pub dataset_b: PathBuf,
    /// blake3 fingerprints keying job identity to exact source versions
    pub fingerprint_a: String,
    pub fingerprint_b: String,
    pub key_columns: Vec<String>,
    #[serde(default)]
    pub key_counts: Option<CategoryCounts>,
    #[serde(default)]
    pub segments: Vec<SegmentRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobRecord {
    pub fn new(
        id: String,
        dataset_a: PathBuf,
        dataset_b: PathBuf,
        fingerprint_a: String,
        fingerprint_b: String,
        key_columns: Vec<String>,
    ) -> Self {
        Self {
            format_version: crate::FORMAT_VERSION.to_string(),
            id,
            created: Utc::now(),
            finished: None,
            state: JobState::Init,
            dataset_a,
            dataset_b,
            fingerprint_a,
            fingerprint_b,
            key_columns,
            key_counts: None,
            segments: Vec::new(),
            error: None,
        }
    }

    pub fn segments_of(&self, category: Category) -> Vec<&SegmentRecord> {
        let mut segments: Vec<&SegmentRecord> = self
            .segments
            .iter()
            .filter(|s| s.category == category)
            .collect();
        segments.sort_by_key(|s| s.sequence);
        segments
    }

    /// Exported row total for a category; duplicates under one key included
    pub fn exported_rows(&self, category: Category) -> u64 {
        self.segments_of(category).iter().map(|s| s.row_count).sum()
    }
}

/// Summary served to pollers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub state: JobState,
    pub key_columns: Vec<String>,
    pub key_counts: Option<CategoryCounts>,
    pub exported_matched: u64,
    pub exported_only_a: u64,
    pub exported_only_b: u64,
    pub error: Option<String>,
}

/// Store contract the comparison core depends on. Implementations must
/// serialize concurrent writers (bounded retry/backoff, not immediate
/// failure) and keep failed jobs visibly failed rather than half-written.
pub trait ResultStore: Send + Sync {
    fn create_job(&self, record: JobRecord) -> Result<()>;
    fn update_state(&self, job_id: &str, state: JobState) -> Result<()>;
    /// Register a finished segment so consumers can page through it while
    /// later segments are still being produced.
    fn record_segment(&self, job_id: &str, segment: SegmentRecord) -> Result<()>;
    fn finish_job(&self, job_id: &str, counts: CategoryCounts) -> Result<()>;
    fn fail_job(&self, job_id: &str, error: &str) -> Result<()>;
    /// Mark a cancelled job: any partial output stays visibly incomplete.
    fn cancel_job(&self, job_id: &str) -> Result<()>;
    fn get_job(&self, job_id: &str) -> Result<JobRecord>;
    fn get_summary(&self, job_id: &str) -> Result<JobSummary>;
    /// Page of full rows from a category, addressed by absolute row offset
    fn get_page(
        &self,
        job_id: &str,
        category: Category,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<Vec<String>>>;
    /// Remove the job record and its segment files
    fn delete_job(&self, job_id: &str) -> Result<()>;
}

/// Maps absolute row offsets within a category to (segment, intra-segment
/// offset) from cumulative segment row counts. Lookup is a binary search,
/// never a rescan of segment files.
#[derive(Debug, Clone)]
pub struct PageIndex {
    cumulative: Vec<u64>,
}

impl PageIndex {
    pub fn from_segments(segments: &[&SegmentRecord]) -> Self {
        let mut cumulative = Vec::with_capacity(segments.len());
        let mut total = 0u64;
        for segment in segments {
            total += segment.row_count;
            cumulative.push(total);
        }
        Self { cumulative }
    }

    pub fn total_rows(&self) -> u64 {
        self.cumulative.last().copied().unwrap_or(0)
    }

    /// Locate the segment holding `offset` and the offset within it
    pub fn locate(&self, offset: u64) -> Option<(usize, u64)> {
        if offset >= self.total_rows() {
            return None;
        }
        let segment = self.cumulative.partition_point(|&end| end <= offset);
        let start = if segment == 0 {
            0
        } else {
            self.cumulative[segment - 1]
        };
        Some((segment, offset - start))
    }
}

/// File-backed store: one JSON document per job under `root/jobs/`
pub struct JsonResultStore {
    jobs_dir: PathBuf,
}

impl JsonResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let jobs_dir = root.into().join("jobs");
        fs::create_dir_all(&jobs_dir)?;
        Ok(Self { jobs_dir })
    }

    fn job_path(&self, job_id: &str) -> PathBuf {
        self.jobs_dir.join(format!("{}.json", job_id))
    }

    fn lock_path(&self, job_id: &str) -> PathBuf {
        self.jobs_dir.join(format!("{}.lock", job_id))
    }

    fn read_record(&self, job_id: &str) -> Result<JobRecord> {
        let path = self.job_path(job_id);
        if !path.exists() {
            return Err(KeydiffError::JobNotFound {
                id: job_id.to_string(),
            });
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_record(&self, record: &JobRecord) -> Result<()> {
        let path = self.job_path(&record.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(record)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Read-modify-write under a lock file, retrying with linear backoff
    /// instead of failing on contention.
    fn with_record<F>(&self, job_id: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut JobRecord) -> Result<()>,
    {
        let lock_path = self.lock_path(job_id);
        let mut acquired = false;
        for attempt in 0..RETRY_ATTEMPTS {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(_) => {
                    acquired = true;
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    std::thread::sleep(std::time::Duration::from_millis(
                        RETRY_BASE_MS * (attempt as u64 + 1),
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }
        if !acquired {
            return Err(KeydiffError::store(format!(
                "could not acquire write lock for job {} after {} attempts",
                job_id, RETRY_ATTEMPTS
            )));
        }

        let result = (|| {
            let mut record = self.read_record(job_id)?;
            mutate(&mut record)?;
            self.write_record(&record)
        })();

        let _ = fs::remove_file(&lock_path);
        result
    }
}

impl ResultStore for JsonResultStore {
    fn create_job(&self, record: JobRecord) -> Result<()> {
        let path = self.job_path(&record.id);
        if path.exists() {
            return Err(KeydiffError::store(format!(
                "job {} already exists",
                record.id
            )));
        }
        self.write_record(&record)
    }

    fn update_state(&self, job_id: &str, state: JobState) -> Result<()> {
        self.with_record(job_id, |record| {
            record.state = state;
            Ok(())
        })
    }

    fn record_segment(&self, job_id: &str, segment: SegmentRecord) -> Result<()> {
        self.with_record(job_id, |record| {
            record.segments.push(segment);
            Ok(())
        })
    }

    fn finish_job(&self, job_id: &str, counts: CategoryCounts) -> Result<()> {
        self.with_record(job_id, |record| {
            record.state = JobState::Done;
            record.key_counts = Some(counts);
            record.finished = Some(Utc::now());
            Ok(())
        })
    }

    fn fail_job(&self, job_id: &str, error: &str) -> Result<()> {
        self.with_record(job_id, |record| {
            record.state = JobState::Failed;
            record.error = Some(error.to_string());
            record.finished = Some(Utc::now());
            Ok(())
        })
    }

    fn cancel_job(&self, job_id: &str) -> Result<()> {
        self.with_record(job_id, |record| {
            record.state = JobState::Cancelled;
            record.error = Some("cancelled before completion; output is incomplete".to_string());
            record.finished = Some(Utc::now());
            Ok(())
        })
    }

    fn get_job(&self, job_id: &str) -> Result<JobRecord> {
        self.read_record(job_id)
    }

    fn get_summary(&self, job_id: &str) -> Result<JobSummary> {
        let record = self.read_record(job_id)?;
        Ok(JobSummary {
            id: record.id.clone(),
            state: record.state,
            key_columns: record.key_columns.clone(),
            key_counts: record.key_counts,
            exported_matched: record.exported_rows(Category::Matched),
            exported_only_a: record.exported_rows(Category::OnlyA),
            exported_only_b: record.exported_rows(Category::OnlyB),
            error: record.error,
        })
    }

    fn get_page(
        &self,
        job_id: &str,
        category: Category,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<Vec<String>>> {
        let record = self.read_record(job_id)?;
        let segments = record.segments_of(category);
        let index = PageIndex::from_segments(&segments);

        let mut rows = Vec::with_capacity(limit);
        let Some((mut segment_idx, mut intra_offset)) = index.locate(offset) else {
            return Ok(rows);
        };

        while rows.len() < limit && segment_idx < segments.len() {
            let segment = segments[segment_idx];
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .from_path(&segment.location)?;
            for result in reader.records().skip(intra_offset as usize) {
                if rows.len() >= limit {
                    break;
                }
                let record = result?;
                rows.push(record.iter().map(|f| f.to_string()).collect());
            }
            segment_idx += 1;
            intra_offset = 0;
        }
        Ok(rows)
    }

    fn delete_job(&self, job_id: &str) -> Result<()> {
        let record = self.read_record(job_id)?;
        for segment in &record.segments {
            if segment.location.exists() {
                fs::remove_file(&segment.location)?;
            }
        }
        fs::remove_file(self.job_path(job_id))?;
        log::info!("Deleted job {} and {} segments", job_id, record.segments.len());
        Ok(())
    }
}

/// Seed a new job record in the store, returning its id
pub fn register_job(
    store: &dyn ResultStore,
    dataset_a: &crate::dataset::Dataset,
    dataset_b: &crate::dataset::Dataset,
    key_columns: &[String],
) -> Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    let record = JobRecord::new(
        id.clone(),
        dataset_a.path.clone(),
        dataset_b.path.clone(),
        dataset_a.fingerprint()?,
        dataset_b.fingerprint()?,
        key_columns.to_vec(),
    );
    store.create_job(record)?;
    Ok(id)
}
