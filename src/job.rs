//! Background execution of comparison jobs
//!
//! A spawned job runs the full compare-then-export pipeline on its own
//! thread and returns a handle immediately; callers poll the handle or the
//! result store. Each job owns its context, key sets, and segment files, so
//! concurrent jobs share no mutable state.

use crate::compare::{ComparisonEngine, JobContext, JobState};
use crate::config::CompareConfig;
use crate::dataset::Dataset;
use crate::error::{KeydiffError, Result};
use crate::export::{ChunkedExporter, ExportTotals};
use crate::progress::{NullSink, ProgressSink, Stage};
use crate::store::{CategoryCounts, JobSummary, ResultStore};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Final numbers from a completed job
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub key_counts: CategoryCounts,
    pub export: ExportTotals,
    pub rows_a: u64,
    pub rows_b: u64,
    pub malformed_a: u64,
    pub malformed_b: u64,
}

/// Handle to a running (or finished) background job
pub struct JobHandle {
    id: String,
    ctx: Arc<JobContext>,
    store: Arc<dyn ResultStore>,
    join: Mutex<Option<JoinHandle<Result<JobOutcome>>>>,
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle").field("id", &self.id).finish()
    }
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// In-memory state of the pipeline, updated per phase
    pub fn state(&self) -> JobState {
        self.ctx.state()
    }

    pub fn is_finished(&self) -> bool {
        self.join
            .lock()
            .unwrap()
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(true)
    }

    /// Request cancellation; honored before the next chunk read.
    pub fn cancel(&self) {
        self.ctx.cancel();
    }

    /// Persisted summary for polling callers
    pub fn summary(&self) -> Result<JobSummary> {
        self.store.get_summary(&self.id)
    }

    /// Block until the job finishes and return its outcome
    pub fn join(&self) -> Result<JobOutcome> {
        let handle = self
            .join
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| KeydiffError::invalid_input("job already joined"))?;
        handle
            .join()
            .map_err(|_| KeydiffError::store("job thread panicked"))?
    }
}

/// Spawns comparison jobs against a shared result store
pub struct JobRunner {
    store: Arc<dyn ResultStore>,
    segments_root: PathBuf,
}

impl JobRunner {
    pub fn new(store: Arc<dyn ResultStore>, segments_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            segments_root: segments_root.into(),
        }
    }

    /// Validate the configuration, register the job, and start it on a
    /// background thread. Returns the handle without waiting for completion;
    /// invalid configurations are rejected before any data file is read.
    pub fn spawn(
        &self,
        dataset_a: Dataset,
        dataset_b: Dataset,
        config: CompareConfig,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<JobHandle> {
        config.validate()?;

        let job_id =
            crate::store::register_job(self.store.as_ref(), &dataset_a, &dataset_b, &config.key_columns)?;
        let ctx = Arc::new(JobContext::new(sink));
        let segments_dir = self.segments_root.join(&job_id).join("segments");

        let store = Arc::clone(&self.store);
        let thread_ctx = Arc::clone(&ctx);
        let thread_id = job_id.clone();
        let handle = std::thread::Builder::new()
            .name(format!("keydiff-job-{}", &job_id[..8]))
            .spawn(move || {
                let outcome = run_pipeline(
                    &dataset_a,
                    &dataset_b,
                    config,
                    store.as_ref(),
                    &thread_id,
                    segments_dir,
                    &thread_ctx,
                );
                match &outcome {
                    Ok(_) => {
                        thread_ctx.set_state(JobState::Done);
                        thread_ctx.emit(Stage::Done, 100.0, "Comparison complete");
                    }
                    Err(KeydiffError::Cancelled) => {
                        thread_ctx.set_state(JobState::Cancelled);
                        if let Err(e) = store.cancel_job(&thread_id) {
                            log::error!("Failed to mark job {} cancelled: {}", thread_id, e);
                        }
                    }
                    Err(e) => {
                        thread_ctx.set_state(JobState::Failed);
                        log::error!("Job {} failed: {}", thread_id, e);
                        if let Err(mark) = store.fail_job(&thread_id, &e.to_string()) {
                            log::error!("Failed to mark job {} failed: {}", thread_id, mark);
                        }
                    }
                }
                outcome
            })
            .map_err(|e| KeydiffError::store(format!("failed to spawn job thread: {}", e)))?;

        log::info!("Spawned comparison job {}", job_id);
        Ok(JobHandle {
            id: job_id,
            ctx,
            store: Arc::clone(&self.store),
            join: Mutex::new(Some(handle)),
        })
    }

    /// Convenience wrapper: spawn with no progress reporting
    pub fn spawn_headless(
        &self,
        dataset_a: Dataset,
        dataset_b: Dataset,
        config: CompareConfig,
    ) -> Result<JobHandle> {
        self.spawn(dataset_a, dataset_b, config, Arc::new(NullSink))
    }
}

fn run_pipeline(
    dataset_a: &Dataset,
    dataset_b: &Dataset,
    config: CompareConfig,
    store: &dyn ResultStore,
    job_id: &str,
    segments_dir: PathBuf,
    ctx: &JobContext,
) -> Result<JobOutcome> {
    let key_columns = config.key_columns.clone();
    let export_config = config.export.clone();
    let chunk_size = config.chunk_size;

    store.update_state(job_id, JobState::ExtractA)?;
    let engine = ComparisonEngine::new(config)?;
    let result = engine.run(dataset_a, dataset_b, ctx)?;

    let key_counts = CategoryCounts {
        matched: result.matched.len() as u64,
        only_a: result.only_a.len() as u64,
        only_b: result.only_b.len() as u64,
    };

    store.update_state(job_id, JobState::Export)?;
    let mut exporter =
        ChunkedExporter::new(export_config, store, job_id, segments_dir, key_columns)?;
    if let Some(chunk_size) = chunk_size {
        exporter = exporter.with_chunk_size(chunk_size);
    }
    let export = exporter.run(dataset_a, dataset_b, &result, ctx)?;

    store.finish_job(job_id, key_counts)?;
    Ok(JobOutcome {
        key_counts,
        export,
        rows_a: result.rows_a,
        rows_b: result.rows_b,
        malformed_a: result.malformed_a,
        malformed_b: result.malformed_b,
    })
}
