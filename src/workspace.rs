//! Workspace management for keydiff output and metadata

use crate::error::Result;
use crate::job::JobRunner;
use crate::store::JsonResultStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Manages the .keydiff workspace directory: job metadata lives under
/// `.keydiff/jobs/`, exported segments under `.keydiff/output/<job-id>/`.
#[derive(Debug, Clone)]
pub struct KeydiffWorkspace {
    /// Project root directory (where .keydiff/ lives)
    pub root: PathBuf,
    /// .keydiff/ directory path
    pub keydiff_dir: PathBuf,
    /// .keydiff/output/ directory holding per-job segment files
    pub output_dir: PathBuf,
}

impl KeydiffWorkspace {
    /// Find existing workspace or create a new one
    pub fn find_or_create(start_dir: Option<&Path>) -> Result<Self> {
        let current_dir = std::env::current_dir()?;
        let start = start_dir.unwrap_or(&current_dir);

        if let Some(workspace) = Self::find_existing(start) {
            return Ok(workspace);
        }
        Self::create_new(start.to_path_buf())
    }

    /// Find an existing .keydiff workspace by walking up the directory tree
    fn find_existing(start_dir: &Path) -> Option<Self> {
        let mut current = start_dir;
        loop {
            let keydiff_dir = current.join(".keydiff");
            if keydiff_dir.is_dir() {
                return Self::from_root(current.to_path_buf()).ok();
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => return None,
            }
        }
    }

    /// Create a new workspace in the specified root directory
    pub fn create_new(root: PathBuf) -> Result<Self> {
        let workspace = Self::from_root(root)?;

        fs::create_dir_all(&workspace.keydiff_dir)?;
        fs::create_dir_all(&workspace.output_dir)?;
        workspace.create_config()?;

        log::info!("Created keydiff workspace at: {}", workspace.root.display());
        Ok(workspace)
    }

    /// Create workspace from root directory path
    pub fn from_root(root: PathBuf) -> Result<Self> {
        let keydiff_dir = root.join(".keydiff");
        let output_dir = keydiff_dir.join("output");
        Ok(Self {
            root,
            keydiff_dir,
            output_dir,
        })
    }

    /// Open the file-backed result store for this workspace
    pub fn store(&self) -> Result<JsonResultStore> {
        JsonResultStore::new(&self.keydiff_dir)
    }

    /// Build a job runner writing segments under this workspace
    pub fn runner(&self) -> Result<JobRunner> {
        let store = Arc::new(self.store()?);
        Ok(JobRunner::new(store, self.output_dir.clone()))
    }

    /// Segment directory for one job
    pub fn job_output_dir(&self, job_id: &str) -> PathBuf {
        self.output_dir.join(job_id)
    }

    /// List all recorded job ids
    pub fn list_jobs(&self) -> Result<Vec<String>> {
        let jobs_dir = self.keydiff_dir.join("jobs");
        let mut jobs = Vec::new();
        if !jobs_dir.exists() {
            return Ok(jobs);
        }
        for entry in fs::read_dir(&jobs_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    jobs.push(stem.to_string());
                }
            }
        }
        jobs.sort();
        Ok(jobs)
    }

    /// Create the initial configuration file, keeping an existing one
    fn create_config(&self) -> Result<()> {
        let config_path = self.keydiff_dir.join("config.json");
        if config_path.exists() {
            return Ok(());
        }
        let config = serde_json::json!({
            "version": crate::FORMAT_VERSION,
            "created": chrono::Utc::now(),
            "default_chunk_size": crate::DEFAULT_CHUNK_SIZE,
            "default_sample_size": crate::DEFAULT_SAMPLE_SIZE,
            "default_segment_rows": crate::DEFAULT_SEGMENT_ROWS,
        });
        fs::write(config_path, serde_json::to_string_pretty(&config)?)?;
        Ok(())
    }

    /// Get workspace statistics
    pub fn stats(&self) -> Result<WorkspaceStats> {
        let jobs = self.list_jobs()?;

        let mut segment_count = 0;
        let mut total_segment_size = 0u64;
        if self.output_dir.exists() {
            for entry in WalkDir::new(&self.output_dir) {
                let entry = entry?;
                if entry.file_type().is_file() {
                    segment_count += 1;
                    total_segment_size += entry.metadata()?.len();
                }
            }
        }

        Ok(WorkspaceStats {
            job_count: jobs.len(),
            segment_count,
            total_segment_size,
        })
    }

    /// Remove a job's metadata and all its segment files
    pub fn cleanup_job(&self, job_id: &str) -> Result<()> {
        use crate::store::ResultStore;

        let store = self.store()?;
        store.delete_job(job_id)?;
        let job_dir = self.job_output_dir(job_id);
        if job_dir.exists() {
            fs::remove_dir_all(&job_dir)?;
        }
        Ok(())
    }

    /// Remove all but the `keep_latest` most recently created jobs
    pub fn cleanup(&self, keep_latest: usize) -> Result<CleanupStats> {
        use crate::store::ResultStore;

        let store = self.store()?;
        let mut jobs_with_time = Vec::new();
        for job_id in self.list_jobs()? {
            match store.get_job(&job_id) {
                Ok(record) => jobs_with_time.push((job_id, record.created)),
                Err(e) => {
                    log::warn!("Skipping unreadable job record {}: {}", job_id, e);
                }
            }
        }
        jobs_with_time.sort_by_key(|(_, created)| *created);

        let mut stats = CleanupStats::default();
        let remove_count = jobs_with_time.len().saturating_sub(keep_latest);
        for (job_id, _) in jobs_with_time.iter().take(remove_count) {
            let record = store.get_job(job_id)?;
            stats.bytes_freed += record.segments.iter().map(|s| s.byte_size).sum::<u64>();
            self.cleanup_job(job_id)?;
            stats.jobs_removed += 1;
            log::info!("Removed old job: {}", job_id);
        }
        Ok(stats)
    }
}

/// Statistics about the workspace
#[derive(Debug, Default)]
pub struct WorkspaceStats {
    pub job_count: usize,
    pub segment_count: usize,
    pub total_segment_size: u64,
}

/// Statistics about cleanup operations
#[derive(Debug, Default)]
pub struct CleanupStats {
    pub jobs_removed: usize,
    pub bytes_freed: u64,
}
