//! Chunked export of full rows into categorized, bounded segments
//!
//! Re-scans each dataset once, routes every row by its composite key's
//! category, and writes bounded segments that are registered in the result
//! store the moment they complete, so consumers can page through finished
//! segments while later ones are still being produced. Matched rows are
//! emitted once, from dataset A, by convention. All rows sharing a key are
//! exported under that key's category; nothing is deduplicated.

use crate::compare::{Category, ComparisonResult, JobContext, JobState};
use crate::config::ExportConfig;
use crate::dataset::Dataset;
use crate::error::{DatasetSide, KeydiffError, Result};
use crate::evaluate::composite_key;
use crate::progress::Stage;
use crate::store::{ResultStore, SegmentRecord};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Exported row totals per category. These count rows, not distinct keys:
/// duplicate-key rows all land in their key's category.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExportTotals {
    pub matched_rows: u64,
    pub only_a_rows: u64,
    pub only_b_rows: u64,
    pub segments: u64,
}

/// Writes one category's rows as a sequence of bounded csv segments.
/// Segments are created lazily on the first row and registered immediately
/// once full, so no empty segment files exist.
struct SegmentWriter<'a> {
    category: Category,
    header: Vec<String>,
    dir: &'a Path,
    job_id: &'a str,
    store: &'a dyn ResultStore,
    segment_rows: u64,
    cap: Option<u64>,
    writer: Option<csv::Writer<File>>,
    current_path: Option<PathBuf>,
    rows_in_segment: u64,
    total_rows: u64,
    sequence: u64,
}

impl<'a> SegmentWriter<'a> {
    fn new(
        category: Category,
        header: Vec<String>,
        dir: &'a Path,
        job_id: &'a str,
        store: &'a dyn ResultStore,
        segment_rows: u64,
        cap: Option<u64>,
    ) -> Self {
        Self {
            category,
            header,
            dir,
            job_id,
            store,
            segment_rows,
            cap,
            writer: None,
            current_path: None,
            rows_in_segment: 0,
            total_rows: 0,
            sequence: 0,
        }
    }

    fn is_capped(&self) -> bool {
        self.cap.is_some_and(|cap| self.total_rows >= cap)
    }

    /// Write one row unless the category cap is reached. Returns whether the
    /// row was written.
    fn write_row(&mut self, row: &[String]) -> Result<bool> {
        if self.is_capped() {
            return Ok(false);
        }

        if self.writer.is_none() {
            let path = self.dir.join(format!(
                "{}-{:05}.csv",
                self.category.as_str(),
                self.sequence
            ));
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record(&self.header)?;
            self.writer = Some(writer);
            self.current_path = Some(path);
        }

        // Writer is present after the block above.
        self.writer.as_mut().unwrap().write_record(row)?;
        self.rows_in_segment += 1;
        self.total_rows += 1;

        if self.rows_in_segment >= self.segment_rows || self.is_capped() {
            self.finish_segment()?;
        }
        Ok(true)
    }

    /// Close the live segment and register it with the store
    fn finish_segment(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.flush()?;
        drop(writer);

        let location = self
            .current_path
            .take()
            .ok_or_else(|| KeydiffError::store("segment path missing at finish"))?;
        let byte_size = std::fs::metadata(&location)?.len();

        self.store.record_segment(
            self.job_id,
            SegmentRecord {
                category: self.category,
                sequence: self.sequence,
                row_count: self.rows_in_segment,
                byte_size,
                location,
            },
        )?;

        log::debug!(
            "Registered segment {} #{} ({} rows, {} bytes)",
            self.category.as_str(),
            self.sequence,
            self.rows_in_segment,
            byte_size
        );
        self.sequence += 1;
        self.rows_in_segment = 0;
        Ok(())
    }

    fn finalize(&mut self) -> Result<u64> {
        self.finish_segment()?;
        Ok(self.total_rows)
    }

    fn segment_count(&self) -> u64 {
        self.sequence
    }
}

/// Streams both datasets once more and partitions full rows into registered
/// segment files
pub struct ChunkedExporter<'a> {
    config: ExportConfig,
    store: &'a dyn ResultStore,
    job_id: &'a str,
    segments_dir: PathBuf,
    key_columns: Vec<String>,
    chunk_size: Option<usize>,
}

impl<'a> ChunkedExporter<'a> {
    pub fn new(
        config: ExportConfig,
        store: &'a dyn ResultStore,
        job_id: &'a str,
        segments_dir: impl Into<PathBuf>,
        key_columns: Vec<String>,
    ) -> Result<Self> {
        config.validate()?;
        let segments_dir = segments_dir.into();
        std::fs::create_dir_all(&segments_dir)?;
        Ok(Self {
            config,
            store,
            job_id,
            segments_dir,
            key_columns,
            chunk_size: None,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Export all three categories: matched and only-A from dataset A,
    /// only-B from dataset B.
    pub fn run(
        &self,
        dataset_a: &Dataset,
        dataset_b: &Dataset,
        result: &ComparisonResult,
        ctx: &JobContext,
    ) -> Result<ExportTotals> {
        ctx.set_state(JobState::Export);

        let mut matched_writer = self.writer(Category::Matched, dataset_a.columns.clone());
        let mut only_a_writer = self.writer(Category::OnlyA, dataset_a.columns.clone());
        let mut only_b_writer = self.writer(Category::OnlyB, dataset_b.columns.clone());

        self.scan_side(
            dataset_a,
            DatasetSide::A,
            result,
            &mut [&mut matched_writer, &mut only_a_writer],
            ctx,
        )?;
        self.scan_side(dataset_b, DatasetSide::B, result, &mut [&mut only_b_writer], ctx)?;

        let matched_rows = matched_writer.finalize()?;
        let only_a_rows = only_a_writer.finalize()?;
        let only_b_rows = only_b_writer.finalize()?;
        let segments = matched_writer.segment_count()
            + only_a_writer.segment_count()
            + only_b_writer.segment_count();

        ctx.emit(
            Stage::Export,
            100.0,
            &format!(
                "Exported {} matched, {} only-A, {} only-B rows in {} segments",
                matched_rows, only_a_rows, only_b_rows, segments
            ),
        );

        Ok(ExportTotals {
            matched_rows,
            only_a_rows,
            only_b_rows,
            segments,
        })
    }

    fn writer(&self, category: Category, header: Vec<String>) -> SegmentWriter<'_> {
        let cap = match category {
            Category::Matched => self.config.caps.matched,
            Category::OnlyA => self.config.caps.only_a,
            Category::OnlyB => self.config.caps.only_b,
        };
        SegmentWriter::new(
            category,
            header,
            &self.segments_dir,
            self.job_id,
            self.store,
            self.config.segment_rows,
            cap,
        )
    }

    /// Route one dataset's rows into the writers handling its categories.
    /// Stops early once every writer for this side is capped.
    fn scan_side(
        &self,
        dataset: &Dataset,
        side: DatasetSide,
        result: &ComparisonResult,
        writers: &mut [&mut SegmentWriter<'_>],
        ctx: &JobContext,
    ) -> Result<()> {
        let indices = dataset.resolve_columns(side, &self.key_columns)?;
        let chunk_size = self
            .chunk_size
            .unwrap_or_else(|| dataset.default_chunk_size());
        let mut reader = dataset.chunks(chunk_size)?;
        let mut rows_scanned = 0u64;

        'chunks: loop {
            if ctx.is_cancelled() {
                return Err(KeydiffError::Cancelled);
            }
            if writers.iter().all(|w| w.is_capped()) {
                break;
            }
            let chunk = match reader.next_chunk()? {
                Some(chunk) => chunk,
                None => break,
            };

            for row in &chunk.rows {
                let key = composite_key(row, &indices);
                let category = match result.category_of(&key) {
                    Some(category) => category,
                    // Row cap during extraction can leave keys uncategorized
                    None => continue,
                };
                // Matched rows come from A only; B contributes only-B rows.
                if side == DatasetSide::B && category != Category::OnlyB {
                    continue;
                }
                for writer in writers.iter_mut() {
                    if writer.category == category {
                        writer.write_row(row)?;
                        break;
                    }
                }
            }
            rows_scanned += chunk.rows.len() as u64;

            let percent = dataset
                .row_count
                .filter(|&n| n > 0)
                .map(|n| rows_scanned as f64 / n as f64 * 100.0)
                .unwrap_or(0.0);
            ctx.emit(
                Stage::Export,
                percent,
                &format!("dataset {}: {} rows partitioned", side, rows_scanned),
            );

            if writers.iter().all(|w| w.is_capped()) {
                break 'chunks;
            }
        }
        Ok(())
    }
}
