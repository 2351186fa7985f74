//! Dataset descriptors and chunked streaming reads over delimited files

use crate::error::{DatasetSide, KeydiffError, Result};
use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Supported field delimiters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    Comma,
    Pipe,
    Tab,
    Semicolon,
    Space,
}

impl Delimiter {
    pub fn as_byte(&self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Pipe => b'|',
            Delimiter::Tab => b'\t',
            Delimiter::Semicolon => b';',
            Delimiter::Space => b' ',
        }
    }

    /// All delimiters considered during sniffing, in preference order
    pub fn all() -> [Delimiter; 5] {
        [
            Delimiter::Comma,
            Delimiter::Pipe,
            Delimiter::Tab,
            Delimiter::Semicolon,
            Delimiter::Space,
        ]
    }
}

impl FromStr for Delimiter {
    type Err = KeydiffError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "," | "comma" => Ok(Delimiter::Comma),
            "|" | "pipe" => Ok(Delimiter::Pipe),
            "\t" | "tab" => Ok(Delimiter::Tab),
            ";" | "semicolon" => Ok(Delimiter::Semicolon),
            " " | "space" => Ok(Delimiter::Space),
            other => Err(KeydiffError::invalid_input(format!(
                "Unsupported delimiter: '{}'",
                other
            ))),
        }
    }
}

/// Descriptor for one delimited dataset. Built once by an upstream inspection
/// step and reused across every phase that touches the same file, so all
/// phases parse columns identically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub path: PathBuf,
    pub delimiter: Delimiter,
    /// Encoding label understood by encoding_rs ("utf-8", "windows-1252", ...)
    pub encoding: String,
    /// Ordered column names from the header row
    pub columns: Vec<String>,
    /// Exact count or sampled estimate; None when unknown
    pub row_count: Option<u64>,
}

impl Dataset {
    /// Build a descriptor from an already-inspected source. Validates that the
    /// file exists but reads no data.
    pub fn new(
        path: impl Into<PathBuf>,
        delimiter: Delimiter,
        encoding: impl Into<String>,
        columns: Vec<String>,
    ) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(KeydiffError::SourceNotFound { path });
        }
        Ok(Self {
            path,
            delimiter,
            encoding: encoding.into(),
            columns,
            row_count: None,
        })
    }

    /// Open a file and build its descriptor by reading the header row.
    /// Sniffs the delimiter only when the caller supplies none; a stored
    /// descriptor always wins over re-detection.
    pub fn open(path: impl Into<PathBuf>, delimiter: Option<Delimiter>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(KeydiffError::SourceNotFound { path });
        }

        let delimiter = match delimiter {
            Some(d) => d,
            None => sniff_delimiter(&path)?,
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter.as_byte())
            .has_headers(true)
            .flexible(true)
            .from_path(&path)?;
        let columns = reader
            .byte_headers()?
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect();

        Ok(Self {
            path,
            delimiter,
            encoding: "utf-8".to_string(),
            columns,
            row_count: None,
        })
    }

    pub fn with_row_count(mut self, row_count: u64) -> Self {
        self.row_count = Some(row_count);
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Resolve column names to header indices, failing with the dataset side
    /// and the full list of available columns on the first miss.
    pub fn resolve_columns(&self, side: DatasetSide, names: &[String]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| KeydiffError::schema(side, name.clone(), self.columns.clone()))
            })
            .collect()
    }

    /// Chunk size tuned to the declared dataset size: small files get small
    /// chunks for responsive progress, large files get large chunks to cut
    /// per-chunk overhead.
    pub fn default_chunk_size(&self) -> usize {
        match self.row_count {
            Some(n) if n < 10_000 => 1_000,
            Some(n) if n < 100_000 => 10_000,
            Some(n) if n < 1_000_000 => 50_000,
            Some(_) => 200_000,
            None => crate::DEFAULT_CHUNK_SIZE,
        }
    }

    /// Stable fingerprint of the source file and its schema, used to key job
    /// identity and idempotence checks.
    pub fn fingerprint(&self) -> Result<String> {
        let meta = std::fs::metadata(&self.path)?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.path.to_string_lossy().as_bytes());
        hasher.update(&meta.len().to_le_bytes());
        if let Ok(modified) = meta.modified() {
            if let Ok(elapsed) = modified.duration_since(std::time::UNIX_EPOCH) {
                hasher.update(&elapsed.as_secs().to_le_bytes());
            }
        }
        for column in &self.columns {
            hasher.update(column.as_bytes());
            hasher.update(&[0]);
        }
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Start a chunked scan of the data rows. Each call reopens the source;
    /// an individual reader is a one-shot, forward-only stream.
    pub fn chunks(&self, chunk_size: usize) -> Result<ChunkReader> {
        ChunkReader::open(self, chunk_size, None)
    }

    /// Chunked scan that stops deterministically after `max_rows` data rows.
    pub fn chunks_capped(&self, chunk_size: usize, max_rows: u64) -> Result<ChunkReader> {
        ChunkReader::open(self, chunk_size, Some(max_rows))
    }
}

/// Detect the most plausible delimiter from the header line. Used only as a
/// fallback for sources without a stored descriptor.
pub fn sniff_delimiter(path: &Path) -> Result<Delimiter> {
    let file = File::open(path).map_err(|_| KeydiffError::SourceNotFound {
        path: path.to_path_buf(),
    })?;
    let mut first_line = String::new();
    BufReader::new(file).read_line(&mut first_line)?;

    let mut best = Delimiter::Comma;
    let mut best_count = 0;
    for candidate in Delimiter::all() {
        let count = first_line
            .bytes()
            .filter(|&b| b == candidate.as_byte())
            .count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    Ok(best)
}

/// A bounded, contiguous slice of decoded rows
#[derive(Debug)]
pub struct RowChunk {
    /// Zero-based chunk sequence number
    pub index: u64,
    /// Zero-based index of the first data row in this chunk
    pub start_row: u64,
    pub rows: Vec<Vec<String>>,
    /// Malformed rows skipped while filling this chunk
    pub malformed: u64,
}

/// Lazy, finite sequence of row chunks over one dataset. Not restartable:
/// rescanning requires a fresh reader from the descriptor.
pub struct ChunkReader {
    reader: csv::Reader<File>,
    encoding: &'static Encoding,
    expected_fields: usize,
    chunk_size: usize,
    max_rows: Option<u64>,
    rows_read: u64,
    malformed_total: u64,
    next_index: u64,
    done: bool,
}

impl ChunkReader {
    fn open(dataset: &Dataset, chunk_size: usize, max_rows: Option<u64>) -> Result<Self> {
        if chunk_size == 0 {
            return Err(KeydiffError::config("chunk size must be positive"));
        }
        if !dataset.path.is_file() {
            return Err(KeydiffError::SourceNotFound {
                path: dataset.path.clone(),
            });
        }
        let reader = csv::ReaderBuilder::new()
            .delimiter(dataset.delimiter.as_byte())
            .has_headers(true)
            .flexible(true)
            .from_path(&dataset.path)?;
        let encoding =
            Encoding::for_label(dataset.encoding.as_bytes()).unwrap_or(UTF_8);

        Ok(Self {
            reader,
            encoding,
            expected_fields: dataset.columns.len(),
            chunk_size,
            max_rows,
            rows_read: 0,
            malformed_total: 0,
            next_index: 0,
            done: false,
        })
    }

    /// Read the next chunk, or None when the source (or the row cap) is
    /// exhausted. Rows with the wrong field count are skipped and counted,
    /// never fatal on their own.
    pub fn next_chunk(&mut self) -> Result<Option<RowChunk>> {
        if self.done {
            return Ok(None);
        }

        let start_row = self.rows_read;
        let mut rows = Vec::with_capacity(self.chunk_size);
        let mut malformed = 0u64;
        let mut record = csv::ByteRecord::new();

        while rows.len() < self.chunk_size {
            if let Some(cap) = self.max_rows {
                if self.rows_read >= cap {
                    self.done = true;
                    break;
                }
            }
            match self.reader.read_byte_record(&mut record) {
                Ok(false) => {
                    self.done = true;
                    break;
                }
                Ok(true) => {
                    if record.len() != self.expected_fields {
                        malformed += 1;
                        continue;
                    }
                    let row = record
                        .iter()
                        .map(|field| {
                            self.encoding
                                .decode_without_bom_handling(field)
                                .0
                                .into_owned()
                        })
                        .collect();
                    rows.push(row);
                    self.rows_read += 1;
                }
                Err(e) => {
                    if e.is_io_error() {
                        return Err(e.into());
                    }
                    // Parse-level problem with one record: count and move on
                    malformed += 1;
                }
            }
        }

        self.malformed_total += malformed;
        if rows.is_empty() && malformed == 0 {
            return Ok(None);
        }

        let chunk = RowChunk {
            index: self.next_index,
            start_row,
            rows,
            malformed,
        };
        self.next_index += 1;
        Ok(Some(chunk))
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn malformed_rows(&self) -> u64 {
        self.malformed_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_csv(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_open_reads_header() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "t.csv", "id,name,city\n1,alice,nyc\n");
        let ds = Dataset::open(&path, Some(Delimiter::Comma)).unwrap();
        assert_eq!(ds.columns, vec!["id", "name", "city"]);
    }

    #[test]
    fn test_sniff_pipe_delimiter() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "t.psv", "id|name|city\n1|alice|nyc\n");
        let ds = Dataset::open(&path, None).unwrap();
        assert_eq!(ds.delimiter, Delimiter::Pipe);
        assert_eq!(ds.columns.len(), 3);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let err = Dataset::open("/nonexistent/file.csv", None).unwrap_err();
        assert!(matches!(err, KeydiffError::SourceNotFound { .. }));
    }

    #[test]
    fn test_chunk_size_invariance_on_row_total() {
        let dir = TempDir::new().unwrap();
        let mut content = String::from("id,v\n");
        for i in 0..23 {
            content.push_str(&format!("{},{}\n", i, i * 2));
        }
        let path = write_csv(&dir, "t.csv", &content);
        let ds = Dataset::open(&path, Some(Delimiter::Comma)).unwrap();

        for chunk_size in [1usize, 10, 100] {
            let mut reader = ds.chunks(chunk_size).unwrap();
            let mut total = 0u64;
            while let Some(chunk) = reader.next_chunk().unwrap() {
                total += chunk.rows.len() as u64;
            }
            assert_eq!(total, 23, "chunk size {} changed row total", chunk_size);
        }
    }

    #[test]
    fn test_malformed_rows_skipped_and_counted() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "t.csv", "id,v\n1,a\n2\n3,c,extra\n4,d\n");
        let ds = Dataset::open(&path, Some(Delimiter::Comma)).unwrap();
        let mut reader = ds.chunks(10).unwrap();
        let chunk = reader.next_chunk().unwrap().unwrap();
        assert_eq!(chunk.rows.len(), 2);
        assert_eq!(chunk.malformed, 2);
    }

    #[test]
    fn test_row_cap_halts_deterministically() {
        let dir = TempDir::new().unwrap();
        let mut content = String::from("id\n");
        for i in 0..100 {
            content.push_str(&format!("{}\n", i));
        }
        let path = write_csv(&dir, "t.csv", &content);
        let ds = Dataset::open(&path, Some(Delimiter::Comma)).unwrap();
        let mut reader = ds.chunks_capped(7, 30).unwrap();
        let mut total = 0u64;
        while let Some(chunk) = reader.next_chunk().unwrap() {
            total += chunk.rows.len() as u64;
        }
        assert_eq!(total, 30);
    }

    #[test]
    fn test_resolve_columns_reports_side() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "t.csv", "id,name\n1,a\n");
        let ds = Dataset::open(&path, Some(Delimiter::Comma)).unwrap();
        let err = ds
            .resolve_columns(DatasetSide::B, &["missing".to_string()])
            .unwrap_err();
        match err {
            KeydiffError::Schema {
                side,
                column,
                available,
            } => {
                assert_eq!(side, DatasetSide::B);
                assert_eq!(column, "missing");
                assert_eq!(available, vec!["id", "name"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_default_chunk_size_scales() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "t.csv", "id\n1\n");
        let ds = Dataset::open(&path, Some(Delimiter::Comma)).unwrap();
        assert_eq!(ds.clone().with_row_count(500).default_chunk_size(), 1_000);
        assert_eq!(
            ds.clone().with_row_count(5_000_000).default_chunk_size(),
            200_000
        );
    }
}
