//! Common test utilities and helpers

use keydiff::dataset::{Dataset, Delimiter};
use keydiff::{KeydiffWorkspace, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test fixture manager for creating temporary test environments
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub workspace: KeydiffWorkspace,
}

impl TestFixture {
    /// Create a new test fixture with an initialized workspace
    pub fn new() -> Result<Self> {
        let _ = env_logger::builder().is_test(true).try_init();
        let temp_dir = TempDir::new()?;
        let workspace = KeydiffWorkspace::create_new(temp_dir.path().to_path_buf())?;
        Ok(Self {
            temp_dir,
            workspace,
        })
    }

    /// Get the root path of the test fixture
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a delimited file from row slices
    pub fn create_csv(&self, name: &str, delimiter: char, data: &[Vec<&str>]) -> Result<PathBuf> {
        let path = self.root().join(name);
        let mut content = String::new();
        for row in data {
            content.push_str(&row.join(&delimiter.to_string()));
            content.push('\n');
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a file with raw string content
    pub fn create_raw(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.root().join(name);
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a comma-delimited file and open its dataset descriptor
    pub fn dataset(&self, name: &str, content: &str) -> Result<Dataset> {
        let path = self.create_raw(name, content)?;
        Dataset::open(&path, Some(Delimiter::Comma))
    }

    /// Generate a csv of `rows` records keyed 0..rows with an offset payload
    pub fn numbered_csv(&self, name: &str, rows: u64, offset: u64) -> Result<Dataset> {
        let mut content = String::from("k,v\n");
        for i in 0..rows {
            content.push_str(&format!("{},{}\n", i + offset, i));
        }
        self.dataset(name, &content)
    }
}
