//! Error types for keydiff operations

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeydiffError>;

/// Which dataset of a comparison pair an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DatasetSide {
    A,
    B,
}

impl std::fmt::Display for DatasetSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetSide::A => write!(f, "A"),
            DatasetSide::B => write!(f, "B"),
        }
    }
}

#[derive(Error, Debug)]
pub enum KeydiffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Schema error in dataset {side}: column '{column}' not found (available: {})", available.join(", "))]
    Schema {
        side: DatasetSide,
        column: String,
        available: Vec<String>,
    },

    #[error("Resource exhaustion in dataset {side} at chunk {chunk_index}: {message}")]
    ResourceExhaustion {
        side: DatasetSide,
        chunk_index: u64,
        message: String,
    },

    #[error("Result store error: {message}")]
    Store { message: String },

    #[error("Workspace error: {message}")]
    Workspace { message: String },

    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl KeydiffError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn schema(side: DatasetSide, column: impl Into<String>, available: Vec<String>) -> Self {
        Self::Schema {
            side,
            column: column.into(),
            available,
        }
    }

    pub fn resource_exhaustion(
        side: DatasetSide,
        chunk_index: u64,
        msg: impl Into<String>,
    ) -> Self {
        Self::ResourceExhaustion {
            side,
            chunk_index,
            message: msg.into(),
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store {
            message: msg.into(),
        }
    }

    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace {
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Job-terminating errors abort the owning job but leave the process and
    /// concurrent jobs untouched.
    pub fn is_job_terminating(&self) -> bool {
        !matches!(self, Self::Config { .. } | Self::InvalidInput { .. })
    }
}
