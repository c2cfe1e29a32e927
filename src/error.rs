// Error taxonomy for the indexing/query engine (spec §7).
//
// Per-file and per-batch failures are data, not propagated errors: they are
// collected into `IndexResult::errors`/`warnings` by the orchestrator so a
// single malformed file never aborts a run. `FelixError` is reserved for
// failures that legitimately stop the *current* operation (input errors,
// exhausted store retries, other fatal errors).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FelixError {
    #[error("invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("unknown project: {name_or_path}")]
    UnknownProject { name_or_path: String },

    #[error("path does not exist or is not readable: {0}")]
    InvalidPath(PathBuf),

    #[error("store contention exceeded {attempts} attempts for {operation}")]
    StoreContentionExhausted { operation: String, attempts: u32 },

    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("fatal pipeline error: {0}")]
    Fatal(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FelixError>;

/// A single per-file or per-batch failure recorded on an indexing result.
/// Not a `FelixError` variant: these never unwind, they accumulate.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IndexingIssue {
    pub file_path: Option<PathBuf>,
    pub message: String,
    pub category: IssueCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum IssueCategory {
    ParseFailure,
    StoreContention,
    Embedding,
    DocResolution,
}

impl IndexingIssue {
    pub fn new(category: IssueCategory, message: impl Into<String>) -> Self {
        Self {
            file_path: None,
            message: message.into(),
            category,
        }
    }

    pub fn for_file(mut self, file_path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }
}
