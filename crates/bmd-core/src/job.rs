//! Job descriptors and terminal result records.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::ModelEntry;

/// Immutable descriptor of one download unit. Constructed once from the job
/// list; the destination is `<base>/<org>/<model>/<size>`.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub org: String,
    pub model: String,
    pub size: String,
    pub repo_id: String,
    /// Quantization tags, in job-list order. Wrapped as `*tag*` at fetch time.
    pub patterns: Vec<String>,
    pub dest: PathBuf,
}

impl JobSpec {
    pub fn from_entry(base: &Path, entry: ModelEntry) -> Self {
        let dest = base.join(&entry.org).join(&entry.model).join(&entry.size);
        Self {
            org: entry.org,
            model: entry.model,
            size: entry.size,
            repo_id: entry.repo_id,
            patterns: entry.quant,
            dest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Ok,
    Failed,
}

/// Outcome of one job. Produced exactly once per `JobSpec`, whatever happens.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub repo_id: String,
    pub status: JobStatus,
    /// Wall-clock time for the whole job, backoff waits included.
    pub elapsed: Duration,
    /// On-disk size of the destination after a successful job; 0 on failure.
    pub size_bytes: u64,
    /// Path of the merged file when split parts were assembled.
    pub merged_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl JobResult {
    pub fn ok(
        repo_id: String,
        elapsed: Duration,
        size_bytes: u64,
        merged_path: Option<PathBuf>,
    ) -> Self {
        Self {
            repo_id,
            status: JobStatus::Ok,
            elapsed,
            size_bytes,
            merged_path,
            error: None,
        }
    }

    pub fn failed(repo_id: String, elapsed: Duration, error: String) -> Self {
        Self {
            repo_id,
            status: JobStatus::Failed,
            elapsed,
            size_bytes: 0,
            merged_path: None,
            error: Some(error),
        }
    }
}
