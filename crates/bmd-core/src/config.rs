//! Job-list configuration (JSON) and run options.
//!
//! The job list is an ordered JSON array of model descriptors. Loading is
//! fail-fast: a malformed file or a descriptor with missing fields aborts the
//! whole run before any job starts.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::retry::RetryPolicy;

/// One model descriptor from the job list.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    /// Organization the model belongs to (first path segment under the base dir).
    pub org: String,
    /// Model name (second path segment).
    pub model: String,
    /// Size/variant tag (third path segment).
    pub size: String,
    /// Remote repository identifier handed to the fetch tool.
    pub repo_id: String,
    /// Ordered quantization tags; each becomes a `*tag*` inclusion pattern.
    pub quant: Vec<String>,
}

/// Load the job list from a JSON file. Any parse or IO failure is fatal to
/// the run; an empty array is a valid, empty run.
pub fn load_entries(path: &Path) -> Result<Vec<ModelEntry>> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let entries: Vec<ModelEntry> =
        serde_json::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(entries)
}

/// Per-run knobs shared by every job.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Retry/backoff policy applied to each job's fetch attempts.
    pub retry: RetryPolicy,
    /// Minimum free space required at each destination, in GB. 0 disables the check.
    pub min_disk_gb: u64,
    /// Worker pool size; 1 runs jobs strictly sequentially.
    pub workers: usize,
    /// Skip writing `manifest.txt` after each download.
    pub skip_manifest: bool,
    /// Skip checksum-manifest verification after each download.
    pub skip_verify: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            min_disk_gb: 10,
            workers: 1,
            skip_manifest: false,
            skip_verify: false,
        }
    }
}
