//! Result aggregation: directory sizing and the end-of-run summary.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::job::{JobResult, JobStatus};

const BYTES_PER_GB: f64 = 1_073_741_824.0;

/// Total size in bytes of every regular file under `dir`, recursively.
pub fn dir_size_bytes(dir: &Path) -> Result<u64> {
    let mut total = 0u64;
    for entry in fs::read_dir(dir).with_context(|| format!("list {}", dir.display()))? {
        let entry = entry.with_context(|| format!("list {}", dir.display()))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat {}", entry.path().display()))?;
        if file_type.is_dir() {
            total += dir_size_bytes(&entry.path())?;
        } else if file_type.is_file() {
            total += entry
                .metadata()
                .with_context(|| format!("stat {}", entry.path().display()))?
                .len();
        }
    }
    Ok(total)
}

/// Format a duration as whole minutes and seconds, e.g. `2m 5s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}

/// One human-readable line for a job outcome.
pub fn summary_line(result: &JobResult) -> String {
    match result.status {
        JobStatus::Ok => {
            let mut line = format!(
                "ok      {}  {}  {:.2} GB",
                result.repo_id,
                format_elapsed(result.elapsed),
                result.size_bytes as f64 / BYTES_PER_GB,
            );
            if let Some(merged) = &result.merged_path {
                line.push_str(&format!("  merged: {}", merged.display()));
            }
            line
        }
        JobStatus::Failed => format!(
            "failed  {}  {}  {}",
            result.repo_id,
            format_elapsed(result.elapsed),
            result.error.as_deref().unwrap_or("unknown error"),
        ),
    }
}

/// Print the per-job summary, one line per result in collection order, to
/// stdout and to the log.
pub fn print_summary(results: &[JobResult]) {
    println!();
    println!("Run summary ({} job(s)):", results.len());
    for result in results {
        let line = summary_line(result);
        println!("  {line}");
        tracing::info!("{}", line);
    }
}
