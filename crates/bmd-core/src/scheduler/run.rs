//! Run one job end to end: gate, fetch with retry, post-processing.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config::RunOptions;
use crate::fetch::{self, Fetch, TransferError};
use crate::gate;
use crate::job::{JobResult, JobSpec};
use crate::manifest;
use crate::report;
use crate::retry::RetryDecision;
use crate::verify;

/// Execute one job and always produce its result. Fetch failures are retried
/// per the run's policy; a failure after the fetch has succeeded (manifest,
/// verification, assembly, sizing) is recorded into the result without
/// re-fetching data that already landed.
pub async fn run_one_job(spec: JobSpec, opts: RunOptions, fetcher: Arc<dyn Fetch>) -> JobResult {
    let started = Instant::now();
    tracing::info!(repo = %spec.repo_id, dest = %spec.dest.display(), "job started");

    // Gate before any transfer: the destination must exist and have room.
    if let Err(e) = gate::ensure_dir(&spec.dest) {
        tracing::error!(repo = %spec.repo_id, "gate failed: {}", e);
        return JobResult::failed(spec.repo_id, started.elapsed(), e.to_string());
    }
    if let Err(e) = gate::check_capacity(&spec.dest, opts.min_disk_gb) {
        tracing::error!(repo = %spec.repo_id, "gate failed: {}", e);
        return JobResult::failed(spec.repo_id, started.elapsed(), e.to_string());
    }

    if let Err(e) = fetch_with_retry(&spec, &opts, &fetcher).await {
        return JobResult::failed(spec.repo_id, started.elapsed(), e.to_string());
    }

    let post = {
        let spec = spec.clone();
        let opts = opts.clone();
        tokio::task::spawn_blocking(move || post_process(&spec, &opts)).await
    };
    let (size_bytes, merged_path) = match post {
        Ok(Ok(v)) => v,
        Ok(Err(e)) => {
            tracing::error!(repo = %spec.repo_id, "post-processing failed: {:#}", e);
            return JobResult::failed(spec.repo_id, started.elapsed(), format!("{e:#}"));
        }
        Err(e) => {
            tracing::error!(repo = %spec.repo_id, "post-processing task join: {}", e);
            return JobResult::failed(spec.repo_id, started.elapsed(), e.to_string());
        }
    };

    tracing::info!(repo = %spec.repo_id, size_bytes, "job completed");
    JobResult::ok(spec.repo_id, started.elapsed(), size_bytes, merged_path)
}

/// Attempt the fetch until it succeeds or the policy stops retrying. Backoff
/// suspends only this job; sibling workers keep running.
async fn fetch_with_retry(
    spec: &JobSpec,
    opts: &RunOptions,
    fetcher: &Arc<dyn Fetch>,
) -> Result<(), TransferError> {
    let patterns = fetch::wrap_patterns(&spec.patterns);
    let mut attempt = 1u32;
    loop {
        tracing::info!(repo = %spec.repo_id, attempt, "downloading");
        let task = {
            let fetcher = Arc::clone(fetcher);
            let repo_id = spec.repo_id.clone();
            let patterns = patterns.clone();
            let dest = spec.dest.clone();
            tokio::task::spawn_blocking(move || fetcher.fetch(&repo_id, &patterns, &dest))
        };
        let err = match task.await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e,
            Err(e) => TransferError::new(format!("fetch task join: {e}")),
        };
        tracing::error!(repo = %spec.repo_id, attempt, "download attempt failed: {}", err);

        match opts.retry.decide(attempt) {
            RetryDecision::NoRetry => {
                tracing::error!(repo = %spec.repo_id, attempts = attempt, "retries exhausted");
                return Err(err);
            }
            RetryDecision::RetryAfter(delay) => {
                tracing::info!(
                    repo = %spec.repo_id,
                    wait_secs = delay.as_secs_f64(),
                    "retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Post-download pipeline, strictly sequential for one job: manifest,
/// checksum verification, part assembly, size report.
fn post_process(spec: &JobSpec, opts: &RunOptions) -> Result<(u64, Option<PathBuf>)> {
    if !opts.skip_manifest {
        let path = manifest::write_manifest(&spec.dest)?;
        tracing::info!(repo = %spec.repo_id, path = %path.display(), "manifest written");
    }

    if !opts.skip_verify {
        let outcomes = verify::verify_dir(&spec.dest)?;
        let mismatches = outcomes
            .iter()
            .filter(|o| matches!(o, verify::VerifyOutcome::Mismatch { .. }))
            .count();
        if mismatches > 0 {
            tracing::error!(repo = %spec.repo_id, mismatches, "checksum mismatches recorded");
        }
    }

    let merged_path = crate::assemble::assemble_parts(&spec.dest)?;
    let size_bytes = report::dir_size_bytes(&spec.dest)?;
    Ok((size_bytes, merged_path))
}
