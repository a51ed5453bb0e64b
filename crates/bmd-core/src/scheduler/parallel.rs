//! Run a batch of jobs across a bounded worker pool.
//!
//! Keeps up to `workers` jobs in flight; when one finishes, the next queued
//! job starts until the queue is empty. Results are collected in completion
//! order. The pool performs no retries of its own; retry logic lives in each
//! job's executor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::RunOptions;
use crate::fetch::Fetch;
use crate::job::{JobResult, JobSpec};

use super::run::run_one_job;

/// Run every job, at most `opts.workers` concurrently (sequentially when the
/// limit is 1 or less). Returns one result per job run, in completion order.
/// Setting `interrupt` stops new launches; in-flight jobs are awaited.
pub async fn run_jobs(
    specs: Vec<JobSpec>,
    opts: &RunOptions,
    fetcher: Arc<dyn Fetch>,
    interrupt: Arc<AtomicBool>,
) -> Vec<JobResult> {
    let workers = opts.workers.max(1);
    if workers == 1 {
        return run_sequential(specs, opts, fetcher, interrupt).await;
    }

    let mut results = Vec::with_capacity(specs.len());
    let mut queue = specs.into_iter();
    let mut join_set = tokio::task::JoinSet::new();

    loop {
        while join_set.len() < workers && !interrupt.load(Ordering::SeqCst) {
            let Some(spec) = queue.next() else {
                break;
            };
            let opts = opts.clone();
            let fetcher = Arc::clone(&fetcher);
            join_set.spawn(async move { run_one_job(spec, opts, fetcher).await });
        }

        if join_set.is_empty() {
            break;
        }

        let Some(res) = join_set.join_next().await else {
            break;
        };
        match res {
            Ok(result) => results.push(result),
            Err(e) => tracing::error!("job task join: {}", e),
        }
    }

    let remaining = queue.len();
    if remaining > 0 {
        tracing::warn!("interrupted; {} job(s) not started", remaining);
    }
    results
}

async fn run_sequential(
    specs: Vec<JobSpec>,
    opts: &RunOptions,
    fetcher: Arc<dyn Fetch>,
    interrupt: Arc<AtomicBool>,
) -> Vec<JobResult> {
    let mut results = Vec::with_capacity(specs.len());
    let mut skipped = 0usize;
    for spec in specs {
        if interrupt.load(Ordering::SeqCst) {
            skipped += 1;
            continue;
        }
        results.push(run_one_job(spec, opts.clone(), Arc::clone(&fetcher)).await);
    }
    if skipped > 0 {
        tracing::warn!("interrupted; {} job(s) not started", skipped);
    }
    results
}
