//! Executor and worker-pool tests with a scripted fetch double.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{run_jobs, run_one_job};
use crate::config::{ModelEntry, RunOptions};
use crate::fetch::{Fetch, TransferError};
use crate::job::{JobSpec, JobStatus};
use crate::retry::RetryPolicy;

/// Fetch double: fails a scripted number of times per repo, then succeeds by
/// materializing one file in the destination. Tracks total invocations and
/// peak concurrent invocations.
struct MockFetch {
    failures: Mutex<HashMap<String, u32>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockFetch {
    fn reliable() -> Self {
        Self::with_failures(HashMap::new())
    }

    fn with_failures(failures: HashMap<String, u32>) -> Self {
        Self {
            failures: Mutex::new(failures),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

impl Fetch for MockFetch {
    fn fetch(&self, repo_id: &str, _patterns: &[String], dest: &Path) -> Result<(), TransferError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        // Hold the slot long enough that overlapping jobs are observable.
        std::thread::sleep(Duration::from_millis(20));

        let result = {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(repo_id) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    Err(TransferError::new("simulated transfer failure"))
                }
                _ => std::fs::write(dest.join("weights.bin"), b"weights")
                    .map_err(|e| TransferError::new(e.to_string())),
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn fast_opts(workers: usize) -> RunOptions {
    RunOptions {
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
        },
        min_disk_gb: 0,
        workers,
        skip_manifest: false,
        skip_verify: false,
    }
}

fn spec(base: &Path, n: usize) -> JobSpec {
    JobSpec::from_entry(
        base,
        ModelEntry {
            org: "org".to_string(),
            model: format!("m{n}"),
            size: "7b".to_string(),
            repo_id: format!("org/m{n}"),
            quant: vec!["Q4_K_M".to_string()],
        },
    )
}

#[tokio::test]
async fn one_result_per_job_at_any_worker_count() {
    for workers in [1usize, 2, 4, 8] {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MockFetch::reliable());
        let specs: Vec<JobSpec> = (0..5).map(|n| spec(tmp.path(), n)).collect();

        let results = run_jobs(
            specs,
            &fast_opts(workers),
            Arc::clone(&fetcher) as Arc<dyn Fetch>,
            Arc::new(AtomicBool::new(false)),
        )
        .await;

        assert_eq!(results.len(), 5, "workers={workers}");
        assert!(results.iter().all(|r| r.status == JobStatus::Ok));
        assert!(results.iter().all(|r| r.size_bytes > 0));
    }
}

#[cfg(unix)]
#[tokio::test]
async fn gate_failure_reaches_no_fetch() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetch::reliable());
    let mut opts = fast_opts(1);
    opts.min_disk_gb = 1 << 30;

    let result = run_one_job(
        spec(tmp.path(), 0),
        opts,
        Arc::clone(&fetcher) as Arc<dyn Fetch>,
    )
    .await;

    assert_eq!(result.status, JobStatus::Failed);
    assert!(result.error.as_deref().unwrap().contains("insufficient storage"));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn transient_failures_are_retried_to_success() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetch::with_failures(HashMap::from([(
        "org/m0".to_string(),
        2u32,
    )])));

    let result = run_one_job(
        spec(tmp.path(), 0),
        fast_opts(1),
        Arc::clone(&fetcher) as Arc<dyn Fetch>,
    )
    .await;

    assert_eq!(result.status, JobStatus::Ok);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    // Two backoffs at 10ms and 20ms must show up in the elapsed time.
    assert!(result.elapsed >= Duration::from_millis(30));
}

#[tokio::test]
async fn exhausted_retries_report_failed_with_last_error() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetch::with_failures(HashMap::from([(
        "org/m0".to_string(),
        u32::MAX,
    )])));

    let result = run_one_job(
        spec(tmp.path(), 0),
        fast_opts(1),
        Arc::clone(&fetcher) as Arc<dyn Fetch>,
    )
    .await;

    assert_eq!(result.status, JobStatus::Failed);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .contains("simulated transfer failure"));
}

#[tokio::test]
async fn pool_is_bounded_and_flaky_job_recovers() {
    let tmp = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetch::with_failures(HashMap::from([(
        "org/m1".to_string(),
        2u32,
    )])));
    let specs: Vec<JobSpec> = (0..3).map(|n| spec(tmp.path(), n)).collect();

    let results = run_jobs(
        specs,
        &fast_opts(2),
        Arc::clone(&fetcher) as Arc<dyn Fetch>,
        Arc::new(AtomicBool::new(false)),
    )
    .await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.status == JobStatus::Ok));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 5);
    assert!(fetcher.peak.load(Ordering::SeqCst) <= 2);

    let flaky = results.iter().find(|r| r.repo_id == "org/m1").unwrap();
    assert!(flaky.elapsed >= Duration::from_millis(30));
}

#[tokio::test]
async fn interrupt_stops_new_launches() {
    for workers in [1usize, 3] {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MockFetch::reliable());
        let specs: Vec<JobSpec> = (0..4).map(|n| spec(tmp.path(), n)).collect();
        let interrupt = Arc::new(AtomicBool::new(true));

        let results = run_jobs(
            specs,
            &fast_opts(workers),
            Arc::clone(&fetcher) as Arc<dyn Fetch>,
            interrupt,
        )
        .await;

        assert!(results.is_empty(), "workers={workers}");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
