//! CLI for the bmd batch model downloader.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bmd_core::config::{self, RunOptions};
use bmd_core::fetch::{Fetch, HubCli};
use bmd_core::gate;
use bmd_core::job::JobSpec;
use bmd_core::report;
use bmd_core::retry::RetryPolicy;
use bmd_core::scheduler;

/// Exit status for a configuration load failure (fail-fast, nothing ran).
pub const EXIT_CONFIG: i32 = 2;
/// Exit status when the run was cut short by a user interrupt.
pub const EXIT_INTERRUPT: i32 = 130;

/// Batch downloader for large model artifacts.
#[derive(Debug, Parser)]
#[command(name = "bmd")]
#[command(about = "bmd: batch downloader for large model artifacts", long_about = None)]
pub struct Cli {
    /// Path to the JSON job list.
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,

    /// Base directory for downloads; each job lands in <base>/<org>/<model>/<size>.
    #[arg(long, default_value = "models", value_name = "DIR")]
    pub base_dir: PathBuf,

    /// Log file path.
    #[arg(long, default_value = "logs/batch_download.log", value_name = "FILE")]
    pub log: PathBuf,

    /// Maximum fetch attempts per job (including the first).
    #[arg(long, default_value_t = 3, value_name = "N")]
    pub retries: u32,

    /// Initial backoff in seconds; doubles after each failed attempt.
    #[arg(long, default_value_t = 5, value_name = "SECS")]
    pub backoff: u64,

    /// Cache root handed to the fetch tool (HF_HOME). Shared by all jobs in a run.
    #[arg(long = "hf-home", value_name = "DIR")]
    pub hf_home: Option<PathBuf>,

    /// Minimum free disk space required per job, in GB. 0 disables the check.
    #[arg(long = "min-disk", default_value_t = 10, value_name = "GB")]
    pub min_disk: u64,

    /// Run up to N jobs concurrently (default 1 = strictly sequential).
    #[arg(long, default_value_t = 1, value_name = "N")]
    pub workers: usize,

    /// Skip writing manifest.txt after each download.
    #[arg(long)]
    pub skip_manifest: bool,

    /// Skip checksum-manifest verification after each download.
    #[arg(long)]
    pub skip_verify: bool,
}

impl Cli {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            retry: RetryPolicy {
                max_attempts: self.retries.max(1),
                initial_backoff: Duration::from_secs(self.backoff),
            },
            min_disk_gb: self.min_disk,
            workers: self.workers,
            skip_manifest: self.skip_manifest,
            skip_verify: self.skip_verify,
        }
    }
}

/// Load the job list, run the batch, print the summary. Returns the process
/// exit code; configuration failures and interrupts get distinct statuses.
pub async fn run(cli: Cli) -> Result<i32> {
    let entries = match config::load_entries(&cli.config) {
        Ok(entries) => entries,
        Err(err) => {
            eprintln!("bmd: configuration error: {err:#}");
            tracing::error!("configuration error: {:#}", err);
            return Ok(EXIT_CONFIG);
        }
    };

    // The cache root is shared by every job in the run; create it up front so
    // a denied target fails before any transfer starts.
    if let Some(root) = &cli.hf_home {
        gate::ensure_dir(root)?;
    }

    let specs: Vec<JobSpec> = entries
        .into_iter()
        .map(|entry| JobSpec::from_entry(&cli.base_dir, entry))
        .collect();
    tracing::info!("loaded {} job(s) from {}", specs.len(), cli.config.display());

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupt);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; no new jobs will start");
                flag.store(true, Ordering::SeqCst);
            }
        });
    }

    let fetcher: Arc<dyn Fetch> = Arc::new(HubCli::with_cache_root(cli.hf_home.clone()));
    let opts = cli.run_options();
    let results = scheduler::run_jobs(specs, &opts, fetcher, Arc::clone(&interrupt)).await;

    report::print_summary(&results);

    if interrupt.load(Ordering::SeqCst) {
        return Ok(EXIT_INTERRUPT);
    }
    Ok(0)
}
