//! External fetch boundary.
//!
//! The actual transfer mechanism is an external collaborator; this module
//! pins down its interface (`Fetch`), the retryable error it may return, and
//! the shipped implementation that shells out to the Hugging Face hub CLI.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Any fetch failure (network, auth, not-found, tool missing). Retryable.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransferError {
    message: String,
}

impl TransferError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Transfers the remote files of `repo_id` matching `patterns` into `dest`.
/// Blocking; the scheduler confines calls to a blocking task.
pub trait Fetch: Send + Sync {
    fn fetch(&self, repo_id: &str, patterns: &[String], dest: &Path) -> Result<(), TransferError>;
}

/// Wrap quantization tags as glob-like inclusion patterns: `Q4_K_M` -> `*Q4_K_M*`.
pub fn wrap_patterns(quants: &[String]) -> Vec<String> {
    quants.iter().map(|q| format!("*{q}*")).collect()
}

/// Fetch implementation backed by the `huggingface-cli download` tool.
///
/// The cache root (HF_HOME) is decided once per run and applied to each child
/// process's environment only, so concurrent jobs never race on the parent
/// process environment.
pub struct HubCli {
    pub program: String,
    pub cache_root: Option<PathBuf>,
}

impl Default for HubCli {
    fn default() -> Self {
        Self {
            program: "huggingface-cli".to_string(),
            cache_root: None,
        }
    }
}

impl HubCli {
    pub fn with_cache_root(cache_root: Option<PathBuf>) -> Self {
        Self {
            cache_root,
            ..Self::default()
        }
    }
}

impl Fetch for HubCli {
    fn fetch(&self, repo_id: &str, patterns: &[String], dest: &Path) -> Result<(), TransferError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("download")
            .arg(repo_id)
            .arg("--local-dir")
            .arg(dest)
            .stdout(Stdio::null());
        for pattern in patterns {
            cmd.arg("--include").arg(pattern);
        }
        if let Some(root) = &self.cache_root {
            cmd.env("HF_HOME", root);
        }

        let output = cmd
            .output()
            .map_err(|e| TransferError::new(format!("spawn {}: {}", self.program, e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransferError::new(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
