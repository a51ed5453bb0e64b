//! Checksum-manifest verification after a completed download.
//!
//! Scans the top level of a destination directory for checksum manifests
//! (`.sha256`/`.sha256sum` and `.md5`/`.md5sum`) and validates every
//! referenced file byte for byte. Outcomes are values, not errors: missing
//! targets and digest mismatches are expected, tolerated results that the
//! caller reports without aborting the job.

use anyhow::{Context, Result};
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

/// Digest family, selected by the checksum manifest's file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestKind {
    Sha256,
    Md5,
}

impl DigestKind {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "sha256" | "sha256sum" => Some(DigestKind::Sha256),
            "md5" | "md5sum" => Some(DigestKind::Md5),
            _ => None,
        }
    }
}

/// Per-entry verification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified {
        path: String,
    },
    Mismatch {
        path: String,
        expected: String,
        actual: String,
    },
    Missing {
        path: String,
    },
}

/// Validate every checksum manifest found at the top level of `dir`.
/// Returns one outcome per parsed entry, in manifest order. Errors only on
/// IO failures reading the directory or a manifest; referenced-file problems
/// become outcomes.
pub fn verify_dir(dir: &Path) -> Result<Vec<VerifyOutcome>> {
    let mut outcomes = Vec::new();
    let mut entries: Vec<fs::DirEntry> = fs::read_dir(dir)
        .with_context(|| format!("list {}", dir.display()))?
        .collect::<std::io::Result<_>>()
        .with_context(|| format!("list {}", dir.display()))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if !entry
            .file_type()
            .with_context(|| format!("stat {}", path.display()))?
            .is_file()
        {
            continue;
        }
        let Some(kind) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(DigestKind::from_extension)
        else {
            continue;
        };
        tracing::info!(manifest = %path.display(), "validating checksum manifest");
        verify_manifest(dir, &path, kind, &mut outcomes)?;
    }
    Ok(outcomes)
}

fn verify_manifest(
    dir: &Path,
    manifest: &Path,
    kind: DigestKind,
    out: &mut Vec<VerifyOutcome>,
) -> Result<()> {
    let text = fs::read_to_string(manifest)
        .with_context(|| format!("read checksum manifest {}", manifest.display()))?;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            continue;
        }
        let expected = tokens[0];
        // The last token is the path; a leading '*' marks binary mode in
        // standard checksum tools.
        let file_ref = tokens[tokens.len() - 1].trim_start_matches('*');

        let target = dir.join(file_ref);
        if !target.exists() {
            tracing::warn!(file = file_ref, "checksum target missing");
            out.push(VerifyOutcome::Missing {
                path: file_ref.to_string(),
            });
            continue;
        }

        let actual = digest_path(kind, &target)?;
        if actual.eq_ignore_ascii_case(expected) {
            tracing::debug!(file = file_ref, "checksum verified");
            out.push(VerifyOutcome::Verified {
                path: file_ref.to_string(),
            });
        } else {
            tracing::error!(file = file_ref, expected, actual = %actual, "checksum mismatch");
            out.push(VerifyOutcome::Mismatch {
                path: file_ref.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
    }
    Ok(())
}

/// Compute the digest of a file as lowercase hex. Reads in chunks to keep
/// memory use bounded; suitable for multi-gigabyte files.
pub fn digest_path(kind: DigestKind, path: &Path) -> Result<String> {
    match kind {
        DigestKind::Sha256 => hash_file::<Sha256>(path),
        DigestKind::Md5 => hash_file::<Md5>(path),
    }
}

fn hash_file<D: Digest>(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = D::new();
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
