//! Manifest writer: record every downloaded file's relative path.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const MANIFEST_NAME: &str = "manifest.txt";

/// Write `manifest.txt` under `dir`: one relative path per line for every
/// regular file in the tree, excluding the manifest itself. Entries are
/// sorted by name at each level so re-running on an unchanged tree
/// reproduces the file byte for byte. Overwrites any prior manifest.
pub fn write_manifest(dir: &Path) -> Result<PathBuf> {
    let manifest_path = dir.join(MANIFEST_NAME);
    let mut entries = Vec::new();
    collect_files(dir, dir, &mut entries)?;

    let file = File::create(&manifest_path)
        .with_context(|| format!("create manifest {}", manifest_path.display()))?;
    let mut w = BufWriter::new(file);
    for rel in &entries {
        writeln!(w, "{rel}")
            .with_context(|| format!("write manifest {}", manifest_path.display()))?;
    }
    w.flush()
        .with_context(|| format!("flush manifest {}", manifest_path.display()))?;
    Ok(manifest_path)
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    let mut entries: Vec<fs::DirEntry> = fs::read_dir(dir)
        .with_context(|| format!("list {}", dir.display()))?
        .collect::<std::io::Result<_>>()
        .with_context(|| format!("list {}", dir.display()))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("stat {}", path.display()))?;
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            let rel = path
                .strip_prefix(root)
                .with_context(|| format!("relativize {}", path.display()))?;
            if rel == Path::new(MANIFEST_NAME) {
                continue;
            }
            out.push(rel.to_string_lossy().into_owned());
        }
    }
    Ok(())
}
