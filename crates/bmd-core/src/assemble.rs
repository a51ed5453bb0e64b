//! Split-file assembly: merge `<base>-K-of-N.<ext>` parts into one file.
//!
//! Part indices and totals are parsed numerically, so unpadded part numbers
//! order correctly. A group whose members disagree on the total, repeat an
//! index, or do not cover 1..=total exactly is refused rather than guessed
//! at. Parts are deleted only after the merged file is written and synced.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Suffix appended to the group's base name for the merged output.
pub const MERGED_SUFFIX: &str = "-full";

/// A split group that cannot be assembled safely.
#[derive(Debug, Error)]
#[error("inconsistent split group '{base}': {detail}")]
pub struct InconsistentGroup {
    pub base: String,
    pub detail: String,
}

#[derive(Debug)]
struct PartFile {
    path: PathBuf,
    index: u64,
    total: u64,
}

/// Parse `<base>-<index>-of-<total>.<ext>` from a file name.
/// Returns `(base, ext, index, total)`; `None` if the name does not match.
fn parse_part_name(name: &str) -> Option<(String, String, u64, u64)> {
    let dot = name.rfind('.')?;
    let (stem, ext) = (&name[..dot], &name[dot + 1..]);
    if ext.is_empty() {
        return None;
    }
    let of = stem.rfind("-of-")?;
    let total_str = &stem[of + 4..];
    let head = &stem[..of];
    let dash = head.rfind('-')?;
    let index_str = &head[dash + 1..];
    let base = &head[..dash];
    if base.is_empty() || !is_digits(index_str) || !is_digits(total_str) {
        return None;
    }
    Some((
        base.to_string(),
        ext.to_string(),
        index_str.parse().ok()?,
        total_str.parse().ok()?,
    ))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Merge split-file groups found at the top level of `dir`.
///
/// A group of zero or one part is left untouched. For each group of two or
/// more, the parts are concatenated in numeric index order into
/// `<base>-full.<ext>` and then deleted; a deletion failure is logged and
/// does not roll back the merge. Returns the first merged path (by base
/// name) when any assembly occurred.
pub fn assemble_parts(dir: &Path) -> Result<Option<PathBuf>> {
    let mut groups: BTreeMap<(String, String), Vec<PartFile>> = BTreeMap::new();

    let entries: Vec<fs::DirEntry> = fs::read_dir(dir)
        .with_context(|| format!("list {}", dir.display()))?
        .collect::<std::io::Result<_>>()
        .with_context(|| format!("list {}", dir.display()))?;
    for entry in entries {
        if !entry
            .file_type()
            .with_context(|| format!("stat {}", entry.path().display()))?
            .is_file()
        {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some((base, ext, index, total)) = parse_part_name(name) {
            groups.entry((base, ext)).or_default().push(PartFile {
                path: entry.path(),
                index,
                total,
            });
        }
    }

    let mut merged = Vec::new();
    for ((base, ext), mut parts) in groups {
        if parts.len() < 2 {
            continue;
        }
        validate_group(&base, &parts)?;
        parts.sort_by_key(|p| p.index);
        merged.push(merge_group(dir, &base, &ext, &parts)?);
    }
    Ok(merged.into_iter().next())
}

fn validate_group(base: &str, parts: &[PartFile]) -> Result<()> {
    let total = parts[0].total;
    if parts.iter().any(|p| p.total != total) {
        return Err(InconsistentGroup {
            base: base.to_string(),
            detail: "parts disagree on the declared total".to_string(),
        }
        .into());
    }
    if parts.len() as u64 != total {
        return Err(InconsistentGroup {
            base: base.to_string(),
            detail: format!("{} part(s) present, {} declared", parts.len(), total),
        }
        .into());
    }
    let mut indices: Vec<u64> = parts.iter().map(|p| p.index).collect();
    indices.sort_unstable();
    if indices.iter().enumerate().any(|(i, &idx)| idx != i as u64 + 1) {
        return Err(InconsistentGroup {
            base: base.to_string(),
            detail: "part indices do not cover 1..=total exactly".to_string(),
        }
        .into());
    }
    Ok(())
}

fn merge_group(dir: &Path, base: &str, ext: &str, parts: &[PartFile]) -> Result<PathBuf> {
    let out_path = dir.join(format!("{base}{MERGED_SUFFIX}.{ext}"));
    let out_file = File::create(&out_path)
        .with_context(|| format!("create merged file {}", out_path.display()))?;
    let mut writer = BufWriter::new(out_file);

    for part in parts {
        let mut reader = File::open(&part.path)
            .with_context(|| format!("open part {}", part.path.display()))?;
        io::copy(&mut reader, &mut writer)
            .with_context(|| format!("append part {}", part.path.display()))?;
    }

    writer
        .flush()
        .with_context(|| format!("flush merged file {}", out_path.display()))?;
    let out_file = writer
        .into_inner()
        .with_context(|| format!("flush merged file {}", out_path.display()))?;
    out_file
        .sync_all()
        .with_context(|| format!("sync merged file {}", out_path.display()))?;
    tracing::info!(path = %out_path.display(), parts = parts.len(), "merged split parts");

    // The merged file is authoritative from here on; a part that cannot be
    // removed is only worth a warning.
    for part in parts {
        if let Err(e) = fs::remove_file(&part.path) {
            tracing::warn!(path = %part.path.display(), "could not remove part: {}", e);
        }
    }
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_part_names() {
        assert_eq!(
            parse_part_name("model-00001-of-00003.gguf"),
            Some(("model".to_string(), "gguf".to_string(), 1, 3))
        );
        assert_eq!(
            parse_part_name("llama-3-70b-2-of-10.bin"),
            Some(("llama-3-70b".to_string(), "bin".to_string(), 2, 10))
        );
        assert_eq!(parse_part_name("model.gguf"), None);
        assert_eq!(parse_part_name("model-of-3.gguf"), None);
        assert_eq!(parse_part_name("-00001-of-00003.gguf"), None);
        assert_eq!(parse_part_name("model-x-of-y.gguf"), None);
    }

    #[test]
    fn merges_three_parts_and_removes_them() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("model-00001-of-00003.gguf"), b"AAA").unwrap();
        fs::write(tmp.path().join("model-00002-of-00003.gguf"), b"BB").unwrap();
        fs::write(tmp.path().join("model-00003-of-00003.gguf"), b"C").unwrap();

        let merged = assemble_parts(tmp.path()).unwrap().unwrap();
        assert_eq!(merged, tmp.path().join("model-full.gguf"));
        assert_eq!(fs::read(&merged).unwrap(), b"AAABBC");
        assert!(!tmp.path().join("model-00001-of-00003.gguf").exists());
        assert!(!tmp.path().join("model-00002-of-00003.gguf").exists());
        assert!(!tmp.path().join("model-00003-of-00003.gguf").exists());
    }

    #[test]
    fn single_part_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let part = tmp.path().join("model-00001-of-00003.gguf");
        fs::write(&part, b"AAA").unwrap();

        assert!(assemble_parts(tmp.path()).unwrap().is_none());
        assert!(part.exists());
        assert!(!tmp.path().join("model-full.gguf").exists());
    }

    #[test]
    fn no_parts_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("weights.gguf"), b"data").unwrap();
        assert!(assemble_parts(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn unpadded_indices_merge_in_numeric_order() {
        let tmp = tempfile::tempdir().unwrap();
        let total = 11u64;
        for i in 1..=total {
            let byte = [b'a' + (i as u8) - 1];
            fs::write(tmp.path().join(format!("m-{i}-of-{total}.bin")), byte).unwrap();
        }

        let merged = assemble_parts(tmp.path()).unwrap().unwrap();
        assert_eq!(fs::read(&merged).unwrap(), b"abcdefghijk");
    }

    #[test]
    fn disagreeing_totals_are_refused() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("m-00001-of-00002.gguf"), b"A").unwrap();
        fs::write(tmp.path().join("m-00002-of-00003.gguf"), b"B").unwrap();

        let err = assemble_parts(tmp.path()).unwrap_err();
        assert!(err.downcast_ref::<InconsistentGroup>().is_some());
        assert!(tmp.path().join("m-00001-of-00002.gguf").exists());
    }

    #[test]
    fn incomplete_group_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("m-00001-of-00003.gguf"), b"A").unwrap();
        fs::write(tmp.path().join("m-00002-of-00003.gguf"), b"B").unwrap();

        let err = assemble_parts(tmp.path()).unwrap_err();
        let group = err.downcast_ref::<InconsistentGroup>().unwrap();
        assert!(group.detail.contains("2 part(s) present"));
    }

    #[test]
    fn duplicate_indices_are_refused() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("m-00001-of-00002.gguf"), b"A").unwrap();
        fs::write(tmp.path().join("m-1-of-2.gguf"), b"B").unwrap();

        assert!(assemble_parts(tmp.path()).unwrap_err()
            .downcast_ref::<InconsistentGroup>()
            .is_some());
    }

    #[test]
    fn distinct_groups_merge_independently() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a-00001-of-00002.gguf"), b"A1").unwrap();
        fs::write(tmp.path().join("a-00002-of-00002.gguf"), b"A2").unwrap();
        fs::write(tmp.path().join("b-00001-of-00002.bin"), b"B1").unwrap();
        fs::write(tmp.path().join("b-00002-of-00002.bin"), b"B2").unwrap();

        let first = assemble_parts(tmp.path()).unwrap().unwrap();
        assert_eq!(first, tmp.path().join("a-full.gguf"));
        assert_eq!(fs::read(tmp.path().join("a-full.gguf")).unwrap(), b"A1A2");
        assert_eq!(fs::read(tmp.path().join("b-full.bin")).unwrap(), b"B1B2");
    }
}
