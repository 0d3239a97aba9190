//! Snapshot files on disk.
//!
//! Writes go to a sibling temp file that is renamed over the target, so a
//! reader never observes a half-written snapshot.

use anyhow::{Context, Result};
use refdex_core::Snapshot;
use std::path::{Path, PathBuf};

pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let bytes = snapshot
        .to_json()
        .context("Failed to encode index snapshot")?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let tmp = temp_path(path);
    std::fs::write(&tmp, &bytes)
        .with_context(|| format!("Failed to write snapshot: {}", tmp.display()))?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(err).with_context(|| format!("Failed to replace snapshot: {}", path.display()));
    }

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "snapshot written");
    Ok(())
}

pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read index file: {}", path.display()))?;
    let snapshot = Snapshot::from_json(&bytes)
        .with_context(|| format!("Invalid index file: {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        build_id = %snapshot.build_id,
        sections = snapshot.index.section_count(),
        "snapshot loaded"
    );
    Ok(snapshot)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "index".into());
    name.push(format!(".tmp-{}", std::process::id()));
    path.with_file_name(name)
}
