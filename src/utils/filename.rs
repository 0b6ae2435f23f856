use chrono::Local;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Shared run timestamp embedded in raw and staged filenames.
pub fn run_timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Raw capture path: `<raw_dir>/<city slug>_raw_<timestamp>.json`
pub fn raw_path(raw_dir: &Path, city_slug: &str, timestamp: &str) -> PathBuf {
    raw_dir.join(format!("{}_raw_{}.json", city_slug, timestamp))
}

/// Staged CSV path: `<staged_dir>/air_quality_transform_<timestamp>.csv`
pub fn staged_path(staged_dir: &Path, timestamp: &str) -> PathBuf {
    staged_dir.join(format!("air_quality_transform_{}.csv", timestamp))
}

/// Newest staged file by sorted filename. Timestamps sort lexicographically,
/// so the last entry is the most recent run.
pub fn latest_staged_file(staged_dir: &Path) -> Result<Option<PathBuf>> {
    if !staged_dir.exists() {
        return Ok(None);
    }

    let mut staged: Vec<PathBuf> = std::fs::read_dir(staged_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("air_quality_transform_") && n.ends_with(".csv"))
                .unwrap_or(false)
        })
        .collect();

    staged.sort();
    Ok(staged.pop())
}

/// Raw files belonging to one extraction run.
pub fn raw_files_for_run(raw_dir: &Path, timestamp: &str) -> Result<Vec<PathBuf>> {
    let suffix = format!("_raw_{}.json", timestamp);
    let mut files: Vec<PathBuf> = std::fs::read_dir(raw_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(&suffix))
                .unwrap_or(false)
        })
        .collect();

    files.sort();
    Ok(files)
}

/// Most recent run timestamp present in the raw directory, if any.
pub fn latest_raw_run(raw_dir: &Path) -> Result<Option<String>> {
    if !raw_dir.exists() {
        return Ok(None);
    }

    let mut stamps: Vec<String> = std::fs::read_dir(raw_dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            let stem = name.strip_suffix(".json")?;
            let (_, stamp) = stem.split_once("_raw_")?;
            Some(stamp.to_string())
        })
        .collect();

    stamps.sort();
    Ok(stamps.pop())
}
