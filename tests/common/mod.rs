#![allow(dead_code)]

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Create a temporary directory for testing
pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Write `content` to `root/relative`, creating parent directories
pub fn write_file(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dirs");
    }
    fs::write(&path, content).expect("Failed to write file");
}

/// Names of all entries directly inside `dir`
pub fn list_names(dir: &Path) -> BTreeSet<String> {
    fs::read_dir(dir)
        .expect("Failed to read dir")
        .map(|e| e.expect("Bad entry").file_name().to_string_lossy().to_string())
        .collect()
}

/// Lay out a typical segmentation scratch tree: one folder per image
pub fn create_segment_output(root: &Path, units: &[&str]) {
    for unit in units {
        write_file(
            root,
            &format!("{unit}/segmentation/corrected_crop/{unit}_crop_0.png"),
            unit.as_bytes(),
        );
        write_file(
            root,
            &format!("{unit}/segmentation/frame/{unit}.tif"),
            unit.as_bytes(),
        );
        write_file(
            root,
            &format!("{unit}/measurements/{unit} measurements.csv"),
            b"id,area\n0,12\n",
        );
    }
}

/// Build the expected result of [`list_names`]
pub fn names(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}
