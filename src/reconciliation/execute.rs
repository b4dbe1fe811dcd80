use super::plan::{build_reconciliation_plan, TargetPlan, TargetSubpath};
use crate::utils::{compute_file_hash, sanitize_filename};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to copy '{path}': {source}")]
    CopyFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list '{path}': {source}")]
    ListFailed {
        path: String,
        #[source]
        source: walkdir::Error,
    },
}

/// Options for a reconciliation run
#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Hash skipped files against the existing destination and report mismatches.
    /// Never changes what gets copied.
    pub detect_conflicts: bool,
}

/// A skipped source whose bytes differ from the file already at the destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Outcome for one target subpath
#[derive(Debug, Clone)]
pub struct TargetReport {
    pub target: TargetSubpath,
    pub destination: PathBuf,
    pub matched_dirs: usize,
    pub copied: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub conflicts: Vec<Conflict>,
    /// Entries in the destination folder after merging
    pub file_count: usize,
}

/// Result of reconciliation execution
#[derive(Debug, Clone, Default)]
pub struct ReconciliationResult {
    pub targets: Vec<TargetReport>,
}

impl ReconciliationResult {
    pub fn total_copied(&self) -> usize {
        self.targets.iter().map(|t| t.copied.len()).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.targets.iter().map(|t| t.skipped.len()).sum()
    }

    pub fn target(&self, dest_name: &str) -> Option<&TargetReport> {
        self.targets
            .iter()
            .find(|t| t.target.dest_name() == dest_name)
    }
}

/// Merge every `<unit>/<target>` directory under `source_root` into
/// `dest_root/<final component of target>`.
///
/// Files are identified by sanitized filename. An existing destination file
/// is never overwritten, so re-running accumulates instead of duplicating.
pub async fn reconcile(
    source_root: &Path,
    dest_root: &Path,
    targets: &[TargetSubpath],
) -> Result<ReconciliationResult, ReconcileError> {
    reconcile_with_options(source_root, dest_root, targets, &ReconcileOptions::default()).await
}

/// Same as [`reconcile`] with explicit options
pub async fn reconcile_with_options(
    source_root: &Path,
    dest_root: &Path,
    targets: &[TargetSubpath],
    options: &ReconcileOptions,
) -> Result<ReconciliationResult, ReconcileError> {
    let plan = build_reconciliation_plan(source_root, dest_root, targets);
    debug!(
        "Found {} unit directories under '{}'",
        plan.units.len(),
        source_root.display()
    );

    let mut result = ReconciliationResult::default();
    for target_plan in &plan.targets {
        result
            .targets
            .push(merge_target(target_plan, options).await?);
    }

    Ok(result)
}

async fn merge_target(
    plan: &TargetPlan,
    options: &ReconcileOptions,
) -> Result<TargetReport, ReconcileError> {
    info!("Copying contents of source to destination");
    info!("source '{}'", plan.target);

    if !plan.destination.exists() {
        fs::create_dir_all(&plan.destination).await?;
    }
    info!("destination '{}'", plan.destination.display());

    let mut report = TargetReport {
        target: plan.target.clone(),
        destination: plan.destination.clone(),
        matched_dirs: plan.matched_dirs.len(),
        copied: Vec::new(),
        skipped: Vec::new(),
        conflicts: Vec::new(),
        file_count: 0,
    };

    for source_dir in &plan.matched_dirs {
        debug!("{}", source_dir.display());

        for source_file in list_direct_files(source_dir)? {
            let dest_name = match source_file.file_name() {
                Some(name) => sanitize_filename(name),
                None => continue,
            };
            let dest_file = plan.destination.join(dest_name);

            if dest_file.exists() {
                debug!(
                    "Skipping '{}' as it already exists in '{}'",
                    source_file.display(),
                    plan.destination.display()
                );
                if options.detect_conflicts && differs(&source_file, &dest_file).await? {
                    warn!(
                        "'{}' differs from existing '{}', keeping existing file",
                        source_file.display(),
                        dest_file.display()
                    );
                    report.conflicts.push(Conflict {
                        source: source_file.clone(),
                        destination: dest_file.clone(),
                    });
                }
                report.skipped.push(source_file);
                continue;
            }

            debug!(
                "Copying '{}' to '{}'",
                source_file.display(),
                dest_file.display()
            );
            fs::copy(&source_file, &dest_file)
                .await
                .map_err(|source| ReconcileError::CopyFailed {
                    path: source_file.display().to_string(),
                    source,
                })?;
            report.copied.push(dest_file);
        }
    }

    report.file_count = count_entries(&plan.destination).await?;
    info!(
        "There are now {} files in destination '{}'",
        report.file_count,
        plan.destination.display()
    );

    Ok(report)
}

/// Regular files directly inside `dir`, sorted by name. Subdirectories are not descended.
fn list_direct_files(dir: &Path) -> Result<Vec<PathBuf>, ReconcileError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|source| ReconcileError::ListFailed {
            path: dir.display().to_string(),
            source,
        })?;
        debug!("{}", entry.path().display());
        if entry.path().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

async fn differs(source: &Path, existing: &Path) -> Result<bool, ReconcileError> {
    let source_hash = compute_file_hash(source)
        .await
        .map_err(|e| ReconcileError::CopyFailed {
            path: source.display().to_string(),
            source: e,
        })?;
    let existing_hash = compute_file_hash(existing).await?;
    Ok(source_hash != existing_hash)
}

async fn count_entries(dir: &Path) -> Result<usize, std::io::Error> {
    let mut entries = fs::read_dir(dir).await?;
    let mut count = 0;
    while entries.next_entry().await?.is_some() {
        count += 1;
    }
    Ok(count)
}
