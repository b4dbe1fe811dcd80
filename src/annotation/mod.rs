//! Copy the annotated subset of a deployment's images into one flat folder.

use crate::config::AnnotationConfig;
use crate::utils::replace_spaces;
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Annotation file {0} does not exist")]
    CsvNotFound(String),

    #[error("Config error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),
}

/// Why one selected image was not copied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyFailure {
    SourceMissing,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCopy {
    pub source: PathBuf,
    pub reason: CopyFailure,
}

/// Result of an annotation copy run
#[derive(Debug, Clone, Default)]
pub struct AnnotationReport {
    /// Images found under the image root
    pub candidates: usize,
    /// Images whose name matched an annotation record
    pub matched: usize,
    pub copied: Vec<PathBuf>,
    pub failed: Vec<FailedCopy>,
}

/// Read the filename column of an annotation CSV.
///
/// The first row is a header. Rows whose first field starts with `#` are
/// metadata and are skipped, as are rows too short to hold the column.
/// Fields are taken verbatim, surrounding whitespace included.
pub fn read_annotation_names(csv_path: &Path, column: usize) -> Result<Vec<String>, AnnotationError> {
    if !csv_path.is_file() {
        return Err(AnnotationError::CsvNotFound(csv_path.display().to_string()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::None)
        .from_path(csv_path)?;

    let mut names = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.get(0).is_some_and(|f| f.starts_with('#')) {
            continue;
        }
        if let Some(name) = record.get(column) {
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
    }

    Ok(names)
}

/// Undo the annotation tool's rewrite of the first space into '-'
pub fn normalize_record_name(name: &str, restore_first_space: bool) -> String {
    if restore_first_space {
        name.replacen('-', " ", 1)
    } else {
        name.to_string()
    }
}

/// Name used in the flat output folder
pub fn output_name(name: &OsStr) -> OsString {
    replace_spaces(name, b'-')
}

/// Every file under `image_root` with one of `extensions`, sorted by path
pub fn find_candidates(image_root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    if !image_root.is_dir() {
        return Vec::new();
    }

    WalkDir::new(image_root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| extensions.iter().any(|x| ext == x.trim_start_matches('.')))
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect()
}

/// Candidates whose filename is one of `names`
pub fn select_matches(candidates: &[PathBuf], names: &HashSet<String>) -> Vec<PathBuf> {
    candidates
        .iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| names.contains(n))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Copy each selected image into `output_dir`, continuing past per-file failures
pub async fn copy_selected(
    selected: &[PathBuf],
    output_dir: &Path,
) -> Result<AnnotationReport, AnnotationError> {
    fs::create_dir_all(output_dir).await?;

    let mut report = AnnotationReport {
        matched: selected.len(),
        ..Default::default()
    };

    for source in selected {
        let name = match source.file_name() {
            Some(n) => output_name(n),
            None => continue,
        };
        let dest = output_dir.join(name);
        debug!("source '{}', dest '{}'", source.display(), dest.display());

        match fs::copy(source, &dest).await {
            Ok(_) => {
                debug!(
                    "File '{}' successfully copied to '{}'",
                    source.display(),
                    dest.display()
                );
                report.copied.push(dest);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                error!("Source file '{}' not found", source.display());
                report.failed.push(FailedCopy {
                    source: source.clone(),
                    reason: CopyFailure::SourceMissing,
                });
            }
            Err(e) => {
                error!("Failed to copy '{}': {}", source.display(), e);
                report.failed.push(FailedCopy {
                    source: source.clone(),
                    reason: CopyFailure::Other(e.to_string()),
                });
            }
        }
    }

    Ok(report)
}

/// Read the deployment's annotation CSV and copy every annotated image
pub async fn run_annotation(config: &AnnotationConfig) -> Result<AnnotationReport, AnnotationError> {
    config.validate()?;

    let csv_path = config.csv_path();
    let names: HashSet<String> = read_annotation_names(&csv_path, config.filename_column)?
        .iter()
        .map(|n| normalize_record_name(n, config.restore_first_space))
        .collect();
    debug!("{} annotated image names in '{}'", names.len(), csv_path.display());

    let image_root = config.image_root();
    debug!("image root '{}'", image_root.display());
    let candidates = find_candidates(&image_root, &config.extensions);

    let selected = select_matches(&candidates, &names);
    info!("There are {} files to copy", selected.len());

    let mut report = copy_selected(&selected, &config.output_dir()).await?;
    report.candidates = candidates.len();

    info!(
        "Copied {} of {} files to '{}'",
        report.copied.len(),
        report.matched,
        config.output_dir().display()
    );
    Ok(report)
}
