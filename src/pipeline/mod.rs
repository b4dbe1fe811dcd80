//! Per-directory segmentation runs: segment into a scratch directory, then
//! reconcile the scratch output into the deployment's processed folder.

use crate::config::{ConfigError, DirectorySelection, PipelineConfig};
use crate::mount::{mount_all, unmount_all, MountError};
use crate::reconciliation::{
    reconcile_with_options, ReconcileError, ReconcileOptions, ReconciliationResult,
};
use crate::segment::{BinarySegmenter, SegmentError, SegmentOutcome, SegmentParams, Segmenter};
use crate::utils::now_display;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Mount error: {0}")]
    MountError(#[from] MountError),

    #[error("Segment error: {0}")]
    SegmentError(#[from] SegmentError),

    #[error("Reconcile error: {0}")]
    ReconcileError(#[from] ReconcileError),
}

/// Outcome for one raw-image directory
#[derive(Debug, Clone)]
pub struct UnitResult {
    pub unit: String,
    pub outcome: SegmentOutcome,
    pub reconciliation: ReconciliationResult,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    pub units: Vec<UnitResult>,
}

impl PipelineResult {
    /// Units whose segmentation binary did not exit cleanly
    pub fn failed_units(&self) -> Vec<&str> {
        self.units
            .iter()
            .filter(|u| !u.outcome.success())
            .map(|u| u.unit.as_str())
            .collect()
    }
}

/// Resolve which directories under `raw_path` to segment
pub fn resolve_units(config: &PipelineConfig, raw_path: &Path) -> Vec<String> {
    match &config.directories {
        DirectorySelection::List(list) => list
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect(),
        DirectorySelection::All => child_dir_names(raw_path)
            .into_iter()
            .filter(|name| !config.ignore_directories.contains(name))
            .collect(),
    }
}

/// Names of the directories directly under `dir`, sorted
fn child_dir_names(dir: &Path) -> Vec<String> {
    if !dir.is_dir() {
        return Vec::new();
    }

    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect()
}

/// Validate, check the binary, then run every unit with the real segmenter
pub async fn run_with_binary(config: &PipelineConfig) -> Result<PipelineResult, PipelineError> {
    config.validate()?;
    let segmenter = BinarySegmenter::new(&config.segment_binary)?;
    info!("Path to segment file: {}", segmenter.binary().display());
    run_validated(config, &segmenter).await
}

/// Validate, then mount, segment and reconcile every selected unit, then unmount.
///
/// Unmounting is attempted even when a unit fails.
pub async fn run_segmentation(
    config: &PipelineConfig,
    segmenter: &dyn Segmenter,
) -> Result<PipelineResult, PipelineError> {
    config.validate()?;
    run_validated(config, segmenter).await
}

async fn run_validated(
    config: &PipelineConfig,
    segmenter: &dyn Segmenter,
) -> Result<PipelineResult, PipelineError> {
    mount_all(&config.mounts).await?;
    let result = process_units(config, segmenter).await;

    if !config.mounts.is_empty() {
        info!("Unmounting buckets");
        unmount_all(&config.mounts).await;
    }

    result
}

async fn process_units(
    config: &PipelineConfig,
    segmenter: &dyn Segmenter,
) -> Result<PipelineResult, PipelineError> {
    let crop = config.scaled_crop()?;
    let raw_path = config.raw_path();
    let proc_path = config.proc_path();
    let units = resolve_units(config, &raw_path);

    info!("Path to raw (in) directories: {}", raw_path.display());
    info!("Path to proc (out) directories: {}", proc_path.display());
    info!("Directory list: {:?}", units);
    if units.is_empty() {
        warn!("No directories to segment under '{}'", raw_path.display());
    }

    let options = ReconcileOptions {
        detect_conflicts: config.detect_conflicts,
    };

    info!("Start time of directory passes: {}", now_display());
    let mut result = PipelineResult::default();

    for unit in units {
        let start = Instant::now();
        info!("Segmenting images in directory {}, start time {}", unit, now_display());

        // Scratch output is removed when `scratch` drops
        let scratch = tempfile::tempdir()?;
        info!("Running segment, and writing files to {}", scratch.path().display());

        let params = SegmentParams {
            input_dir: raw_path.join(&unit),
            output_dir: scratch.path().to_path_buf(),
            crop,
            tuning: config.tuning,
        };
        let outcome = segmenter.run(&params, &config.unit_log_path(&unit)).await?;

        let reconciliation =
            reconcile_with_options(scratch.path(), &proc_path, &config.targets, &options).await?;

        info!("Time is {}", now_display());
        info!(
            "Full directory runtime: {:.2} minutes",
            start.elapsed().as_secs_f64() / 60.0
        );

        result.units.push(UnitResult {
            unit,
            outcome,
            reconciliation,
        });
    }

    Ok(result)
}
