//! Invocation of the external segmentation binary.
//!
//! The binary is opaque: it reads one directory of raw images and writes one
//! output folder per image under a scratch directory. Its combined stdout and
//! stderr go to a per-unit log file, and its exit status is surfaced to the
//! caller as a [`SegmentOutcome`].

use crate::config::{CropParams, SegmentTuning};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Segmentation binary not found at {0}")]
    BinaryNotFound(String),

    #[error("Failed to launch segmentation binary: {0}")]
    SpawnFailed(#[source] std::io::Error),
}

/// Arguments for one unit
#[derive(Debug, Clone)]
pub struct SegmentParams {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub crop: CropParams,
    pub tuning: SegmentTuning,
}

impl SegmentParams {
    /// Render the command-line arguments, in the order the binary documents them
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            self.input_dir.to_string_lossy().to_string(),
            "-o".to_string(),
            self.output_dir.to_string_lossy().to_string(),
        ];
        if self.tuning.verbose {
            args.push("--verbose".to_string());
        }
        if self.tuning.full_output {
            args.push("-f".to_string());
        }
        for (flag, value) in [
            ("-m", self.tuning.minimum),
            ("-d", self.tuning.delta),
            ("-l", self.crop.left),
            ("-r", self.crop.right),
            ("-b", self.crop.bottom),
            ("-t", self.crop.top),
        ] {
            args.push(flag.to_string());
            args.push(value.to_string());
        }
        args
    }
}

/// What happened when the binary ran
#[derive(Debug, Clone)]
pub struct SegmentOutcome {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub log_path: PathBuf,
    pub elapsed: Duration,
}

impl SegmentOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Run segmentation for one unit, writing combined output to `log_path`
    async fn run(&self, params: &SegmentParams, log_path: &Path)
        -> Result<SegmentOutcome, SegmentError>;
}

/// Runs the real binary as a subprocess
#[derive(Debug, Clone)]
pub struct BinarySegmenter {
    binary: PathBuf,
}

impl BinarySegmenter {
    /// Fails if `binary` is not an existing file
    pub fn new(binary: impl Into<PathBuf>) -> Result<Self, SegmentError> {
        let binary = binary.into();
        if !binary.is_file() {
            return Err(SegmentError::BinaryNotFound(binary.display().to_string()));
        }
        Ok(Self { binary })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl Segmenter for BinarySegmenter {
    async fn run(
        &self,
        params: &SegmentParams,
        log_path: &Path,
    ) -> Result<SegmentOutcome, SegmentError> {
        if let Some(parent) = log_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let log_file = std::fs::File::create(log_path)?;
        let log_err = log_file.try_clone()?;

        let args = params.args();
        debug!("{} {}", self.binary.display(), args.join(" "));

        let start = Instant::now();
        let status = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_err))
            .status()
            .await
            .map_err(SegmentError::SpawnFailed)?;
        let elapsed = start.elapsed();

        let outcome = SegmentOutcome {
            exit_code: status.code(),
            log_path: log_path.to_path_buf(),
            elapsed,
        };

        info!(
            "Segmentation runtime: {:.2} minutes",
            elapsed.as_secs_f64() / 60.0
        );
        if !outcome.success() {
            warn!(
                "Segmentation exited with {:?}, see '{}'",
                outcome.exit_code,
                log_path.display()
            );
        }

        Ok(outcome)
    }
}
