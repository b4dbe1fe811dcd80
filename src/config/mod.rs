use crate::mount::MountSpec;
use crate::reconciliation::{check_distinct_destinations, PlanError, TargetSubpath};
use crate::utils::DEFAULT_TARGETS;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Deployment '{0}' has no resize factor configured")]
    UnknownDeployment(String),

    #[error("Resize factor for '{deployment}' must be positive, got {factor}")]
    InvalidResizeFactor { deployment: String, factor: f64 },

    #[error("No directories selected for segmentation")]
    EmptyDirectories,

    #[error("At least one target subpath is required")]
    NoTargets,

    #[error("At least one image extension is required")]
    NoExtensions,

    #[error("Target error: {0}")]
    TargetError(#[from] PlanError),
}

/// Crop margins in pixels, as measured on full-resolution (factor 1.0) images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropParams {
    pub left: u32,
    pub right: u32,
    pub bottom: u32,
    pub top: u32,
}

impl Default for CropParams {
    fn default() -> Self {
        Self {
            left: 1200,
            right: 1200,
            bottom: 1200,
            top: 600,
        }
    }
}

impl CropParams {
    /// Divide each margin by `factor`, rounding half to even.
    pub fn scaled(&self, factor: f64) -> CropParams {
        let scale = |v: u32| (f64::from(v) / factor).round_ties_even() as u32;
        CropParams {
            left: scale(self.left),
            right: scale(self.right),
            bottom: scale(self.bottom),
            top: scale(self.top),
        }
    }
}

/// Fixed tuning constants handed to the segmentation binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentTuning {
    /// Passed as `-m`
    #[serde(default = "default_minimum")]
    pub minimum: u32,
    /// Passed as `-d`
    #[serde(default = "default_delta")]
    pub delta: u32,
    /// Adds `-f`
    #[serde(default = "default_true")]
    pub full_output: bool,
    /// Adds `--verbose`
    #[serde(default = "default_true")]
    pub verbose: bool,
}

impl Default for SegmentTuning {
    fn default() -> Self {
        Self {
            minimum: default_minimum(),
            delta: default_delta(),
            full_output: true,
            verbose: true,
        }
    }
}

/// Per-deployment image geometry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentProfile {
    /// 1.0 for 4056 x 3040 images, 2.0 for 2028 x 1520
    pub resize_factor: f64,
}

/// Which raw-image directories to segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SelectionRepr", into = "SelectionRepr")]
pub enum DirectorySelection {
    /// Every directory under the raw path, minus `ignoreDirectories`
    All,
    List(Vec<String>),
}

/// Wire form of [`DirectorySelection`]: `"all"` or an array of names
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectionRepr {
    Keyword(String),
    List(Vec<String>),
}

impl TryFrom<SelectionRepr> for DirectorySelection {
    type Error = String;

    fn try_from(value: SelectionRepr) -> Result<Self, Self::Error> {
        match value {
            SelectionRepr::Keyword(k) if k == "all" => Ok(DirectorySelection::All),
            SelectionRepr::Keyword(k) => Err(format!(
                "expected \"all\" or a list of directory names, got \"{}\"",
                k
            )),
            SelectionRepr::List(list) => Ok(DirectorySelection::List(list)),
        }
    }
}

impl From<DirectorySelection> for SelectionRepr {
    fn from(value: DirectorySelection) -> Self {
        match value {
            DirectorySelection::All => SelectionRepr::Keyword("all".to_string()),
            DirectorySelection::List(list) => SelectionRepr::List(list),
        }
    }
}

fn default_minimum() -> u32 {
    50
}

fn default_delta() -> u32 {
    20
}

fn default_true() -> bool {
    true
}

fn default_directories() -> DirectorySelection {
    DirectorySelection::All
}

fn default_ignore_directories() -> Vec<String> {
    ["Dir0000", "Dir0001", "Dir0002", "Dir0003"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_segment_binary() -> PathBuf {
    PathBuf::from("/opt/Threshold-MSER/build/segment")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_deployments() -> HashMap<String, DeploymentProfile> {
    let mut deployments = HashMap::new();
    deployments.insert(
        "amlr08-20220513".to_string(),
        DeploymentProfile { resize_factor: 1.0 },
    );
    deployments.insert(
        "george-20240907".to_string(),
        DeploymentProfile { resize_factor: 2.0 },
    );
    deployments
}

fn default_targets() -> Vec<TargetSubpath> {
    DEFAULT_TARGETS
        .iter()
        .filter_map(|t| TargetSubpath::new(t).ok())
        .collect()
}

fn default_filename_column() -> usize {
    1
}

fn default_extensions() -> Vec<String> {
    vec!["jpg".to_string()]
}

/// Segmentation run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub project: String,
    pub year: String,
    pub deployment: String,
    #[serde(default = "default_directories")]
    pub directories: DirectorySelection,
    #[serde(default = "default_ignore_directories")]
    pub ignore_directories: Vec<String>,
    #[serde(default = "default_segment_binary")]
    pub segment_binary: PathBuf,
    /// Local path of the raw imagery (usually a mount point)
    pub raw_root: PathBuf,
    /// Local path of the processed output (usually a mount point)
    pub proc_root: PathBuf,
    /// Where per-unit segmentation logs are written
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default)]
    pub crop: CropParams,
    #[serde(default)]
    pub tuning: SegmentTuning,
    #[serde(default = "default_deployments")]
    pub deployments: HashMap<String, DeploymentProfile>,
    #[serde(default = "default_targets")]
    pub targets: Vec<TargetSubpath>,
    #[serde(default)]
    pub mounts: Vec<MountSpec>,
    /// Report (but never overwrite) same-named files with different bytes
    #[serde(default)]
    pub detect_conflicts: bool,
}

impl PipelineConfig {
    /// Validate once at startup, before any mount or subprocess.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resize_factor()?;

        if let DirectorySelection::List(list) = &self.directories {
            if list.iter().all(|d| d.trim().is_empty()) {
                return Err(ConfigError::EmptyDirectories);
            }
        }

        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        check_distinct_destinations(&self.targets)?;

        Ok(())
    }

    /// Resize factor of the configured deployment
    pub fn resize_factor(&self) -> Result<f64, ConfigError> {
        let profile = self
            .deployments
            .get(&self.deployment)
            .ok_or_else(|| ConfigError::UnknownDeployment(self.deployment.clone()))?;

        if !(profile.resize_factor.is_finite() && profile.resize_factor > 0.0) {
            return Err(ConfigError::InvalidResizeFactor {
                deployment: self.deployment.clone(),
                factor: profile.resize_factor,
            });
        }

        Ok(profile.resize_factor)
    }

    /// Crop margins scaled to this deployment's image size
    pub fn scaled_crop(&self) -> Result<CropParams, ConfigError> {
        Ok(self.crop.scaled(self.resize_factor()?))
    }

    /// `<rawRoot>/<project>/<year>/<deployment>/images`
    pub fn raw_path(&self) -> PathBuf {
        self.raw_root
            .join(&self.project)
            .join(&self.year)
            .join(&self.deployment)
            .join("images")
    }

    /// `<procRoot>/<project>/<year>/<deployment>/tmser`
    pub fn proc_path(&self) -> PathBuf {
        self.proc_root
            .join(&self.project)
            .join(&self.year)
            .join(&self.deployment)
            .join("tmser")
    }

    /// `<logDir>/<deployment>-<unit>.log`
    pub fn unit_log_path(&self, unit: &str) -> PathBuf {
        self.log_dir.join(format!("{}-{}.log", self.deployment, unit))
    }
}

/// Annotation subset-copy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationConfig {
    pub project: String,
    pub year: String,
    pub deployment: String,
    /// Local path of the raw imagery (usually a mount point)
    pub raw_root: PathBuf,
    /// Folder holding `<deployment>-annotations-all.csv`
    pub annotations_dir: PathBuf,
    /// Defaults to `<annotationsDir>/annotated-images-<deployment>`
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Zero-based CSV column holding the image filename
    #[serde(default = "default_filename_column")]
    pub filename_column: usize,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Turn the first '-' of each annotated name back into a space before matching
    #[serde(default = "default_true")]
    pub restore_first_space: bool,
}

impl AnnotationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(ConfigError::NoExtensions);
        }
        Ok(())
    }

    pub fn csv_path(&self) -> PathBuf {
        self.annotations_dir
            .join(format!("{}-annotations-all.csv", self.deployment))
    }

    /// `<rawRoot>/<project>/<year>/<deployment>/images`
    pub fn image_root(&self) -> PathBuf {
        self.raw_root
            .join(&self.project)
            .join(&self.year)
            .join(&self.deployment)
            .join("images")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            self.annotations_dir
                .join(format!("annotated-images-{}", self.deployment))
        })
    }
}

/// Read a JSON configuration file
pub async fn read_config<T: DeserializeOwned>(config_path: &Path) -> Result<T, ConfigError> {
    if !config_path.exists() {
        return Err(ConfigError::NotFound(config_path.display().to_string()));
    }

    let content = fs::read_to_string(config_path).await?;
    let config: T = serde_json::from_str(&content)?;
    Ok(config)
}

/// Write a JSON configuration file
pub async fn write_config<T: Serialize>(config_path: &Path, config: &T) -> Result<(), ConfigError> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(config_path, content).await?;
    Ok(())
}
