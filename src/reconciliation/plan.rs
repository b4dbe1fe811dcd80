use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Target subpath is empty")]
    EmptyTarget,

    #[error("Target subpath must be relative and free of '.' or '..': {0}")]
    InvalidTarget(String),

    #[error("Target subpaths share the destination folder '{0}'")]
    DuplicateDestination(String),
}

/// A relative directory path identifying one category of output.
///
/// Each target maps to exactly one destination folder, named after its
/// final path component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetSubpath {
    path: PathBuf,
    dest_name: String,
}

impl TargetSubpath {
    pub fn new(raw: &str) -> Result<Self, PlanError> {
        let trimmed = raw.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(PlanError::EmptyTarget);
        }

        let path = PathBuf::from(trimmed);
        let mut last = None;
        for component in path.components() {
            match component {
                Component::Normal(part) => last = Some(part.to_string_lossy().to_string()),
                _ => return Err(PlanError::InvalidTarget(raw.to_string())),
            }
        }

        let dest_name = last.ok_or_else(|| PlanError::InvalidTarget(raw.to_string()))?;
        Ok(Self { path, dest_name })
    }

    /// The relative path searched for under each unit directory
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Final path component, used as the destination folder name
    pub fn dest_name(&self) -> &str {
        &self.dest_name
    }
}

impl TryFrom<String> for TargetSubpath {
    type Error = PlanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<TargetSubpath> for String {
    fn from(value: TargetSubpath) -> Self {
        value.path.to_string_lossy().to_string()
    }
}

impl std::fmt::Display for TargetSubpath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Parse a list of target strings, rejecting colliding destination names
pub fn parse_targets<S: AsRef<str>>(raw: &[S]) -> Result<Vec<TargetSubpath>, PlanError> {
    let targets = raw
        .iter()
        .map(|s| TargetSubpath::new(s.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    check_distinct_destinations(&targets)?;
    Ok(targets)
}

/// Final segments must be mutually distinct, otherwise two categories
/// would merge into one folder
pub fn check_distinct_destinations(targets: &[TargetSubpath]) -> Result<(), PlanError> {
    let mut seen = std::collections::HashSet::new();
    for target in targets {
        if !seen.insert(target.dest_name()) {
            return Err(PlanError::DuplicateDestination(target.dest_name().to_string()));
        }
    }
    Ok(())
}

/// A candidate unit directory somewhere under the source root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDir {
    /// Path relative to the source root, for logs
    pub name: String,
    pub path: PathBuf,
}

/// Where one target's files come from and where they go
#[derive(Debug, Clone)]
pub struct TargetPlan {
    pub target: TargetSubpath,
    pub destination: PathBuf,
    /// Matched `<unit>/<target>` directories, in traversal order
    pub matched_dirs: Vec<PathBuf>,
}

/// The reconciliation plan
#[derive(Debug, Clone, Default)]
pub struct ReconciliationPlan {
    pub units: Vec<UnitDir>,
    pub targets: Vec<TargetPlan>,
}

/// Phase one: enumerate every directory at any depth below `source_root`.
///
/// The root itself is never a unit. A missing or unreadable root yields no
/// units, and unreadable subtrees are skipped. Traversal is depth-first with
/// entries sorted by name, so "first encountered" is stable across platforms.
pub fn discover_units(source_root: &Path) -> Vec<UnitDir> {
    if !source_root.is_dir() {
        return Vec::new();
    }

    WalkDir::new(source_root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| UnitDir {
            name: e
                .path()
                .strip_prefix(source_root)
                .unwrap_or(e.path())
                .to_string_lossy()
                .to_string(),
            path: e.into_path(),
        })
        .collect()
}

/// Phase two: for each unit, `unit/target` matches if it is a directory.
///
/// At least one path component always separates the source root from a
/// match, so a target sitting directly under the root is never merged.
pub fn find_target_dirs(units: &[UnitDir], target: &TargetSubpath) -> Vec<PathBuf> {
    units
        .iter()
        .map(|unit| unit.path.join(target.as_path()))
        .filter(|candidate| candidate.is_dir())
        .collect()
}

/// Build a reconciliation plan for the given source and destination roots
pub fn build_reconciliation_plan(
    source_root: &Path,
    dest_root: &Path,
    targets: &[TargetSubpath],
) -> ReconciliationPlan {
    let units = discover_units(source_root);

    let targets = targets
        .iter()
        .map(|target| TargetPlan {
            target: target.clone(),
            destination: dest_root.join(target.dest_name()),
            matched_dirs: find_target_dirs(&units, target),
        })
        .collect();

    ReconciliationPlan { units, targets }
}
