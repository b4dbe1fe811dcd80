//! Cloud bucket mounts around a pipeline run.
//!
//! Only the tool invocation lives here: the mount helper is expected to be
//! installed and authenticated already.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum MountError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to launch '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with status {code:?} for '{mount_point}'")]
    CommandFailed {
        program: String,
        mount_point: String,
        code: Option<i32>,
    },
}

fn default_mount_program() -> String {
    "gcsfuse".to_string()
}

fn default_unmount_program() -> String {
    "fusermount".to_string()
}

/// A bucket exposed as a local directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountSpec {
    pub bucket: String,
    pub mount_point: PathBuf,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default = "default_mount_program")]
    pub mount_program: String,
    #[serde(default = "default_unmount_program")]
    pub unmount_program: String,
}

impl MountSpec {
    pub fn new(bucket: impl Into<String>, mount_point: impl Into<PathBuf>, read_only: bool) -> Self {
        Self {
            bucket: bucket.into(),
            mount_point: mount_point.into(),
            read_only,
            mount_program: default_mount_program(),
            unmount_program: default_unmount_program(),
        }
    }

    /// Arguments for the mount program
    pub fn mount_args(&self) -> Vec<String> {
        let mut args = vec!["--implicit-dirs".to_string()];
        if self.read_only {
            args.push("-o".to_string());
            args.push("ro".to_string());
        }
        args.push(self.bucket.clone());
        args.push(self.mount_point.to_string_lossy().to_string());
        args
    }

    /// Arguments for the unmount program
    pub fn unmount_args(&self) -> Vec<String> {
        vec![
            "-u".to_string(),
            self.mount_point.to_string_lossy().to_string(),
        ]
    }
}

/// Create the mount point if needed and mount the bucket
pub async fn mount(spec: &MountSpec) -> Result<(), MountError> {
    if !spec.mount_point.exists() {
        fs::create_dir_all(&spec.mount_point).await?;
    }

    info!(
        "Mounting bucket '{}' at '{}'{}",
        spec.bucket,
        spec.mount_point.display(),
        if spec.read_only { " (read-only)" } else { "" }
    );
    run_tool(&spec.mount_program, &spec.mount_args(), &spec.mount_point).await
}

pub async fn unmount(spec: &MountSpec) -> Result<(), MountError> {
    info!("Unmounting '{}'", spec.mount_point.display());
    run_tool(&spec.unmount_program, &spec.unmount_args(), &spec.mount_point).await
}

/// Mount every spec in order. On failure, already-mounted specs are released.
pub async fn mount_all(specs: &[MountSpec]) -> Result<(), MountError> {
    for (i, spec) in specs.iter().enumerate() {
        if let Err(e) = mount(spec).await {
            unmount_all(&specs[..i]).await;
            return Err(e);
        }
    }
    Ok(())
}

/// Unmount every spec, logging failures instead of stopping
pub async fn unmount_all(specs: &[MountSpec]) {
    for spec in specs {
        if let Err(e) = unmount(spec).await {
            warn!("Failed to unmount '{}': {}", spec.mount_point.display(), e);
        }
    }
}

async fn run_tool(program: &str, args: &[String], mount_point: &Path) -> Result<(), MountError> {
    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|source| MountError::SpawnFailed {
            program: program.to_string(),
            source,
        })?;

    if !status.success() {
        return Err(MountError::CommandFailed {
            program: program.to_string(),
            mount_point: mount_point.display().to_string(),
            code: status.code(),
        });
    }

    Ok(())
}
