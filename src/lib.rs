pub mod annotation;
pub mod config;
pub mod mount;
pub mod pipeline;
pub mod reconciliation;
pub mod segment;
pub mod utils;

// Re-export commonly used types
pub use annotation::{run_annotation, AnnotationError, AnnotationReport, CopyFailure, FailedCopy};
pub use config::{
    read_config, write_config, AnnotationConfig, ConfigError, CropParams, DeploymentProfile,
    DirectorySelection, PipelineConfig, SegmentTuning,
};
pub use mount::{mount, unmount, MountError, MountSpec};
pub use pipeline::{run_segmentation, run_with_binary, PipelineError, PipelineResult, UnitResult};
pub use reconciliation::{
    build_reconciliation_plan, parse_targets, reconcile, reconcile_with_options, ReconcileError,
    ReconcileOptions, ReconciliationPlan, ReconciliationResult, TargetReport, TargetSubpath,
};
pub use segment::{BinarySegmenter, SegmentError, SegmentOutcome, SegmentParams, Segmenter};
pub use utils::{sanitize_filename, DEFAULT_TARGETS};
