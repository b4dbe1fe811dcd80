use anyhow::Context;
use clap::{Parser, Subcommand};
use imagery_pipeline::config::{read_config, AnnotationConfig, PipelineConfig};
use imagery_pipeline::reconciliation::{parse_targets, reconcile_with_options, ReconcileOptions};
use imagery_pipeline::utils::DEFAULT_TARGETS;
use imagery_pipeline::{annotation, pipeline};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Imagery Pipeline - segmentation driver and output reconciler for glider imagery
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log filter directive, overrides --verbose (e.g. "imagery_pipeline=debug")
    #[arg(long, env = "IMAGERY_LOG", global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge per-unit segmentation output into flat per-category folders
    Reconcile {
        /// Root holding one output directory per unit
        source: PathBuf,

        /// Root under which one folder per target is created
        dest: PathBuf,

        /// Relative target subpath; repeat for several. Defaults to the segmentation categories.
        #[arg(short, long = "target")]
        targets: Vec<String>,

        /// Report skipped files whose bytes differ from the existing copy
        #[arg(long)]
        detect_conflicts: bool,
    },

    /// Segment every configured directory and reconcile its output
    Segment {
        /// Pipeline config file (JSON)
        #[arg(short, long, env = "IMAGERY_CONFIG")]
        config: PathBuf,
    },

    /// Copy the images named in an annotation CSV into one folder
    Annotate {
        /// Annotation config file (JSON)
        #[arg(short, long, env = "IMAGERY_CONFIG")]
        config: PathBuf,
    },
}

fn init_logging(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = match &args.log {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
    };

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args)?;

    match args.command {
        Command::Reconcile {
            source,
            dest,
            targets,
            detect_conflicts,
        } => {
            let targets = if targets.is_empty() {
                parse_targets(&DEFAULT_TARGETS[..])?
            } else {
                parse_targets(&targets[..])?
            };
            let options = ReconcileOptions { detect_conflicts };
            let result = reconcile_with_options(&source, &dest, &targets, &options)
                .await
                .with_context(|| format!("reconciling '{}'", source.display()))?;
            info!(
                "Reconciliation complete: {} copied, {} skipped",
                result.total_copied(),
                result.total_skipped()
            );
        }
        Command::Segment { config } => {
            let config: PipelineConfig = read_config(&config)
                .await
                .with_context(|| format!("loading '{}'", config.display()))?;
            let result = pipeline::run_with_binary(&config).await?;

            let failed = result.failed_units();
            if !failed.is_empty() {
                error!("Segmentation failed for: {}", failed.join(", "));
            }
            info!("Script complete");
        }
        Command::Annotate { config } => {
            let config: AnnotationConfig = read_config(&config)
                .await
                .with_context(|| format!("loading '{}'", config.display()))?;
            let report = annotation::run_annotation(&config).await?;
            if !report.failed.is_empty() {
                error!("{} files could not be copied", report.failed.len());
            }
        }
    }

    Ok(())
}
