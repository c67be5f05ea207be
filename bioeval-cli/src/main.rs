use bioeval_core::{config::EvalParams, gallery::Gallery, EvalPipeline};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "bioeval")]
#[command(about = "Biometric algorithm evaluation harness", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Parameter file (defaults to the standard config search path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a resolved sigset into a gallery
    Enroll {
        /// Resolved sigset (JSON)
        sigset: PathBuf,
        /// Output gallery file (.gal)
        gallery: PathBuf,
    },
    /// Compare two galleries into a similarity matrix
    Compare {
        /// Target gallery (.gal)
        target: PathBuf,
        /// Query gallery (.gal)
        query: PathBuf,
        /// Output matrix file (.mtx)
        output: PathBuf,
    },
    /// Derive the ground-truth mask from two sigsets
    MakeMask {
        /// Target resolved sigset (JSON)
        target_sigset: PathBuf,
        /// Query resolved sigset (JSON)
        query_sigset: PathBuf,
        /// Output mask file (.mask)
        output: PathBuf,
    },
    /// Evaluate a similarity matrix against a mask and export CSV
    Eval {
        /// Similarity matrix (.mtx), from this system or a third party
        matrix: PathBuf,
        /// Ground-truth mask (.mask)
        mask: PathBuf,
        /// Output report (.csv)
        output: PathBuf,
        /// Series label for the report rows (defaults to the output file stem)
        #[arg(short, long)]
        label: Option<String>,
    },
    /// Show parameters
    Config {
        /// Validate parameters
        #[arg(long)]
        validate: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let params = match &cli.config {
        Some(path) => EvalParams::load_from_path(path)?,
        None => EvalParams::load()?,
    };

    match cli.command {
        Commands::Enroll { sigset, gallery } => cmd_enroll(params, sigset, gallery),
        Commands::Compare {
            target,
            query,
            output,
        } => cmd_compare(params, target, query, output),
        Commands::MakeMask {
            target_sigset,
            query_sigset,
            output,
        } => cmd_make_mask(params, target_sigset, query_sigset, output),
        Commands::Eval {
            matrix,
            mask,
            output,
            label,
        } => cmd_eval(params, matrix, mask, output, label),
        Commands::Config { validate } => cmd_config(params, validate),
    }
}

fn cmd_enroll(params: EvalParams, sigset: PathBuf, gallery: PathBuf) -> anyhow::Result<()> {
    println!("Enrolling {} -> {}", sigset.display(), gallery.display());

    let pipeline = EvalPipeline::new(params)?;
    let start = Instant::now();
    let result = pipeline.enroll(&sigset, &gallery)?;

    println!(
        "✓ Gallery {} written: {} templates, {} gaps ({:.2}s)",
        result.name(),
        result.len(),
        result.gap_count(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn cmd_compare(
    params: EvalParams,
    target: PathBuf,
    query: PathBuf,
    output: PathBuf,
) -> anyhow::Result<()> {
    let pipeline = EvalPipeline::new(params)?;
    let target = Gallery::load(&target)?;
    let query = Gallery::load(&query)?;

    let cancel = AtomicBool::new(false);
    let start = Instant::now();
    let matrix = pipeline.compare(&target, &query, &output, &cancel)?;

    println!(
        "✓ Matrix {} written: {}x{} ({:.2}s)",
        output.display(),
        matrix.rows(),
        matrix.cols(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn cmd_make_mask(
    params: EvalParams,
    target_sigset: PathBuf,
    query_sigset: PathBuf,
    output: PathBuf,
) -> anyhow::Result<()> {
    let pipeline = EvalPipeline::new(params)?;
    let mask = pipeline.make_mask(&target_sigset, &query_sigset, &output)?;

    println!(
        "✓ Mask {} written: {}x{}",
        output.display(),
        mask.rows(),
        mask.cols()
    );
    Ok(())
}

fn cmd_eval(
    params: EvalParams,
    matrix: PathBuf,
    mask: PathBuf,
    output: PathBuf,
    label: Option<String>,
) -> anyhow::Result<()> {
    let label = label.unwrap_or_else(|| {
        output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unlabeled".to_string())
    });

    let pipeline = EvalPipeline::new(params)?;
    let metrics = pipeline.evaluate(&matrix, &mask, &output, &label)?;

    println!("✓ Report written to {}", output.display());
    println!();
    println!("{:<20} {}", "Series", label);
    println!("{:<20} {}", "Genuine records", metrics.genuine_scores.len());
    println!(
        "{:<20} {}",
        "Impostor records",
        metrics.impostor_scores.len()
    );
    println!("{:<20} {}", "ROC points", metrics.roc.len());
    println!("{:<20} {}", "EER", metrics.eer);
    println!(
        "{:<20} {} (at FAR {})",
        "TAR", metrics.tar_at_far, metrics.target_far
    );
    if metrics.decision_threshold.is_some() {
        println!("{:<20} {}", "Accuracy", metrics.accuracy);
    }
    Ok(())
}

fn cmd_config(params: EvalParams, validate: bool) -> anyhow::Result<()> {
    if validate {
        params.validate()?;
        println!("✓ Parameters are valid");
        return Ok(());
    }

    println!("Parameters:");
    println!();
    println!("  algorithm = {:?}", params.algorithm);
    println!("  force_enrollment = {}", params.force_enrollment);
    println!(
        "  comparison_input_path = {:?}",
        params.comparison_input_path
    );
    println!("  target_far = {}", params.target_far);
    println!("  same_source_exclusion = {}", params.same_source_exclusion);
    match params.decision_threshold {
        Some(threshold) => println!("  decision_threshold = {}", threshold),
        None => println!("  decision_threshold = (unset)"),
    }
    println!("  enrollment_policy = {:?}", params.enrollment_policy);
    println!("  exclude_self = {}", params.exclude_self);

    Ok(())
}
