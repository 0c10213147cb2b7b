use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use encode_conformance::harness::TestMode;
use encode_conformance::lockfile::{generate_lock, load_lock, verify_lock};
use encode_conformance::observability::log_snapshot;
use encode_conformance::presets::generate_preset;
use encode_conformance::recipe::{CaptureSpec, CodecSpec, FlagSpec, Recipe, SourceSpec};
use encode_conformance::runner::{ConformanceReport, run_recipe, write_report};
use encode_conformance::validation::{ValidationReport, validate_recipe};
use encode_conformance::video::{ImageFormat, Rational};
use serde_json::to_writer_pretty;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_tracing()?;

    match cli.command {
        Commands::Run {
            recipe,
            print_metrics,
            metrics_json,
            report,
            lock,
        } => run_command(recipe, print_metrics, metrics_json, report, lock),
        Commands::Quick {
            mode,
            width,
            height,
            frames,
        } => quick_command(mode, width, height, frames),
        Commands::Validate { recipe } => validate_recipe_cmd(recipe),
        Commands::Lock { recipe, output } => lock_recipe(recipe, output),
        Commands::Modes => {
            list_modes();
            Ok(())
        }
        Commands::Recipe { action } => recipe_command(action),
    }
}

fn configure_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))?;
    Ok(())
}

fn run_command(
    recipe_path: PathBuf,
    print_metrics: bool,
    metrics_json: Option<PathBuf>,
    report_path: Option<PathBuf>,
    lock_path: Option<PathBuf>,
) -> Result<()> {
    let recipe = load_valid_recipe(&recipe_path)?;
    let report = run_recipe(&recipe, Some(&recipe_path))?;
    print_summary(&report);

    if print_metrics {
        log_snapshot(&report.metrics);
    }
    if let Some(path) = metrics_json {
        create_parent(&path)?;
        let file = File::create(&path)
            .with_context(|| format!("Failed to create metrics file: {}", path.display()))?;
        to_writer_pretty(file, &report.metrics)
            .with_context(|| format!("Failed to write metrics JSON: {}", path.display()))?;
        info!(metrics = %path.display(), "Metrics JSON written");
    }
    if let Some(path) = report_path {
        write_report(&report, &path)?;
        info!(report = %path.display(), "Run report written");
    }
    if let Some(path) = lock_path {
        let lock = load_lock(&path)?;
        let problems = verify_lock(&lock, &recipe, &report)?;
        if !problems.is_empty() {
            for problem in &problems {
                error!(lockfile = %path.display(), "{problem}");
            }
            bail!("Lockfile verification failed with {} difference(s)", problems.len());
        }
        info!(lockfile = %path.display(), "Bitstreams match lockfile");
    }

    Ok(())
}

fn quick_command(modes: Vec<TestMode>, width: u32, height: u32, frames: u32) -> Result<()> {
    let modes = if modes.is_empty() {
        TestMode::ALL.to_vec()
    } else {
        modes
    };
    let recipe = Recipe {
        version: 1,
        modes,
        source: SourceSpec::Synthetic {
            width,
            height,
            frames,
            format: ImageFormat::I420,
            timebase: Rational::new(1, 30),
            resize: Vec::new(),
        },
        codec: CodecSpec::default(),
        flags: FlagSpec::default(),
        capture: CaptureSpec::default(),
    };
    let validation = validate_recipe(&recipe);
    if !validation.is_ok() {
        bail!("Invalid quick run: {}", validation.errors.join("; "));
    }
    let report = run_recipe(&recipe, None)?;
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &ConformanceReport) {
    for outcome in &report.modes {
        let compared: u32 = outcome.run.passes.iter().map(|p| p.compared_frames).sum();
        match outcome.final_digest() {
            Some(digest) => println!(
                "{:<14} ok  frames={} bytes={} compared={} sha256={}",
                outcome.mode, digest.frames, digest.bytes, compared, digest.sha256
            ),
            None => println!("{:<14} ok  (no frame packets)", outcome.mode),
        }
    }
}

fn load_valid_recipe(recipe_path: &Path) -> Result<Recipe> {
    let recipe = Recipe::load(recipe_path)?;
    let report = validate_recipe(&recipe);
    log_validation(recipe_path, &report);
    if !report.is_ok() {
        bail!(
            "Recipe validation failed with {} error(s)",
            report.errors.len()
        );
    }
    Ok(recipe)
}

fn log_validation(recipe_path: &Path, report: &ValidationReport) {
    for warning in &report.warnings {
        warn!(file = %recipe_path.display(), "{warning}");
    }
    for error_msg in &report.errors {
        error!(file = %recipe_path.display(), "{error_msg}");
    }
}

fn validate_recipe_cmd(recipe_path: PathBuf) -> Result<()> {
    load_valid_recipe(&recipe_path)?;
    info!(file = %recipe_path.display(), "Recipe validation passed");
    Ok(())
}

fn lock_recipe(recipe_path: PathBuf, output_path: PathBuf) -> Result<()> {
    let recipe = load_valid_recipe(&recipe_path)
        .context("Cannot generate lockfile for an invalid recipe")?;
    let report = run_recipe(&recipe, Some(&recipe_path))?;
    create_parent(&output_path)?;
    generate_lock(&recipe, &report, &output_path)?;
    info!(
        lockfile = %output_path.display(),
        "Lockfile generated successfully"
    );
    Ok(())
}

fn list_modes() {
    for mode in TestMode::ALL {
        println!(
            "{:<14} deadline={:<12} passes={}",
            mode.as_str(),
            format!("{:?}", mode.deadline()),
            mode.passes()
        );
    }
}

fn recipe_command(command: RecipeCommands) -> Result<()> {
    match command {
        RecipeCommands::New { preset, output } => {
            let destination =
                output.unwrap_or_else(|| PathBuf::from(format!("recipes/{preset}.yaml")));
            let generated = generate_preset(&preset, &destination)?;
            info!(
                preset = %preset,
                path = %generated.display(),
                "Preset recipe generated"
            );
            Ok(())
        }
        RecipeCommands::Lint { recipes } => lint_recipes(&recipes),
    }
}

fn lint_recipes(recipes: &[PathBuf]) -> Result<()> {
    let mut failures = 0usize;

    for recipe_path in recipes {
        match Recipe::load(recipe_path) {
            Ok(recipe) => {
                let report = validate_recipe(&recipe);
                log_validation(recipe_path, &report);
                if report.is_ok() {
                    info!(file = %recipe_path.display(), "Lint passed");
                } else {
                    failures += 1;
                }
            }
            Err(err) => {
                failures += 1;
                error!(file = %recipe_path.display(), "Failed to load recipe: {err:#}");
            }
        }
    }

    if failures > 0 {
        bail!("Lint failed for {failures} recipe(s)");
    }

    info!("All recipe lint checks passed");
    Ok(())
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "encode-conformance",
    version,
    about = "Encoder/decoder conformance harness"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every mode of a recipe and report per-mode bitstream digests.
    Run {
        recipe: PathBuf,
        #[arg(long)]
        print_metrics: bool,
        #[arg(long = "metrics-json")]
        metrics_json: Option<PathBuf>,
        #[arg(long)]
        report: Option<PathBuf>,
        /// Fail when the produced bitstreams differ from this lockfile.
        #[arg(long)]
        lock: Option<PathBuf>,
    },
    /// Run a synthetic clip without a recipe.
    Quick {
        #[arg(long = "mode", value_enum)]
        mode: Vec<TestMode>,
        #[arg(long, default_value_t = 16)]
        width: u32,
        #[arg(long, default_value_t = 16)]
        height: u32,
        #[arg(long, default_value_t = 2)]
        frames: u32,
    },
    Validate {
        recipe: PathBuf,
    },
    Lock {
        recipe: PathBuf,
        output: PathBuf,
    },
    /// List test modes with their deadline and pass count.
    Modes,
    Recipe {
        #[command(subcommand)]
        action: RecipeCommands,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    New {
        #[arg(long)]
        preset: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Lint {
        #[arg(required = true)]
        recipes: Vec<PathBuf>,
    },
}
