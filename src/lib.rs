//! Cellcount: typed point counting for image stacks.
//!
//! Cellcount keeps named counter types with ordered, slice-aware markers,
//! optional polygonal subregions, and turns them into per-slice tallies and
//! intensity measurements. Marker sets round-trip through the Cell Counter
//! XML layout (and a JSON dump).
//!
//! # Modules
//!
//! - [`model`]: Annotation data model and file codecs
//! - [`session`]: Command-driven counting session and click resolution
//! - [`report`]: Per-slice counts and hyperstack index decomposition
//! - [`measure`]: Intensity sampling at marker locations
//! - [`pixels`]: Pixel-access seam and an in-memory image stack
//! - [`validation`]: Marker file validation and error reporting
//! - [`config`]: Counter options
//! - [`error`]: Error types for cellcount operations

pub mod config;
pub mod error;
pub mod measure;
pub mod model;
pub mod pixels;
pub mod report;
pub mod session;
pub mod validation;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

pub use error::CellCountError;

use config::CounterOptions;
use model::{MarkerFile, MarkerFormat};
use pixels::ImageStack;

/// The cellcount CLI application.
#[derive(Parser)]
#[command(name = "cellcount")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Counter options file (YAML).
    #[arg(long, global = true, env = "CELLCOUNT_CONFIG")]
    config: Option<PathBuf>,

    /// Log progress to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print per-slice and total counts for a marker file.
    Report(ReportArgs),
    /// Sample pixel intensities under each marker.
    Measure(MeasureArgs),
    /// Validate a marker file for errors and warnings.
    Validate(ValidateArgs),
    /// Convert a marker file between XML and JSON.
    Convert(ConvertArgs),
}

/// Hyperstack shape shared by `report` and `measure`.
#[derive(clap::Args)]
struct StackShapeArgs {
    /// Number of channels.
    #[arg(long, default_value_t = 1)]
    channels: usize,

    /// Number of z-slices (derived from the data when omitted).
    #[arg(long)]
    slices: Option<usize>,

    /// Number of frames.
    #[arg(long, default_value_t = 1)]
    frames: usize,
}

impl StackShapeArgs {
    /// Planes per z-slice across channels and frames.
    fn planes_per_slice(&self) -> Result<usize, CellCountError> {
        pixels::plane_count(self.channels.max(1), 1, self.frames.max(1))
    }
}

/// Arguments for the report subcommand.
#[derive(clap::Args)]
struct ReportArgs {
    /// Marker file to count.
    input: PathBuf,

    /// Input format ('xml' or 'json'; inferred from the extension by default).
    #[arg(long)]
    format: Option<String>,

    #[command(flatten)]
    shape: StackShapeArgs,

    /// Only count markers inside a subregion.
    #[arg(long)]
    subregions_only: bool,

    /// Output format ('text', 'json', or 'tsv').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Arguments for the measure subcommand.
#[derive(clap::Args)]
struct MeasureArgs {
    /// Marker file to measure.
    input: PathBuf,

    /// Image planes, one file per plane, in stack order.
    #[arg(long = "image", required = true, num_args = 1..)]
    images: Vec<PathBuf>,

    #[command(flatten)]
    shape: StackShapeArgs,

    /// Sample this channel (1-based) instead of each marker's own.
    #[arg(long)]
    channel: Option<usize>,

    /// Only measure markers inside a subregion.
    #[arg(long)]
    subregions_only: bool,

    /// Measure even if the markers were made on a differently named image.
    #[arg(long)]
    force: bool,

    /// Output format ('text', 'json', or 'tsv').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Arguments for the validate subcommand.
#[derive(clap::Args)]
struct ValidateArgs {
    /// Marker file to validate.
    input: PathBuf,

    /// Input format ('xml' or 'json'; inferred from the extension by default).
    #[arg(long)]
    format: Option<String>,

    /// Image width to check marker positions against.
    #[arg(long, requires = "height")]
    width: Option<usize>,

    /// Image height to check marker positions against.
    #[arg(long, requires = "width")]
    height: Option<usize>,

    /// Number of planes to check marker slices against.
    #[arg(long)]
    stack_size: Option<usize>,

    /// Treat warnings as errors (exit non-zero if any warnings).
    #[arg(long)]
    strict: bool,

    /// Output format for the report ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Arguments for the convert subcommand.
#[derive(clap::Args)]
struct ConvertArgs {
    /// Marker file to read.
    input: PathBuf,

    /// File to write.
    output: PathBuf,

    /// Input format (inferred from the extension by default).
    #[arg(long)]
    from: Option<String>,

    /// Output format (inferred from the extension by default).
    #[arg(long)]
    to: Option<String>,
}

/// Run the cellcount CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), CellCountError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = match &cli.config {
        Some(path) => CounterOptions::load(path)?,
        None => CounterOptions::default(),
    };

    match cli.command {
        Some(Commands::Report(args)) => run_report(args, &options),
        Some(Commands::Measure(args)) => run_measure(args, options),
        Some(Commands::Validate(args)) => run_validate(args),
        Some(Commands::Convert(args)) => run_convert(args),
        None => {
            println!("cellcount {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Typed point counting for image stacks.");
            println!();
            println!("Run 'cellcount --help' for usage information.");
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    // A logger may already be installed when embedded; keep it.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .try_init();
}

fn resolve_format(name: Option<&str>, path: &Path) -> Result<MarkerFormat, CellCountError> {
    match name {
        Some(name) => MarkerFormat::from_name(name),
        None => MarkerFormat::from_path(path).ok_or_else(|| {
            CellCountError::UnsupportedFormat(format!(
                "cannot infer the format of {} (use .xml or .json, or pass a format)",
                path.display()
            ))
        }),
    }
}

fn read_input(path: &Path, format: Option<&str>) -> Result<MarkerFile, CellCountError> {
    let format = resolve_format(format, path)?;
    let file = format.read(path)?;
    log::info!(
        "read {} marker(s) in {} type(s) from {}",
        file.annotations.markers().total_markers(),
        file.annotations.markers().type_count(),
        path.display()
    );
    Ok(file)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CellCountError> {
    serde_json::to_string_pretty(value).map_err(CellCountError::ReportJson)
}

/// Execute the report subcommand.
fn run_report(args: ReportArgs, options: &CounterOptions) -> Result<(), CellCountError> {
    let file = read_input(&args.input, args.format.as_deref())?;

    let planes_per_slice = args.shape.planes_per_slice()?;
    let max_slice = file
        .annotations
        .markers()
        .iter_markers()
        .map(|m| m.z)
        .max()
        .unwrap_or(1);
    let slices = args
        .shape
        .slices
        .unwrap_or_else(|| max_slice.div_ceil(planes_per_slice).max(1));

    let dims = pixels::Dimensions {
        width: 0,
        height: 0,
        channels: args.shape.channels,
        slices,
        frames: args.shape.frames,
    };
    let opts = report::ReportOptions {
        restrict_to_subregions: args.subregions_only || options.restrict_to_subregions,
    };
    let counts = report::count_markers(&file.annotations, &dims, &opts)?;

    match args.output.as_str() {
        "text" => print!("{}", counts),
        "json" => println!("{}", to_json(&counts)?),
        "tsv" => print!("{}", counts.to_tsv_string()?),
        other => {
            return Err(CellCountError::UnsupportedFormat(format!(
                "output '{}' (supported: text, json, tsv)",
                other
            )));
        }
    }
    Ok(())
}

/// Execute the measure subcommand.
fn run_measure(args: MeasureArgs, options: CounterOptions) -> Result<(), CellCountError> {
    let mut image = ImageStack::open(&args.images)?;
    if args.shape.channels > 1 || args.shape.frames > 1 || args.shape.slices.is_some() {
        let per_slice = args.shape.planes_per_slice()?;
        let slices = args.shape.slices.unwrap_or(args.images.len() / per_slice);
        image = image.with_hyperstack_dims(args.shape.channels, slices, args.shape.frames)?;
    }

    let restrict = args.subregions_only || options.restrict_to_subregions;
    let mut counter = session::Session::new(options)?;
    counter.apply(session::Command::Initialize(image))?;
    counter.apply(session::Command::Import {
        path: args.input.clone(),
        force: args.force,
    })?;

    let outcome = counter.apply(session::Command::Measure(measure::MeasureOptions {
        channel: args.channel,
        restrict_to_subregions: restrict,
    }))?;
    let session::Outcome::Measured(measured) = outcome else {
        return Err(CellCountError::InvalidState(
            "measurement produced no report".to_string(),
        ));
    };

    match args.output.as_str() {
        "text" => print!("{}", measured),
        "json" => println!("{}", to_json(&measured)?),
        "tsv" => print!("{}", measured.to_tsv_string()?),
        other => {
            return Err(CellCountError::UnsupportedFormat(format!(
                "output '{}' (supported: text, json, tsv)",
                other
            )));
        }
    }
    Ok(())
}

/// Execute the validate subcommand.
fn run_validate(args: ValidateArgs) -> Result<(), CellCountError> {
    let file = read_input(&args.input, args.format.as_deref())?;

    let opts = validation::ValidateOptions {
        strict: args.strict,
        plane: args.width.zip(args.height),
        stack_size: args.stack_size,
    };
    let report = validation::validate_markers(&file, &opts);

    match args.output.as_str() {
        "json" => println!("{}", to_json(&report)?),
        _ => print!("{}", report),
    }

    let has_errors = report.error_count() > 0;
    let has_warnings = report.warning_count() > 0;

    if has_errors || (opts.strict && has_warnings) {
        Err(CellCountError::ValidationFailed {
            error_count: report.error_count(),
            warning_count: report.warning_count(),
            report,
        })
    } else {
        Ok(())
    }
}

/// Execute the convert subcommand.
fn run_convert(args: ConvertArgs) -> Result<(), CellCountError> {
    let file = read_input(&args.input, args.from.as_deref())?;
    let target = resolve_format(args.to.as_deref(), &args.output)?;
    target.write(&args.output, &file)?;
    log::info!("wrote {:?} to {}", target, args.output.display());
    Ok(())
}
