//! Grid math command line tool.
//!
//! Combines grid variables from a Zarr store using a per-pixel expression
//! and writes the result as a new variable:
//!
//! ```text
//! gridmath [OPTIONS] <INPUT> <OUTPUT> "<name> = <expression>"
//! ```
//!
//! Each variable named in the expression is opened lazily from the input
//! store. The result is written to a staging array and renamed into place
//! only after every tile has been computed.

mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chunk_engine::{
    ChunkCollector, ChunkComputation, ChunkProducer, DataChunk, EngineConfig, ExpressionFunction,
    FailurePolicy, GridChunkConsumer, GridChunkProducer, GridInfo, GridStorage, PoolProcessor,
    SharedGrid, ZarrGrid,
};
use clap::Parser;
use grid_expression::{split_assignment, ExpressionParser, Grammar};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use output::OutputRequest;

const STAGING_SUFFIX: &str = ".partial";

#[derive(Parser, Debug)]
#[command(name = "gridmath")]
#[command(about = "Combine gridded earth data using a mathematical expression")]
struct Args {
    /// Zarr store holding the input variables
    input: PathBuf,

    /// Zarr store receiving the output variable (may equal the input)
    output: PathBuf,

    /// Assignment such as "sst_c = sst - 273.15"
    expression: String,

    /// Expression syntax: legacy (emulated) or modern (java)
    #[arg(short, long, default_value = "legacy")]
    parser: String,

    /// Skip computation for pixels where any input is missing
    #[arg(short = 'k', long)]
    skip_missing: bool,

    /// Output storage type: byte, ubyte, short, ushort, int, uint, long, ulong, float or double
    #[arg(short, long)]
    size: Option<String>,

    /// Store output unsigned (integer sizes only)
    #[arg(long)]
    unsigned: bool,

    /// Packing as FACTOR/OFFSET, or "none" (ignored for float and double)
    #[arg(short = 'c', long)]
    scale: Option<String>,

    /// Stored value marking missing output pixels
    #[arg(short, long, allow_hyphen_values = true)]
    missing: Option<String>,

    /// Input variable whose storage format the output copies
    #[arg(short, long)]
    template: Option<String>,

    /// Output tile size as ROWSxCOLS (default: first input's tiles)
    #[arg(long)]
    tile: Option<String>,

    /// Worker thread limit
    #[arg(long, env = "GRIDMATH_MAX_THREADS")]
    threads: Option<usize>,

    /// fail_fast or aggregate
    #[arg(long)]
    failure_policy: Option<String>,

    /// Log time spent reading, computing and writing
    #[arg(long)]
    timing: bool,

    /// YAML engine configuration (default: GRIDMATH_* environment variables)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replace an existing output variable
    #[arg(long)]
    overwrite: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn output_request(&self) -> OutputRequest {
        OutputRequest {
            size: self.size.clone(),
            unsigned: self.unsigned,
            scale: self.scale.clone(),
            missing: self.missing.clone(),
        }
    }

    /// Engine settings: file or environment, then command line flags.
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_yaml_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => EngineConfig::from_env(),
        };
        if let Some(threads) = self.threads {
            config.max_threads = Some(threads);
        }
        if self.skip_missing {
            config.skip_missing = true;
        }
        if let Some(policy) = &self.failure_policy {
            config.failure_policy = FailurePolicy::from_str(policy)
                .with_context(|| format!("unknown failure policy '{policy}'"))?;
        }
        if self.timing {
            config.track_timing = true;
        }
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    fn grammar(&self) -> Result<Grammar> {
        Grammar::from_str(&self.parser)
            .with_context(|| format!("unknown parser '{}', expected legacy or modern", self.parser))
    }
}

/// Parse `ROWSxCOLS`, or a single number for square tiles.
fn parse_tile(text: &str) -> Result<[usize; 2]> {
    let parse = |s: &str| -> Result<usize> {
        let value: usize = s
            .trim()
            .parse()
            .with_context(|| format!("invalid tile size '{text}'"))?;
        if value == 0 {
            bail!("tile size must be positive, got '{text}'");
        }
        Ok(value)
    };
    match text.split_once(['x', 'X']) {
        Some((rows, cols)) => Ok([parse(rows)?, parse(cols)?]),
        None => {
            let side = parse(text)?;
            Ok([side, side])
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true);
    if args.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(&args)?;

    if let Err(e) = run(&args) {
        error!(error = %format!("{e:#}"), "gridmath failed");
        return Err(e);
    }
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let config = args.engine_config()?;
    let parser = ExpressionParser::new(args.grammar()?);
    let (output_name, _) = split_assignment(&args.expression)?;
    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        variable = %output_name,
        parser = %parser.grammar().as_str(),
        "Starting gridmath"
    );

    if ZarrGrid::exists(&args.output, &output_name) && !args.overwrite {
        bail!(
            "variable '{output_name}' already exists in {}, use --overwrite to replace it",
            args.output.display()
        );
    }

    let template = match &args.template {
        Some(name) => Some(
            ZarrGrid::open(&args.input, name)
                .with_context(|| format!("opening template variable '{name}'"))?,
        ),
        None => None,
    };
    let format = args
        .output_request()
        .resolve(template.as_ref().map(|grid| &grid.info().format))?;

    let mut inputs: Vec<GridInfo> = Vec::new();
    let mut collector = ChunkCollector::new();
    let function = ExpressionFunction::compile(
        &parser,
        &args.expression,
        &mut collector,
        |name| open_input(&args.input, name, &mut inputs),
        DataChunk::prototype(format),
        config.skip_missing,
    )
    .context("compiling expression")?;

    let Some(first) = inputs.first() else {
        bail!("expression references no input variables, the output size is unknown");
    };
    let dims = first.dims;
    collector
        .verify_dims(dims)
        .context("input variables differ in size")?;
    let tile_dims = match &args.tile {
        Some(text) => parse_tile(text)?,
        None => first.tile_dims,
    };

    let info = GridInfo::new(output_name.clone(), dims, tile_dims, format);
    let staging = format!("{output_name}{STAGING_SUFFIX}");
    let report = compute(args, &config, info, &staging, collector, function);
    match report {
        Ok(()) => {
            ZarrGrid::rename(&args.output, &staging, &output_name)
                .with_context(|| format!("publishing '{output_name}'"))?;
            info!(variable = %output_name, "Output written");
            Ok(())
        }
        Err(e) => {
            if let Err(cleanup) = ZarrGrid::remove(&args.output, &staging) {
                error!(array = %staging, error = %cleanup, "Failed to remove staging array");
            }
            Err(e)
        }
    }
}

/// Compute every tile of `info` into the staging array `staging`.
fn compute(
    args: &Args,
    config: &EngineConfig,
    mut info: GridInfo,
    staging: &str,
    collector: ChunkCollector,
    function: ExpressionFunction,
) -> Result<()> {
    let output_name = std::mem::replace(&mut info.name, staging.to_string());
    ZarrGrid::remove(&args.output, staging)?;
    let grid = SharedGrid::new(
        ZarrGrid::create(&args.output, info)
            .with_context(|| format!("creating '{output_name}' in {}", args.output.display()))?,
    );
    let consumer = GridChunkConsumer::new(grid.clone())?;
    let scheme = grid.native_scheme()?;

    let mut computation = ChunkComputation::new(collector, Arc::new(function), Arc::new(consumer));
    if config.track_timing {
        computation = computation.with_timing();
    }
    let computation = Arc::new(computation);

    let mut processor = PoolProcessor::from_config(config);
    info!(
        rows = scheme.dims()[0],
        cols = scheme.dims()[1],
        tiles = scheme.total_chunks(),
        tile_rows = scheme.chunk_size()[0],
        tile_cols = scheme.chunk_size()[1],
        threads = processor.effective_threads(),
        "Processing grid"
    );

    let started = Instant::now();
    processor.init(scheme.positions(), computation.clone())?;
    let report = processor
        .run()
        .with_context(|| format!("computing '{output_name}'"))?;
    grid.flush()?;

    info!(
        started_at = %report.started_at.to_rfc3339(),
        completed = report.completed,
        threads = report.threads,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Computation finished"
    );
    if let Some(timing) = computation.timing() {
        info!(
            timing = %serde_json::to_string(&timing)?,
            total_ms = timing.total().as_millis() as u64,
            "Stage timing"
        );
    }
    Ok(())
}

/// Open `name` from the input store, or `None` when the store has no such
/// variable.
fn open_input(
    root: &Path,
    name: &str,
    opened: &mut Vec<GridInfo>,
) -> chunk_engine::Result<Option<Arc<dyn ChunkProducer>>> {
    if !ZarrGrid::exists(root, name) {
        return Ok(None);
    }
    let grid = ZarrGrid::open(root, name)?;
    opened.push(grid.info().clone());
    let producer = GridChunkProducer::new(SharedGrid::new(grid));
    Ok(Some(Arc::new(producer)))
}
