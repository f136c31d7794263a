//! transform-field - mask fields of a record stream read from stdin
//!
//! Reads one JSON message per line, applies the configured transformations to
//! record messages and writes every message to stdout. With `--validate` the
//! rules are checked against a catalog instead and no input is read.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fieldmask_core::batcher::{
    DEFAULT_BATCH_DELAY, DEFAULT_MAX_BATCH_BYTES, DEFAULT_MAX_BATCH_RECORDS,
};
use fieldmask_core::{BatchSettings, Batcher, FlushStats, JsonLinesSink, PipelineError};
use fieldmask_recipe::{
    validate_rules, Catalog, ConfigError, RuleRegistry, TransformConfig, TransformationRule,
    ValidationError,
};
use tracing::{error, info, info_span};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "transform-field")]
#[command(about = "Transform fields of a record stream read from stdin")]
#[command(version)]
struct Cli {
    /// Path to the transformation config JSON file
    #[arg(short, long, env = "TRANSFORM_FIELD_CONFIG")]
    config: PathBuf,

    /// Path to the catalog JSON file, used by --validate
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Validate the transformations against the catalog and exit
    #[arg(long)]
    validate: bool,

    /// Flush a batch once its buffered input reaches this many bytes
    #[arg(long, default_value_t = DEFAULT_MAX_BATCH_BYTES, env = "TRANSFORM_FIELD_MAX_BATCH_BYTES")]
    max_batch_bytes: usize,

    /// Flush a batch once it holds this many messages
    #[arg(long, default_value_t = DEFAULT_MAX_BATCH_RECORDS, env = "TRANSFORM_FIELD_MAX_BATCH_RECORDS")]
    max_batch_records: usize,

    /// Flush a batch when a message arrives this long after the last flush
    #[arg(long, default_value_t = DEFAULT_BATCH_DELAY.as_secs(), env = "TRANSFORM_FIELD_BATCH_DELAY_SECONDS")]
    batch_delay_seconds: u64,

    /// Validate transformed records against their stream schema
    #[arg(long, env = "TRANSFORM_FIELD_VALIDATE_RECORDS")]
    validate_records: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            max_bytes: self.max_batch_bytes,
            max_records: self.max_batch_records,
            max_delay: Duration::from_secs(self.batch_delay_seconds),
            validate_records: self.validate_records,
        }
    }
}

/// Every rule that failed catalog validation.
#[derive(Debug, thiserror::Error)]
#[error("{}", join_lines(.0))]
struct ValidationFailed(Vec<ValidationError>);

fn join_lines(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => {
            info!("Exiting normally");
            ExitCode::SUCCESS
        }
        Err(err) => report(&err),
    }
}

/// Log to stderr; stdout carries the message stream.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let rules = load_rules(&cli.config)?;

    if cli.validate {
        return validate(&rules, cli.catalog.as_deref());
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    let stats = transform_stream(rules, cli.batch_settings(), stdin.lock(), stdout.lock())?;
    info!(
        flushes = stats.flushes,
        messages = stats.messages,
        applied = stats.applied,
        skipped = stats.skipped,
        failed = stats.failed,
        "Input stream consumed"
    );
    Ok(())
}

fn load_rules(path: &Path) -> Result<Vec<TransformationRule>> {
    info!("Loading transformations from {:?}", path);
    let config = TransformConfig::from_path(path)
        .with_context(|| format!("Failed to load transformation config {}", path.display()))?;
    Ok(config.compile())
}

fn validate(rules: &[TransformationRule], catalog_path: Option<&Path>) -> Result<()> {
    let catalog = catalog_path
        .map(|path| {
            Catalog::from_path(path)
                .with_context(|| format!("Failed to load catalog {}", path.display()))
        })
        .transpose()?;

    validate_rules(rules, catalog.as_ref()).map_err(ValidationFailed)?;
    info!("Transformations are valid");
    Ok(())
}

fn transform_stream<R: BufRead, W: Write>(
    rules: Vec<TransformationRule>,
    settings: BatchSettings,
    input: R,
    output: W,
) -> Result<FlushStats, PipelineError> {
    let registry = RuleRegistry::new(rules);
    info!(
        streams = registry.streams().count(),
        rules = registry.len(),
        "Transforming input stream"
    );
    let mut batcher = Batcher::new(registry, settings, JsonLinesSink::new(output))
        .with_span(info_span!("transform_field"));
    batcher.consume_lines(input)?;
    Ok(batcher.stats())
}

/// Exit code 1 for errors this tool describes itself, 2 for anything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    let named = err.chain().any(|cause| {
        cause.is::<ConfigError>() || cause.is::<PipelineError>() || cause.is::<ValidationFailed>()
    });
    if named {
        1
    } else {
        2
    }
}

fn report(err: &anyhow::Error) -> ExitCode {
    let code = exit_code(err);
    if code == 1 {
        for line in format!("{:#}", err).lines() {
            error!("{}", line);
        }
    } else {
        error!("{:?}", err);
    }
    ExitCode::from(code)
}
