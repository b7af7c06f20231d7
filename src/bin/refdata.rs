//! RefData diagnostic binary
//!
//! Inspect how the reference data core would behave for a given configuration:
//! - Build a buffer pool and report its tiers
//! - Encode an instant with any time codec
//! - Print the effective configuration
//!
//! # Examples
//!
//! ```bash
//! # Tier table after borrowing and returning a 50 and a 5000 byte buffer
//! refdata --config refdata.toml pool-stats --acquire 50 --acquire 5000
//!
//! # Encode an instant at hour resolution in a zone
//! refdata encode 2024-10-27T01:30:00Z --resolution hour-zoned --zone Europe/London
//! ```

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use refdata::bytebuffer::ByteBufferPool;
use refdata::timecodec::{parse_zone, TimeResolution};
use refdata::RefDataConfig;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// RefData - time-versioned reference data diagnostics
#[derive(Parser, Debug)]
#[command(name = "refdata")]
#[command(version = refdata::VERSION)]
#[command(about = "Diagnostics for the reference data lookup core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file; defaults are used when absent
    #[arg(long, global = true, env = "REFDATA_CONFIG")]
    config: Option<PathBuf>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, env = "REFDATA_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Log level or filter directives, e.g. `debug` or `refdata=trace,warn`
    #[arg(long, global = true, default_value = "warn", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a buffer pool from the configuration and print its statistics
    PoolStats(PoolStatsArgs),

    /// Encode an instant and show the bytes and the floored instant
    Encode(EncodeArgs),

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(Args, Debug)]
struct PoolStatsArgs {
    /// Borrow a buffer of this size before reporting (repeatable)
    #[arg(short, long = "acquire")]
    sizes: Vec<usize>,

    /// Report while the buffers are still on loan
    #[arg(long)]
    hold: bool,
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// RFC 3339 instant, e.g. 2024-03-31T01:45:00Z
    instant: String,

    /// Time resolution, e.g. second, hour, day-zoned
    #[arg(short, long, default_value = "second")]
    resolution: String,

    /// IANA zone for the zoned resolutions
    #[arg(short, long)]
    zone: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    let config = load_config(cli.config.as_ref())?;
    match cli.command {
        Commands::PoolStats(args) => pool_stats_command(config, args),
        Commands::Encode(args) => encode_command(args),
        Commands::ShowConfig => show_config_command(&config),
    }
}

/// Console logging on stderr, plus a rolling file when a log directory is given
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    let (filter, rejected) = log_filter(&cli.log_level);

    let file_layer = match &cli.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Creating log directory {}", dir.display()))?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "refdata.log");
            Some(fmt::layer().with_writer(appender).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color),
        )
        .with(file_layer)
        .with(filter)
        .init();

    if let Some(error) = rejected {
        warn!(directives = %cli.log_level, error = %error, "Invalid log filter, using warn");
    }
    Ok(())
}

/// Filter from a level or a full directive list such as `refdata=debug,warn`.
/// Falls back to `warn`, handing back the parse error to report.
fn log_filter(directives: &str) -> (EnvFilter, Option<ParseError>) {
    match EnvFilter::try_new(directives) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new("warn"), Some(e)),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<RefDataConfig> {
    let config = match path {
        Some(path) => RefDataConfig::load(path)
            .with_context(|| format!("Loading configuration from {}", path.display()))?,
        None => {
            debug!("No configuration file given, using defaults");
            RefDataConfig::default()
        }
    };
    config.validate()?;
    Ok(config)
}

fn pool_stats_command(config: RefDataConfig, args: PoolStatsArgs) -> anyhow::Result<()> {
    let pool = ByteBufferPool::new(config.byte_buffer_pool)?;

    let mut borrowed = pool.acquire_many(&args.sizes)?;
    for (size, buffer) in args.sizes.iter().zip(&borrowed) {
        info!(requested = size, capacity = buffer.capacity()?, "Borrowed buffer");
    }
    if !args.hold {
        for buffer in &mut borrowed {
            buffer.release()?;
        }
    }

    println!("{}", serde_json::to_string_pretty(&pool.stats())?);
    Ok(())
}

fn encode_command(args: EncodeArgs) -> anyhow::Result<()> {
    let instant: DateTime<Utc> = DateTime::parse_from_rfc3339(&args.instant)
        .with_context(|| format!("Parsing instant '{}'", args.instant))?
        .with_timezone(&Utc);
    let resolution: TimeResolution = args.resolution.parse()?;
    let zone = args.zone.as_deref().map(parse_zone).transpose()?;

    let codec = resolution.codec(zone);
    let mut encoded = Vec::with_capacity(codec.encoded_size());
    codec.write(&mut encoded, instant)?;
    let floored = codec.read(&mut encoded.as_slice())?;

    let report = serde_json::json!({
        "resolution": resolution,
        "zone": zone.map(|z| z.name().to_string()),
        "instant": instant.to_rfc3339(),
        "encoded_size": codec.encoded_size(),
        "hex": hex::encode(&encoded),
        "floored": floored.to_rfc3339(),
        "temporal_unit": codec.temporal_unit(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn show_config_command(config: &RefDataConfig) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
