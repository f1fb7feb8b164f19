//! Timeframe driver - merges collisions into timeframes and writes the results
//!
//! Usage:
//!   cargo run --bin timeframes                              # Use defaults
//!   cargo run --bin timeframes -- --config tf.toml          # Use config file
//!   cargo run --bin timeframes -- -i datafiles.txt -n 10    # 10 timeframes from dumps
//!   cargo run --bin timeframes -- --emulate -c train        # Train a Huffman table
//!   cargo run --bin timeframes -- -i - -n -1                # File names from stdin, all input

use std::io;

use clap::Parser;
use tfgen_rs::common::TimeframeArgs;
use tfgen_rs::config::{Config, InputSource};
use tfgen_rs::data_source_emulator::EmulatorSource;
use tfgen_rs::pipeline::TimeframePipeline;
use tfgen_rs::reader::{EventSource, FileListSource};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Timeframe generator for TPC raw channel data
#[derive(Parser, Debug)]
#[command(name = "timeframes", about = "TPC timeframe generator")]
struct Args {
    #[command(flatten)]
    timeframe: TimeframeArgs,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tfgen_rs=info".parse()?))
        .init();

    let args = Args::parse();

    // Build configuration
    let config_path = &args.timeframe.common.config_file;
    let mut config = if std::path::Path::new(config_path).exists() {
        let config = Config::load(config_path)?;
        info!(config_file = %config_path, "Loaded configuration");
        config
    } else {
        info!(config_file = %config_path, "Config file not found, using defaults");
        Config::default()
    };
    args.timeframe.apply_to(&mut config);
    config.validate()?;

    let mut source: Box<dyn EventSource> = match config.input.source {
        InputSource::Emulator => Box::new(EmulatorSource::new(config.input.emulator.clone())?),
        InputSource::Files if config.input.file_list == "-" => {
            info!("Reading input file names from stdin");
            Box::new(FileListSource::new(io::stdin().lock()))
        }
        InputSource::Files => Box::new(FileListSource::open(&config.input.file_list)?),
    };

    info!(
        frames = config.generator.frames,
        pileup_mode = ?config.generator.pileup_mode,
        rate = config.generator.rate,
        compression = ?config.compression.mode,
        "Starting timeframe generation"
    );

    let mut pipeline = TimeframePipeline::new(config)?;
    let summary = pipeline.run(source.as_mut())?;

    info!(
        timeframes = summary.timeframes,
        collisions = summary.collisions,
        channels = summary.channels,
        signal_overflow = summary.counters.signal_overflow,
        out_of_range = summary.counters.out_of_range,
        "Timeframe generation finished"
    );
    if let Some(compression) = &summary.compression {
        info!(
            channels = compression.channels,
            mean_factor = compression.mean_factor,
            min_factor = compression.min_factor,
            max_factor = compression.max_factor,
            "Compression estimate"
        );
    }

    Ok(())
}
