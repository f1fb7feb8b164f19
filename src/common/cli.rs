//! CLI argument parsing for the timeframe tools
//!
//! # Design Principles (KISS)
//! - Use clap's derive macro for declarative argument definition
//! - Common arguments shared via composition, not inheritance
//! - Command line values override the configuration file

use clap::Parser;

use crate::config::{CompressionMode, Config, InputSource};

/// Common arguments shared across all binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    /// Path to configuration file
    #[arg(short = 'f', long = "config", default_value = "config.toml")]
    pub config_file: String,
}

/// Arguments for the timeframe driver
#[derive(Parser, Debug, Clone)]
pub struct TimeframeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Number of timeframes to generate (negative = until input is exhausted)
    #[arg(short = 'n', long = "frames", allow_hyphen_values = true)]
    pub frames: Option<i64>,

    /// File listing the input dump files, one per line
    #[arg(short = 'i', long = "input-list")]
    pub input_list: Option<String>,

    /// Use the synthetic event emulator instead of input files
    #[arg(long)]
    pub emulate: bool,

    /// Compression estimate mode (off, encode, train)
    #[arg(short = 'c', long = "compression", value_enum)]
    pub compression: Option<CompressionMode>,

    /// Directory for flat timeframe dumps
    #[arg(long = "ascii-dir")]
    pub ascii_dir: Option<String>,

    /// Random seed (collision generator, emulator and noise manipulation)
    #[arg(long)]
    pub seed: Option<u64>,
}

impl TimeframeArgs {
    /// Override configuration values given on the command line
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(frames) = self.frames {
            config.generator.frames = frames;
        }
        if let Some(list) = &self.input_list {
            config.input.file_list = list.clone();
            config.input.source = InputSource::Files;
        }
        if self.emulate {
            config.input.source = InputSource::Emulator;
        }
        if let Some(mode) = self.compression {
            config.compression.mode = mode;
        }
        if let Some(dir) = &self.ascii_dir {
            config.output.ascii_dir = Some(dir.clone());
        }
        if let Some(seed) = self.seed {
            config.generator.seed = Some(seed);
            config.merger.seed = Some(seed);
            config.input.emulator.seed = Some(seed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_args_default() {
        let args = CommonArgs::try_parse_from(["test"]).unwrap();
        assert_eq!(args.config_file, "config.toml");
    }

    #[test]
    fn test_common_args_custom_config() {
        let args = CommonArgs::try_parse_from(["test", "-f", "custom.toml"]).unwrap();
        assert_eq!(args.config_file, "custom.toml");
    }

    #[test]
    fn test_timeframe_args_default() {
        let args = TimeframeArgs::try_parse_from(["test"]).unwrap();
        assert_eq!(args.common.config_file, "config.toml");
        assert_eq!(args.frames, None);
        assert_eq!(args.input_list, None);
        assert!(!args.emulate);
        assert_eq!(args.compression, None);
        assert_eq!(args.seed, None);
    }

    #[test]
    fn test_timeframe_args_full() {
        let args = TimeframeArgs::try_parse_from([
            "test",
            "-f",
            "tf.toml",
            "-n",
            "5",
            "-i",
            "files.txt",
            "--compression",
            "train",
            "--ascii-dir",
            "tfdata",
            "--seed",
            "7",
        ])
        .unwrap();
        assert_eq!(args.common.config_file, "tf.toml");
        assert_eq!(args.frames, Some(5));
        assert_eq!(args.input_list, Some("files.txt".to_string()));
        assert_eq!(args.compression, Some(CompressionMode::Train));
        assert_eq!(args.ascii_dir, Some("tfdata".to_string()));
        assert_eq!(args.seed, Some(7));
    }

    #[test]
    fn test_timeframe_args_unlimited_frames() {
        let args = TimeframeArgs::try_parse_from(["test", "--frames", "-1", "--emulate"]).unwrap();
        assert_eq!(args.frames, Some(-1));
        assert!(args.emulate);
    }

    #[test]
    fn test_apply_overrides_config() {
        let args = TimeframeArgs::try_parse_from([
            "test", "-n", "3", "--emulate", "-c", "encode", "--seed", "11",
        ])
        .unwrap();
        let mut config = Config::default();
        args.apply_to(&mut config);
        assert_eq!(config.generator.frames, 3);
        assert_eq!(config.input.source, InputSource::Emulator);
        assert_eq!(config.compression.mode, CompressionMode::Encode);
        assert_eq!(config.merger.seed, Some(11));
        assert_eq!(config.input.emulator.seed, Some(11));
        assert_eq!(config.output.ascii_dir, None);
    }

    #[test]
    fn test_apply_keeps_config_without_flags() {
        let args = TimeframeArgs::try_parse_from(["test"]).unwrap();
        let mut config = Config::default();
        config.generator.frames = 42;
        args.apply_to(&mut config);
        assert_eq!(config.generator.frames, 42);
        assert_eq!(config.input.source, InputSource::Files);
    }
}
