//! Configuration module for the timeframe generator
//!
//! Supports loading configuration from:
//! - TOML files (merger, generator, input, compression and output settings)
//! - Line-oriented text tables (pedestals, channel mapping), see [`tables`]
//!
//! # Example
//! ```ignore
//! let config = Config::load("config.toml")?;
//! let threshold = config.merger.zs_threshold;
//! ```

pub mod tables;

pub use tables::{BaselineTable, ChannelMapping, PadPosition};

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::data_source_emulator::EmulatorConfig;
use crate::generator::{GeneratorConfig, PileupMode};
use crate::merger::MergerConfig;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub merger: MergerConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub tables: TablesConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.merger.channel_length == 0 {
            return Err(ConfigError::invalid("merger.channel_length must be > 0"));
        }
        if let Some([min, max]) = self.merger.ddl_range {
            if min > max {
                return Err(ConfigError::invalid(format!(
                    "merger.ddl_range [{}, {}] is empty",
                    min, max
                )));
            }
        }
        if let Some([min, max]) = self.merger.padrow_range {
            if min > max {
                return Err(ConfigError::invalid(format!(
                    "merger.padrow_range [{}, {}] is empty",
                    min, max
                )));
            }
        }
        if self.generator.pileup_mode == PileupMode::FixedRandomOffset {
            return Err(ConfigError::invalid(
                "fixed number of collisions at random offsets is not supported",
            ));
        }
        if self.generator.rate <= 0.0 && self.generator.pileup_mode != PileupMode::Fixed {
            return Err(ConfigError::invalid("generator.rate must be > 0"));
        }
        if !(1..=15).contains(&self.compression.signal_bit_length) {
            return Err(ConfigError::invalid(
                "compression.signal_bit_length must be in 1..=15",
            ));
        }
        let start = self.output.fixed_bunch_start as usize;
        if self.output.fixed_bunch_length == 0
            || self.output.fixed_bunch_start <= self.output.fixed_bunch_length
            || start >= self.merger.channel_length
        {
            return Err(ConfigError::invalid(format!(
                "fixed bunch (start {}, length {}) does not fit a channel of {} timebins",
                self.output.fixed_bunch_start,
                self.output.fixed_bunch_length,
                self.merger.channel_length
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Processing steps
// =============================================================================

/// Optional processing steps applied to each timeframe
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessingConfig {
    /// Divide each timeframe by the number of merged collisions
    /// (baseline estimation, not for pile-up studies)
    #[serde(default)]
    pub normalize: bool,

    /// Apply the common-mode correction
    #[serde(default)]
    pub common_mode: bool,

    /// Common-mode scaling factor (default: number of channels)
    #[serde(default)]
    pub common_mode_scaling: Option<u32>,
}

// =============================================================================
// Tables
// =============================================================================

/// Paths of the external lookup tables
#[derive(Debug, Clone, Deserialize)]
pub struct TablesConfig {
    /// Pedestal table: `ddl hw pedestal` per line
    #[serde(default = "default_pedestal_table")]
    pub pedestal: Option<String>,

    /// Channel mapping table: `ddl hw row pad` per line
    #[serde(default = "default_mapping_table")]
    pub mapping: Option<String>,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            pedestal: default_pedestal_table(),
            mapping: default_mapping_table(),
        }
    }
}

fn default_pedestal_table() -> Option<String> {
    Some("pedestal.dat".to_string())
}

fn default_mapping_table() -> Option<String> {
    Some("mapping.dat".to_string())
}

// =============================================================================
// Input
// =============================================================================

/// Where acquisition cycles come from
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    /// Flat timeframe dumps listed in a file
    #[default]
    Files,
    /// Synthetic events
    Emulator,
}

/// Input configuration
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub source: InputSource,

    /// File listing input dump files, one per line
    #[serde(default = "default_file_list")]
    pub file_list: String,

    /// Emulator settings (used when `source = "emulator"`)
    #[serde(default)]
    pub emulator: EmulatorConfig,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            source: InputSource::Files,
            file_list: default_file_list(),
            emulator: EmulatorConfig::default(),
        }
    }
}

fn default_file_list() -> String {
    "datafiles.txt".to_string()
}

// =============================================================================
// Compression
// =============================================================================

/// Compression estimate mode
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    #[default]
    Off,
    /// Estimate compression factors with a trained table
    Encode,
    /// Collect symbol statistics and write a new table at the end of the run
    Train,
}

/// Compression estimate configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CompressionConfig {
    #[serde(default)]
    pub mode: CompressionMode,

    /// Name stored in the Huffman table
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Huffman table file (written in train mode, read in encode mode)
    #[serde(default = "default_table_file")]
    pub table_file: String,

    /// Symbols with code length >= cutoff are charged cutoff + raw bits (0 = off)
    #[serde(default)]
    pub length_cutoff: u32,

    /// Raw signal bit width
    #[serde(default = "default_signal_bit_length")]
    pub signal_bit_length: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            mode: CompressionMode::Off,
            table_name: default_table_name(),
            table_file: default_table_file(),
            length_cutoff: 0,
            signal_bit_length: default_signal_bit_length(),
        }
    }
}

fn default_table_name() -> String {
    "TPCRawSignalDifference".to_string()
}

fn default_table_file() -> String {
    "TPCRawSignalDifference_HuffmanTable.msgpack".to_string()
}

fn default_signal_bit_length() -> u32 {
    crate::common::SIGNAL_BIT_LENGTH
}

// =============================================================================
// Output
// =============================================================================

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Channel statistics text file (written for the first timeframe only)
    #[serde(default)]
    pub statistics_file: Option<String>,

    /// Directory for flat timeframe dumps (`tf%04d.dat`)
    #[serde(default)]
    pub ascii_dir: Option<String>,

    /// Directory for fixed-bunch simulation input (`event%04d.dat`)
    #[serde(default)]
    pub fixed_bunch_dir: Option<String>,

    /// Start timebin of the fixed bunch
    #[serde(default = "default_fixed_bunch_start")]
    pub fixed_bunch_start: u32,

    /// Length of the fixed bunch
    #[serde(default = "default_fixed_bunch_length")]
    pub fixed_bunch_length: u32,

    /// JSON run summary
    #[serde(default = "default_summary_file")]
    pub summary_file: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            statistics_file: None,
            ascii_dir: None,
            fixed_bunch_dir: None,
            fixed_bunch_start: default_fixed_bunch_start(),
            fixed_bunch_length: default_fixed_bunch_length(),
            summary_file: default_summary_file(),
        }
    }
}

fn default_fixed_bunch_start() -> u32 {
    1021
}

fn default_fixed_bunch_length() -> u32 {
    980
}

fn default_summary_file() -> Option<String> {
    Some("tpc-raw-channel-stat.json".to_string())
}

// =============================================================================
// Tests
// =============================================================================
