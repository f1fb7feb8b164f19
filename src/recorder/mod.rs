//! Recorder - writes timeframe data and run reports to files
//!
//! File naming:
//!   - `tf{XXXX}.dat`: flat timeframe dump (ASCII directory)
//!   - `event{XXXX}.dat`: fixed-bunch simulation input
//!   - statistics text file: first timeframe only
//!   - JSON run summary: written once at the end of the run
//!
//! All writers go through `BufWriter`; a file that cannot be created aborts
//! the run.

pub mod format;

pub use format::{
    extract_bunches, read_block, read_timeframe, write_block, write_fixed_bunch, write_statistics,
    write_timeframe,
};

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::common::{CounterSnapshot, TimeframeResult};
use crate::compression::CompressionSummary;
use crate::config::OutputConfig;
use crate::merger::{ChannelMerger, ChannelStats};

/// Create a file for writing, logging the failure
pub fn create_output<P: AsRef<Path>>(path: P) -> TimeframeResult<BufWriter<File>> {
    let path = path.as_ref();
    match File::create(path) {
        Ok(file) => Ok(BufWriter::new(file)),
        Err(e) => {
            error!(file = %path.display(), error = %e, "Cannot open file for writing");
            Err(e.into())
        }
    }
}

/// Per-timeframe dump writer
#[derive(Debug, Clone)]
pub struct DumpWriter {
    ascii_dir: Option<PathBuf>,
    fixed_bunch_dir: Option<PathBuf>,
    fixed_bunch_start: u32,
    fixed_bunch_length: u32,
    statistics_file: Option<PathBuf>,
}

impl DumpWriter {
    /// Create the configured output directories
    pub fn new(config: &OutputConfig) -> TimeframeResult<Self> {
        let ascii_dir = config.ascii_dir.as_ref().map(PathBuf::from);
        let fixed_bunch_dir = config.fixed_bunch_dir.as_ref().map(PathBuf::from);
        for dir in ascii_dir.iter().chain(fixed_bunch_dir.iter()) {
            fs::create_dir_all(dir)?;
        }
        Ok(Self {
            ascii_dir,
            fixed_bunch_dir,
            fixed_bunch_start: config.fixed_bunch_start,
            fixed_bunch_length: config.fixed_bunch_length,
            statistics_file: config.statistics_file.as_ref().map(PathBuf::from),
        })
    }

    pub fn timeframe_path(dir: &Path, timeframe: usize) -> PathBuf {
        dir.join(format!("tf{:04}.dat", timeframe))
    }

    pub fn event_path(dir: &Path, timeframe: usize) -> PathBuf {
        dir.join(format!("event{:04}.dat", timeframe))
    }

    pub fn has_statistics_file(&self) -> bool {
        self.statistics_file.is_some()
    }

    /// Write every enabled dump of the current timeframe
    pub fn write(&self, merger: &ChannelMerger, timeframe: usize) -> TimeframeResult<()> {
        if let Some(dir) = &self.ascii_dir {
            let path = Self::timeframe_path(dir, timeframe);
            let mut writer = create_output(&path)?;
            write_timeframe(&mut writer, merger.channels())?;
            writer.flush()?;
            info!(file = %path.display(), "Wrote timeframe dump");
        }
        if let Some(dir) = &self.fixed_bunch_dir {
            let path = Self::event_path(dir, timeframe);
            let mut writer = create_output(&path)?;
            write_fixed_bunch(
                &mut writer,
                merger.channels(),
                self.fixed_bunch_start,
                self.fixed_bunch_length,
            )?;
            writer.flush()?;
            info!(file = %path.display(), "Wrote fixed bunch dump");
        }
        Ok(())
    }

    /// Write the statistics text file, if configured
    pub fn write_statistics(&self, stats: &[ChannelStats]) -> TimeframeResult<()> {
        let Some(path) = &self.statistics_file else {
            return Ok(());
        };
        let mut writer = create_output(path)?;
        write_statistics(&mut writer, stats)?;
        writer.flush()?;
        info!(file = %path.display(), channels = stats.len(), "Wrote channel statistics");
        Ok(())
    }
}

/// JSON report of a complete run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub timeframes: usize,
    pub collisions: usize,
    pub channels: usize,
    pub counters: CounterSnapshot,
    pub compression: Option<CompressionSummary>,
}

impl RunSummary {
    pub fn new(started: DateTime<Utc>) -> Self {
        Self {
            started,
            finished: started,
            timeframes: 0,
            collisions: 0,
            channels: 0,
            counters: CounterSnapshot::default(),
            compression: None,
        }
    }

    /// Add the results of one timeframe
    pub fn add_timeframe(&mut self, collisions: usize, merger: &ChannelMerger) {
        self.timeframes += 1;
        self.collisions += collisions;
        self.channels = merger.channel_count();
        self.counters.accumulate(&merger.counters().snapshot());
    }

    pub fn finish(&mut self) {
        self.finished = Utc::now();
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> TimeframeResult<()> {
        let path = path.as_ref();
        let mut writer = create_output(path)?;
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        info!(file = %path.display(), "Wrote run summary");
        Ok(())
    }
}
