//! Timeframe pipeline - drives the merger over a whole run
//!
//! Per timeframe:
//! 1. generate collision offsets, start the timeframe
//! 2. merge one event per collision
//! 3. optional normalization, zero suppression (applied unless a compression
//!    estimate runs), optional common-mode correction
//! 4. statistics, compression training / estimate, counters
//! 5. dumps
//!
//! The run ends after the configured number of timeframes or when the input
//! is exhausted. With a statistics file only the first timeframe is
//! processed.

use std::path::Path;

use chrono::Utc;
use tracing::{info, warn};

use crate::common::TimeframeResult;
use crate::compression::{CompressionEstimator, CompressionSummary, HuffmanTable};
use crate::config::{CompressionMode, Config};
use crate::generator::CollisionGenerator;
use crate::merger::ChannelMerger;
use crate::reader::EventSource;
use crate::recorder::{DumpWriter, RunSummary};

pub struct TimeframePipeline {
    config: Config,
    merger: ChannelMerger,
    generator: CollisionGenerator,
    writer: DumpWriter,
    estimator: CompressionEstimator,
    coder: Option<HuffmanTable>,
}

impl TimeframePipeline {
    /// Set up all components; tables that do not exist are skipped with a
    /// warning, a missing Huffman table in encode mode is an error
    pub fn new(config: Config) -> TimeframeResult<Self> {
        let mut merger = ChannelMerger::new(config.merger.clone());

        if let Some(path) = &config.tables.pedestal {
            if Path::new(path).exists() {
                let channels = merger.init_channel_baseline(path, config.merger.baseline_shift)?;
                info!(file = %path, channels, "Loaded pedestal table");
            } else {
                warn!(file = %path, "Pedestal table not found, using zero pedestals");
            }
        }
        if let Some(path) = &config.tables.mapping {
            if Path::new(path).exists() {
                merger.init_channel_mapping(path)?;
            } else {
                warn!(file = %path, "Channel mapping not found, all channels unmapped");
            }
        }

        let coder = match config.compression.mode {
            CompressionMode::Off => None,
            CompressionMode::Train => Some(HuffmanTable::new(config.compression.table_name.clone())),
            CompressionMode::Encode => Some(HuffmanTable::load(&config.compression.table_file)?),
        };

        Ok(Self {
            generator: CollisionGenerator::new(&config.generator)?,
            writer: DumpWriter::new(&config.output)?,
            estimator: CompressionEstimator::from_config(&config.compression),
            merger,
            coder,
            config,
        })
    }

    pub fn merger(&self) -> &ChannelMerger {
        &self.merger
    }

    pub fn coder(&self) -> Option<&HuffmanTable> {
        self.coder.as_ref()
    }

    fn frames_left(&self, timeframe: usize) -> bool {
        let frames = self.config.generator.frames;
        frames < 0 || (timeframe as i64) < frames
    }

    /// Run all timeframes against `source`
    pub fn run<S: EventSource + ?Sized>(&mut self, source: &mut S) -> TimeframeResult<RunSummary> {
        let mode = self.config.compression.mode;
        let processing = self.config.processing.clone();
        let mut summary = RunSummary::new(Utc::now());
        let mut compression = CompressionSummary::new();
        let mut overflow_seen = false;
        let mut timeframe = 0usize;

        while self.frames_left(timeframe) {
            if timeframe > 0 && self.writer.has_statistics_file() {
                info!("Statistics file covers a single timeframe, stopping");
                break;
            }

            let offsets = self.generator.next_timeframe();
            self.merger.start_timeframe();
            let merged = self.merger.merge_collisions(&offsets, source)?;

            if processing.normalize {
                self.merger.normalize(offsets.len() as u32);
            }
            self.merger
                .calculate_zero_suppression(mode == CompressionMode::Off, true);
            if processing.common_mode {
                self.merger
                    .apply_common_mode_effect(processing.common_mode_scaling)?;
            }

            let stats = self.merger.analyze();
            if timeframe == 0 {
                self.writer.write_statistics(&stats)?;
            }

            if let Some(coder) = self.coder.as_mut() {
                match mode {
                    CompressionMode::Train => self.estimator.train(&self.merger, coder),
                    CompressionMode::Encode => {
                        let results = self.estimator.estimate(&self.merger, coder);
                        compression.add(&results);
                    }
                    CompressionMode::Off => {}
                }
            }

            if self.merger.counters().snapshot().has_overflow() {
                warn!(timeframe, "Signal overflow in current timeframe detected");
                overflow_seen = true;
            }
            self.merger.report_counters(timeframe);

            if merged < offsets.len() {
                info!(timeframes = timeframe, "No more input data, simulated timeframes");
                break;
            }

            summary.add_timeframe(merged, &self.merger);
            self.writer.write(&self.merger, timeframe)?;
            info!(
                timeframe,
                collisions = merged,
                offsets = ?offsets,
                "Successfully generated timeframe"
            );
            timeframe += 1;
        }

        if let (CompressionMode::Train, Some(coder)) = (mode, self.coder.as_mut()) {
            coder.generate();
            coder.save(&self.config.compression.table_file)?;
        }
        if overflow_seen {
            warn!("Signal overflow detected in at least one timeframe");
        }

        if mode == CompressionMode::Encode {
            summary.compression = Some(compression);
        }
        summary.finish();
        if let Some(path) = &self.config.output.summary_file {
            summary.save(path)?;
        }
        Ok(summary)
    }
}
