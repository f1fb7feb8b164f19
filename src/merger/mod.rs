//! Channel merger - accumulates collisions into timeframes
//!
//! Architecture:
//! - `ChannelIndex`: channel identifier → dense storage slot
//! - `SampleBuffer`: current + pending sample buffers, swapped per timeframe
//! - Ingestion: pedestal subtraction, inline zero suppression, accumulation
//! - Post-processing in place: normalization, standalone zero suppression,
//!   common-mode correction
//! - Read-only consumers: statistics, compression estimate, dump writers
//!
//! # Design Principles (KISS)
//! - Single-threaded; processing of timeframe N and ingestion of N+1 strictly
//!   alternate
//! - Non-fatal conditions are counted in `TimeframeCounters`, never thrown
//! - Counters and occupancy are engine fields, reset in `start_timeframe`

pub mod buffer;
mod common_mode;
pub mod index;
mod ingestion;
mod stats;
pub mod suppression;

pub use buffer::{Accumulation, BufferSlot, SampleBuffer};
pub use common_mode::common_mode_impact;
pub use index::ChannelIndex;
pub use ingestion::{manipulate_noise, subtracted_pedestal};
pub use stats::ChannelStats;
pub use suppression::{adjusted_threshold, scan_peaks, ScanDirection};

use std::collections::BTreeMap;
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::common::{
    ChannelId, Sample, TimeframeCounters, TimeframeResult, VOID_SIGNAL,
};
use crate::config::{BaselineTable, ChannelMapping};

/// Number of overflow / out-of-range occurrences reported individually
const MAX_REPORTED_WARNINGS: u64 = 10;

/// Merger configuration (`[merger]` section)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MergerConfig {
    /// Timebins per channel and timeframe
    #[serde(default = "default_channel_length")]
    pub channel_length: usize,

    /// Channels reserved by the first buffer allocation
    #[serde(default = "default_initial_channels")]
    pub initial_channels: usize,

    /// Zero suppression cut; `None` disables zero suppression
    #[serde(default)]
    pub zs_threshold: Option<u32>,

    /// Shift applied to pedestals and the zero suppression threshold
    #[serde(default)]
    pub baseline_shift: i32,

    /// Noise manipulation factor (0 or 1 = off)
    #[serde(default)]
    pub noise_factor: u32,

    /// Inclusive DDL range accepted during merging
    #[serde(default)]
    pub ddl_range: Option<[u16; 2]>,

    /// Inclusive pad-row range accepted during merging
    #[serde(default)]
    pub padrow_range: Option<[u32; 2]>,

    /// Seed of the noise manipulation random source
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            channel_length: default_channel_length(),
            initial_channels: default_initial_channels(),
            zs_threshold: None,
            baseline_shift: 0,
            noise_factor: 0,
            ddl_range: None,
            padrow_range: None,
            seed: None,
        }
    }
}

fn default_channel_length() -> usize {
    1024
}

fn default_initial_channels() -> usize {
    1024
}

/// Timeframe accumulation engine
pub struct ChannelMerger {
    config: MergerConfig,
    index: ChannelIndex,
    buffer: SampleBuffer,
    baseline: BaselineTable,
    mapping: ChannelMapping,
    occupancy: BTreeMap<ChannelId, Option<u32>>,
    counters: TimeframeCounters,
    rng: StdRng,
}

impl ChannelMerger {
    pub fn new(config: MergerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            buffer: SampleBuffer::new(config.channel_length, config.initial_channels),
            index: ChannelIndex::new(),
            baseline: BaselineTable::new(),
            mapping: ChannelMapping::new(),
            occupancy: BTreeMap::new(),
            counters: TimeframeCounters::new(),
            rng,
            config,
        }
    }

    pub fn config(&self) -> &MergerConfig {
        &self.config
    }

    pub fn channel_length(&self) -> usize {
        self.config.channel_length
    }

    /// Load the pedestal table; `baseline_shift` is added to every entry and
    /// becomes the engine's baseline shift.
    pub fn init_channel_baseline<P: AsRef<Path>>(
        &mut self,
        path: P,
        baseline_shift: i32,
    ) -> TimeframeResult<usize> {
        let table = BaselineTable::load(path, baseline_shift)?;
        let channels = table.len();
        self.set_baseline(table, baseline_shift);
        Ok(channels)
    }

    /// Install an already shifted pedestal table
    pub fn set_baseline(&mut self, table: BaselineTable, baseline_shift: i32) {
        self.baseline = table;
        self.config.baseline_shift = baseline_shift;
    }

    pub fn baseline(&self) -> &BaselineTable {
        &self.baseline
    }

    pub fn baseline_shift(&self) -> i32 {
        self.config.baseline_shift
    }

    /// Load the channel to pad mapping
    pub fn init_channel_mapping<P: AsRef<Path>>(&mut self, path: P) -> TimeframeResult<usize> {
        let mapping = ChannelMapping::load(path)?;
        let channels = mapping.len();
        self.set_mapping(mapping);
        Ok(channels)
    }

    pub fn set_mapping(&mut self, mapping: ChannelMapping) {
        self.mapping = mapping;
    }

    pub fn mapping(&self) -> &ChannelMapping {
        &self.mapping
    }

    pub fn set_zero_suppression(&mut self, threshold: Option<u32>) {
        self.config.zs_threshold = threshold;
    }

    pub fn set_noise_factor(&mut self, factor: u32) {
        self.config.noise_factor = factor;
    }

    /// Zero suppression threshold adjusted by the baseline shift,
    /// `None` when zero suppression is disabled
    pub fn threshold(&self) -> Option<u32> {
        self.config
            .zs_threshold
            .map(|cut| adjusted_threshold(cut, self.config.baseline_shift))
    }

    /// Begin a new timeframe
    ///
    /// Samples collected for the next timeframe become current, the pending
    /// buffer is cleared, counters are reset and all occupancies become
    /// unknown.
    pub fn start_timeframe(&mut self) {
        self.buffer.swap_at_timeframe_start();
        self.counters.reset();
        for occupancy in self.occupancy.values_mut() {
            *occupancy = None;
        }
    }

    /// Add `amount` at `timebin` of a channel, registering it if needed
    pub fn accumulate(&mut self, id: ChannelId, timebin: i32, amount: Sample) -> TimeframeResult<Accumulation> {
        let slot = self.register_channel(id)?;
        let outcome = self.buffer.accumulate(slot, timebin as i64, amount);
        self.count_outcome(id, timebin as i64, outcome);
        Ok(outcome)
    }

    /// Storage slot of `id`, assigned and backed by storage on first use
    fn register_channel(&mut self, id: ChannelId) -> TimeframeResult<usize> {
        if let Some(slot) = self.index.get(id) {
            return Ok(slot);
        }
        self.buffer.ensure_slot(self.index.len())?;
        let (slot, _) = self.index.slot_or_insert(id);
        self.occupancy.insert(id, None);
        debug!(channel = %id, slot, "Registered new channel");
        Ok(slot)
    }

    fn count_outcome(&mut self, id: ChannelId, timebin: i64, outcome: Accumulation) {
        match outcome {
            Accumulation::Overflow(BufferSlot::Current) => {
                if self.counters.signal_overflow() < MAX_REPORTED_WARNINGS {
                    warn!(channel = %id, timebin, "Accumulated signal overflow");
                }
                self.counters.inc_signal_overflow();
            }
            Accumulation::OutOfRange => {
                if self.counters.out_of_range() < MAX_REPORTED_WARNINGS {
                    warn!(channel = %id, timebin, "Sample timebin out of range");
                }
                self.counters.inc_out_of_range();
            }
            _ => {}
        }
    }

    /// Divide every non-VOID sample by `scaling`; 0 leaves the data unchanged
    pub fn normalize(&mut self, scaling: u32) {
        if scaling == 0 {
            return;
        }
        let divisor = scaling.min(Sample::MAX as u32) as Sample;
        for (_, slot) in self.index.iter() {
            for sample in self.buffer.channel_mut(BufferSlot::Current, slot) {
                if *sample != VOID_SIGNAL {
                    *sample /= divisor;
                }
            }
        }
    }

    /// Standalone zero suppression of every channel in the current buffer
    ///
    /// With `apply` the suppressed data replaces the buffer content, with
    /// `set_occupancy` the kept timebin count is stored per channel. No-op
    /// when zero suppression is disabled.
    pub fn calculate_zero_suppression(&mut self, apply: bool, set_occupancy: bool) {
        let Some(threshold) = self.threshold() else {
            return;
        };
        let shift = self.config.baseline_shift;
        for (id, slot) in self.index.iter() {
            let filled = if apply {
                let samples = self.buffer.channel_mut(BufferSlot::Current, slot);
                suppression::suppress_channel_in_place(samples, threshold, shift)
            } else {
                let samples = self.buffer.channel(BufferSlot::Current, slot);
                suppression::suppress_channel(samples, threshold, shift, None)
            };
            if set_occupancy {
                self.occupancy.insert(id, Some(filled));
            }
        }
    }

    /// Samples of a channel in the current timeframe
    pub fn channel(&self, id: ChannelId) -> Option<&[Sample]> {
        self.index
            .get(id)
            .map(|slot| self.buffer.channel(BufferSlot::Current, slot))
    }

    /// Samples already collected for the next timeframe
    pub fn pending_channel(&self, id: ChannelId) -> Option<&[Sample]> {
        self.index
            .get(id)
            .map(|slot| self.buffer.channel(BufferSlot::Pending, slot))
    }

    /// All channels of the current timeframe by ascending identifier
    pub fn channels(&self) -> impl Iterator<Item = (ChannelId, &[Sample])> + '_ {
        self.index
            .iter()
            .map(|(id, slot)| (id, self.buffer.channel(BufferSlot::Current, slot)))
    }

    pub fn channel_count(&self) -> usize {
        self.index.len()
    }

    /// Kept timebins per channel, `None` where not yet calculated
    pub fn occupancy(&self) -> &BTreeMap<ChannelId, Option<u32>> {
        &self.occupancy
    }

    pub fn counters(&self) -> &TimeframeCounters {
        &self.counters
    }

    /// Log the counted conditions of the current timeframe
    pub fn report_counters(&self, timeframe: usize) {
        let snapshot = self.counters.snapshot();
        if snapshot.has_overflow() {
            warn!(
                timeframe,
                overflows = snapshot.signal_overflow,
                "Signal overflow in timeframe"
            );
        }
        info!(
            timeframe,
            channels = self.channel_count(),
            out_of_range = snapshot.out_of_range,
            invalid_samples = snapshot.invalid_samples,
            "Timeframe counters"
        );
    }
}
