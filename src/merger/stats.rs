//! Per-channel statistics of the current timeframe

use serde::Serialize;

use super::ChannelMerger;
use crate::common::{ChannelId, Sample, VOID_SIGNAL};
use crate::config::PadPosition;

/// Signal statistics of one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub ddl: u16,
    pub hw_address: u16,
    pub pad_row: Option<u32>,
    pub pad: Option<u32>,
    pub min_signal: Option<Sample>,
    pub max_signal: Option<Sample>,
    /// Integer mean over filled timebins, 0 for an empty channel
    pub average_signal: u32,
    /// Smallest / largest difference between neighbouring filled timebins,
    /// by magnitude, sign preserved
    pub min_signal_diff: Option<i32>,
    pub max_signal_diff: Option<i32>,
    pub min_timebin: Option<usize>,
    pub max_timebin: Option<usize>,
    pub filled_timebins: u32,
    /// Lengths of runs of consecutive filled timebins, by increasing timebin
    pub bunch_lengths: Vec<u32>,
}

impl ChannelStats {
    pub fn from_samples(id: ChannelId, samples: &[Sample], position: Option<PadPosition>) -> Self {
        let mut stats = Self {
            ddl: id.ddl(),
            hw_address: id.hw_address(),
            pad_row: position.map(|p| p.row),
            pad: position.map(|p| p.pad),
            min_signal: None,
            max_signal: None,
            average_signal: 0,
            min_signal_diff: None,
            max_signal_diff: None,
            min_timebin: None,
            max_timebin: None,
            filled_timebins: 0,
            bunch_lengths: Vec::new(),
        };

        let mut sum: u64 = 0;
        let mut run = 0u32;
        let mut previous = VOID_SIGNAL;
        for (timebin, &signal) in samples.iter().enumerate() {
            if signal == VOID_SIGNAL {
                if run > 0 {
                    stats.bunch_lengths.push(run);
                    run = 0;
                }
                previous = signal;
                continue;
            }
            run += 1;
            stats.min_timebin.get_or_insert(timebin);
            stats.max_timebin = Some(timebin);
            stats.min_signal = Some(stats.min_signal.map_or(signal, |m| m.min(signal)));
            stats.max_signal = Some(stats.max_signal.map_or(signal, |m| m.max(signal)));
            sum += signal as u64;
            stats.filled_timebins += 1;

            if previous != VOID_SIGNAL {
                let diff = signal as i32 - previous as i32;
                if stats.max_signal_diff.map_or(true, |d| d.abs() < diff.abs()) {
                    stats.max_signal_diff = Some(diff);
                }
                if stats.min_signal_diff.map_or(true, |d| d.abs() > diff.abs()) {
                    stats.min_signal_diff = Some(diff);
                }
            }
            previous = signal;
        }
        if run > 0 {
            stats.bunch_lengths.push(run);
        }
        if stats.filled_timebins > 0 {
            stats.average_signal = (sum / stats.filled_timebins as u64) as u32;
        }
        stats
    }

    pub fn bunches(&self) -> usize {
        self.bunch_lengths.len()
    }
}

impl ChannelMerger {
    /// Statistics of every channel of the current timeframe, by ascending
    /// channel identifier
    pub fn analyze(&self) -> Vec<ChannelStats> {
        self.channels()
            .map(|(id, samples)| ChannelStats::from_samples(id, samples, self.mapping.get(id)))
            .collect()
    }
}
