//! Per-timeframe counters for the merger
//!
//! # Design Principles (KISS)
//! - Local, non-fatal conditions are counted, never thrown
//! - Counters live in the engine instance, reset explicitly at timeframe start
//! - Simple snapshot mechanism for reporting

use serde::Serialize;

/// Counted conditions of the current timeframe
///
/// Single-threaded: the engine owns these counters exclusively, so plain
/// integers are sufficient.
#[derive(Debug, Default)]
pub struct TimeframeCounters {
    /// Accumulations clamped at the saturation ceiling (current buffer only)
    signal_overflow: u64,
    /// Samples dropped because their timebin fell outside `[-L, L)`
    out_of_range: u64,
    /// Raw samples outside the nominal ADC range
    invalid_samples: u64,
    /// Common-mode subtractions floored at zero
    common_mode_underflow: u64,
    /// Channels with at least one common-mode floor event
    common_mode_underflow_channels: u64,
    /// Channels accepted by the merger in this timeframe
    channels_added: u64,
}

impl TimeframeCounters {
    /// Create new zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc_signal_overflow(&mut self) {
        self.signal_overflow += 1;
    }

    #[inline]
    pub fn inc_out_of_range(&mut self) {
        self.out_of_range += 1;
    }

    #[inline]
    pub fn inc_invalid_samples(&mut self) {
        self.invalid_samples += 1;
    }

    #[inline]
    pub fn inc_channels_added(&mut self) {
        self.channels_added += 1;
    }

    /// Add the floor events of one common-mode pass
    pub fn add_common_mode(&mut self, report: &CommonModeReport) {
        self.common_mode_underflow += report.underflows;
        self.common_mode_underflow_channels += report.underflow_channels;
    }

    pub fn signal_overflow(&self) -> u64 {
        self.signal_overflow
    }

    pub fn out_of_range(&self) -> u64 {
        self.out_of_range
    }

    /// Take a snapshot of current values
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            signal_overflow: self.signal_overflow,
            out_of_range: self.out_of_range,
            invalid_samples: self.invalid_samples,
            common_mode_underflow: self.common_mode_underflow,
            common_mode_underflow_channels: self.common_mode_underflow_channels,
            channels_added: self.channels_added,
        }
    }

    /// Reset all counters to zero
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Snapshot of counter values at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub signal_overflow: u64,
    pub out_of_range: u64,
    pub invalid_samples: u64,
    pub common_mode_underflow: u64,
    pub common_mode_underflow_channels: u64,
    pub channels_added: u64,
}

impl CounterSnapshot {
    /// Accumulate another snapshot into this one (run totals)
    pub fn accumulate(&mut self, other: &CounterSnapshot) {
        self.signal_overflow += other.signal_overflow;
        self.out_of_range += other.out_of_range;
        self.invalid_samples += other.invalid_samples;
        self.common_mode_underflow += other.common_mode_underflow;
        self.common_mode_underflow_channels += other.common_mode_underflow_channels;
        self.channels_added += other.channels_added;
    }

    pub fn has_overflow(&self) -> bool {
        self.signal_overflow > 0
    }
}

/// Result of one common-mode correction pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommonModeReport {
    /// Scaling factor that was applied
    pub scaling: u32,
    /// Samples floored at zero
    pub underflows: u64,
    /// Channels with at least one floored sample
    pub underflow_channels: u64,
}
