//! Common data types shared across components
//!
//! This module defines the sample word, the channel identifier and the
//! raw event structures handed from event sources to the merger.

use serde::{Deserialize, Serialize};

pub mod cli;
pub mod error;
pub mod metrics;

pub use cli::{CommonArgs, TimeframeArgs};
pub use error::{TimeframeError, TimeframeResult};
pub use metrics::{CommonModeReport, CounterSnapshot, TimeframeCounters};

/// One ADC reading or an accumulated sum of readings
pub type Sample = u16;

/// Sentinel for "no sample recorded at this timebin"
pub const VOID_SIGNAL: Sample = Sample::MAX;

/// Saturation ceiling for accumulated samples
pub const MAX_ACCUMULATED_SIGNAL: Sample = VOID_SIGNAL - 1;

/// Nominal ADC range of a single raw sample (10 bit)
pub const SIGNAL_RANGE: u32 = 1024;

/// Raw signal bit width used by the compression estimate
pub const SIGNAL_BIT_LENGTH: u32 = 10;

/// Physical channel identifier: DDL (link) number and hardware address
/// packed as `(ddl << 16) | hw_address`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(u32);

impl ChannelId {
    pub fn new(ddl: u16, hw_address: u16) -> Self {
        Self(((ddl as u32) << 16) | hw_address as u32)
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn ddl(&self) -> u16 {
        ((self.0 & 0xffff_0000) >> 16) as u16
    }

    pub fn hw_address(&self) -> u16 {
        (self.0 & 0x0000_ffff) as u16
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DDL {} HW {}", self.ddl(), self.hw_address())
    }
}

/// Contiguous run of samples of one channel in one acquisition cycle
///
/// Sample `i` belongs to timebin `start_timebin - i`, i.e. samples are
/// stored in reverse time order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bunch {
    pub start_timebin: i32,
    pub samples: Vec<Sample>,
}

impl Bunch {
    pub fn new(start_timebin: i32, samples: Vec<Sample>) -> Self {
        Self {
            start_timebin,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// All bunches of one channel in one acquisition cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChannel {
    pub id: ChannelId,
    /// Channel flagged invalid by the decoder; skipped by the merger
    #[serde(default)]
    pub bad: bool,
    pub bunches: Vec<Bunch>,
}

impl RawChannel {
    pub fn new(id: ChannelId, bunches: Vec<Bunch>) -> Self {
        Self {
            id,
            bad: false,
            bunches,
        }
    }
}

/// One acquisition cycle ("collision") as delivered by an event source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub channels: Vec<RawChannel>,
}

impl RawEvent {
    pub fn new(channels: Vec<RawChannel>) -> Self {
        Self { channels }
    }

    /// Total number of samples over all channels and bunches
    pub fn sample_count(&self) -> usize {
        self.channels
            .iter()
            .flat_map(|c| c.bunches.iter())
            .map(Bunch::len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_packing() {
        let id = ChannelId::new(3, 0x0abc);
        assert_eq!(id.raw(), 0x0003_0abc);
        assert_eq!(id.ddl(), 3);
        assert_eq!(id.hw_address(), 0x0abc);
        assert_eq!(ChannelId::from_raw(id.raw()), id);
    }

    #[test]
    fn channel_id_orders_by_ddl_then_hw() {
        let a = ChannelId::new(0, 0xffff);
        let b = ChannelId::new(1, 0);
        assert!(a < b);
    }

    #[test]
    fn void_and_ceiling() {
        assert_eq!(VOID_SIGNAL, 0xffff);
        assert_eq!(MAX_ACCUMULATED_SIGNAL, 0xfffe);
    }

    #[test]
    fn event_sample_count() {
        let event = RawEvent::new(vec![
            RawChannel::new(
                ChannelId::new(0, 1),
                vec![Bunch::new(10, vec![1, 2, 3]), Bunch::new(4, vec![5])],
            ),
            RawChannel::new(ChannelId::new(0, 2), vec![Bunch::new(2, vec![7, 8])]),
        ]);
        assert_eq!(event.sample_count(), 6);
    }
}
