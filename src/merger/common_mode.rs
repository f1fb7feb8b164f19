//! Common-mode correction
//!
//! Two passes over the current buffer:
//! 1. zero-suppress every channel into a scratch vector and sum the kept
//!    samples per timebin into the ensemble
//! 2. per channel, subtract `(ensemble - own kept sample) / scaling` from the
//!    stored sample, floored at zero
//!
//! VOID cells stay VOID.

use tracing::info;

use super::buffer::BufferSlot;
use super::suppression::suppress_channel;
use super::ChannelMerger;
use crate::common::{CommonModeReport, Sample, TimeframeError, TimeframeResult, VOID_SIGNAL};

/// Contribution of all other channels at one timebin
///
/// `own` is the channel's zero-suppressed sample; VOID means it did not
/// contribute to the ensemble.
pub fn common_mode_impact(ensemble: u32, own: Sample, scaling: u32) -> u32 {
    let excess = if own == VOID_SIGNAL {
        ensemble
    } else {
        ensemble.saturating_sub(own as u32)
    };
    excess / scaling
}

impl ChannelMerger {
    /// Apply the common-mode effect of all channels on each other
    ///
    /// `scaling` defaults to the number of channels. Without a zero
    /// suppression threshold nothing is kept, the ensemble is empty and the
    /// data is left unchanged.
    pub fn apply_common_mode_effect(&mut self, scaling: Option<u32>) -> TimeframeResult<CommonModeReport> {
        let scaling = match scaling {
            Some(0) => {
                return Err(TimeframeError::invalid_argument(
                    "common mode scaling factor must be positive",
                ))
            }
            Some(scaling) => scaling,
            None => self.channel_count() as u32,
        };
        let mut report = CommonModeReport {
            scaling,
            ..Default::default()
        };
        let Some(threshold) = self.threshold() else {
            return Ok(report);
        };
        if self.index.is_empty() {
            return Ok(report);
        }

        let length = self.config.channel_length;
        let shift = self.config.baseline_shift;
        let mut ensemble = vec![0u32; length];
        let mut suppressed = vec![VOID_SIGNAL; length];

        for (_, slot) in self.index.iter() {
            let samples = self.buffer.channel(BufferSlot::Current, slot);
            suppress_channel(samples, threshold, shift, Some(&mut suppressed));
            for (sum, &kept) in ensemble.iter_mut().zip(&suppressed) {
                if kept != VOID_SIGNAL {
                    *sum += kept as u32;
                }
            }
        }

        for (_, slot) in self.index.iter() {
            suppress_channel(
                self.buffer.channel(BufferSlot::Current, slot),
                threshold,
                shift,
                Some(&mut suppressed),
            );
            let samples = self.buffer.channel_mut(BufferSlot::Current, slot);
            let mut floored = false;
            for (i, sample) in samples.iter_mut().enumerate() {
                if *sample == VOID_SIGNAL {
                    continue;
                }
                let impact = common_mode_impact(ensemble[i], suppressed[i], scaling);
                if (*sample as u32) < impact {
                    *sample = 0;
                    report.underflows += 1;
                    floored = true;
                } else {
                    *sample -= impact as Sample;
                }
            }
            if floored {
                report.underflow_channels += 1;
            }
        }

        self.counters.add_common_mode(&report);
        info!(
            scaling,
            underflows = report.underflows,
            channels = report.underflow_channels,
            "Applied common mode effect"
        );
        Ok(report)
    }
}
