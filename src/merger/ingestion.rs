//! Ingestion of raw channel data into the timeframe buffers

use rand::Rng;
use tracing::{debug, info};

use super::suppression::{peak_mask, ScanDirection};
use super::ChannelMerger;
use crate::common::{
    ChannelId, RawChannel, RawEvent, Sample, TimeframeResult, MAX_ACCUMULATED_SIGNAL,
    SIGNAL_RANGE,
};
use crate::reader::EventSource;

/// Pedestal subtracted from zero-suppressed samples
///
/// The baseline shift is already contained in the table value; a negative
/// shift is taken off once more, a positive one is given back as long as it
/// stays below the pedestal.
pub fn subtracted_pedestal(pedestal: u32, baseline_shift: i32) -> u32 {
    if baseline_shift < 0 {
        pedestal + baseline_shift.unsigned_abs()
    } else if (baseline_shift as u32) < pedestal {
        pedestal - baseline_shift as u32
    } else {
        pedestal
    }
}

/// Scale a pedestal-subtracted noise sample and add a random count in
/// `[0, factor)`
///
/// Identity for `factor <= 1`. With a negative baseline shift the scaled
/// shift `|shift| × (factor - 1)` is removed again where possible.
pub fn manipulate_noise<R: Rng + ?Sized>(
    signal: u32,
    factor: u32,
    baseline_shift: i32,
    rng: &mut R,
) -> Sample {
    if factor <= 1 {
        return signal.min(MAX_ACCUMULATED_SIGNAL as u32) as Sample;
    }
    let mut noise = signal as u64 * factor as u64 + rng.gen_range(0..factor) as u64;
    if baseline_shift < 0 {
        let correction = baseline_shift.unsigned_abs() as u64 * (factor as u64 - 1);
        if noise >= correction {
            noise -= correction;
        }
    }
    noise.min(MAX_ACCUMULATED_SIGNAL as u64) as Sample
}

impl ChannelMerger {
    /// Whether a channel passes the DDL range selection
    pub fn ddl_selected(&self, id: ChannelId) -> bool {
        match self.config.ddl_range {
            Some([min, max]) => (min..=max).contains(&id.ddl()),
            None => true,
        }
    }

    /// Whether a channel passes the pad-row selection; unmapped channels are
    /// rejected whenever a row range is configured
    pub fn padrow_selected(&self, id: ChannelId) -> bool {
        match self.config.padrow_range {
            Some([min, max]) => self
                .mapping
                .row(id)
                .is_some_and(|row| (min..=max).contains(&row)),
            None => true,
        }
    }

    /// Add all bunches of one channel, shifted by `offset` timeframes
    ///
    /// Sample `i` of a bunch lands in timebin
    /// `trunc(start - offset × L) - i`. The first value of a VOID cell is
    /// the pedestal-subtracted sample (noise-manipulated if it was
    /// suppressed), later collisions add the zero-suppressed value. Noise
    /// substitution therefore depends on which collision reaches a cell
    /// first.
    pub fn add_channel(&mut self, offset: f32, channel: &RawChannel) -> TimeframeResult<()> {
        let id = channel.id;
        let slot = self.register_channel(id)?;
        self.counters.inc_channels_added();

        let shift = self.config.baseline_shift;
        let noise_factor = self.config.noise_factor;
        let pedestal = self.baseline.get(id);
        let reduced_pedestal = subtracted_pedestal(pedestal, shift);
        let threshold = self.threshold().map(|t| t + pedestal);
        let window = offset * self.config.channel_length as f32;

        for bunch in &channel.bunches {
            let keep = match threshold {
                Some(threshold) => peak_mask(&bunch.samples, threshold, ScanDirection::Forward),
                None => vec![true; bunch.len()],
            };
            let start = (bunch.start_timebin as f32 - window) as i64;

            for (i, (&raw, &kept)) in bunch.samples.iter().zip(&keep).enumerate() {
                let raw = raw as u32;
                if raw >= SIGNAL_RANGE {
                    debug!(channel = %id, value = raw, "Invalid signal value");
                    self.counters.inc_invalid_samples();
                }
                let original = raw.saturating_sub(pedestal);
                let current = if kept {
                    raw.saturating_sub(reduced_pedestal)
                } else {
                    0
                };
                let amount = current.min(MAX_ACCUMULATED_SIGNAL as u32) as Sample;
                let timebin = start - i as i64;

                let rng = &mut self.rng;
                let outcome = self.buffer.accumulate_with(slot, timebin, amount, || {
                    if current == 0 && noise_factor >= 1 {
                        manipulate_noise(original, noise_factor, shift, rng)
                    } else {
                        original.min(MAX_ACCUMULATED_SIGNAL as u32) as Sample
                    }
                });
                self.count_outcome(id, timebin, outcome);
            }
        }
        Ok(())
    }

    /// Whether any channel of the event passes the DDL selection
    fn has_selected_data(&self, event: &RawEvent) -> bool {
        event.channels.iter().any(|c| self.ddl_selected(c.id))
    }

    /// Merge one event per offset into the buffers
    ///
    /// Events without data in the selected DDL range are skipped. Returns the
    /// number of merged collisions; fewer than `offsets.len()` means the
    /// source is exhausted.
    pub fn merge_collisions<S: EventSource + ?Sized>(
        &mut self,
        offsets: &[f32],
        source: &mut S,
    ) -> TimeframeResult<usize> {
        info!(collisions = offsets.len(), "Merging collisions into timeframe");
        let mut merged = 0;
        for &offset in offsets {
            let event = loop {
                match source.next_event()? {
                    Some(event) if self.has_selected_data(&event) => break event,
                    Some(_) => debug!("Skipping event without selected data"),
                    None => {
                        info!(merged, requested = offsets.len(), "No more input data");
                        return Ok(merged);
                    }
                }
            };
            debug!(collision = merged, offset, "Adding collision");
            for channel in &event.channels {
                if channel.bad || !self.ddl_selected(channel.id) || !self.padrow_selected(channel.id) {
                    continue;
                }
                self.add_channel(offset, channel)?;
            }
            merged += 1;
        }
        Ok(merged)
    }
}
