//! Double-buffered multi-channel sample storage
//!
//! Layout:
//! ```text
//! buffer:  | slot 0: L timebins | slot 1: L timebins | ... | VOID tail |
//! ```
//! Two buffers of identical size exist: `Current` holds the timeframe being
//! built, `Pending` collects samples whose timebin fell before the start of
//! the window (`[-L, 0)`) and therefore belong to the next timeframe. At
//! timeframe start the roles are exchanged by flipping an index, so no sample
//! data is copied, and the new pending buffer is cleared to VOID.

use crate::common::{Sample, TimeframeError, TimeframeResult, MAX_ACCUMULATED_SIGNAL, VOID_SIGNAL};

/// Handle selecting one of the two buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSlot {
    Current,
    Pending,
}

/// Outcome of a single accumulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulation {
    /// First value written into a VOID cell
    Stored(BufferSlot),
    /// Value added to an existing cell
    Added(BufferSlot),
    /// Sum exceeded the saturation ceiling and was clamped
    Overflow(BufferSlot),
    /// Timebin outside `[-L, L)`, sample dropped
    OutOfRange,
}

/// Growable storage for fixed-length channel sample sequences
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    channel_length: usize,
    initial_capacity: usize,
    buffers: [Vec<Sample>; 2],
    current: usize,
}

impl SampleBuffer {
    /// Create an empty buffer; the first growth allocates at least
    /// `initial_channels` channels.
    pub fn new(channel_length: usize, initial_channels: usize) -> Self {
        Self {
            channel_length,
            initial_capacity: channel_length.saturating_mul(initial_channels),
            buffers: [Vec::new(), Vec::new()],
            current: 0,
        }
    }

    pub fn channel_length(&self) -> usize {
        self.channel_length
    }

    /// Number of samples in each of the two buffers
    pub fn capacity(&self) -> usize {
        self.buffers[self.current].len()
    }

    fn index_of(&self, which: BufferSlot) -> usize {
        match which {
            BufferSlot::Current => self.current,
            BufferSlot::Pending => 1 - self.current,
        }
    }

    /// Make room for at least `min_size` samples in both buffers
    ///
    /// No-op when the capacity suffices. Otherwise the size becomes
    /// `max(min_size, 2 × capacity)` (`max(min_size, initial)` on first use).
    /// Existing content keeps its offsets; the new tail is VOID.
    pub fn grow(&mut self, min_size: usize) -> TimeframeResult<()> {
        let size = self.capacity();
        if min_size <= size {
            return Ok(());
        }
        let new_size = if size == 0 {
            min_size.max(self.initial_capacity)
        } else {
            min_size.max(size.saturating_mul(2))
        };
        for buffer in self.buffers.iter_mut() {
            buffer
                .try_reserve_exact(new_size - buffer.len())
                .map_err(|_| TimeframeError::Allocation {
                    requested: new_size,
                })?;
            buffer.resize(new_size, VOID_SIGNAL);
        }
        Ok(())
    }

    /// Ensure storage for `slot`
    pub fn ensure_slot(&mut self, slot: usize) -> TimeframeResult<()> {
        let required = (slot + 1)
            .checked_mul(self.channel_length)
            .ok_or(TimeframeError::Allocation { requested: usize::MAX })?;
        self.grow(required)
    }

    /// Exchange current and pending, then clear the new pending buffer
    pub fn swap_at_timeframe_start(&mut self) {
        self.current = 1 - self.current;
        let pending = 1 - self.current;
        self.buffers[pending].fill(VOID_SIGNAL);
    }

    /// Add `amount` at `timebin` of `slot`
    ///
    /// A VOID cell takes `amount` as its first value.
    pub fn accumulate(&mut self, slot: usize, timebin: i64, amount: Sample) -> Accumulation {
        self.accumulate_with(slot, timebin, amount, || amount)
    }

    /// Add `amount` at `timebin` of `slot`; a VOID cell is initialised with
    /// `initial()` instead (evaluated only in that case).
    ///
    /// Timebins in `[0, L)` address the current buffer, `[-L, 0)` the pending
    /// buffer at `timebin + L`. The slot must have been reserved with
    /// [`ensure_slot`](Self::ensure_slot).
    pub fn accumulate_with<F>(
        &mut self,
        slot: usize,
        timebin: i64,
        amount: Sample,
        initial: F,
    ) -> Accumulation
    where
        F: FnOnce() -> Sample,
    {
        let length = self.channel_length as i64;
        let (which, offset) = if (0..length).contains(&timebin) {
            (BufferSlot::Current, timebin)
        } else if (-length..0).contains(&timebin) {
            (BufferSlot::Pending, timebin + length)
        } else {
            return Accumulation::OutOfRange;
        };

        let position = slot * self.channel_length + offset as usize;
        let index = self.index_of(which);
        let cell = &mut self.buffers[index][position];
        if *cell == VOID_SIGNAL {
            *cell = initial().min(MAX_ACCUMULATED_SIGNAL);
            Accumulation::Stored(which)
        } else if *cell as u32 + amount as u32 > MAX_ACCUMULATED_SIGNAL as u32 {
            *cell = MAX_ACCUMULATED_SIGNAL;
            Accumulation::Overflow(which)
        } else {
            *cell += amount;
            Accumulation::Added(which)
        }
    }

    /// Samples of one channel
    pub fn channel(&self, which: BufferSlot, slot: usize) -> &[Sample] {
        let start = slot * self.channel_length;
        &self.buffers[self.index_of(which)][start..start + self.channel_length]
    }

    /// Mutable samples of one channel
    pub fn channel_mut(&mut self, which: BufferSlot, slot: usize) -> &mut [Sample] {
        let start = slot * self.channel_length;
        let index = self.index_of(which);
        &mut self.buffers[index][start..start + self.channel_length]
    }

    /// Whole buffer
    pub fn samples(&self, which: BufferSlot) -> &[Sample] {
        &self.buffers[self.index_of(which)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(length: usize, channels: usize) -> SampleBuffer {
        let mut buffer = SampleBuffer::new(length, 0);
        buffer.ensure_slot(channels - 1).unwrap();
        buffer
    }

    #[test]
    fn first_growth_uses_initial_capacity() {
        let mut buffer = SampleBuffer::new(8, 4);
        buffer.ensure_slot(0).unwrap();
        assert_eq!(buffer.capacity(), 32);
        assert!(buffer.samples(BufferSlot::Current).iter().all(|&s| s == VOID_SIGNAL));
        assert!(buffer.samples(BufferSlot::Pending).iter().all(|&s| s == VOID_SIGNAL));
    }

    #[test]
    fn growth_doubles_or_fits_exactly() {
        let mut buffer = SampleBuffer::new(4, 0);
        buffer.grow(4).unwrap();
        assert_eq!(buffer.capacity(), 4);
        buffer.grow(6).unwrap();
        assert_eq!(buffer.capacity(), 8);
        buffer.grow(40).unwrap();
        assert_eq!(buffer.capacity(), 40);
    }

    #[test]
    fn grow_is_idempotent_and_preserves_content() {
        let mut buffer = filled(4, 2);
        buffer.accumulate(1, 2, 17);
        buffer.accumulate(0, -1, 5);
        let current = buffer.samples(BufferSlot::Current).to_vec();
        let pending = buffer.samples(BufferSlot::Pending).to_vec();

        buffer.grow(buffer.capacity()).unwrap();
        buffer.grow(3).unwrap();
        assert_eq!(buffer.samples(BufferSlot::Current), &current[..]);

        buffer.ensure_slot(5).unwrap();
        assert_eq!(buffer.capacity(), 24);
        assert_eq!(&buffer.samples(BufferSlot::Current)[..8], &current[..]);
        assert_eq!(&buffer.samples(BufferSlot::Pending)[..8], &pending[..]);
        assert!(buffer.samples(BufferSlot::Current)[8..]
            .iter()
            .all(|&s| s == VOID_SIGNAL));
    }

    #[test]
    fn void_cell_takes_first_value_then_adds() {
        let mut buffer = filled(4, 1);
        assert_eq!(buffer.accumulate(0, 1, 10), Accumulation::Stored(BufferSlot::Current));
        assert_eq!(buffer.accumulate(0, 1, 0), Accumulation::Added(BufferSlot::Current));
        assert_eq!(buffer.accumulate(0, 1, 7), Accumulation::Added(BufferSlot::Current));
        assert_eq!(buffer.channel(BufferSlot::Current, 0), &[VOID_SIGNAL, 17, VOID_SIGNAL, VOID_SIGNAL]);
    }

    #[test]
    fn initial_value_only_evaluated_for_void_cell() {
        let mut buffer = filled(4, 1);
        buffer.accumulate_with(0, 0, 0, || 99);
        let outcome = buffer.accumulate_with(0, 0, 3, || panic!("cell is not VOID"));
        assert_eq!(outcome, Accumulation::Added(BufferSlot::Current));
        assert_eq!(buffer.channel(BufferSlot::Current, 0)[0], 102);
    }

    #[test]
    fn saturation_clamps_at_ceiling() {
        let mut buffer = filled(2, 1);
        buffer.accumulate(0, 0, MAX_ACCUMULATED_SIGNAL - 3);
        assert_eq!(buffer.accumulate(0, 0, 3), Accumulation::Added(BufferSlot::Current));
        assert_eq!(buffer.accumulate(0, 0, 1), Accumulation::Overflow(BufferSlot::Current));
        assert_eq!(buffer.channel(BufferSlot::Current, 0)[0], MAX_ACCUMULATED_SIGNAL);
    }

    #[test]
    fn negative_timebins_go_to_pending() {
        let mut buffer = filled(4, 2);
        assert_eq!(buffer.accumulate(1, -1, 8), Accumulation::Stored(BufferSlot::Pending));
        assert_eq!(buffer.accumulate(1, -4, 9), Accumulation::Stored(BufferSlot::Pending));
        assert_eq!(buffer.channel(BufferSlot::Pending, 1), &[9, VOID_SIGNAL, VOID_SIGNAL, 8]);
        assert!(buffer.channel(BufferSlot::Current, 1).iter().all(|&s| s == VOID_SIGNAL));
    }

    #[test]
    fn out_of_range_timebins_are_dropped() {
        let mut buffer = filled(4, 1);
        assert_eq!(buffer.accumulate(0, 4, 1), Accumulation::OutOfRange);
        assert_eq!(buffer.accumulate(0, -5, 1), Accumulation::OutOfRange);
        assert!(buffer.samples(BufferSlot::Current).iter().all(|&s| s == VOID_SIGNAL));
        assert!(buffer.samples(BufferSlot::Pending).iter().all(|&s| s == VOID_SIGNAL));
    }

    #[test]
    fn swap_moves_pending_to_current_and_clears() {
        let mut buffer = filled(4, 2);
        buffer.accumulate(0, 2, 11);
        buffer.accumulate(0, -2, 22);
        buffer.accumulate(1, -3, 33);
        let pending = buffer.samples(BufferSlot::Pending).to_vec();

        buffer.swap_at_timeframe_start();
        assert_eq!(buffer.samples(BufferSlot::Current), &pending[..]);
        assert!(buffer.samples(BufferSlot::Pending).iter().all(|&s| s == VOID_SIGNAL));
    }
}
