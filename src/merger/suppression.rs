//! Zero suppression with peak detection
//!
//! A sample survives zero suppression if it belongs to a peak:
//! - two consecutive samples above threshold start a peak
//! - inside a peak, samples above threshold are kept
//! - a sample at or below threshold inside a peak is kept if one of the next
//!   two samples (in scan direction) is above threshold again, so two peaks
//!   separated by a dip of one or two samples are merged
//! - otherwise the peak ends and the sample is suppressed
//!
//! The same state machine serves ingestion (forward over a bunch, whose
//! samples are in reverse time order) and the standalone pass (backward over
//! a filled channel, from the last timebin to the first). Lookahead is
//! VOID-aware: a VOID neighbour never counts as above threshold, and the
//! second neighbour is only considered when the first one holds a sample.

use crate::common::{Sample, MAX_ACCUMULATED_SIGNAL, VOID_SIGNAL};

/// Order in which samples are visited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    /// Increasing index
    Forward,
    /// Decreasing index
    Backward,
}

/// Zero suppression threshold adjusted by the baseline shift
///
/// A negative shift raises the threshold, a positive one lowers it, never
/// below zero.
pub fn adjusted_threshold(threshold: u32, baseline_shift: i32) -> u32 {
    if baseline_shift < 0 {
        threshold + baseline_shift.unsigned_abs()
    } else if threshold <= baseline_shift as u32 {
        0
    } else {
        threshold - baseline_shift as u32
    }
}

/// Apply the baseline shift to a kept sample of the standalone pass
pub fn shift_kept_sample(sample: Sample, baseline_shift: i32) -> Sample {
    if baseline_shift < 0 {
        let shift = baseline_shift.unsigned_abs().min(Sample::MAX as u32) as Sample;
        sample.saturating_sub(shift)
    } else {
        let shifted = sample as u32 + baseline_shift as u32;
        shifted.min(MAX_ACCUMULATED_SIGNAL as u32) as Sample
    }
}

fn value(sample: Sample) -> Option<u32> {
    (sample != VOID_SIGNAL).then_some(sample as u32)
}

/// Visit every sample in scan order and report whether it is kept
///
/// `visit` receives the slice index and the keep decision.
pub fn scan_peaks<F>(samples: &[Sample], threshold: u32, direction: ScanDirection, mut visit: F)
where
    F: FnMut(usize, bool),
{
    let n = samples.len();
    let index_at = |step: usize| -> Option<usize> {
        if step >= n {
            return None;
        }
        Some(match direction {
            ScanDirection::Forward => step,
            ScanDirection::Backward => n - 1 - step,
        })
    };
    let above = |v: Option<u32>| v.is_some_and(|v| v > threshold);

    let mut in_peak = false;
    for step in 0..n {
        let Some(index) = index_at(step) else {
            break;
        };
        let current = value(samples[index]).unwrap_or(0);
        let next1 = index_at(step + 1).and_then(|i| value(samples[i]));
        let next2 = if next1.is_some() {
            index_at(step + 2).and_then(|i| value(samples[i]))
        } else {
            None
        };

        let keep = if !in_peak && current > threshold && above(next1) {
            in_peak = true;
            true
        } else if in_peak && current > threshold {
            true
        } else if in_peak {
            if above(next1) || above(next2) {
                true
            } else {
                in_peak = false;
                false
            }
        } else {
            false
        };
        visit(index, keep);
    }
}

/// Keep flags for every sample, in index order
pub fn peak_mask(samples: &[Sample], threshold: u32, direction: ScanDirection) -> Vec<bool> {
    let mut mask = vec![false; samples.len()];
    scan_peaks(samples, threshold, direction, |index, keep| mask[index] = keep);
    mask
}

/// Standalone zero suppression of one channel
///
/// Scans backward from the last timebin. Kept samples are shifted by
/// `baseline_shift` and written to `target`, suppressed samples and VOID
/// input become VOID. Returns the number of kept, filled timebins.
pub fn suppress_channel(
    source: &[Sample],
    threshold: u32,
    baseline_shift: i32,
    target: Option<&mut [Sample]>,
) -> u32 {
    let mask = peak_mask(source, threshold, ScanDirection::Backward);
    match target {
        Some(target) => write_suppressed(source, &mask, baseline_shift, target),
        None => count_kept(source, &mask),
    }
}

/// Standalone zero suppression applied to the channel itself
pub fn suppress_channel_in_place(samples: &mut [Sample], threshold: u32, baseline_shift: i32) -> u32 {
    let mask = peak_mask(samples, threshold, ScanDirection::Backward);
    let mut filled = 0;
    for (sample, keep) in samples.iter_mut().zip(&mask) {
        if *sample == VOID_SIGNAL {
            continue;
        }
        if *keep {
            *sample = shift_kept_sample(*sample, baseline_shift);
            filled += 1;
        } else {
            *sample = VOID_SIGNAL;
        }
    }
    filled
}

fn write_suppressed(source: &[Sample], mask: &[bool], baseline_shift: i32, target: &mut [Sample]) -> u32 {
    let mut filled = 0;
    for ((out, &sample), &keep) in target.iter_mut().zip(source).zip(mask) {
        *out = if sample != VOID_SIGNAL && keep {
            filled += 1;
            shift_kept_sample(sample, baseline_shift)
        } else {
            VOID_SIGNAL
        };
    }
    filled
}

fn count_kept(source: &[Sample], mask: &[bool]) -> u32 {
    source
        .iter()
        .zip(mask)
        .filter(|&(&s, &keep)| keep && s != VOID_SIGNAL)
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const V: Sample = VOID_SIGNAL;

    fn kept_forward(samples: &[Sample], threshold: u32) -> Vec<Option<Sample>> {
        let mask = peak_mask(samples, threshold, ScanDirection::Forward);
        samples
            .iter()
            .zip(mask)
            .map(|(&s, keep)| keep.then_some(s))
            .collect()
    }

    fn kept_backward(samples: &[Sample], threshold: u32) -> Vec<Option<Sample>> {
        let reversed: Vec<Sample> = samples.iter().rev().copied().collect();
        let mask = peak_mask(&reversed, threshold, ScanDirection::Backward);
        let mut kept: Vec<Option<Sample>> = reversed
            .iter()
            .zip(mask)
            .map(|(&s, keep)| keep.then_some(s))
            .collect();
        kept.reverse();
        kept
    }

    #[test]
    fn bridged_dip_scenario() {
        let samples = [0, 0, 8, 9, 3, 7, 2, 0, 0];
        let expected = vec![None, None, Some(8), Some(9), Some(3), Some(7), None, None, None];
        assert_eq!(kept_forward(&samples, 5), expected);
        assert_eq!(kept_backward(&samples, 5), expected);
    }

    #[test]
    fn single_sample_above_threshold_is_noise() {
        let samples = [0, 9, 0, 0, 9, 0];
        assert!(peak_mask(&samples, 5, ScanDirection::Forward).iter().all(|k| !k));
        assert!(peak_mask(&samples, 5, ScanDirection::Backward).iter().all(|k| !k));
    }

    #[test]
    fn two_sample_dip_is_bridged() {
        let samples = [9, 9, 1, 1, 9, 9, 0];
        let expected = vec![Some(9), Some(9), Some(1), Some(1), Some(9), Some(9), None];
        assert_eq!(kept_forward(&samples, 5), expected);
        assert_eq!(kept_backward(&samples, 5), expected);
    }

    #[test]
    fn three_sample_dip_is_not_bridged() {
        let samples = [9, 9, 1, 1, 1, 9, 9];
        let expected = vec![Some(9), Some(9), None, None, None, Some(9), Some(9)];
        assert_eq!(kept_forward(&samples, 5), expected);
        assert_eq!(kept_backward(&samples, 5), expected);
    }

    #[test]
    fn threshold_is_strict() {
        let samples = [5, 5, 5];
        assert!(peak_mask(&samples, 5, ScanDirection::Forward).iter().all(|k| !k));
    }

    #[test]
    fn peak_at_end_of_scan() {
        let samples = [0, 0, 7, 8];
        let expected = vec![None, None, Some(7), Some(8)];
        assert_eq!(kept_forward(&samples, 5), expected);
        assert_eq!(kept_backward(&samples, 5), expected);
    }

    #[test]
    fn void_neighbour_does_not_start_or_bridge() {
        // backward scan: 8 at index 3 has VOID below it
        let samples = [9, 8, V, 8];
        let mask = peak_mask(&samples, 5, ScanDirection::Backward);
        assert_eq!(mask, vec![true, true, false, false]);

        // a dip followed by VOID cannot look past the VOID
        let samples = [9, V, 2, 9, 9];
        let mask = peak_mask(&samples, 5, ScanDirection::Backward);
        assert_eq!(mask, vec![false, false, false, true, true]);
    }

    #[test]
    fn raw_void_value_never_starts_a_peak() {
        // a raw 0xFFFF in a bunch is not above threshold and hides the
        // sample behind it from the lookahead
        let samples = [9, V, 9];
        assert_eq!(peak_mask(&samples, 5, ScanDirection::Forward), vec![false, false, false]);

        let samples = [V, 9, 9];
        assert_eq!(
            peak_mask(&samples, 5, ScanDirection::Forward),
            vec![false, true, true]
        );
    }

    #[test]
    fn adjusted_threshold_follows_shift() {
        assert_eq!(adjusted_threshold(2, -5), 7);
        assert_eq!(adjusted_threshold(2, 0), 2);
        assert_eq!(adjusted_threshold(2, 2), 0);
        assert_eq!(adjusted_threshold(2, 5), 0);
        assert_eq!(adjusted_threshold(10, 3), 7);
    }

    #[test]
    fn shift_of_kept_samples() {
        assert_eq!(shift_kept_sample(10, -5), 5);
        assert_eq!(shift_kept_sample(3, -5), 0);
        assert_eq!(shift_kept_sample(10, 4), 14);
        assert_eq!(shift_kept_sample(MAX_ACCUMULATED_SIGNAL, 4), MAX_ACCUMULATED_SIGNAL);
    }

    #[test]
    fn standalone_pass_writes_void_for_suppressed() {
        // backward scan order reads 0, 8, 9, 3, 7, 2, 0
        let source = [V, 0, 2, 7, 3, 9, 8, 0, V];
        let mut target = [0; 9];
        let filled = suppress_channel(&source, 5, -1, Some(&mut target));
        assert_eq!(filled, 4);
        assert_eq!(target, [V, V, V, 6, 2, 8, 7, V, V]);
    }

    #[test]
    fn standalone_pass_counts_without_target() {
        let source = [V, 0, 2, 7, 3, 9, 8, 0, V];
        assert_eq!(suppress_channel(&source, 5, 0, None), 4);
    }

    #[test]
    fn in_place_matches_target_variant() {
        let source = [1, 12, 14, 2, 2, 11, 13, 0, V, 9, 9, 1];
        let mut target = [0; 12];
        let filled = suppress_channel(&source, 5, -2, Some(&mut target));

        let mut in_place = source;
        let filled_in_place = suppress_channel_in_place(&mut in_place, 5, -2);
        assert_eq!(filled, filled_in_place);
        assert_eq!(target, in_place);
    }

    #[test]
    fn suppression_is_idempotent_on_kept_samples() {
        let source = [0, 0, 2, 7, 3, 9, 8, 0, 0];
        let mut once = source;
        assert_eq!(suppress_channel_in_place(&mut once, 5, 0), 4);
        let kept: Vec<Sample> = once.iter().copied().filter(|&s| s != V).collect();
        assert_eq!(kept, vec![7, 3, 9, 8]);

        let mut twice = once;
        assert_eq!(suppress_channel_in_place(&mut twice, 5, 0), 4);
        assert_eq!(twice, once);
    }
}
