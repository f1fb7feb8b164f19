//! Compression estimate of timeframe data
//!
//! Each channel is turned into a sequence of difference symbols:
//! - VOID counts as 0, samples are clamped to `2^bits - 1`
//! - `diff = sample - previous` (previous = 0 at the channel start)
//! - `symbol = diff + 2^bits`, always in `[0, 2 × 2^bits)`
//!
//! In training mode the symbols feed an entropy coder's statistics, in
//! encoding mode their code lengths are summed and compared with the raw
//! size `L × bits`.

mod huffman;

pub use huffman::{HuffmanTable, HUFFMAN_MAGIC};

use serde::Serialize;
use tracing::{debug, warn};

use crate::common::{Sample, VOID_SIGNAL};
use crate::config::CompressionConfig;
use crate::merger::ChannelMerger;

/// Word size of the hardware output format in bits
pub const ALTRO_WORD_BITS: u64 = 40;

/// Entropy coder oracle
pub trait EntropyCoder {
    /// Record one symbol for training
    fn add_training_value(&mut self, symbol: u64);

    /// Code length of a symbol, `None` if the coder does not know it
    fn code_length(&self, symbol: u64) -> Option<u32>;

    /// Longest code length of the coder
    fn max_code_length(&self) -> u32;
}

/// Estimated compression of one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionResult {
    pub ddl: u16,
    pub hw_address: u16,
    pub pad_row: Option<u32>,
    /// Kept timebins from zero suppression, if calculated
    pub occupancy: Option<u32>,
    /// Encoded size in bits, aligned to the hardware word size
    pub bits: u64,
    /// Raw size divided by encoded size
    pub factor: f64,
}

/// Round a bit count up to a multiple of the hardware word size
pub fn align_to_word(bits: u64) -> u64 {
    bits.div_ceil(ALTRO_WORD_BITS) * ALTRO_WORD_BITS
}

/// Difference-symbol compression estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionEstimator {
    signal_bit_length: u32,
    length_cutoff: u32,
}

impl CompressionEstimator {
    /// `length_cutoff` 0 disables the escape cost model
    pub fn new(signal_bit_length: u32, length_cutoff: u32) -> Self {
        Self {
            signal_bit_length,
            length_cutoff,
        }
    }

    pub fn from_config(config: &CompressionConfig) -> Self {
        Self::new(config.signal_bit_length, config.length_cutoff)
    }

    pub fn signal_bit_length(&self) -> u32 {
        self.signal_bit_length
    }

    fn signal_range(&self) -> u64 {
        1u64 << self.signal_bit_length
    }

    /// Difference symbols of one channel, in increasing timebin order
    pub fn symbols<'a>(&self, samples: &'a [Sample]) -> impl Iterator<Item = u64> + 'a {
        let range = self.signal_range();
        let mut previous = 0u64;
        samples.iter().map(move |&sample| {
            let signal = if sample == VOID_SIGNAL { 0 } else { sample as u64 };
            let signal = signal.min(range - 1);
            let symbol = signal + range - previous;
            previous = signal;
            symbol
        })
    }

    /// Cost in bits of one symbol
    pub fn symbol_cost<C: EntropyCoder + ?Sized>(&self, coder: &C, symbol: u64) -> u64 {
        let escape = self.length_cutoff as u64 + self.signal_bit_length as u64;
        match coder.code_length(symbol) {
            Some(length) if self.length_cutoff == 0 || length < self.length_cutoff => length as u64,
            Some(_) => escape,
            None if self.length_cutoff > 0 => escape,
            None => coder.max_code_length() as u64 + self.signal_bit_length as u64,
        }
    }

    /// Encoded size of one channel before word alignment
    pub fn channel_bits<C: EntropyCoder + ?Sized>(&self, coder: &C, samples: &[Sample]) -> u64 {
        self.symbols(samples)
            .map(|symbol| self.symbol_cost(coder, symbol))
            .sum()
    }

    /// Feed every channel of the current timeframe into the coder statistics
    pub fn train<C: EntropyCoder + ?Sized>(&self, merger: &ChannelMerger, coder: &mut C) {
        for (_, samples) in merger.channels() {
            for symbol in self.symbols(samples) {
                coder.add_training_value(symbol);
            }
        }
    }

    /// Compression estimate of every channel of the current timeframe
    ///
    /// Channels without any encoded bit produce no result.
    pub fn estimate<C: EntropyCoder + ?Sized>(
        &self,
        merger: &ChannelMerger,
        coder: &C,
    ) -> Vec<CompressionResult> {
        let raw_bits = merger.channel_length() as f64 * self.signal_bit_length as f64;
        let mut results = Vec::new();
        for (id, samples) in merger.channels() {
            let bits = self.channel_bits(coder, samples);
            if bits == 0 {
                continue;
            }
            let bits = align_to_word(bits);
            let factor = raw_bits / bits as f64;
            if factor < 1.0 {
                warn!(channel = %id, factor, bits, "Compression factor smaller than 1");
            }
            debug!(channel = %id, factor, bits, "Channel compression");
            results.push(CompressionResult {
                ddl: id.ddl(),
                hw_address: id.hw_address(),
                pad_row: merger.mapping().row(id),
                occupancy: merger.occupancy().get(&id).copied().flatten(),
                bits,
                factor,
            });
        }
        results
    }
}

/// Compression factors over a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompressionSummary {
    pub channels: usize,
    pub mean_factor: f64,
    pub min_factor: f64,
    pub max_factor: f64,
    #[serde(skip)]
    factor_sum: f64,
}

impl CompressionSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, results: &[CompressionResult]) {
        for result in results {
            if self.channels == 0 {
                self.min_factor = result.factor;
                self.max_factor = result.factor;
            } else {
                self.min_factor = self.min_factor.min(result.factor);
                self.max_factor = self.max_factor.max(result.factor);
            }
            self.channels += 1;
            self.factor_sum += result.factor;
        }
        if self.channels > 0 {
            self.mean_factor = self.factor_sum / self.channels as f64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ChannelId;
    use crate::merger::MergerConfig;
    use std::collections::HashMap;

    const V: Sample = VOID_SIGNAL;

    /// Fixed code lengths for selected symbols
    struct FixedCoder {
        lengths: HashMap<u64, u32>,
        trained: Vec<u64>,
    }

    impl FixedCoder {
        fn new(lengths: &[(u64, u32)]) -> Self {
            Self {
                lengths: lengths.iter().copied().collect(),
                trained: Vec::new(),
            }
        }
    }

    impl EntropyCoder for FixedCoder {
        fn add_training_value(&mut self, symbol: u64) {
            self.trained.push(symbol);
        }

        fn code_length(&self, symbol: u64) -> Option<u32> {
            self.lengths.get(&symbol).copied()
        }

        fn max_code_length(&self) -> u32 {
            self.lengths.values().copied().max().unwrap_or(0)
        }
    }

    fn merger_with(samples: &[Sample]) -> ChannelMerger {
        let mut m = ChannelMerger::new(MergerConfig {
            channel_length: samples.len(),
            initial_channels: 1,
            seed: Some(2),
            ..Default::default()
        });
        for (timebin, &value) in samples.iter().enumerate() {
            if value != V {
                m.accumulate(ChannelId::new(0, 9), timebin as i32, value).unwrap();
            }
        }
        m
    }

    #[test]
    fn symbols_are_shifted_differences() {
        let estimator = CompressionEstimator::new(10, 0);
        let symbols: Vec<u64> = estimator.symbols(&[5, V, 3, 2000]).collect();
        // diffs: +5, -5, +3, +1020 (2000 clamped to 1023)
        assert_eq!(symbols, vec![1029, 1019, 1027, 2044]);
        assert!(symbols.iter().all(|&s| s < 2048));
    }

    #[test]
    fn word_alignment() {
        assert_eq!(align_to_word(1), 40);
        assert_eq!(align_to_word(40), 40);
        assert_eq!(align_to_word(41), 80);
    }

    #[test]
    fn cutoff_charges_escape_cost() {
        let coder = FixedCoder::new(&[(1024, 2), (1025, 12)]);
        let estimator = CompressionEstimator::new(10, 8);
        assert_eq!(estimator.symbol_cost(&coder, 1024), 2);
        assert_eq!(estimator.symbol_cost(&coder, 1025), 18);
        assert_eq!(estimator.symbol_cost(&coder, 7), 18);

        let no_cutoff = CompressionEstimator::new(10, 0);
        assert_eq!(no_cutoff.symbol_cost(&coder, 1025), 12);
        assert_eq!(no_cutoff.symbol_cost(&coder, 7), 22);
    }

    #[test]
    fn training_submits_every_timebin() {
        let m = merger_with(&[1, 1, V, 4]);
        let mut coder = FixedCoder::new(&[]);
        CompressionEstimator::new(10, 0).train(&m, &mut coder);
        assert_eq!(coder.trained, vec![1025, 1024, 1023, 1028]);
    }

    #[test]
    fn constant_signal_compresses() {
        let samples = vec![50; 1024];
        let m = merger_with(&samples);
        let mut table = HuffmanTable::new("constant");
        let estimator = CompressionEstimator::new(10, 0);
        estimator.train(&m, &mut table);
        table.generate();

        let results = estimator.estimate(&m, &table);
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.bits, 1040);
        assert!(result.factor >= 1.0);
        assert_eq!(result.occupancy, None);
        assert_eq!(result.hw_address, 9);
    }

    #[test]
    fn summary_tracks_factors() {
        let result = |factor| CompressionResult {
            ddl: 0,
            hw_address: 0,
            pad_row: None,
            occupancy: None,
            bits: 40,
            factor,
        };
        let mut summary = CompressionSummary::new();
        summary.add(&[result(2.0), result(4.0)]);
        summary.add(&[result(0.5)]);
        assert_eq!(summary.channels, 3);
        assert_eq!(summary.min_factor, 0.5);
        assert_eq!(summary.max_factor, 4.0);
        assert!((summary.mean_factor - 6.5 / 3.0).abs() < 1e-12);
    }
}
