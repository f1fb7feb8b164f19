//! Huffman code-length table
//!
//! Training collects symbol frequencies, `generate` builds the code lengths.
//! Only lengths are kept: the table answers "how many bits would this symbol
//! cost", it never produces a bitstream.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::EntropyCoder;
use crate::common::{TimeframeError, TimeframeResult};
use crate::recorder::{create_output, read_block, write_block};

/// Magic bytes of a Huffman table file
pub const HUFFMAN_MAGIC: [u8; 8] = *b"TFHUFF01";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuffmanTable {
    name: String,
    frequencies: BTreeMap<u64, u64>,
    lengths: BTreeMap<u64, u32>,
}

impl HuffmanTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frequencies(&self) -> &BTreeMap<u64, u64> {
        &self.frequencies
    }

    pub fn lengths(&self) -> &BTreeMap<u64, u32> {
        &self.lengths
    }

    pub fn training_count(&self) -> u64 {
        self.frequencies.values().sum()
    }

    /// Whether code lengths are available
    pub fn is_generated(&self) -> bool {
        !self.lengths.is_empty()
    }

    /// Build code lengths from the collected frequencies
    pub fn generate(&mut self) {
        self.lengths = code_lengths(&self.frequencies);
        info!(
            table = %self.name,
            symbols = self.lengths.len(),
            max_length = self.max_code_length(),
            "Generated Huffman code lengths"
        );
    }

    /// Average code length weighted with the training frequencies
    pub fn mean_code_length(&self) -> Option<f64> {
        let total = self.training_count();
        if total == 0 || !self.is_generated() {
            return None;
        }
        let bits: u64 = self
            .frequencies
            .iter()
            .filter_map(|(symbol, &count)| self.lengths.get(symbol).map(|&l| l as u64 * count))
            .sum();
        Some(bits as f64 / total as f64)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> TimeframeResult<()> {
        write_block(writer, &HUFFMAN_MAGIC, self)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> TimeframeResult<Self> {
        read_block(reader, &HUFFMAN_MAGIC)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> TimeframeResult<()> {
        let path = path.as_ref();
        let mut writer = create_output(path)?;
        self.write_to(&mut writer)?;
        writer.flush()?;
        info!(table = %self.name, file = %path.display(), "Saved Huffman table");
        Ok(())
    }

    /// Load a generated table; a table without code lengths is an error
    pub fn load<P: AsRef<Path>>(path: P) -> TimeframeResult<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let table = Self::read_from(&mut reader)?;
        if !table.is_generated() {
            return Err(TimeframeError::other(format!(
                "Huffman table '{}' in {} has no code lengths",
                table.name,
                path.display()
            )));
        }
        info!(table = %table.name, symbols = table.lengths.len(), "Loaded Huffman table");
        Ok(table)
    }
}

impl EntropyCoder for HuffmanTable {
    fn add_training_value(&mut self, symbol: u64) {
        *self.frequencies.entry(symbol).or_insert(0) += 1;
    }

    fn code_length(&self, symbol: u64) -> Option<u32> {
        self.lengths.get(&symbol).copied()
    }

    fn max_code_length(&self) -> u32 {
        self.lengths.values().copied().max().unwrap_or(0)
    }
}

/// Huffman code lengths; a single symbol gets length 1
fn code_lengths(frequencies: &BTreeMap<u64, u64>) -> BTreeMap<u64, u32> {
    let symbols: Vec<(u64, u64)> = frequencies
        .iter()
        .filter(|&(_, &count)| count > 0)
        .map(|(&symbol, &count)| (symbol, count))
        .collect();
    match symbols.len() {
        0 => return BTreeMap::new(),
        1 => return BTreeMap::from([(symbols[0].0, 1)]),
        _ => {}
    }

    // leaves are nodes 0..n, internal nodes follow
    let n = symbols.len();
    let mut parent = vec![usize::MAX; 2 * n - 1];
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = symbols
        .iter()
        .enumerate()
        .map(|(node, &(_, count))| Reverse((count, node)))
        .collect();
    let mut next = n;
    while heap.len() > 1 {
        let (Some(Reverse((wa, a))), Some(Reverse((wb, b)))) = (heap.pop(), heap.pop()) else {
            break;
        };
        parent[a] = next;
        parent[b] = next;
        heap.push(Reverse((wa.saturating_add(wb), next)));
        next += 1;
    }

    symbols
        .iter()
        .enumerate()
        .map(|(leaf, &(symbol, _))| {
            let mut depth = 0;
            let mut node = leaf;
            while parent[node] != usize::MAX {
                node = parent[node];
                depth += 1;
            }
            (symbol, depth)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn trained(counts: &[(u64, u64)]) -> HuffmanTable {
        let mut table = HuffmanTable::new("test");
        for &(symbol, count) in counts {
            for _ in 0..count {
                table.add_training_value(symbol);
            }
        }
        table.generate();
        table
    }

    #[test]
    fn single_symbol_has_length_one() {
        let table = trained(&[(1024, 50)]);
        assert_eq!(table.code_length(1024), Some(1));
        assert_eq!(table.code_length(1025), None);
        assert_eq!(table.max_code_length(), 1);
    }

    #[test]
    fn frequent_symbols_get_short_codes() {
        let table = trained(&[(1, 40), (2, 20), (3, 10), (4, 5), (5, 5)]);
        assert_eq!(table.code_length(1), Some(1));
        assert_eq!(table.code_length(2), Some(2));
        assert_eq!(table.code_length(3), Some(3));
        assert_eq!(table.code_length(4), Some(4));
        assert_eq!(table.code_length(5), Some(4));
        assert_eq!(table.max_code_length(), 4);
    }

    #[test]
    fn code_lengths_satisfy_kraft_equality() {
        let counts: Vec<(u64, u64)> = (0..37).map(|s| (s, 1 + (s * 7919) % 101)).collect();
        let table = trained(&counts);
        let kraft: f64 = table
            .lengths()
            .values()
            .map(|&l| 0.5f64.powi(l as i32))
            .sum();
        assert!((kraft - 1.0).abs() < 1e-9);
    }

    #[test]
    fn mean_code_length() {
        let table = trained(&[(1, 2), (2, 1), (3, 1)]);
        // lengths 1, 2, 2
        assert_eq!(table.mean_code_length(), Some(1.5));
        assert_eq!(HuffmanTable::new("empty").mean_code_length(), None);
    }

    #[test]
    fn persistence_round_trip() {
        let table = trained(&[(1024, 9), (1023, 3), (1030, 1)]);
        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        assert_eq!(&buf[..8], &HUFFMAN_MAGIC);
        let restored = HuffmanTable::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(restored, table);
    }

    #[test]
    fn load_rejects_untrained_table() {
        let path = std::env::temp_dir().join(format!("tfgen_untrained_{}.msgpack", std::process::id()));
        HuffmanTable::new("untrained").save(&path).unwrap();
        assert!(HuffmanTable::load(&path).is_err());
        std::fs::remove_file(&path).unwrap();

        assert!(HuffmanTable::load("/nonexistent/table.msgpack").is_err());
    }
}
