//! Per-channel lookup tables loaded from line-oriented text files
//!
//! Pedestal table line: `<ddl> <hw address> <pedestal> [ignored...]`
//! Mapping table line:  `<ddl> <hw address> <pad row> <pad> [ignored...]`
//!
//! Missing entries are not errors: an absent pedestal is zero and an absent
//! mapping marks the channel as unmapped.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{info, warn};

use crate::common::{ChannelId, TimeframeResult};

/// Per-channel pedestal values, already shifted by the baseline shift
#[derive(Debug, Clone, Default)]
pub struct BaselineTable {
    values: HashMap<ChannelId, u32>,
}

impl BaselineTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a pedestal table, adding `baseline_shift` to every entry
    pub fn load<P: AsRef<Path>>(path: P, baseline_shift: i32) -> TimeframeResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        info!(file = %path.display(), "Reading channel baseline configuration");
        Self::from_reader(BufReader::new(file), baseline_shift)
    }

    /// Parse a pedestal table from any buffered reader
    pub fn from_reader<R: BufRead>(reader: R, baseline_shift: i32) -> TimeframeResult<Self> {
        let mut table = Self::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let Some(fields) = leading_integers::<3>(&line) else {
                if !is_blank_or_comment(&line) {
                    warn!(line = line_no + 1, "Skipping malformed pedestal line");
                }
                continue;
            };
            let [ddl, hw, pedestal] = fields;
            let (Ok(ddl), Ok(hw)) = (u16::try_from(ddl), u16::try_from(hw)) else {
                warn!(line = line_no + 1, "Channel address out of range");
                continue;
            };
            let Some(shifted) = pedestal
                .checked_add(baseline_shift as i64)
                .and_then(|v| u32::try_from(v.max(0)).ok())
            else {
                warn!(line = line_no + 1, "Pedestal value out of range");
                continue;
            };
            table.insert(ChannelId::new(ddl, hw), shifted);
        }
        Ok(table)
    }

    pub fn insert(&mut self, id: ChannelId, pedestal: u32) {
        self.values.insert(id, pedestal);
    }

    /// Pedestal of a channel, zero when not configured
    pub fn get(&self, id: ChannelId) -> u32 {
        self.values.get(&id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Physical position of a channel on the pad plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadPosition {
    pub row: u32,
    pub pad: u32,
}

/// Channel identifier to pad position lookup
#[derive(Debug, Clone, Default)]
pub struct ChannelMapping {
    positions: HashMap<ChannelId, PadPosition>,
}

impl ChannelMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a channel mapping table
    pub fn load<P: AsRef<Path>>(path: P) -> TimeframeResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        info!(file = %path.display(), "Reading channel mapping");
        let mapping = Self::from_reader(BufReader::new(file))?;
        info!(channels = mapping.len(), "Read channel mapping");
        Ok(mapping)
    }

    /// Parse a mapping table from any buffered reader
    pub fn from_reader<R: BufRead>(reader: R) -> TimeframeResult<Self> {
        let mut mapping = Self::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let Some(fields) = leading_integers::<4>(&line) else {
                if !is_blank_or_comment(&line) {
                    warn!(line = line_no + 1, "Skipping malformed mapping line");
                }
                continue;
            };
            let [ddl, hw, row, pad] = fields;
            let (Ok(ddl), Ok(hw), Ok(row), Ok(pad)) = (
                u16::try_from(ddl),
                u16::try_from(hw),
                u32::try_from(row),
                u32::try_from(pad),
            ) else {
                warn!(line = line_no + 1, "Mapping entry out of range");
                continue;
            };
            mapping.insert(ChannelId::new(ddl, hw), PadPosition { row, pad });
        }
        Ok(mapping)
    }

    pub fn insert(&mut self, id: ChannelId, position: PadPosition) {
        self.positions.insert(id, position);
    }

    /// Pad position, `None` for unmapped channels
    pub fn get(&self, id: ChannelId) -> Option<PadPosition> {
        self.positions.get(&id).copied()
    }

    /// Pad row, `None` for unmapped channels
    pub fn row(&self, id: ChannelId) -> Option<u32> {
        self.get(id).map(|p| p.row)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Parse the first N whitespace separated integers of a line
fn leading_integers<const N: usize>(line: &str) -> Option<[i64; N]> {
    let mut out = [0i64; N];
    let mut fields = line.split_whitespace();
    for slot in out.iter_mut() {
        *slot = fields.next()?.parse().ok()?;
    }
    Some(out)
}

fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn baseline_table_applies_shift() {
        let text = "0 10 50\n0 11 3 trailing text\n1 5 100\n";
        let table = BaselineTable::from_reader(Cursor::new(text), -5).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(ChannelId::new(0, 10)), 45);
        // clamped at zero
        assert_eq!(table.get(ChannelId::new(0, 11)), 0);
        assert_eq!(table.get(ChannelId::new(1, 5)), 95);
    }

    #[test]
    fn baseline_absent_entry_is_zero() {
        let table = BaselineTable::from_reader(Cursor::new("0 1 20\n"), 0).unwrap();
        assert_eq!(table.get(ChannelId::new(7, 7)), 0);
    }

    #[test]
    fn baseline_skips_malformed_lines() {
        let text = "# ddl hw pedestal\n\n0 1 x\n0 2 30\n";
        let table = BaselineTable::from_reader(Cursor::new(text), 0).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(ChannelId::new(0, 2)), 30);
    }

    #[test]
    fn baseline_skips_out_of_range_pedestals() {
        let text = "0 1 9223372036854775807\n0 2 4294967301\n0 3 -7\n0 4 4294967294\n";
        let table = BaselineTable::from_reader(Cursor::new(text), 1).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(ChannelId::new(0, 1)), 0);
        assert_eq!(table.get(ChannelId::new(0, 2)), 0);
        assert_eq!(table.get(ChannelId::new(0, 3)), 0);
        assert_eq!(table.get(ChannelId::new(0, 4)), u32::MAX);
    }

    #[test]
    fn mapping_lookup() {
        let text = "0 10 3 17\n1 20 60 2\n";
        let mapping = ChannelMapping::from_reader(Cursor::new(text)).unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(
            mapping.get(ChannelId::new(0, 10)),
            Some(PadPosition { row: 3, pad: 17 })
        );
        assert_eq!(mapping.row(ChannelId::new(1, 20)), Some(60));
        assert_eq!(mapping.get(ChannelId::new(0, 11)), None);
    }

    #[test]
    fn mapping_rejects_negative_rows() {
        let mapping = ChannelMapping::from_reader(Cursor::new("0 1 -1 4\n")).unwrap();
        assert!(mapping.is_empty());
    }

    #[test]
    fn load_missing_file_is_error() {
        assert!(BaselineTable::load("/nonexistent/pedestal.dat", 0).is_err());
        assert!(ChannelMapping::load("/nonexistent/mapping.dat").is_err());
    }
}
