//! Text and binary file formats
//!
//! Flat timeframe dump (one line per channel, blank line between channels):
//! ```text
//!  <ddl:4> <hw:6> <nbunches:4> [ <len:4> <time:4> <sample:4>{len} ]{nbunches}
//! ```
//! Bunches are listed from the highest timebin down, samples in
//! time-descending order, so a parsed bunch has the same layout as a raw
//! bunch (`sample i` at `time - i`).
//!
//! Fixed-bunch dump (hardware simulation input):
//! ```text
//! hw=<hw>
//! <start> <length>
//! <time> <signal>        (time = start down to start - length + 1)
//! ```
//!
//! Binary block file (Huffman tables):
//! - Magic (8 bytes)
//! - Length (4 bytes LE) + MsgPack payload

use std::io::{BufRead, Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::{
    Bunch, ChannelId, RawChannel, RawEvent, Sample, TimeframeError, TimeframeResult, VOID_SIGNAL,
};
use crate::merger::ChannelStats;

/// Maximal runs of filled timebins, highest timebin first
pub fn extract_bunches(samples: &[Sample]) -> Vec<Bunch> {
    let mut bunches = Vec::new();
    let mut current: Option<Bunch> = None;
    for timebin in (0..samples.len()).rev() {
        let signal = samples[timebin];
        if signal == VOID_SIGNAL {
            if let Some(bunch) = current.take() {
                bunches.push(bunch);
            }
            continue;
        }
        current
            .get_or_insert_with(|| Bunch::new(timebin as i32, Vec::new()))
            .samples
            .push(signal);
    }
    if let Some(bunch) = current {
        bunches.push(bunch);
    }
    bunches
}

/// Write channels as a flat timeframe dump
pub fn write_timeframe<'a, W, I>(writer: &mut W, channels: I) -> TimeframeResult<()>
where
    W: Write,
    I: IntoIterator<Item = (ChannelId, &'a [Sample])>,
{
    for (n, (id, samples)) in channels.into_iter().enumerate() {
        let bunches = extract_bunches(samples);
        if n > 0 {
            writeln!(writer)?;
        }
        write!(writer, " {:4} {:6} {:4}", id.ddl(), id.hw_address(), bunches.len())?;
        for bunch in &bunches {
            write!(writer, " {:4} {:4}", bunch.len(), bunch.start_timebin)?;
            for signal in &bunch.samples {
                write!(writer, " {:4}", signal)?;
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Parse a flat timeframe dump into one raw event
pub fn read_timeframe<R: BufRead>(reader: R, source_name: &str) -> TimeframeResult<RawEvent> {
    let mut channels = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let channel = parse_channel_line(&line)
            .map_err(|message| TimeframeError::parse(source_name, line_no + 1, message))?;
        channels.push(channel);
    }
    Ok(RawEvent::new(channels))
}

fn parse_channel_line(line: &str) -> Result<RawChannel, String> {
    let mut fields = line.split_whitespace();
    let mut next = |what: &str| -> Result<i64, String> {
        let field = fields.next().ok_or_else(|| format!("missing {what}"))?;
        field
            .parse::<i64>()
            .map_err(|_| format!("invalid {what} '{field}'"))
    };

    let ddl = next("ddl number")?;
    let hw = next("hardware address")?;
    let ddl = u16::try_from(ddl).map_err(|_| format!("ddl number {ddl} out of range"))?;
    let hw = u16::try_from(hw).map_err(|_| format!("hardware address {hw} out of range"))?;
    let nbunches = next("bunch count")?;

    let mut bunches = Vec::new();
    for _ in 0..nbunches {
        let length = next("bunch length")?;
        let time = next("bunch time")?;
        let time = i32::try_from(time).map_err(|_| format!("bunch time {time} out of range"))?;
        let mut samples = Vec::new();
        for _ in 0..length {
            let signal = next("sample")?;
            let signal = Sample::try_from(signal)
                .ok()
                .filter(|&s| s != VOID_SIGNAL)
                .ok_or_else(|| format!("sample {signal} out of range"))?;
            samples.push(signal);
        }
        bunches.push(Bunch::new(time, samples));
    }
    if fields.next().is_some() {
        return Err("trailing fields after last bunch".to_string());
    }
    Ok(RawChannel::new(ChannelId::new(ddl, hw), bunches))
}

/// Write channels in the fixed single-bunch simulation input format
///
/// VOID timebins are written as 0 so every channel has one complete bunch.
pub fn write_fixed_bunch<'a, W, I>(writer: &mut W, channels: I, start: u32, length: u32) -> TimeframeResult<()>
where
    W: Write,
    I: IntoIterator<Item = (ChannelId, &'a [Sample])>,
{
    if length == 0 || length > start {
        return Err(TimeframeError::invalid_argument(format!(
            "fixed bunch of length {length} does not fit below timebin {start}"
        )));
    }
    let lower = start - length;
    for (id, samples) in channels {
        if start as usize >= samples.len() {
            return Err(TimeframeError::invalid_argument(format!(
                "fixed bunch start {start} beyond channel length {}",
                samples.len()
            )));
        }
        writeln!(writer, "hw={}", id.hw_address())?;
        writeln!(writer, "{} {}", start, length)?;
        for time in (lower + 1..=start).rev() {
            let signal = match samples[time as usize] {
                VOID_SIGNAL => 0,
                s => s,
            };
            writeln!(writer, "{} {}", time, signal)?;
        }
    }
    Ok(())
}

/// Write channel statistics as fixed-width text columns
///
/// Columns: ddl, hw, average, min, max, filled timebins, bunches. Missing
/// minimum / maximum are written as -1.
pub fn write_statistics<W: Write>(writer: &mut W, stats: &[ChannelStats]) -> TimeframeResult<()> {
    for s in stats {
        let min = s.min_signal.map_or(-1, |v| v as i64);
        let max = s.max_signal.map_or(-1, |v| v as i64);
        writeln!(
            writer,
            "{:3}{:6}{:6}{:6}{:6}{:6}{:6}",
            s.ddl,
            s.hw_address,
            s.average_signal,
            min,
            max,
            s.filled_timebins,
            s.bunches()
        )?;
    }
    Ok(())
}

/// Write `magic` followed by one length-prefixed MsgPack block
pub fn write_block<W: Write, T: Serialize>(writer: &mut W, magic: &[u8; 8], value: &T) -> TimeframeResult<()> {
    let payload = rmp_serde::to_vec(value)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| TimeframeError::other("block exceeds 4 GiB"))?;
    writer.write_all(magic)?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    Ok(())
}

/// Read a block written by [`write_block`], checking the magic
pub fn read_block<R: Read, T: DeserializeOwned>(reader: &mut R, magic: &[u8; 8]) -> TimeframeResult<T> {
    let mut found = [0u8; 8];
    reader.read_exact(&mut found)?;
    if &found != magic {
        return Err(TimeframeError::other("invalid file magic bytes"));
    }
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as u64;
    let mut payload = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut payload)?;
    if payload.len() as u64 != len {
        return Err(TimeframeError::other(format!(
            "truncated block: expected {} bytes, found {}",
            len,
            payload.len()
        )));
    }
    Ok(rmp_serde::from_slice(&payload)?)
}
