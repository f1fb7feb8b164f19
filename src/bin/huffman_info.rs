//! huffman_info - inspect Huffman tables written by the timeframe driver
//!
//! Usage:
//!   huffman_info info <file>                  - Show table summary
//!   huffman_info top <file> [--count 20]      - Most frequent symbols
//!   huffman_info lookup <file> <diff>...      - Code length of signal differences

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tfgen_rs::common::SIGNAL_BIT_LENGTH;
use tfgen_rs::compression::{EntropyCoder, HuffmanTable};

#[derive(Parser)]
#[command(name = "huffman_info")]
#[command(about = "Inspect Huffman code-length tables")]
#[command(version)]
struct Cli {
    /// Raw signal bit width the table was trained with
    #[arg(long, default_value_t = SIGNAL_BIT_LENGTH, value_parser = clap::value_parser!(u32).range(1..=15))]
    signal_bit_length: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show table summary
    Info {
        /// Path to the table file
        file: PathBuf,
    },

    /// List the most frequent symbols
    Top {
        /// Path to the table file
        file: PathBuf,

        /// Number of symbols to list
        #[arg(short, long, default_value_t = 20)]
        count: usize,
    },

    /// Show the code length of signal differences
    Lookup {
        /// Path to the table file
        file: PathBuf,

        /// Signal differences (sample minus previous sample)
        #[arg(allow_hyphen_values = true, required = true)]
        diffs: Vec<i64>,
    },
}

fn main() {
    let cli = Cli::parse();
    let offset = 1i64 << cli.signal_bit_length;

    let result = match &cli.command {
        Commands::Info { file } => show_info(file, offset),
        Commands::Top { file, count } => show_top(file, *count, offset),
        Commands::Lookup { file, diffs } => lookup(file, diffs, offset),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn show_info(path: &Path, offset: i64) -> Result<(), Box<dyn std::error::Error>> {
    let table = HuffmanTable::load(path)?;
    let lengths = table.lengths();

    println!("File: {}", path.display());
    println!("Size: {} bytes", std::fs::metadata(path)?.len());
    println!();
    println!("=== Table ===");
    println!("  Name:           {}", table.name());
    println!("  Symbols:        {}", lengths.len());
    println!("  Training count: {}", table.training_count());
    println!(
        "  Min length:     {}",
        lengths.values().min().copied().unwrap_or(0)
    );
    println!("  Max length:     {}", table.max_code_length());
    if let Some(mean) = table.mean_code_length() {
        println!("  Mean length:    {:.3} bits", mean);
    }
    if let (Some(first), Some(last)) = (lengths.keys().next(), lengths.keys().last()) {
        println!(
            "  Diff range:     {} .. {}",
            *first as i64 - offset,
            *last as i64 - offset
        );
    }
    Ok(())
}

fn show_top(path: &Path, count: usize, offset: i64) -> Result<(), Box<dyn std::error::Error>> {
    let table = HuffmanTable::load(path)?;
    let total = table.training_count().max(1) as f64;

    let mut symbols: Vec<(u64, u64)> = table
        .frequencies()
        .iter()
        .map(|(&symbol, &frequency)| (symbol, frequency))
        .collect();
    symbols.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    println!("{:>8} {:>12} {:>8} {:>7}", "diff", "count", "share", "length");
    for (symbol, frequency) in symbols.into_iter().take(count) {
        let length = table
            .code_length(symbol)
            .map_or_else(|| "-".to_string(), |l| l.to_string());
        println!(
            "{:>8} {:>12} {:>7.3}% {:>7}",
            symbol as i64 - offset,
            frequency,
            100.0 * frequency as f64 / total,
            length
        );
    }
    Ok(())
}

fn lookup(path: &Path, diffs: &[i64], offset: i64) -> Result<(), Box<dyn std::error::Error>> {
    let table = HuffmanTable::load(path)?;
    for &diff in diffs {
        let symbol = diff + offset;
        let length = u64::try_from(symbol).ok().and_then(|s| table.code_length(s));
        match length {
            Some(length) => println!("{:>8} {:>4} bits", diff, length),
            None => println!("{:>8} not in table", diff),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_bit_length_is_bounded() {
        let cli = Cli::try_parse_from(["huffman_info", "info", "t.msgpack"]).unwrap();
        assert_eq!(cli.signal_bit_length, SIGNAL_BIT_LENGTH);
        assert!(Cli::try_parse_from(["huffman_info", "--signal-bit-length", "15", "info", "t"]).is_ok());
        assert!(Cli::try_parse_from(["huffman_info", "--signal-bit-length", "64", "info", "t"]).is_err());
        assert!(Cli::try_parse_from(["huffman_info", "--signal-bit-length", "0", "info", "t"]).is_err());
    }
}
