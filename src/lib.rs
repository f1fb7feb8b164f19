//! TFGEN-RS: Timeframe generator for TPC raw channel data
//!
//! Merges the raw channel data of many collisions into fixed-length
//! timeframes, applies the front-end signal processing (zero suppression,
//! common mode) and estimates the entropy-coding compression of the result.

pub mod common;
pub mod compression;
pub mod config;
pub mod data_source_emulator;
pub mod generator;
pub mod merger;
pub mod pipeline;
pub mod reader;
pub mod recorder;
