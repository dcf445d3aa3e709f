#![doc(html_root_url = "https://docs.rs/tsdemux/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tsdemux - MPEG Transport Stream demultiplexer
//!
//! `tsdemux` reads an MPEG-2 transport stream, learns its program layout from
//! the PAT and PMT tables, and reassembles H.264 video and AAC audio PES
//! payloads into elementary stream units.
//!
//! ## Features
//!
//! - Streaming packet parser with adaptation field and PCR decoding
//! - PSI section reassembly across packets, with optional CRC checks
//! - PES payload reassembly with PTS/DTS decoding
//! - Async session API over any `tokio::io::AsyncRead` source, bounded by
//!   packet count or wall-clock time, with cancellation
//! - Optional three-stage pipeline feeding an async unit sink
//!
//! ## Quick Start
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tsdemux = "0.1.0"
//! ```
//!
//! ### Writing elementary streams to disk
//!
//! ```rust,no_run
//! use tsdemux::config::DemuxConfig;
//! use tsdemux::format::ts::{run_pipeline, RunBound};
//! use tsdemux::format::FileSink;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = tokio::fs::File::open("input.ts").await?;
//!     let sink = FileSink::per_codec("output", "stream").await?;
//!
//!     // Writes output/stream.h264 and output/stream.aac
//!     let (report, _) =
//!         run_pipeline(source, sink, DemuxConfig::load(), RunBound::Unbounded, None).await;
//!     println!("{} units from {} packets", report.units, report.packets);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: codec tags and the output unit type
//! - `format`: transport stream demuxing and unit sinks
//! - `config`: session tunables loaded from the environment or a file
//! - `error`: error type and `Result` alias
//! - `utils`: big-endian field readers and MPEG-2 CRC32

/// Codec tags and output units
pub mod av;

/// Session configuration
pub mod config;

/// Error types and utilities
pub mod error;

/// Transport stream demuxing and unit sinks
pub mod format;

/// Common utilities and helper functions
pub mod utils;

pub use error::{DemuxError, Result};
