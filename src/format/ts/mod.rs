//! # MPEG Transport Stream (TS) Demuxing
//!
//! Turns a stream of 188-byte transport packets into codec-tagged
//! elementary stream units:
//!
//! - TS packet and adaptation field parsing
//! - Program Specific Information (PAT/PMT) section reassembly
//! - Packetized Elementary Stream (PES) payload reassembly
//! - 33-bit PTS/DTS decoding
//!
//! ## Example Usage
//!
//! ### Demuxing a file
//!
//! ```rust,no_run
//! use tsdemux::format::ts::{RunBound, TSDemuxer};
//!
//! # async fn demux() -> tsdemux::Result<()> {
//! let mut demuxer = TSDemuxer::open("input.ts").await?;
//! let report = demuxer.run(RunBound::Unbounded).await;
//! for unit in &report.units {
//!     println!("{} unit, {} bytes, pts {:?}", unit.codec, unit.len(), unit.pts);
//! }
//! demuxer.close();
//! # Ok(())
//! # }
//! ```
//!
//! ### Feeding packets by hand
//!
//! ```rust
//! use tsdemux::format::ts::{TSDemuxCore, TS_PACKET_SIZE};
//!
//! let mut core = TSDemuxCore::default();
//! let mut units = Vec::new();
//! let mut null_packet = [0xFFu8; TS_PACKET_SIZE];
//! null_packet[..4].copy_from_slice(&[0x47, 0x1F, 0xFF, 0x10]);
//! core.process_packet(&null_packet, &mut units).unwrap();
//! assert!(units.is_empty());
//! ```

/// Demux session and per-packet driver
pub mod demuxer;

/// Structured events and the caller hook
pub mod events;

/// Low-level TS packet parsing
pub mod parser;

/// PES sub-header parsing and payload reassembly
pub mod pes;

/// Reader, parser, and sink stages over bounded queues
pub mod pipeline;

/// Per-PID channel state
pub mod registry;

/// PSI section reassembly and PAT/PMT parsing
pub mod section;

/// PTS/DTS timestamp decoding
pub mod timestamp;

/// Core TS types and constants
pub mod types;

pub use demuxer::{RunBound, RunReport, StopReason, TSDemuxCore, TSDemuxer};
pub use events::{DemuxEvent, EventHook};
pub use pes::{PESHeader, PayloadReassembler};
pub use pipeline::{run_pipeline, run_pipeline_until, PipelineReport};
pub use registry::{ChannelRegistry, ChannelState};
pub use section::{ProgramMapTable, PsiTable, SectionReassembler};
pub use types::{
    ChannelKind, ProgramAssociation, ProgramMapping, TSHeader, TableKind, PID_NULL, PID_PAT,
    TS_PACKET_SIZE,
};
