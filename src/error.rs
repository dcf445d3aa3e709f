use std::time::Duration;
use thiserror::Error;

/// Errors produced while demultiplexing a transport stream.
///
/// Per-packet problems are non-fatal: the packet (or the unit it belonged to)
/// is dropped and processing continues. Source and sink failures stop a run.
#[derive(Error, Debug)]
pub enum DemuxError {
    /// First byte of a packet was not the 0x47 sync marker
    #[error("invalid sync byte: 0x{0:02x}")]
    InvalidSync(u8),

    /// Adaptation field length runs past the end of the packet
    #[error("adaptation field overrun on pid 0x{pid:04x}: length {length}")]
    AdaptationOverrun { pid: u16, length: usize },

    /// PES start packet too short for its fixed and optional header bytes
    #[error("truncated PES header on pid 0x{pid:04x}: have {available} bytes, need {needed}")]
    TruncatedHeader {
        pid: u16,
        available: usize,
        needed: usize,
    },

    /// PSI section declared a length over the configured maximum
    #[error("section too large on pid 0x{pid:04x}: {size} bytes")]
    SectionTooLarge { pid: u16, size: usize },

    /// CRC_32 of a complete section did not verify
    #[error("section crc mismatch on pid 0x{pid:04x}")]
    CrcMismatch { pid: u16 },

    /// Source ended part way through a packet
    #[error("truncated packet: {0} of 188 bytes")]
    TruncatedPacket(usize),

    /// The byte source could not be opened, or was already closed
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A source read did not complete in time
    #[error("source read timed out after {0:?}")]
    Timeout(Duration),

    /// The downstream unit sink went away
    #[error("sink closed")]
    SinkClosed,
}

impl DemuxError {
    /// Returns whether this error ends a run. Non-fatal errors only drop
    /// the offending packet or in-flight unit.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DemuxError::SourceUnavailable(_)
                | DemuxError::Io(_)
                | DemuxError::Timeout(_)
                | DemuxError::SinkClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, DemuxError>;
