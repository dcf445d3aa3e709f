/// Destinations for reassembled units
pub mod sink;

/// MPEG transport stream demuxing
pub mod ts;

pub use self::sink::{FileLayout, FileSink, MemorySink, UnitSink};
pub use self::ts::{TSDemuxCore, TSDemuxer};
