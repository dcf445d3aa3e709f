use super::events::{DemuxEvent, Observer};
use super::registry::ChannelState;
use super::timestamp::parse_timestamp;
use super::types::{PES_FIXED_HEADER_SIZE, TIMESTAMP_SIZE};
use crate::av::{CodecTag, OutputUnit};
use crate::config::DemuxConfig;
use crate::error::{DemuxError, Result};
use crate::utils::{rb16, rb8};
use bytes::Bytes;

/// Packetized Elementary Stream (PES) sub-header
///
/// The fixed 9 bytes at the start of every PES packet plus the timestamps
/// decoded from the optional header bytes that follow them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PESHeader {
    /// Whether the packet began with the 0x000001 start code prefix
    pub has_start_code: bool,
    /// Stream identifier indicating content type (video/audio/etc.)
    pub stream_id: u8,
    /// Declared PES_packet_length; 0 means unbounded
    pub packet_length: u16,
    /// Second flags byte, carrying PTS_DTS_flags in its top two bits
    pub flags: u8,
    /// Number of optional header bytes after the fixed 9
    pub header_data_length: u8,
    /// Presentation Time Stamp (33 bits)
    pub pts: Option<u64>,
    /// Decoding Time Stamp (33 bits)
    pub dts: Option<u64>,
}

impl PESHeader {
    /// Parses the sub-header at the start of a PES packet.
    ///
    /// Fails with `TruncatedHeader` when `data` is shorter than the fixed
    /// header plus the optional bytes it announces.
    pub fn parse(pid: u16, data: &[u8]) -> Result<Self> {
        if data.len() < PES_FIXED_HEADER_SIZE {
            return Err(DemuxError::TruncatedHeader {
                pid,
                available: data.len(),
                needed: PES_FIXED_HEADER_SIZE,
            });
        }

        let header_data_length = rb8(&data[8..]);
        let needed = PES_FIXED_HEADER_SIZE + header_data_length as usize;
        if data.len() < needed {
            return Err(DemuxError::TruncatedHeader {
                pid,
                available: data.len(),
                needed,
            });
        }

        let flags = rb8(&data[7..]);
        let optional = &data[PES_FIXED_HEADER_SIZE..needed];
        let pts = parse_timestamp(optional);
        let dts = if flags & 0xC0 == 0xC0 {
            optional.get(TIMESTAMP_SIZE..).and_then(parse_timestamp)
        } else {
            None
        };

        Ok(Self {
            has_start_code: data[..3] == [0x00, 0x00, 0x01],
            stream_id: rb8(&data[3..]),
            packet_length: rb16(&data[4..]),
            flags,
            header_data_length,
            pts,
            dts,
        })
    }

    /// Offset of the first payload byte after the fixed and optional header.
    pub fn payload_offset(&self) -> usize {
        PES_FIXED_HEADER_SIZE + self.header_data_length as usize
    }
}

/// Frames PES payloads spread over transport packets into output units.
///
/// Each payload channel moves from awaiting a start packet, to accumulating,
/// to emitting a unit and awaiting the next start. A unit completes when its
/// declared size is reached or when the next unit starts.
#[derive(Debug, Clone)]
pub struct PayloadReassembler {
    default_capacity: usize,
}

impl Default for PayloadReassembler {
    fn default() -> Self {
        Self::new(&DemuxConfig::default())
    }
}

impl PayloadReassembler {
    pub fn new(config: &DemuxConfig) -> Self {
        Self {
            default_capacity: config.default_unit_capacity.max(1),
        }
    }

    /// Feeds one packet's payload for a payload channel, appending completed
    /// units to `out`.
    ///
    /// A truncated sub-header fails the packet after any in-flight unit has
    /// been flushed; the channel is left awaiting the next start.
    pub fn push(
        &self,
        state: &mut ChannelState,
        payload: &[u8],
        unit_start: bool,
        observer: &mut Observer,
        out: &mut Vec<OutputUnit>,
    ) -> Result<()> {
        if !state.codec().is_some_and(|codec| codec.is_emitted()) {
            return Ok(());
        }
        let mut data = payload;

        if unit_start {
            self.flush(state, observer, out);
            state.reset();

            let header = PESHeader::parse(state.pid(), data)?;
            observer.emit(DemuxEvent::PesHeader {
                pid: state.pid(),
                stream_id: header.stream_id,
                declared_size: header.packet_length as usize,
                header_data_length: header.header_data_length as usize,
                flags: header.flags,
                pts: header.pts,
            });

            let capacity = match header.packet_length {
                0 => self.default_capacity,
                declared => declared as usize,
            };
            data = &data[header.payload_offset()..];
            state.buffer = Vec::with_capacity(capacity);
            state.expected_size = capacity;
            state.header = Some(header);
        }

        if !state.is_accumulating() {
            return Ok(());
        }

        let room = state.expected_size - state.position;
        let take = room.min(data.len());
        state.buffer.extend_from_slice(&data[..take]);
        state.position += take;

        if state.position >= state.expected_size {
            self.flush(state, observer, out);
        }
        Ok(())
    }

    /// Emits the in-flight unit, if any bytes were written, and returns the
    /// channel to awaiting a start packet. Flushing twice never duplicates a unit.
    pub fn flush(&self, state: &mut ChannelState, observer: &mut Observer, out: &mut Vec<OutputUnit>) {
        if state.position == 0 {
            return;
        }
        let codec = state.codec().unwrap_or(CodecTag::Unclassified);
        let mut data = std::mem::take(&mut state.buffer);
        data.truncate(state.position);
        state.reset();

        let mut unit = OutputUnit::new(codec, Bytes::from(data)).with_pid(state.pid());
        if let Some(header) = &state.header {
            unit = unit
                .with_stream_id(header.stream_id)
                .with_pts(header.pts)
                .with_dts(header.dts);
        }
        observer.emit(DemuxEvent::UnitEmitted {
            pid: unit.pid,
            codec,
            len: unit.len(),
        });
        out.push(unit);
    }
}
