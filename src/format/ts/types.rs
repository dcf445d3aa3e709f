use crate::av::CodecTag;

// PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_NULL: u16 = 0x1fff;

// Table IDs
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;
/// Padding byte that fills a packet after the last section
pub const TABLE_ID_STUFFING: u8 = 0xff;

// Constants
pub const SYNC_BYTE: u8 = 0x47;
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_HEADER_SIZE: usize = 4;
pub const TS_PAYLOAD_SIZE: usize = TS_PACKET_SIZE - TS_HEADER_SIZE;
/// table_id through last_section_number
pub const PSI_HEADER_SIZE: usize = 8;
pub const PSI_CRC_SIZE: usize = 4;
/// start code, stream_id, length, two flag bytes, header_data_length
pub const PES_FIXED_HEADER_SIZE: usize = 9;
pub const TIMESTAMP_SIZE: usize = 5;
pub const PTS_HZ: u64 = 90_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TSHeader {
    pub sync_byte: u8, // Always 0x47
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    pub adaptation_field_exists: bool,
    pub contains_payload: bool,
    pub continuity_counter: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptationField {
    /// Value of the adaptation_field_length byte
    pub length: usize,
    pub discontinuity: bool,
    pub random_access: bool,
    /// Program clock reference in 27 MHz units, informational only
    pub pcr: Option<u64>,
}

/// A parsed 188-byte transport packet borrowing its payload from the input block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsPacket<'a> {
    pub header: TSHeader,
    pub adaptation: Option<AdaptationField>,
    /// Empty when the packet carries no payload
    pub payload: &'a [u8],
}

/// PAT entry mapping a program to the PID carrying its PMT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramAssociation {
    pub program_number: u16,
    /// PMT PID, or the network PID for program 0
    pub pid: u16,
}

/// PMT entry describing one elementary stream of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramMapping {
    pub stream_type: u8,
    pub elementary_pid: u16,
    pub codec: CodecTag,
}

/// Which PSI table a section channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    ProgramAssociation,
    ProgramMapping,
}

/// Classification of a channel, deciding which reassembler sees its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Unclassified,
    Section(TableKind),
    Payload(CodecTag),
}
