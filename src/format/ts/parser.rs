use super::types::*;
use crate::error::{DemuxError, Result};
use crate::utils::{rb8, read_pid};

/// Parses one 188-byte transport packet.
///
/// Never reads past `TS_PACKET_SIZE`; anything after it in `data` is ignored.
pub fn parse_packet(data: &[u8]) -> Result<TsPacket<'_>> {
    if data.len() < TS_PACKET_SIZE {
        return Err(DemuxError::TruncatedPacket(data.len()));
    }
    let data = &data[..TS_PACKET_SIZE];
    let header = parse_header(data)?;

    let mut payload_offset = TS_HEADER_SIZE;
    let adaptation = if header.adaptation_field_exists {
        let field = parse_adaptation_field(data, header.pid)?;
        payload_offset += field.length + 1;
        Some(field)
    } else {
        None
    };

    let payload: &[u8] = if header.contains_payload {
        &data[payload_offset..]
    } else {
        &[]
    };

    Ok(TsPacket {
        header,
        adaptation,
        payload,
    })
}

pub fn parse_header(data: &[u8]) -> Result<TSHeader> {
    if data.len() < TS_HEADER_SIZE {
        return Err(DemuxError::TruncatedPacket(data.len()));
    }

    if data[0] != SYNC_BYTE {
        return Err(DemuxError::InvalidSync(data[0]));
    }

    Ok(TSHeader {
        sync_byte: data[0],
        transport_error: (data[1] & 0x80) != 0,
        payload_unit_start: (data[1] & 0x40) != 0,
        transport_priority: (data[1] & 0x20) != 0,
        pid: read_pid(&data[1..]),
        scrambling_control: (data[3] >> 6) & 0x03,
        adaptation_field_exists: (data[3] & 0x20) != 0,
        contains_payload: (data[3] & 0x10) != 0,
        continuity_counter: data[3] & 0x0F,
    })
}

/// Parses the adaptation field that follows the 4-byte header of a full packet.
pub fn parse_adaptation_field(data: &[u8], pid: u16) -> Result<AdaptationField> {
    let offset = TS_HEADER_SIZE;
    if data.len() <= offset {
        return Err(DemuxError::TruncatedPacket(data.len()));
    }
    let length = rb8(&data[offset..]) as usize;
    if offset + 1 + length > data.len().min(TS_PACKET_SIZE) {
        return Err(DemuxError::AdaptationOverrun { pid, length });
    }

    let mut field = AdaptationField {
        length,
        discontinuity: false,
        random_access: false,
        pcr: None,
    };
    if length == 0 {
        return Ok(field);
    }

    let flags = data[offset + 1];
    field.discontinuity = (flags & 0x80) != 0;
    field.random_access = (flags & 0x40) != 0;

    // flags byte plus the 6-byte PCR must fit inside the field
    let pos = offset + 2;
    if (flags & 0x10) != 0 && length >= 7 {
        let pcr_base = ((data[pos] as u64) << 25)
            | ((data[pos + 1] as u64) << 17)
            | ((data[pos + 2] as u64) << 9)
            | ((data[pos + 3] as u64) << 1)
            | ((data[pos + 4] & 0x80) as u64 >> 7);
        let pcr_ext = (((data[pos + 4] & 0x01) as u64) << 8) | (data[pos + 5] as u64);
        field.pcr = Some(pcr_base * 300 + pcr_ext);
    }

    Ok(field)
}
