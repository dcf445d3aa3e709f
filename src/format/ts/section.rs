use super::events::{DemuxEvent, Observer};
use super::registry::{ChannelRegistry, ChannelState};
use super::types::*;
use crate::av::CodecTag;
use crate::config::DemuxConfig;
use crate::error::{DemuxError, Result};
use crate::utils::{read_length12, read_pid, ri16, verify_section};

/// Program Map Table contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramMapTable {
    pub program_number: u16,
    pub pcr_pid: u16,
    pub entries: Vec<ProgramMapping>,
}

/// A parsed PSI table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PsiTable {
    Pat(Vec<ProgramAssociation>),
    Pmt(ProgramMapTable),
}

/// Reassembles PSI sections that span transport packets.
///
/// A channel with an empty buffer has no section in progress, so
/// continuation packets arriving then are ignored until the next unit start.
#[derive(Debug, Clone)]
pub struct SectionReassembler {
    max_section_size: usize,
    verify_crc: bool,
}

impl Default for SectionReassembler {
    fn default() -> Self {
        Self::new(&DemuxConfig::default())
    }
}

impl SectionReassembler {
    pub fn new(config: &DemuxConfig) -> Self {
        Self {
            max_section_size: config.max_section_size,
            verify_crc: config.verify_crc,
        }
    }

    /// Feeds one packet's payload, appending every section it completes to
    /// `sections`.
    ///
    /// On error the channel is reset; sections completed earlier in the same
    /// packet are still delivered. A failure finishing the previous section
    /// from the bytes before the pointer is returned only after the sections
    /// starting at the pointer have been read.
    pub fn push(
        &self,
        state: &mut ChannelState,
        payload: &[u8],
        unit_start: bool,
        sections: &mut Vec<Vec<u8>>,
    ) -> Result<()> {
        let mut data = payload;
        let mut deferred = None;

        if unit_start {
            let Some((&pointer, rest)) = data.split_first() else {
                state.reset();
                return Ok(());
            };
            let pointer = pointer as usize;
            if pointer > rest.len() {
                state.reset();
                return Ok(());
            }
            let (tail, rest) = rest.split_at(pointer);
            if !state.buffer.is_empty() {
                // only the previous section's remainder lives before the pointer
                match self.fill(state, tail) {
                    Ok((_, Some(section))) => sections.push(section),
                    Ok((_, None)) => {}
                    Err(e) => deferred = Some(e),
                }
            }
            state.reset();
            data = rest;
        } else if state.buffer.is_empty() {
            return Ok(());
        }

        while !data.is_empty() {
            if state.buffer.is_empty() && data[0] == TABLE_ID_STUFFING {
                break;
            }
            let (consumed, section) = self.fill(state, data)?;
            data = &data[consumed..];
            if let Some(section) = section {
                sections.push(section);
            }
        }
        deferred.map_or(Ok(()), Err)
    }

    /// Moves bytes into the buffer until one section is complete or `data`
    /// runs out. Returns the number of bytes consumed and the finished section.
    fn fill(&self, state: &mut ChannelState, data: &[u8]) -> Result<(usize, Option<Vec<u8>>)> {
        let mut consumed = 0;

        if state.expected_size == 0 {
            let take = 3usize.saturating_sub(state.buffer.len()).min(data.len());
            state.buffer.extend_from_slice(&data[..take]);
            consumed += take;
            if state.buffer.len() < 3 {
                return Ok((consumed, None));
            }
            let size = read_length12(&state.buffer[1..]) + 3;
            if size > self.max_section_size {
                state.reset();
                return Err(DemuxError::SectionTooLarge {
                    pid: state.pid(),
                    size,
                });
            }
            state.expected_size = size;
        }

        let need = state.expected_size.saturating_sub(state.buffer.len());
        let take = need.min(data.len() - consumed);
        state
            .buffer
            .extend_from_slice(&data[consumed..consumed + take]);
        consumed += take;

        if state.buffer.len() < state.expected_size {
            return Ok((consumed, None));
        }

        let section = std::mem::take(&mut state.buffer);
        state.expected_size = 0;
        if self.verify_crc && has_syntax_indicator(&section) && !verify_section(&section) {
            state.reset();
            return Err(DemuxError::CrcMismatch { pid: state.pid() });
        }
        Ok((consumed, Some(section)))
    }
}

fn has_syntax_indicator(section: &[u8]) -> bool {
    section.len() > 1 && (section[1] & 0x80) != 0
}

/// End of the table body: long-form sections carry a trailing CRC_32.
fn body_end(section: &[u8]) -> usize {
    if has_syntax_indicator(section) && section.len() >= PSI_HEADER_SIZE + PSI_CRC_SIZE {
        section.len() - PSI_CRC_SIZE
    } else {
        section.len()
    }
}

/// Parses a program association section.
///
/// Returns `None` for short sections or a wrong table id. A program number
/// with the top bit set ends the entry list.
pub fn parse_pat(section: &[u8]) -> Option<Vec<ProgramAssociation>> {
    if section.len() < PSI_HEADER_SIZE || section[0] != TABLE_ID_PAT {
        return None;
    }
    let mut p = &section[PSI_HEADER_SIZE..body_end(section)];
    let mut entries = Vec::new();

    while p.len() >= 4 {
        let program_number = ri16(p);
        if program_number < 0 {
            break;
        }
        entries.push(ProgramAssociation {
            program_number: program_number as u16,
            pid: read_pid(&p[2..]),
        });
        p = &p[4..];
    }

    Some(entries)
}

/// Parses a program map section.
pub fn parse_pmt(section: &[u8]) -> Option<ProgramMapTable> {
    if section.len() < PSI_HEADER_SIZE || section[0] != TABLE_ID_PMT {
        return None;
    }
    let program_number = u16::from_be_bytes([section[3], section[4]]);
    let mut p = &section[PSI_HEADER_SIZE..body_end(section)];
    if p.len() < 4 {
        return None;
    }

    let mut table = ProgramMapTable {
        program_number,
        pcr_pid: read_pid(p),
        entries: Vec::new(),
    };
    let program_info_length = read_length12(&p[2..]);
    p = &p[4..];
    if program_info_length > p.len() {
        return Some(table);
    }
    p = &p[program_info_length..];

    while p.len() >= 5 {
        let stream_type = p[0];
        let elementary_pid = read_pid(&p[1..]);
        let es_info_length = read_length12(&p[3..]);
        table.entries.push(ProgramMapping {
            stream_type,
            elementary_pid,
            codec: CodecTag::from_stream_type(stream_type),
        });
        if 5 + es_info_length > p.len() {
            break;
        }
        p = &p[5 + es_info_length..];
    }

    Some(table)
}

/// Parses a complete section from a PSI channel and applies it to the registry.
///
/// PAT entries classify their PIDs as PMT channels; PMT entries create payload
/// channels tagged with their codec. Returns `None` if the section did not
/// parse as the expected table.
pub fn apply_section(
    registry: &mut ChannelRegistry,
    observer: &mut Observer,
    pid: u16,
    table: TableKind,
    section: &[u8],
) -> Option<PsiTable> {
    observer.emit(DemuxEvent::SectionComplete {
        pid,
        table_id: section.first().copied().unwrap_or(TABLE_ID_STUFFING),
        length: section.len(),
    });

    match table {
        TableKind::ProgramAssociation => {
            let entries = parse_pat(section)?;
            for entry in &entries {
                observer.emit(DemuxEvent::ProgramAssociation(*entry));
                // program 0 points at the network information table
                if entry.program_number == 0 {
                    continue;
                }
                let kind = ChannelKind::Section(TableKind::ProgramMapping);
                if registry.classify(entry.pid, kind) {
                    observer.emit(DemuxEvent::ChannelCreated {
                        pid: entry.pid,
                        kind,
                    });
                }
            }
            Some(PsiTable::Pat(entries))
        }
        TableKind::ProgramMapping => {
            let pmt = parse_pmt(section)?;
            for mapping in &pmt.entries {
                observer.emit(DemuxEvent::ProgramMapping {
                    pmt_pid: pid,
                    pcr_pid: pmt.pcr_pid,
                    mapping: *mapping,
                });
                let kind = ChannelKind::Payload(mapping.codec);
                if registry.classify(mapping.elementary_pid, kind) {
                    observer.emit(DemuxEvent::ChannelCreated {
                        pid: mapping.elementary_pid,
                        kind,
                    });
                }
            }
            Some(PsiTable::Pmt(pmt))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crc32_mpeg2;
    use pretty_assertions::assert_eq;

    fn with_crc(mut section: Vec<u8>) -> Vec<u8> {
        let crc = crc32_mpeg2(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        section
    }

    fn pat_section() -> Vec<u8> {
        with_crc(vec![
            0x00, 0xB0, 0x0D, // table id, syntax + length 13
            0x00, 0x01, 0xC1, 0x00, 0x00, // ts id, version, section numbers
            0x00, 0x01, 0xE1, 0x00, // program 1 -> 0x100
        ])
    }

    fn pmt_section() -> Vec<u8> {
        with_crc(vec![
            0x02, 0xB0, 0x17, // table id, syntax + length 23
            0x00, 0x01, 0xC1, 0x00, 0x00, // program 1
            0xE0, 0x44, 0xF0, 0x00, // pcr pid 0x44, no program info
            0x1B, 0xE0, 0x44, 0xF0, 0x00, // H.264 on 0x44
            0x0F, 0xE0, 0x45, 0xF0, 0x00, // AAC on 0x45
        ])
    }

    fn state(pid: u16, table: TableKind) -> ChannelState {
        ChannelState::new(pid, ChannelKind::Section(table))
    }

    #[test]
    fn test_parse_pat_single_entry() {
        // short-form section, no CRC
        let section = [
            0x00, 0x00, 0x09, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xE1, 0x00,
        ];
        assert_eq!(
            parse_pat(&section),
            Some(vec![ProgramAssociation {
                program_number: 1,
                pid: 0x100
            }])
        );
    }

    #[test]
    fn test_parse_pat_excludes_crc() {
        let entries = parse_pat(&pat_section()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pid, 0x100);
    }

    #[test]
    fn test_parse_pat_negative_program_ends_loop() {
        let section = [
            0x00, 0x00, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xE1, 0x00, 0x80, 0x00,
            0xE2, 0x00,
        ];
        assert_eq!(parse_pat(&section).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_pat_wrong_table() {
        let mut section = pat_section();
        section[0] = 0x42;
        assert_eq!(parse_pat(&section), None);
        assert_eq!(parse_pat(&[0x00, 0xB0]), None);
    }

    #[test]
    fn test_parse_pmt() {
        let pmt = parse_pmt(&pmt_section()).unwrap();
        assert_eq!(pmt.program_number, 1);
        assert_eq!(pmt.pcr_pid, 0x44);
        assert_eq!(
            pmt.entries,
            vec![
                ProgramMapping {
                    stream_type: 0x1B,
                    elementary_pid: 0x44,
                    codec: CodecTag::H264
                },
                ProgramMapping {
                    stream_type: 0x0F,
                    elementary_pid: 0x45,
                    codec: CodecTag::AAC
                },
            ]
        );
    }

    #[test]
    fn test_parse_pmt_skips_descriptors() {
        let section = with_crc(vec![
            0x02, 0xB0, 0x17, 0x00, 0x01, 0xC1, 0x00, 0x00, 0xE1, 0x00, // pcr 0x100
            0xF0, 0x03, 0x0E, 0x01, 0xFF, // 3 bytes program info
            0x1B, 0xE1, 0x00, 0xF0, 0x02, 0x52, 0x00, // H.264, 2 bytes ES info
        ]);
        let pmt = parse_pmt(&section).unwrap();
        assert_eq!(pmt.pcr_pid, 0x100);
        assert_eq!(pmt.entries.len(), 1);
        assert_eq!(pmt.entries[0].elementary_pid, 0x100);
    }

    #[test]
    fn test_parse_pmt_descriptor_overrun() {
        let section = [
            0x02, 0x00, 0x0F, 0x00, 0x01, 0xC1, 0x00, 0x00, 0xE1, 0x00, 0xF0, 0x00, 0x0F, 0xE0,
            0x45, 0xF0, 0x40, 0x1B, 0xE0, 0x46, 0xF0, 0x00,
        ];
        // first entry claims 64 descriptor bytes; it is kept and the loop ends
        let pmt = parse_pmt(&section).unwrap();
        assert_eq!(pmt.entries.len(), 1);
        assert_eq!(pmt.entries[0].elementary_pid, 0x45);
    }

    #[test]
    fn test_apply_pmt_classifies_streams() {
        let mut registry = ChannelRegistry::new();
        let mut observer = Observer::new();
        let section = with_crc(vec![
            0x02, 0xB0, 0x12, 0x00, 0x01, 0xC1, 0x00, 0x00, 0xE0, 0x44, 0xF0, 0x00, 0x1B, 0xE0,
            0x44, 0xF0, 0x00,
        ]);
        let table = apply_section(
            &mut registry,
            &mut observer,
            0x100,
            TableKind::ProgramMapping,
            &section,
        );
        assert!(matches!(table, Some(PsiTable::Pmt(_))));
        let state = registry.get(0x44).unwrap();
        assert_eq!(state.kind(), ChannelKind::Payload(CodecTag::H264));
    }

    #[test]
    fn test_apply_pat_derives_pmt_pid() {
        let mut registry = ChannelRegistry::new();
        let mut observer = Observer::new();
        apply_section(
            &mut registry,
            &mut observer,
            PID_PAT,
            TableKind::ProgramAssociation,
            &pat_section(),
        );
        assert_eq!(
            registry.get(0x100).unwrap().kind(),
            ChannelKind::Section(TableKind::ProgramMapping)
        );
    }

    #[test]
    fn test_reassemble_single_packet() {
        let reassembler = SectionReassembler::default();
        let mut state = state(PID_PAT, TableKind::ProgramAssociation);
        let mut payload = vec![0x00];
        payload.extend_from_slice(&pat_section());
        payload.resize(TS_PAYLOAD_SIZE, 0xFF);

        let mut sections = Vec::new();
        reassembler
            .push(&mut state, &payload, true, &mut sections)
            .unwrap();
        assert_eq!(sections, vec![pat_section()]);
        assert!(state.buffer().is_empty());
        assert_eq!(state.expected_size(), 0);
    }

    #[test]
    fn test_reassemble_across_packets() {
        let reassembler = SectionReassembler::default();
        let mut state = state(0x100, TableKind::ProgramMapping);
        let section = pmt_section();
        let mut first = vec![0x02, 0xAA, 0xBB]; // pointer skips two bytes
        first.extend_from_slice(&section[..10]);

        let mut sections = Vec::new();
        reassembler.push(&mut state, &first, true, &mut sections).unwrap();
        assert!(sections.is_empty());
        assert_eq!(state.expected_size(), section.len());

        let mut second = section[10..].to_vec();
        second.resize(TS_PAYLOAD_SIZE, 0xFF);
        reassembler
            .push(&mut state, &second, false, &mut sections)
            .unwrap();
        assert_eq!(sections, vec![section]);
    }

    #[test]
    fn test_pointer_completes_previous_section() {
        let reassembler = SectionReassembler::default();
        let mut state = state(PID_PAT, TableKind::ProgramAssociation);
        let section = pat_section();
        let mut first = vec![0x00];
        first.extend_from_slice(&section[..5]);

        let mut sections = Vec::new();
        reassembler.push(&mut state, &first, true, &mut sections).unwrap();

        let mut second = vec![(section.len() - 5) as u8];
        second.extend_from_slice(&section[5..]);
        second.extend_from_slice(&section);
        second.resize(TS_PAYLOAD_SIZE, 0xFF);
        reassembler
            .push(&mut state, &second, true, &mut sections)
            .unwrap();
        assert_eq!(sections, vec![section.clone(), section]);
    }

    #[test]
    fn test_bad_tail_keeps_section_at_pointer() {
        let reassembler = SectionReassembler::default();
        let mut state = state(0x100, TableKind::ProgramMapping);
        let mut sections = Vec::new();
        reassembler
            .push(&mut state, &[0x00, 0x02, 0xBF], true, &mut sections)
            .unwrap();
        assert_eq!(state.buffer(), &[0x02, 0xBF]);

        // the tail byte completes a 4098-byte length field
        let section = pmt_section();
        let mut payload = vec![0x01, 0xFF];
        payload.extend_from_slice(&section);
        let err = reassembler
            .push(&mut state, &payload, true, &mut sections)
            .unwrap_err();
        assert!(matches!(err, DemuxError::SectionTooLarge { pid: 0x100, size: 4098 }));
        assert_eq!(sections, vec![section]);
        assert!(state.buffer().is_empty());
    }

    #[test]
    fn test_bad_crc_in_tail_keeps_next_section() {
        let config = DemuxConfig {
            verify_crc: true,
            ..Default::default()
        };
        let reassembler = SectionReassembler::new(&config);
        let mut state = state(PID_PAT, TableKind::ProgramAssociation);
        let section = pat_section();
        let mut corrupt = section.clone();
        corrupt[9] ^= 0x04;

        let mut first = vec![0x00];
        first.extend_from_slice(&corrupt[..5]);
        let mut sections = Vec::new();
        reassembler.push(&mut state, &first, true, &mut sections).unwrap();

        let mut second = vec![(corrupt.len() - 5) as u8];
        second.extend_from_slice(&corrupt[5..]);
        second.extend_from_slice(&section);
        let err = reassembler
            .push(&mut state, &second, true, &mut sections)
            .unwrap_err();
        assert!(matches!(err, DemuxError::CrcMismatch { pid: 0 }));
        assert_eq!(sections, vec![section]);
    }

    #[test]
    fn test_section_too_large() {
        let reassembler = SectionReassembler::default();
        let mut state = state(0x100, TableKind::ProgramMapping);
        // length field 0xFFF: 4098 bytes
        let payload = [0x00, 0x02, 0xBF, 0xFF, 0x00, 0x01];
        let mut sections = Vec::new();
        let err = reassembler
            .push(&mut state, &payload, true, &mut sections)
            .unwrap_err();
        assert!(matches!(err, DemuxError::SectionTooLarge { pid: 0x100, size: 4098 }));
        assert!(sections.is_empty());
        assert!(state.buffer().is_empty());
        assert_eq!(state.expected_size(), 0);

        // continuation bytes of the dropped section are ignored
        reassembler
            .push(&mut state, &[0x11; 20], false, &mut sections)
            .unwrap();
        assert!(state.buffer().is_empty());
    }

    #[test]
    fn test_crc_verification() {
        let config = DemuxConfig {
            verify_crc: true,
            ..Default::default()
        };
        let reassembler = SectionReassembler::new(&config);
        let mut state = state(PID_PAT, TableKind::ProgramAssociation);
        let mut section = pat_section();
        section[9] ^= 0x04;
        let mut payload = vec![0x00];
        payload.extend_from_slice(&section);

        let mut sections = Vec::new();
        let err = reassembler
            .push(&mut state, &payload, true, &mut sections)
            .unwrap_err();
        assert!(matches!(err, DemuxError::CrcMismatch { pid: 0 }));
        assert!(sections.is_empty());
    }

    #[test]
    fn test_pointer_past_payload() {
        let reassembler = SectionReassembler::default();
        let mut state = state(PID_PAT, TableKind::ProgramAssociation);
        let mut sections = Vec::new();
        reassembler
            .push(&mut state, &[0x10, 0x00, 0xB0], true, &mut sections)
            .unwrap();
        assert!(sections.is_empty());
        assert!(state.buffer().is_empty());
    }
}
