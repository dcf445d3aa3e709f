use super::pes::PESHeader;
use super::types::*;
use crate::av::CodecTag;
use std::collections::HashMap;

/// Reassembly state for one PID.
///
/// Used by the section reassembler for PSI channels and by the payload
/// reassembler for elementary streams. The buffer never grows past the
/// expected size once that size is known.
#[derive(Debug)]
pub struct ChannelState {
    pid: u16,
    kind: ChannelKind,
    pub(crate) buffer: Vec<u8>,
    /// Expected total size of the unit in flight, 0 when unknown
    pub(crate) expected_size: usize,
    /// Bytes written into a payload buffer
    pub(crate) position: usize,
    pub(crate) header: Option<PESHeader>,
    last_counter: Option<u8>,
}

impl ChannelState {
    pub fn new(pid: u16, kind: ChannelKind) -> Self {
        Self {
            pid,
            kind,
            buffer: Vec::new(),
            expected_size: 0,
            position: 0,
            header: None,
            last_counter: None,
        }
    }

    pub fn pid(&self) -> u16 {
        self.pid
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Codec tag of a payload channel.
    pub fn codec(&self) -> Option<CodecTag> {
        match self.kind {
            ChannelKind::Payload(codec) => Some(codec),
            _ => None,
        }
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn expected_size(&self) -> usize {
        self.expected_size
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// The sub-header of the most recent PES unit on this channel.
    pub fn pes_header(&self) -> Option<&PESHeader> {
        self.header.as_ref()
    }

    /// Whether a payload unit is currently being accumulated.
    pub fn is_accumulating(&self) -> bool {
        self.expected_size > 0 && self.header.is_some()
    }

    /// Drops any in-flight unit and returns to the initial state.
    pub fn reset(&mut self) {
        self.buffer = Vec::new();
        self.expected_size = 0;
        self.position = 0;
    }

    /// Records a continuity counter and returns the expected value when it
    /// does not follow the previous one.
    ///
    /// The counter only advances on packets with payload. A repeated value on
    /// a payload packet is a legal duplicate. A discontinuity indicator resets
    /// tracking.
    pub fn track_continuity(&mut self, counter: u8, has_payload: bool, discontinuity: bool) -> Option<u8> {
        let previous = self.last_counter.replace(counter);
        if discontinuity || self.pid == PID_NULL {
            return None;
        }
        let previous = previous?;
        let expected = if has_payload {
            (previous + 1) & 0x0F
        } else {
            previous
        };
        if counter == expected || (has_payload && counter == previous) {
            None
        } else {
            Some(expected)
        }
    }
}

/// Maps PIDs to their reassembly state for the lifetime of a session.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: HashMap<u16, ChannelState>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    /// Returns the state for `pid`, creating it on first sighting.
    ///
    /// PID 0 is always the PAT channel; any other new PID starts unclassified.
    pub fn lookup_or_create(&mut self, pid: u16) -> &mut ChannelState {
        self.channels
            .entry(pid)
            .or_insert_with(|| ChannelState::new(pid, default_kind(pid)))
    }

    /// Classifies `pid`, creating its state if needed. An existing
    /// classification other than `Unclassified` is kept.
    ///
    /// Returns true if the classification changed.
    pub fn classify(&mut self, pid: u16, kind: ChannelKind) -> bool {
        let state = self.lookup_or_create(pid);
        if state.kind == ChannelKind::Unclassified && kind != ChannelKind::Unclassified {
            state.kind = kind;
            state.reset();
            true
        } else {
            false
        }
    }

    pub fn contains(&self, pid: u16) -> bool {
        self.channels.contains_key(&pid)
    }

    pub fn get(&self, pid: u16) -> Option<&ChannelState> {
        self.channels.get(&pid)
    }

    pub fn get_mut(&mut self, pid: u16) -> Option<&mut ChannelState> {
        self.channels.get_mut(&pid)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ChannelState> {
        self.channels.values_mut()
    }
}

fn default_kind(pid: u16) -> ChannelKind {
    if pid == PID_PAT {
        ChannelKind::Section(TableKind::ProgramAssociation)
    } else {
        ChannelKind::Unclassified
    }
}
