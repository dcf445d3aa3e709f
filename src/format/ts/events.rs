//! Structured observability for the demuxer.
//!
//! Every component reports what it did through an [`Observer`], which writes
//! a `log` record and then forwards the event to an optional caller hook.
//! Events never influence control flow.

use super::types::{ChannelKind, ProgramAssociation, ProgramMapping};
use crate::av::CodecTag;
use crate::error::DemuxError;
use log::{debug, trace, warn};

/// Something observable that happened while demultiplexing.
#[derive(Debug)]
pub enum DemuxEvent<'a> {
    /// A packet header was decoded
    Packet {
        index: u64,
        pid: u16,
        continuity_counter: u8,
        payload_unit_start: bool,
        has_payload: bool,
        has_adaptation: bool,
    },
    /// First sighting of a PID, or a PID was (re)classified
    ChannelCreated { pid: u16, kind: ChannelKind },
    /// Continuity counter skipped values; the gap is logged, not enforced
    ContinuityGap { pid: u16, expected: u8, found: u8 },
    /// A complete PSI section was reassembled
    SectionComplete { pid: u16, table_id: u8, length: usize },
    ProgramAssociation(ProgramAssociation),
    ProgramMapping {
        pmt_pid: u16,
        pcr_pid: u16,
        mapping: ProgramMapping,
    },
    /// A PES sub-header opened a new payload unit
    PesHeader {
        pid: u16,
        stream_id: u8,
        declared_size: usize,
        header_data_length: usize,
        flags: u8,
        pts: Option<u64>,
    },
    UnitEmitted { pid: u16, codec: CodecTag, len: usize },
    /// A packet, section, or in-flight unit was discarded
    Dropped { pid: Option<u16>, error: &'a DemuxError },
}

/// Callback receiving demux events.
pub type EventHook = Box<dyn FnMut(&DemuxEvent<'_>) + Send>;

/// Logs events and forwards them to the caller's hook, if any.
#[derive(Default)]
pub struct Observer {
    hook: Option<EventHook>,
}

impl Observer {
    pub fn new() -> Self {
        Self { hook: None }
    }

    pub fn with_hook(hook: EventHook) -> Self {
        Self { hook: Some(hook) }
    }

    pub fn set_hook(&mut self, hook: EventHook) {
        self.hook = Some(hook);
    }

    pub fn emit(&mut self, event: DemuxEvent<'_>) {
        match &event {
            DemuxEvent::Packet {
                index,
                pid,
                continuity_counter,
                payload_unit_start,
                has_payload,
                has_adaptation,
            } => trace!(
                "#{} pid 0x{:x} counter {} start={} payload={} adaptation={}",
                index,
                pid,
                continuity_counter,
                payload_unit_start,
                has_payload,
                has_adaptation
            ),
            DemuxEvent::ChannelCreated { pid, kind } => {
                debug!("channel 0x{:x} tracked as {:?}", pid, kind)
            }
            DemuxEvent::ContinuityGap { pid, expected, found } => debug!(
                "continuity gap on pid 0x{:x}: expected {} found {}",
                pid, expected, found
            ),
            DemuxEvent::SectionComplete {
                pid,
                table_id,
                length,
            } => debug!(
                "section on pid 0x{:x}: table 0x{:x}, {} bytes",
                pid, table_id, length
            ),
            DemuxEvent::ProgramAssociation(entry) => debug!(
                "pat: program 0x{:x} pid 0x{:x}",
                entry.program_number, entry.pid
            ),
            DemuxEvent::ProgramMapping {
                pmt_pid,
                pcr_pid,
                mapping,
            } => debug!(
                "pmt 0x{:x} (pcr 0x{:x}): stream type 0x{:x} pid 0x{:x} -> {}",
                pmt_pid, pcr_pid, mapping.stream_type, mapping.elementary_pid, mapping.codec
            ),
            DemuxEvent::PesHeader {
                pid,
                stream_id,
                declared_size,
                header_data_length,
                flags,
                pts,
            } => trace!(
                "pes on pid 0x{:x}: stream 0x{:x} size {} header {} flags 0x{:x} pts {:?}",
                pid,
                stream_id,
                declared_size,
                header_data_length,
                flags,
                pts
            ),
            DemuxEvent::UnitEmitted { pid, codec, len } => {
                debug!("{} unit from pid 0x{:x}: {} bytes", codec, pid, len)
            }
            DemuxEvent::Dropped { pid, error } => match pid {
                Some(pid) => warn!("dropped data on pid 0x{:x}: {}", pid, error),
                None => warn!("dropped packet: {}", error),
            },
        }

        if let Some(hook) = self.hook.as_mut() {
            hook(&event);
        }
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_hook_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut observer = Observer::with_hook(Box::new(move |event: &DemuxEvent<'_>| {
            if let DemuxEvent::ContinuityGap { pid, .. } = event {
                sink.lock().unwrap().push(*pid);
            }
        }));

        observer.emit(DemuxEvent::ContinuityGap {
            pid: 0x44,
            expected: 3,
            found: 5,
        });
        observer.emit(DemuxEvent::UnitEmitted {
            pid: 0x44,
            codec: CodecTag::H264,
            len: 10,
        });

        assert_eq!(*seen.lock().unwrap(), vec![0x44]);
    }

    #[test]
    fn test_without_hook() {
        let mut observer = Observer::new();
        let error = DemuxError::InvalidSync(0);
        observer.emit(DemuxEvent::Dropped {
            pid: None,
            error: &error,
        });
    }
}
