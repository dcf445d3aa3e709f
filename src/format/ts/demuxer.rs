use super::events::{DemuxEvent, EventHook, Observer};
use super::parser::parse_packet;
use super::pes::PayloadReassembler;
use super::registry::ChannelRegistry;
use super::section::{apply_section, ProgramMapTable, PsiTable, SectionReassembler};
use super::types::*;
use crate::av::OutputUnit;
use crate::config::DemuxConfig;
use crate::error::{DemuxError, Result};
use crate::utils::read_pid;
use futures::stream::{self, Stream};
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{timeout_at, Instant};

/// Packets read per step when the demuxer is driven as a stream
const STREAM_BATCH: u64 = 64;

/// Synchronous demultiplexing core.
///
/// Owns every channel's reassembly state and turns transport packets, one at
/// a time and in stream order, into output units.
#[derive(Debug)]
pub struct TSDemuxCore {
    registry: ChannelRegistry,
    sections: SectionReassembler,
    payloads: PayloadReassembler,
    observer: Observer,
    programs: Vec<ProgramAssociation>,
    program_maps: BTreeMap<u16, ProgramMapTable>,
    packets: u64,
    dropped: u64,
}

impl Default for TSDemuxCore {
    fn default() -> Self {
        Self::new(&DemuxConfig::default())
    }
}

impl TSDemuxCore {
    pub fn new(config: &DemuxConfig) -> Self {
        Self {
            registry: ChannelRegistry::new(),
            sections: SectionReassembler::new(config),
            payloads: PayloadReassembler::new(config),
            observer: Observer::new(),
            programs: Vec::new(),
            program_maps: BTreeMap::new(),
            packets: 0,
            dropped: 0,
        }
    }

    pub fn set_event_hook(&mut self, hook: EventHook) {
        self.observer.set_hook(hook);
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Programs listed by the most recent PAT.
    pub fn programs(&self) -> &[ProgramAssociation] {
        &self.programs
    }

    /// Most recent PMT for each PMT PID.
    pub fn program_map(&self, pmt_pid: u16) -> Option<&ProgramMapTable> {
        self.program_maps.get(&pmt_pid)
    }

    /// Packets handed to `process_packet`, including dropped ones.
    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Packets or units discarded due to non-fatal errors.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Processes one 188-byte packet, appending completed units to `out`.
    ///
    /// Errors are non-fatal and already reported through the event hook; the
    /// caller can ignore them and continue with the next packet.
    pub fn process_packet(&mut self, block: &[u8], out: &mut Vec<OutputUnit>) -> Result<()> {
        let index = self.packets;
        self.packets += 1;

        let result = self.route(index, block, out);
        if let Err(error) = &result {
            self.drop_packet(block, error);
        }
        result
    }

    /// Emits every in-flight payload unit, in PID order. Used at end of stream.
    pub fn flush_all(&mut self, out: &mut Vec<OutputUnit>) {
        let mut states: Vec<_> = self
            .registry
            .iter_mut()
            .filter(|state| matches!(state.kind(), ChannelKind::Payload(_)))
            .collect();
        states.sort_by_key(|state| state.pid());
        for state in states {
            self.payloads.flush(state, &mut self.observer, out);
        }
    }

    /// Accounts for how the source ended. A short final read counts as a
    /// dropped packet, and in-flight units are flushed at end of stream when
    /// `flush` is set.
    pub(crate) fn finish_run(&mut self, stop: &StopReason, flush: bool, out: &mut Vec<OutputUnit>) {
        let at_end = match stop {
            StopReason::Exhausted => true,
            StopReason::Failed(error @ DemuxError::TruncatedPacket(_)) => {
                self.dropped += 1;
                self.observer.emit(DemuxEvent::Dropped { pid: None, error });
                true
            }
            _ => false,
        };
        if at_end && flush {
            self.flush_all(out);
        }
    }

    fn route(&mut self, index: u64, block: &[u8], out: &mut Vec<OutputUnit>) -> Result<()> {
        let packet = parse_packet(block)?;
        let header = &packet.header;
        let pid = header.pid;

        self.observer.emit(DemuxEvent::Packet {
            index,
            pid,
            continuity_counter: header.continuity_counter,
            payload_unit_start: header.payload_unit_start,
            has_payload: header.contains_payload,
            has_adaptation: header.adaptation_field_exists,
        });

        if !self.registry.contains(pid) {
            let kind = self.registry.lookup_or_create(pid).kind();
            self.observer.emit(DemuxEvent::ChannelCreated { pid, kind });
        }
        let state = self.registry.lookup_or_create(pid);

        let discontinuity = packet.adaptation.as_ref().is_some_and(|a| a.discontinuity);
        if let Some(expected) =
            state.track_continuity(header.continuity_counter, header.contains_payload, discontinuity)
        {
            self.observer.emit(DemuxEvent::ContinuityGap {
                pid,
                expected,
                found: header.continuity_counter,
            });
        }

        if header.transport_error {
            log::debug!("skipping packet {} on pid 0x{:x} with transport error", index, pid);
            return Ok(());
        }
        if !header.contains_payload {
            return Ok(());
        }

        match state.kind() {
            ChannelKind::Section(table) => {
                let mut sections = Vec::new();
                let result =
                    self.sections
                        .push(state, packet.payload, header.payload_unit_start, &mut sections);
                for section in sections {
                    match apply_section(&mut self.registry, &mut self.observer, pid, table, &section) {
                        Some(PsiTable::Pat(entries)) => self.programs = entries,
                        Some(PsiTable::Pmt(pmt)) => {
                            self.program_maps.insert(pid, pmt);
                        }
                        None => {}
                    }
                }
                result
            }
            ChannelKind::Payload(_) => self.payloads.push(
                state,
                packet.payload,
                header.payload_unit_start,
                &mut self.observer,
                out,
            ),
            ChannelKind::Unclassified => Ok(()),
        }
    }

    fn drop_packet(&mut self, block: &[u8], error: &DemuxError) {
        self.dropped += 1;
        let pid = (block.len() >= 3 && block[0] == SYNC_BYTE).then(|| read_pid(&block[1..]));
        if let (Some(pid), DemuxError::AdaptationOverrun { .. }) = (pid, error) {
            // the unit in flight has lost bytes
            if let Some(state) = self.registry.get_mut(pid) {
                state.reset();
            }
        }
        self.observer.emit(DemuxEvent::Dropped { pid, error });
    }
}

/// Limit on how much of the source a single `run` consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunBound {
    /// Stop after this many packets
    Packets(u64),
    /// Stop once this much wall-clock time has passed
    Duration(Duration),
    Unbounded,
}

impl RunBound {
    /// Resolves the bound against the current time.
    pub(crate) fn limits(self) -> RunLimits {
        match self {
            RunBound::Packets(count) => RunLimits {
                packets: Some(count),
                deadline: None,
            },
            RunBound::Duration(duration) => RunLimits {
                packets: None,
                deadline: Some(Instant::now() + duration),
            },
            RunBound::Unbounded => RunLimits::default(),
        }
    }
}

/// A resolved [`RunBound`]: a packet budget and a wall-clock deadline.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RunLimits {
    pub(crate) packets: Option<u64>,
    pub(crate) deadline: Option<Instant>,
}

impl RunLimits {
    /// Whether a run has consumed these limits after `count` packets.
    pub(crate) fn reached(&self, count: u64) -> bool {
        self.packets.is_some_and(|limit| count >= limit) || self.deadline_passed()
    }

    pub(crate) fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Why a run stopped.
#[derive(Debug)]
pub enum StopReason {
    /// The source reached end of stream on a packet boundary
    Exhausted,
    BoundReached,
    Cancelled,
    /// A fatal error, or a short final read from the source
    Failed(DemuxError),
}

/// Units produced by a run, in stream order, and how the run ended.
#[derive(Debug)]
pub struct RunReport {
    pub units: Vec<OutputUnit>,
    /// Packets read during this run
    pub packets: u64,
    /// Packets dropped during this run
    pub dropped: u64,
    pub stop: StopReason,
}

impl RunReport {
    pub fn error(&self) -> Option<&DemuxError> {
        match &self.stop {
            StopReason::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// MPEG Transport Stream demuxer session.
///
/// Pulls 188-byte packets from an async byte source and feeds them to a
/// [`TSDemuxCore`]. A block interrupted by a bound or cancellation is kept
/// and completed by the next run, so packet alignment survives across runs.
pub struct TSDemuxer<R: AsyncRead + Unpin + Send> {
    reader: Option<R>,
    core: TSDemuxCore,
    config: DemuxConfig,
    block: Box<[u8; TS_PACKET_SIZE]>,
    filled: usize,
}

impl TSDemuxer<File> {
    /// Opens a transport stream file with the default configuration.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, DemuxConfig::default()).await
    }

    pub async fn open_with_config<P: AsRef<Path>>(path: P, config: DemuxConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|e| DemuxError::SourceUnavailable(format!("{}: {}", path.display(), e)))?;
        Ok(Self::with_config(file, config))
    }
}

impl<R: AsyncRead + Unpin + Send> TSDemuxer<R> {
    /// Creates a new TS demuxer over any async byte source.
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, DemuxConfig::default())
    }

    pub fn with_config(reader: R, config: DemuxConfig) -> Self {
        Self {
            reader: Some(reader),
            core: TSDemuxCore::new(&config),
            config,
            block: Box::new([0u8; TS_PACKET_SIZE]),
            filled: 0,
        }
    }

    pub fn set_event_hook(&mut self, hook: EventHook) {
        self.core.set_event_hook(hook);
    }

    pub fn core(&self) -> &TSDemuxCore {
        &self.core
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// Releases the source. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            log::debug!("closed source after {} packets", self.core.packets());
        }
    }

    /// Demultiplexes until the source is exhausted, the bound is reached, or a
    /// fatal error occurs.
    pub async fn run(&mut self, bound: RunBound) -> RunReport {
        self.run_until(bound, std::future::pending()).await
    }

    /// Like [`run`](Self::run), also stopping when `cancel` completes.
    ///
    /// Units completed before cancellation are returned.
    pub async fn run_until<F: Future<Output = ()>>(&mut self, bound: RunBound, cancel: F) -> RunReport {
        self.run_limited(bound.limits(), cancel).await
    }

    /// Emits every in-flight partial unit, for callers done with the source.
    pub fn finish(&mut self) -> Vec<OutputUnit> {
        let mut units = Vec::new();
        self.core.flush_all(&mut units);
        units
    }

    async fn run_limited<F: Future<Output = ()>>(&mut self, limits: RunLimits, cancel: F) -> RunReport {
        let packets_before = self.core.packets();
        let dropped_before = self.core.dropped();
        let mut units = Vec::new();
        tokio::pin!(cancel);

        let stop = match self.reader.as_mut() {
            None => StopReason::Failed(DemuxError::SourceUnavailable("source is closed".into())),
            Some(reader) => loop {
                if limits.reached(self.core.packets() - packets_before) {
                    break StopReason::BoundReached;
                }

                let read = read_next(
                    reader,
                    &mut self.block[..],
                    &mut self.filled,
                    limits.deadline,
                    self.config.read_timeout,
                );
                let step = tokio::select! {
                    biased;
                    _ = &mut cancel => break StopReason::Cancelled,
                    step = read => step,
                };

                match step {
                    BlockRead::Full => {
                        // non-fatal errors are reported by the core
                        let _ = self.core.process_packet(&self.block[..], &mut units);
                    }
                    BlockRead::Stop(stop) => break stop,
                }
            },
        };

        self.core.finish_run(&stop, self.config.flush_on_eof, &mut units);

        RunReport {
            units,
            packets: self.core.packets() - packets_before,
            dropped: self.core.dropped() - dropped_before,
            stop,
        }
    }

    /// Drives the session as a stream of units, in stream order, until the
    /// source ends or `bound` is consumed.
    ///
    /// A fatal error, or a short final read, is yielded after the units
    /// completed before it and ends the stream.
    pub fn units(self, bound: RunBound) -> impl Stream<Item = Result<OutputUnit>> {
        let limits = bound.limits();
        let start = self.core.packets();
        stream::unfold(
            (self, VecDeque::new(), false),
            move |(mut demuxer, mut pending, mut done)| async move {
                loop {
                    if let Some(item) = pending.pop_front() {
                        return Some((item, (demuxer, pending, done)));
                    }
                    if done {
                        return None;
                    }

                    let consumed = demuxer.core.packets() - start;
                    let batch = match limits.packets {
                        Some(limit) => limit.saturating_sub(consumed).min(STREAM_BATCH),
                        None => STREAM_BATCH,
                    };
                    let step = RunLimits {
                        packets: Some(batch),
                        deadline: limits.deadline,
                    };
                    let report = demuxer.run_limited(step, std::future::pending()).await;
                    pending.extend(report.units.into_iter().map(Ok));
                    match report.stop {
                        StopReason::BoundReached => done = limits.reached(demuxer.core.packets() - start),
                        StopReason::Failed(error) => {
                            pending.push_back(Err(error));
                            done = true;
                        }
                        StopReason::Exhausted | StopReason::Cancelled => done = true,
                    }
                }
            },
        )
    }
}

/// Result of one bounded block read.
pub(crate) enum BlockRead {
    /// `block` holds a complete packet
    Full,
    Stop(StopReason),
}

/// Reads the next packet into `block`, honoring the run deadline and the
/// per-read timeout.
pub(crate) async fn read_next<R: AsyncRead + Unpin>(
    reader: &mut R,
    block: &mut [u8],
    filled: &mut usize,
    deadline: Option<Instant>,
    read_timeout: Option<Duration>,
) -> BlockRead {
    let read_deadline = match (deadline, read_timeout) {
        (Some(d), Some(t)) => Some(d.min(Instant::now() + t)),
        (d, t) => d.or_else(|| t.map(|t| Instant::now() + t)),
    };
    let read = fill_block(reader, block, filled);
    let outcome = match read_deadline {
        Some(at) => timeout_at(at, read).await.ok(),
        None => Some(read.await),
    };

    match outcome {
        None if deadline.is_some_and(|d| Instant::now() >= d) => {
            BlockRead::Stop(StopReason::BoundReached)
        }
        None => BlockRead::Stop(StopReason::Failed(DemuxError::Timeout(
            read_timeout.unwrap_or_default(),
        ))),
        Some(Ok(true)) => {
            *filled = 0;
            BlockRead::Full
        }
        Some(Ok(false)) => BlockRead::Stop(StopReason::Exhausted),
        Some(Err(error)) => BlockRead::Stop(StopReason::Failed(error)),
    }
}

/// Reads into `block` until it is full or the source ends.
///
/// Progress is kept in `filled`, so a read dropped part way through resumes
/// where it left off. Returns `Ok(false)` at end of stream on a packet
/// boundary and `TruncatedPacket` when the stream ends inside a packet.
async fn fill_block<R: AsyncRead + Unpin>(
    reader: &mut R,
    block: &mut [u8],
    filled: &mut usize,
) -> Result<bool> {
    while *filled < block.len() {
        match reader.read(&mut block[*filled..]).await {
            Ok(0) => break,
            Ok(n) => *filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    match *filled {
        0 => Ok(false),
        n if n == block.len() => Ok(true),
        n => {
            *filled = 0;
            Err(DemuxError::TruncatedPacket(n))
        }
    }
}
