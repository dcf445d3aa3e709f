//! Pipelined demuxing.
//!
//! Overlaps source I/O, packet parsing, and sink writes across three tokio
//! tasks joined by bounded queues:
//!
//! ```text
//! reader --[Bytes; queue_depth]--> parser --[OutputUnit; queue_depth]--> sink
//! ```
//!
//! Only the parser task touches the demux core, so channel state is never
//! shared. A full queue suspends the stage feeding it; nothing is dropped.

use super::demuxer::{read_next, BlockRead, RunBound, StopReason, TSDemuxCore};
use super::events::EventHook;
use super::types::TS_PACKET_SIZE;
use crate::config::DemuxConfig;
use crate::error::DemuxError;
use crate::format::sink::UnitSink;
use bytes::Bytes;
use std::future::Future;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinError;

/// Totals from a pipelined run.
#[derive(Debug)]
pub struct PipelineReport {
    pub packets: u64,
    /// Units accepted by the sink
    pub units: u64,
    pub dropped: u64,
    pub stop: StopReason,
}

enum Feed {
    Packet(Bytes),
    End(StopReason),
}

/// Demultiplexes `reader` into `sink` until the source ends, the bound is
/// reached, or a fatal error occurs. Returns the sink along with the report.
pub async fn run_pipeline<R, S>(
    reader: R,
    sink: S,
    config: DemuxConfig,
    bound: RunBound,
    hook: Option<EventHook>,
) -> (PipelineReport, S)
where
    R: AsyncRead + Unpin + Send + 'static,
    S: UnitSink + 'static,
{
    run_pipeline_until(reader, sink, config, bound, hook, std::future::pending()).await
}

/// Like [`run_pipeline`], also stopping the reader when `cancel` completes.
/// Packets already queued are still parsed and their units written.
pub async fn run_pipeline_until<R, S, F>(
    reader: R,
    mut sink: S,
    config: DemuxConfig,
    bound: RunBound,
    hook: Option<EventHook>,
    cancel: F,
) -> (PipelineReport, S)
where
    R: AsyncRead + Unpin + Send + 'static,
    S: UnitSink + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let depth = config.queue_depth.max(1);
    let (block_tx, mut block_rx) = mpsc::channel::<Feed>(depth);
    let (unit_tx, mut unit_rx) = mpsc::channel(depth);

    let read_timeout = config.read_timeout;
    let reader_task = tokio::spawn(read_blocks(reader, bound, read_timeout, cancel, block_tx));

    let parser_task = tokio::spawn(async move {
        let mut core = TSDemuxCore::new(&config);
        if let Some(hook) = hook {
            core.set_event_hook(hook);
        }
        let mut units = Vec::new();
        let stop = loop {
            let feed = tokio::select! {
                biased;
                // the sink only hangs up early when it fails
                _ = unit_tx.closed() => break StopReason::Failed(DemuxError::SinkClosed),
                feed = block_rx.recv() => feed,
            };
            let Some(feed) = feed else {
                // reader task ended without reporting
                break StopReason::Cancelled;
            };
            let mut stop = match feed {
                Feed::Packet(block) => {
                    let _ = core.process_packet(&block, &mut units);
                    None
                }
                Feed::End(stop) => {
                    core.finish_run(&stop, config.flush_on_eof, &mut units);
                    Some(stop)
                }
            };
            for unit in units.drain(..) {
                if unit_tx.send(unit).await.is_err() {
                    stop = Some(StopReason::Failed(DemuxError::SinkClosed));
                    break;
                }
            }
            if let Some(stop) = stop {
                break stop;
            }
        };
        (stop, core.packets(), core.dropped())
    });

    let sink_task = tokio::spawn(async move {
        let mut written = 0u64;
        let mut result = Ok(());
        while let Some(unit) = unit_rx.recv().await {
            if let Err(e) = sink.write_unit(&unit).await {
                result = Err(e);
                break;
            }
            written += 1;
        }
        // unblock the parser before finishing
        drop(unit_rx);
        if result.is_ok() {
            result = sink.finish().await;
        }
        (sink, written, result)
    });

    join(reader_task.await);
    let (stop, packets, dropped) = join(parser_task.await);
    let (sink, units, written) = join(sink_task.await);

    let stop = match written {
        Err(error) => {
            log::warn!("sink failed: {}", error);
            StopReason::Failed(error)
        }
        Ok(()) => stop,
    };
    log::debug!(
        "pipeline finished: {} packets, {} units, {} dropped",
        packets,
        units,
        dropped
    );

    (
        PipelineReport {
            packets,
            units,
            dropped,
            stop,
        },
        sink,
    )
}

async fn read_blocks<R, F>(
    mut reader: R,
    bound: RunBound,
    read_timeout: Option<std::time::Duration>,
    cancel: F,
    tx: mpsc::Sender<Feed>,
) where
    R: AsyncRead + Unpin,
    F: Future<Output = ()>,
{
    let limits = bound.limits();
    let mut block = [0u8; TS_PACKET_SIZE];
    let mut filled = 0;
    let mut count = 0u64;
    tokio::pin!(cancel);

    let stop = loop {
        if limits.reached(count) {
            break StopReason::BoundReached;
        }
        let read = read_next(&mut reader, &mut block, &mut filled, limits.deadline, read_timeout);
        let step = tokio::select! {
            biased;
            _ = &mut cancel => break StopReason::Cancelled,
            // parser is gone, so nothing will consume the block
            _ = tx.closed() => return,
            step = read => step,
        };
        match step {
            BlockRead::Full => {
                count += 1;
                if tx.send(Feed::Packet(Bytes::copy_from_slice(&block))).await.is_err() {
                    // parser is gone
                    return;
                }
            }
            BlockRead::Stop(stop) => break stop,
        }
    };
    let _ = tx.send(Feed::End(stop)).await;
}

fn join<T>(result: Result<T, JoinError>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
}
