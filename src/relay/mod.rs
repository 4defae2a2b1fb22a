//! Receive → impair → forward loop.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::goo::{GooEngine, GooEvent, GooType};
use crate::record::Recorder;
use crate::transport::{DatagramSink, PacketSource};

/// Running counters of the relay.
#[derive(Debug, Default)]
pub struct RelayStats {
    pub packets_received: AtomicU64,
    pub packets_forwarded: AtomicU64,
    pub packets_dropped: AtomicU64,
    pub packets_reordered: AtomicU64,
    pub packets_mutated: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_forwarded: AtomicU64,
}

impl RelayStats {
    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> RelaySummary {
        RelaySummary {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_forwarded: self.packets_forwarded.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            packets_reordered: self.packets_reordered.load(Ordering::Relaxed),
            packets_mutated: self.packets_mutated.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_forwarded: self.bytes_forwarded.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    pub packets_received: u64,
    pub packets_forwarded: u64,
    pub packets_dropped: u64,
    pub packets_reordered: u64,
    pub packets_mutated: u64,
    pub bytes_received: u64,
    pub bytes_forwarded: u64,
}

impl fmt::Display for RelaySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received {} ({} bytes), forwarded {} ({} bytes), goo'd {}, dropped {}, reordered {}",
            self.packets_received,
            self.bytes_received,
            self.packets_forwarded,
            self.bytes_forwarded,
            self.packets_mutated,
            self.packets_dropped,
            self.packets_reordered
        )
    }
}

/// The relay: owns the source, the engine and the sink.
pub struct Relay {
    source: PacketSource,
    sink: Box<dyn DatagramSink>,
    engine: GooEngine,
    recorder: Option<Arc<Recorder>>,
    stats: Arc<RelayStats>,
    started: bool,
}

impl Relay {
    pub fn new(
        source: PacketSource,
        sink: Box<dyn DatagramSink>,
        engine: GooEngine,
        recorder: Option<Arc<Recorder>>,
    ) -> Self {
        Self {
            source,
            sink,
            engine,
            recorder,
            stats: Arc::new(RelayStats::default()),
            started: false,
        }
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    /// Impairment engine state.
    pub fn engine(&self) -> &GooEngine {
        &self.engine
    }

    /// Relay datagrams until `shutdown` fires.
    ///
    /// Any receive, send or recording failure ends the loop with that error.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<RelaySummary> {
        info!("Forwarding to {}", self.sink.describe());

        loop {
            tokio::select! {
                result = self.source.recv() => {
                    let datagram = result?;
                    if datagram.is_empty() {
                        continue;
                    }
                    self.handle_datagram(datagram).await?;
                }
                _ = shutdown.recv() => {
                    debug!("Relay shutting down");
                    break;
                }
            }
        }

        if let Some(ref recorder) = self.recorder {
            recorder.flush()?;
        }

        let summary = self.stats.snapshot();
        info!("Relay stopped: {}", summary);
        Ok(summary)
    }

    /// Run one datagram through the engine and forward the result.
    pub async fn handle_datagram(&mut self, datagram: Vec<u8>) -> Result<()> {
        if !self.started {
            info!("Started receiving packets...");
            self.started = true;
        }
        self.stats.packets_received.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_received
            .fetch_add(datagram.len() as u64, Ordering::Relaxed);

        let verdict = self.engine.process(datagram, Instant::now());

        if let Some(change) = verdict.window {
            self.trace(&change.to_string());
        }
        if let Some(ref event) = verdict.event {
            self.report(event);
        }

        if let Some(delay) = verdict.delay {
            tokio::time::sleep(delay).await;
        }

        for (i, datagram) in verdict.into_datagrams().enumerate() {
            if i > 0 {
                debug!("Releasing out of order packet ({} bytes)", datagram.len());
            }
            self.forward(&datagram).await?;
        }
        Ok(())
    }

    async fn forward(&self, datagram: &[u8]) -> Result<()> {
        self.sink.send(datagram).await?;
        self.stats.packets_forwarded.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_forwarded
            .fetch_add(datagram.len() as u64, Ordering::Relaxed);

        if let Some(ref recorder) = self.recorder {
            recorder.write_datagram(datagram)?;
        }
        Ok(())
    }

    fn report(&self, event: &GooEvent) {
        match event.goo_type() {
            GooType::Drop => &self.stats.packets_dropped,
            GooType::Reorder => &self.stats.packets_reordered,
            _ => &self.stats.packets_mutated,
        }
        .fetch_add(1, Ordering::Relaxed);

        self.trace(&event.to_string());
    }

    /// Operator line, mirrored into the recording log.
    fn trace(&self, line: &str) {
        info!("{}", line);
        if let Some(ref recorder) = self.recorder {
            if let Err(e) = recorder.log(line) {
                warn!("{}", e);
            }
        }
    }
}
