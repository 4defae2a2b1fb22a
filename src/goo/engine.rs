//! Per-datagram impairment decisions and mutations.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{find_sync, GooClock, GooControl, GooType, WindowChange, FACTOR_SCALE, MAX_JITTER_MS};
use crate::config::GooConfig;

/// Outcome of running one datagram through the engine.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Verdict {
    /// Datagram to forward now, if any.
    pub forward: Option<Vec<u8>>,
    /// Previously held datagram to send right after `forward`.
    pub deferred: Option<Vec<u8>>,
    /// Delay to wait before forwarding.
    pub delay: Option<Duration>,
    /// Mutation applied to this datagram.
    pub event: Option<GooEvent>,
    /// Pause that began when this datagram arrived.
    pub window: Option<WindowChange>,
}

impl Verdict {
    /// Whether nothing is sent for this datagram right now.
    pub fn is_withheld(&self) -> bool {
        self.forward.is_none()
    }

    /// Datagrams to send, in wire order.
    pub fn into_datagrams(self) -> impl Iterator<Item = Vec<u8>> {
        self.forward.into_iter().chain(self.deferred)
    }
}

/// A mutation that was applied, formatted as an operator trace line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GooEvent {
    BitError { pos: usize, old: u8, added: u8, new: u8 },
    ByteIncrement { pos: usize, old: u8, new: u8 },
    ZeroPacket { len: usize },
    RandomFill { value: u8, len: usize },
    Drop,
    Reorder { replaced: bool },
    Jitter { delay: Duration },
    TransportError { flagged: Option<usize> },
}

impl GooEvent {
    /// Variant that produced this event.
    pub fn goo_type(&self) -> GooType {
        match self {
            GooEvent::BitError { .. } => GooType::BitError,
            GooEvent::ByteIncrement { .. } => GooType::ByteIncrement,
            GooEvent::ZeroPacket { .. } => GooType::ZeroPacket,
            GooEvent::RandomFill { .. } => GooType::RandomFill,
            GooEvent::Drop => GooType::Drop,
            GooEvent::Reorder { .. } => GooType::Reorder,
            GooEvent::Jitter { .. } => GooType::Jitter,
            GooEvent::TransportError { .. } => GooType::TransportError,
        }
    }
}

impl fmt::Display for GooEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GooEvent::BitError { pos, old, added, new } => write!(
                f,
                "Adding a little goo (single bit error) - Pos: {pos}, Old: {old} + {added}, New: {new}"
            ),
            GooEvent::ByteIncrement { pos, old, new } => write!(
                f,
                "Adding a little goo (single byte increment) - Pos: {pos}, Old: {old}, New: {new}"
            ),
            GooEvent::ZeroPacket { len } => {
                write!(f, "Adding a little goo to your stream (zero whole packet, {len} bytes)")
            }
            GooEvent::RandomFill { value, len } => write!(
                f,
                "Adding a little goo to your stream (write {value} to whole packet, {len} bytes)"
            ),
            GooEvent::Drop => write!(f, "Adding a little goo to your stream (discarding packet)"),
            GooEvent::Reorder { replaced } => {
                write!(f, "Adding a little goo to your stream (out of order packet)")?;
                if *replaced {
                    write!(f, " - previous held packet discarded")?;
                }
                Ok(())
            }
            GooEvent::Jitter { delay } => write!(
                f,
                "Adding a little goo to your stream (add jitter - sleep approx. {} ms)",
                delay.as_millis()
            ),
            GooEvent::TransportError { flagged: Some(pos) } => write!(
                f,
                "Adding a little goo to your stream (add Transport Error Indicator) - Pos: {pos}"
            ),
            GooEvent::TransportError { flagged: None } => write!(
                f,
                "Adding a little goo to your stream (add Transport Error Indicator) - no sync found, packet untouched"
            ),
        }
    }
}

/// Impairment engine: owns the window clock and the out-of-order slot.
pub struct GooEngine<R = StdRng> {
    control: Arc<GooControl>,
    clock: GooClock,
    out_of_order: Option<Vec<u8>>,
    rng: R,
}

impl GooEngine<StdRng> {
    /// Create an engine whose warmup starts now.
    pub fn new(control: Arc<GooControl>, config: &GooConfig) -> Self {
        Self::with_rng(control, config, Instant::now(), StdRng::from_entropy())
    }
}

impl<R: Rng> GooEngine<R> {
    /// Create an engine with an explicit start time and random source.
    pub fn with_rng(control: Arc<GooControl>, config: &GooConfig, now: Instant, mut rng: R) -> Self {
        let clock = GooClock::new(
            now,
            config.warmup,
            config.duration,
            config.pause,
            config.goo_type,
            &mut rng,
        );
        Self {
            control,
            clock,
            out_of_order: None,
            rng,
        }
    }

    /// Window clock state.
    pub fn clock(&self) -> &GooClock {
        &self.clock
    }

    /// Whether a reordered datagram is waiting for release.
    pub fn has_pending(&self) -> bool {
        self.out_of_order.is_some()
    }

    /// Run one datagram through the impairment pipeline.
    pub fn process(&mut self, datagram: Vec<u8>, now: Instant) -> Verdict {
        let factor = self.control.factor();
        // A disabled factor freezes the clock as well
        if factor == 0 {
            return self.pass(datagram, None, None);
        }

        let tick = self.clock.tick(now, &mut self.rng);
        let mut verdict = if !tick.eligible
            || datagram.is_empty()
            || self.rng.gen_range(0..FACTOR_SCALE) >= factor
        {
            self.pass(datagram, None, None)
        } else {
            self.apply(datagram)
        };
        verdict.window = tick.window;
        verdict
    }

    fn apply(&mut self, mut data: Vec<u8>) -> Verdict {
        let pos = self.rng.gen_range(0..data.len());

        match self.clock.current() {
            GooType::BitError => {
                let bit = self.rng.gen_range(0..8u8);
                let event = add_bit(&mut data, pos, bit);
                self.pass(data, None, Some(event))
            }
            GooType::ByteIncrement => {
                let event = increment_byte(&mut data, pos);
                self.pass(data, None, Some(event))
            }
            GooType::ZeroPacket => {
                let event = zero_packet(&mut data);
                self.pass(data, None, Some(event))
            }
            GooType::RandomFill => {
                let value: u8 = self.rng.gen();
                let event = random_fill(&mut data, value);
                self.pass(data, None, Some(event))
            }
            GooType::Drop => Verdict {
                event: Some(GooEvent::Drop),
                ..Verdict::default()
            },
            GooType::Reorder => {
                let replaced = self.out_of_order.replace(data).is_some();
                Verdict {
                    event: Some(GooEvent::Reorder { replaced }),
                    ..Verdict::default()
                }
            }
            GooType::Jitter => {
                let delay = Duration::from_millis(self.rng.gen_range(0..=MAX_JITTER_MS));
                self.pass(data, Some(delay), Some(GooEvent::Jitter { delay }))
            }
            GooType::TransportError => {
                let event = set_transport_error(&mut data);
                self.pass(data, None, Some(event))
            }
        }
    }

    /// Forward `data`, releasing any held datagram behind it.
    fn pass(&mut self, data: Vec<u8>, delay: Option<Duration>, event: Option<GooEvent>) -> Verdict {
        Verdict {
            forward: Some(data),
            deferred: self.out_of_order.take(),
            delay,
            event,
            window: None,
        }
    }
}

fn add_bit(data: &mut [u8], pos: usize, bit: u8) -> GooEvent {
    // Additive: an overflow carries into neighbouring bits
    let old = data[pos];
    let added = 1u8 << bit;
    data[pos] = old.wrapping_add(added);
    GooEvent::BitError {
        pos,
        old,
        added,
        new: data[pos],
    }
}

fn increment_byte(data: &mut [u8], pos: usize) -> GooEvent {
    let old = data[pos];
    data[pos] = old.wrapping_add(1);
    GooEvent::ByteIncrement {
        pos,
        old,
        new: data[pos],
    }
}

fn zero_packet(data: &mut [u8]) -> GooEvent {
    data.fill(0);
    GooEvent::ZeroPacket { len: data.len() }
}

fn random_fill(data: &mut [u8], value: u8) -> GooEvent {
    data.fill(value);
    GooEvent::RandomFill {
        value,
        len: data.len(),
    }
}

fn set_transport_error(data: &mut [u8]) -> GooEvent {
    let flagged = find_sync(data, 0)
        .map(|sync| sync + 1)
        .filter(|&pos| pos < data.len());
    if let Some(pos) = flagged {
        data[pos] = data[pos].wrapping_add(0x80);
    }
    GooEvent::TransportError { flagged }
}
