//! Impairment ("goo") engine.
//!
//! Everything that decides whether a datagram gets corrupted and how:
//! - [`GooType`]: the closed set of impairment variants
//! - [`GooControl`]: the factor shared with the console control surface
//! - [`GooClock`]: active/paused window state machine
//! - [`GooEngine`]: per-datagram decision, mutation and reordering
//! - [`find_sync`]: MPEG-TS sync alignment scan

pub mod clock;
pub mod engine;
pub mod sync;

pub use clock::{GooClock, Tick, WindowChange};
pub use engine::{GooEngine, GooEvent, Verdict};
pub use sync::{find_sync, SYNC_BYTE, TS_PACKET_SIZE};

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Denominator of the goo factor: a factor of `FACTOR_SCALE` corrupts every eligible packet.
pub const FACTOR_SCALE: u32 = 10_000;

/// Upper bound (inclusive) of the injected jitter sleep, in milliseconds.
pub const MAX_JITTER_MS: u64 = 80;

/// Impairment variant applied to a selected datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GooType {
    /// Add `1 << n` to one random byte.
    BitError,
    /// Increment one random byte.
    ByteIncrement,
    /// Overwrite the whole datagram with zeroes.
    ZeroPacket,
    /// Overwrite the whole datagram with a single random value.
    RandomFill,
    /// Discard the datagram.
    Drop,
    /// Hold the datagram back until after the next one.
    Reorder,
    /// Delay forwarding by a random interval.
    Jitter,
    /// Raise the transport error indicator of the first aligned TS packet.
    TransportError,
}

impl GooType {
    /// All variants, indexed by their numeric code.
    pub const ALL: [GooType; 8] = [
        GooType::BitError,
        GooType::ByteIncrement,
        GooType::ZeroPacket,
        GooType::RandomFill,
        GooType::Drop,
        GooType::Reorder,
        GooType::Jitter,
        GooType::TransportError,
    ];

    /// Numeric code used by the `--goo-type` option.
    pub fn code(self) -> u8 {
        match self {
            GooType::BitError => 0,
            GooType::ByteIncrement => 1,
            GooType::ZeroPacket => 2,
            GooType::RandomFill => 3,
            GooType::Drop => 4,
            GooType::Reorder => 5,
            GooType::Jitter => 6,
            GooType::TransportError => 7,
        }
    }

    /// Look up a variant by numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Pick a variant uniformly at random.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            GooType::BitError => "bit-error",
            GooType::ByteIncrement => "byte-increment",
            GooType::ZeroPacket => "zero-packet",
            GooType::RandomFill => "random-fill",
            GooType::Drop => "drop",
            GooType::Reorder => "reorder",
            GooType::Jitter => "jitter",
            GooType::TransportError => "transport-error",
        }
    }
}

impl fmt::Display for GooType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.as_str())
    }
}

impl FromStr for GooType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u8>() {
            return Self::from_code(code)
                .ok_or_else(|| Error::InvalidConfig(format!("unknown goo type code: {code}")));
        }
        let lowered = s.to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown goo type: {s}")))
    }
}

/// Factor shared between the relay and the console control surface.
///
/// The effective factor is a relaxed atomic: a toggle may be observed one packet
/// late by the relay. Reads are eventually consistent, not linearizable.
#[derive(Debug)]
pub struct GooControl {
    factor: AtomicU32,
    configured: u32,
}

impl GooControl {
    /// Create with the operator-configured factor active.
    pub fn new(factor: u32) -> Self {
        let factor = factor.min(FACTOR_SCALE);
        Self {
            factor: AtomicU32::new(factor),
            configured: factor,
        }
    }

    /// Current effective factor (0 = impairment disabled).
    pub fn factor(&self) -> u32 {
        self.factor.load(Ordering::Relaxed)
    }

    /// Factor the process was started with.
    pub fn configured_factor(&self) -> u32 {
        self.configured
    }

    /// Whether impairment is currently forced off.
    pub fn is_paused(&self) -> bool {
        self.factor() == 0
    }

    /// Flip between disabled and the configured factor. Returns the new factor.
    pub fn toggle(&self) -> u32 {
        let next = if self.is_paused() { self.configured } else { 0 };
        self.factor.store(next, Ordering::Relaxed);
        next
    }

    /// Force the effective factor.
    pub fn set_factor(&self, factor: u32) {
        self.factor.store(factor.min(FACTOR_SCALE), Ordering::Relaxed);
    }
}
