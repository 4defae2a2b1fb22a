//! # StreamGoo
//!
//! RTP / MPEG transport stream relay that corrupts a live multicast feed on demand.
//!
//! StreamGoo receives datagrams from a multicast group, optionally mangles some of
//! them according to a time-windowed random policy, and forwards them to a second
//! multicast or unicast destination, optionally recording what was sent. With a goo
//! factor of 0 it is simply an efficient RTP relay.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────────┐    ┌───────────────────────────────┐    ┌──────────────┐
//!  │ PacketSource │──▶ │ GooEngine                     │──▶ │ DatagramSink │
//!  │ (multicast)  │    │  GooClock · find_sync · slot  │    │  + Recorder  │
//!  └──────────────┘    └───────────────▲───────────────┘    └──────────────┘
//!                                      │ factor
//!                              ┌───────┴────────┐
//!                              │ ControlSurface │
//!                              └────────────────┘
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::unreadable_literal)]

pub mod config;
pub mod control;
pub mod error;
pub mod goo;
pub mod record;
pub mod relay;
pub mod transport;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::Config;
pub use error::{Error, ExitStatus, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Product name shown in the banner and logs.
pub const PRODUCT_NAME: &str = "StreamGoo";

/// Length of the fixed RTP header in front of the TS payload.
pub const RTP_HEADER_SIZE: usize = 12;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, GooConfig};
    pub use crate::control::{ControlAction, ControlSurface};
    pub use crate::error::{Error, ExitStatus, Result};
    pub use crate::goo::{find_sync, GooClock, GooControl, GooEngine, GooEvent, GooType, Verdict};
    pub use crate::record::Recorder;
    pub use crate::relay::{Relay, RelaySummary};
    pub use crate::transport::{DatagramSink, PacketSource, UdpSink};
}
