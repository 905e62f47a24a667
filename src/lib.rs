//! # seqroute - ALSA sequencer route keeper
//!
//! Keeps named MIDI connections alive across hotplug and renumbering.
//!
//! ## Architecture
//!
//! seqroute is an umbrella crate that coordinates:
//! - **seqroute-core** - Topology model, rules and rule stores, the sequencer boundary
//! - **seqroute-io** - Session, event ingest, announcement interpreter, reconciliation engine
//!
//! ## Quick Start
//!
//! ```ignore
//! use seqroute::prelude::*;
//!
//! let mut config = Config::load("seqroute.json")?;
//! config.apply_env()?;
//!
//! let daemon = SeqRouteDaemon::builder()
//!     .config(config)
//!     .build_alsa()?;
//!
//! let status = daemon.status()?;
//! println!("{}", serde_json::to_string_pretty(&status)?);
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - In-memory sequencer only
//! - `alsa` - Kernel sequencer backend and the `seqrouted` binary

/// Re-export of seqroute-core for direct access
pub use seqroute_core as core;

/// Re-export of seqroute-io for direct access
pub use seqroute_io as io;

pub use seqroute_core::{
    AnnouncementEvent, AnnouncementKind, ConnectionRule, Device, DevicePort, JsonRuleStore,
    MemoryRuleStore, PortAddress, PortCaps, RuleStore, SeqEvent, Sequencer, TopologySnapshot,
};

pub use seqroute_io::{
    MemorySequencer, MidiBytes, PortMonitor, ReconcileReport, RouterSystem, RouterSystemBuilder,
};

#[cfg(feature = "alsa")]
pub use seqroute_io::AlsaSequencer;

mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::Config;

pub mod logging;

mod builder;
pub use builder::SeqRouteDaemonBuilder;

mod daemon;
pub use daemon::{SeqRouteDaemon, StatusConfig, StatusReport};

pub mod prelude {
    pub use crate::{
        Config, ConnectionRule, Error, MemorySequencer, PortAddress, Result, RouterSystem,
        SeqRouteDaemon, TopologySnapshot,
    };

    #[cfg(feature = "alsa")]
    pub use crate::AlsaSequencer;

    pub use std::sync::Arc;
}
