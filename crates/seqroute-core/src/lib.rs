//! Core types for seqroute.
//!
//! Topology model, durable rules, the announcement table, and the
//! [`Sequencer`] boundary that the I/O crate drives.

pub mod error;
pub use error::{Error, Result};

pub mod model;
pub use model::{
    ConnectionRule, Device, DevicePort, PortAddress, PortCaps, TopologyBuilder, TopologySnapshot,
    ANNOUNCE_PORT, SYSTEM_CLIENT,
};

pub mod event;
pub use event::{SeqEvent, EVENT_DATA_LEN};

pub mod announce;
pub use announce::{AnnouncementEvent, AnnouncementKind};

pub mod sequencer;
pub use sequencer::{ClientInfo, PortInfo, Sequencer};

pub mod rules;
pub use rules::{JsonRuleStore, MemoryRuleStore, RuleStore};
