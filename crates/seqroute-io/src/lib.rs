//! Sequencer I/O for seqroute.
//!
//! Session, topology scan, subscription control, event ingest, the
//! announcement interpreter and the reconciliation engine, wired together by
//! [`RouterSystem`].
//!
//! Feature gates: `alsa` (the kernel sequencer backend).

pub use seqroute_core::{Error, Result};

mod backend;
pub use backend::{MemorySequencer, SeqOp};

#[cfg(feature = "alsa")]
pub use backend::AlsaSequencer;

pub mod session;
pub use session::Session;

pub mod topology;

pub mod subscription;
pub use subscription::SubscriptionController;

pub mod codec;
pub use codec::MidiBytes;

pub(crate) mod port;
pub use port::{PortListener, PortRegistry, RegisteredPort, RegisteredPortInfo};

pub mod ingest;
pub use ingest::EventIngest;

pub mod announce;
pub use announce::AnnouncementInterpreter;

pub mod reconcile;
pub use reconcile::{ReconcileReport, Reconciler};

mod monitor;
pub use monitor::PortMonitor;

mod system;
pub use system::{RouterSystem, RouterSystemBuilder};
