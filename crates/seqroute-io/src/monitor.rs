//! Live MIDI tap on any port.

use crate::codec::MidiBytes;
use crate::port::{PortListener, PortRegistry, RegisteredPort};
use crate::session::Session;
use crate::subscription::SubscriptionController;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use seqroute_core::{PortAddress, PortCaps, Result};
use std::sync::Arc;
use std::time::Duration;

pub const PORT_NAME: &str = "monitor";

/// Decoded messages buffered per monitor; overflow is dropped.
pub const MONITOR_CAPACITY: usize = 256;

/// A private reader port subscribed to `target`.
///
/// Dropping the monitor removes the subscription and deletes the port.
pub struct PortMonitor {
    target: PortAddress,
    subscriptions: SubscriptionController,
    rx: Receiver<MidiBytes>,
    // Dropped after the subscription is removed
    port: RegisteredPort,
}

impl PortMonitor {
    pub fn open(
        session: &Session,
        registry: &Arc<PortRegistry>,
        target: PortAddress,
    ) -> Result<Self> {
        let (tx, rx) = bounded(MONITOR_CAPACITY);
        let port = registry.open_port(
            session,
            PORT_NAME,
            PortCaps::WRITE | PortCaps::SUBS_WRITE,
            PortListener::new().midi(tx),
        )?;

        let subscriptions = SubscriptionController::new(session.clone());
        subscriptions.connect(target, port.addr())?;
        tracing::info!("Monitoring {} on {}", target, port.addr());

        Ok(Self {
            target,
            subscriptions,
            rx,
            port,
        })
    }

    pub fn target(&self) -> PortAddress {
        self.target
    }

    pub fn port(&self) -> PortAddress {
        self.port.addr()
    }

    /// Blocks for the next message; `None` once the session has closed.
    pub fn recv(&self) -> Option<MidiBytes> {
        self.rx.recv().ok()
    }

    pub fn try_recv(&self) -> Option<MidiBytes> {
        self.rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<MidiBytes> {
        match self.rx.recv_timeout(timeout) {
            Ok(bytes) => Some(bytes),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Drop for PortMonitor {
    fn drop(&mut self) {
        if self.subscriptions.disconnect(self.target, self.port.addr()).is_ok() {
            tracing::info!("Stopped monitoring {}", self.target);
        }
    }
}

impl std::fmt::Debug for PortMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortMonitor")
            .field("target", &self.target)
            .field("port", &self.port.addr())
            .finish()
    }
}
