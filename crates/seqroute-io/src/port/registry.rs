//! Destination port to listener registry.
//!
//! Ports are registered when opened and unregistered when their
//! [`RegisteredPort`] handle drops. The ingest loop is the only reader.

use crate::codec::MidiBytes;
use crate::session::Session;
use crossbeam_channel::Sender;
use dashmap::DashMap;
use seqroute_core::{PortAddress, PortCaps, Result, SeqEvent};
use std::sync::Arc;

/// Where events delivered to one port go.
///
/// Either sink may be absent. Decoded MIDI is best-effort; envelopes are
/// lossless.
#[derive(Clone, Default)]
pub struct PortListener {
    pub(crate) midi: Option<Sender<MidiBytes>>,
    pub(crate) events: Option<Sender<SeqEvent>>,
}

impl PortListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn midi(mut self, tx: Sender<MidiBytes>) -> Self {
        self.midi = Some(tx);
        self
    }

    pub fn events(mut self, tx: Sender<SeqEvent>) -> Self {
        self.events = Some(tx);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredPortInfo {
    pub port: u8,
    pub name: String,
}

struct PortEntry {
    name: String,
    listener: PortListener,
}

#[derive(Default)]
pub struct PortRegistry {
    ports: DashMap<u8, PortEntry>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a port on this client and registers `listener` for it before
    /// anything can subscribe to it.
    pub fn open_port(
        self: &Arc<Self>,
        session: &Session,
        name: &str,
        caps: PortCaps,
        listener: PortListener,
    ) -> Result<RegisteredPort> {
        let port = session.sequencer()?.create_port(name, caps)?;
        self.register(port, name, listener);

        Ok(RegisteredPort {
            registry: Arc::clone(self),
            session: session.clone(),
            addr: PortAddress::new(session.client_id(), port),
            name: name.to_string(),
        })
    }

    pub fn register(&self, port: u8, name: impl Into<String>, listener: PortListener) {
        let name = name.into();
        tracing::debug!("Registered listener for port {} ({})", port, name);
        self.ports.insert(port, PortEntry { name, listener });
    }

    /// Clone of the listener, so no map shard stays locked while sending.
    pub fn listener(&self, port: u8) -> Option<PortListener> {
        self.ports.get(&port).map(|entry| entry.listener.clone())
    }

    pub fn unregister(&self, port: u8) -> bool {
        let removed = self.ports.remove(&port).is_some();
        if removed {
            tracing::debug!("Unregistered listener for port {}", port);
        }
        removed
    }

    /// Drops every listener; their receivers see a disconnected channel.
    pub fn clear(&self) {
        self.ports.clear();
    }

    pub fn list(&self) -> Vec<RegisteredPortInfo> {
        let mut ports: Vec<_> = self
            .ports
            .iter()
            .map(|entry| RegisteredPortInfo {
                port: *entry.key(),
                name: entry.value().name.clone(),
            })
            .collect();
        ports.sort_by_key(|p| p.port);
        ports
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

/// An open port of this client. Dropping it unregisters the listener and
/// deletes the port.
pub struct RegisteredPort {
    registry: Arc<PortRegistry>,
    session: Session,
    addr: PortAddress,
    name: String,
}

impl RegisteredPort {
    pub fn addr(&self) -> PortAddress {
        self.addr
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for RegisteredPort {
    fn drop(&mut self) {
        self.registry.unregister(self.addr.port);

        // A closed session took the port with it
        if let Ok(seq) = self.session.sequencer() {
            if let Err(e) = seq.delete_port(self.addr.port) {
                tracing::warn!("Failed to delete port {} ({}): {}", self.addr, self.name, e);
            }
        }
    }
}

impl std::fmt::Debug for RegisteredPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredPort")
            .field("addr", &self.addr)
            .field("name", &self.name)
            .finish()
    }
}
