//! Announcements from the system announce port.
//!
//! Only three kinds matter for routing: a port appeared, an edge was made,
//! an edge was removed. Everything else the kernel announces is ignored here
//! and can be added as a new kind later.

use crate::event::SeqEvent;
use crate::model::PortAddress;
use serde::{Deserialize, Serialize};

/// Announcement type tags as defined by the kernel's announcement protocol.
///
/// Treat these as an opaque external table; the numbers carry no meaning of
/// their own.
pub mod tags {
    pub const CLIENT_START: u8 = 60;
    pub const CLIENT_EXIT: u8 = 61;
    pub const CLIENT_CHANGE: u8 = 62;
    pub const PORT_START: u8 = 63;
    pub const PORT_EXIT: u8 = 64;
    pub const PORT_CHANGE: u8 = 65;
    pub const PORT_SUBSCRIBED: u8 = 66;
    pub const PORT_UNSUBSCRIBED: u8 = 67;

    pub fn name(tag: u8) -> Option<&'static str> {
        Some(match tag {
            CLIENT_START => "client-start",
            CLIENT_EXIT => "client-exit",
            CLIENT_CHANGE => "client-change",
            PORT_START => "port-start",
            PORT_EXIT => "port-exit",
            PORT_CHANGE => "port-change",
            PORT_SUBSCRIBED => "port-subscribed",
            PORT_UNSUBSCRIBED => "port-unsubscribed",
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnouncementKind {
    PortCreated,
    Connected,
    Disconnected,
}

impl AnnouncementKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            tags::PORT_START => Some(AnnouncementKind::PortCreated),
            tags::PORT_SUBSCRIBED => Some(AnnouncementKind::Connected),
            tags::PORT_UNSUBSCRIBED => Some(AnnouncementKind::Disconnected),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            AnnouncementKind::PortCreated => tags::PORT_START,
            AnnouncementKind::Connected => tags::PORT_SUBSCRIBED,
            AnnouncementKind::Disconnected => tags::PORT_UNSUBSCRIBED,
        }
    }
}

/// A classified announcement with its raw 4-byte payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementEvent {
    pub kind: AnnouncementKind,
    pub payload: [u8; 4],
}

impl AnnouncementEvent {
    pub fn port_created(addr: PortAddress) -> Self {
        Self {
            kind: AnnouncementKind::PortCreated,
            payload: [addr.device, addr.port, 0, 0],
        }
    }

    pub fn connected(from: PortAddress, to: PortAddress) -> Self {
        Self {
            kind: AnnouncementKind::Connected,
            payload: [from.device, from.port, to.device, to.port],
        }
    }

    pub fn disconnected(from: PortAddress, to: PortAddress) -> Self {
        Self {
            kind: AnnouncementKind::Disconnected,
            payload: [from.device, from.port, to.device, to.port],
        }
    }

    /// Classifies an envelope; `None` for every tag outside the three kinds.
    pub fn from_envelope(event: &SeqEvent) -> Option<Self> {
        let kind = AnnouncementKind::from_tag(event.event_type)?;
        let mut payload = [0u8; 4];
        payload.copy_from_slice(&event.data[..4]);
        Some(Self { kind, payload })
    }

    /// The new port for `PortCreated`, the sender for connection kinds.
    pub fn source(&self) -> PortAddress {
        PortAddress::new(self.payload[0], self.payload[1])
    }

    /// The receiver for connection kinds; `None` for `PortCreated`.
    pub fn dest(&self) -> Option<PortAddress> {
        match self.kind {
            AnnouncementKind::PortCreated => None,
            _ => Some(PortAddress::new(self.payload[2], self.payload[3])),
        }
    }
}
