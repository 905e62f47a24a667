//! Sequencer event envelope.

use crate::model::PortAddress;
use serde::{Deserialize, Serialize};

/// Size of the kernel's fixed event data union.
pub const EVENT_DATA_LEN: usize = 12;

/// Typed envelope of one sequencer event.
///
/// `data` is the fixed payload: literal protocol fields for musical events,
/// or packed address pairs for system announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqEvent {
    pub event_type: u8,
    pub source: PortAddress,
    pub dest: PortAddress,
    pub data: [u8; EVENT_DATA_LEN],
}

impl SeqEvent {
    pub fn new(event_type: u8, source: PortAddress, dest: PortAddress) -> Self {
        Self {
            event_type,
            source,
            dest,
            data: [0; EVENT_DATA_LEN],
        }
    }

    /// Copies `bytes` into the front of the payload (extra bytes are ignored).
    pub fn with_data(mut self, bytes: &[u8]) -> Self {
        let n = bytes.len().min(EVENT_DATA_LEN);
        self.data[..n].copy_from_slice(&bytes[..n]);
        self
    }

    /// Payload carrying one address, as in port lifecycle announcements.
    pub fn with_addr(self, addr: PortAddress) -> Self {
        self.with_data(&[addr.device, addr.port])
    }

    /// Payload carrying a `sender -> dest` pair, as in subscription announcements.
    pub fn with_connection(self, sender: PortAddress, dest: PortAddress) -> Self {
        self.with_data(&[sender.device, sender.port, dest.device, dest.port])
    }

    /// Little-endian field at `offset`; `None` past the end of the payload.
    pub fn u32_at(&self, offset: usize) -> Option<u32> {
        let bytes = self.data.get(offset..offset.checked_add(4)?)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(bytes);
        Some(u32::from_le_bytes(word))
    }

    pub fn i32_at(&self, offset: usize) -> Option<i32> {
        self.u32_at(offset).map(|v| v as i32)
    }
}
