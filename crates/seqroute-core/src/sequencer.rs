//! Kernel sequencer boundary.
//!
//! Everything the router needs from the subsystem goes through [`Sequencer`].
//! Implementations must be callable from several threads at once; the kernel
//! interface serializes concurrent queries itself.

use crate::error::Result;
use crate::event::SeqEvent;
use crate::model::{PortAddress, PortCaps};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub client: u8,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub port: u8,
    pub name: String,
    pub caps: PortCaps,
}

pub trait Sequencer: Send + Sync {
    /// Client number the kernel assigned to this session.
    fn client_id(&self) -> Result<u8>;

    fn set_client_name(&self, name: &str) -> Result<()>;

    /// Creates a port owned by this client and returns its port number.
    fn create_port(&self, name: &str, caps: PortCaps) -> Result<u8>;

    fn delete_port(&self, port: u8) -> Result<()>;

    fn clients(&self) -> Result<Vec<ClientInfo>>;

    fn ports(&self, client: u8) -> Result<Vec<PortInfo>>;

    /// Ports currently receiving from `addr` (read subscriptions), in kernel order.
    fn subscribers(&self, addr: PortAddress) -> Result<Vec<PortAddress>>;

    fn is_subscribed(&self, from: PortAddress, to: PortAddress) -> Result<bool>;

    fn subscribe(&self, from: PortAddress, to: PortAddress) -> Result<()>;

    fn unsubscribe(&self, from: PortAddress, to: PortAddress) -> Result<()>;

    /// Blocks until at least one event is pending.
    ///
    /// Fails with `SessionClosed` once [`Sequencer::close`] has been called;
    /// that failure is the only way to stop a reader blocked here.
    fn wait_ready(&self) -> Result<()>;

    /// Pops the next pending event without blocking.
    fn next_pending(&self) -> Result<Option<SeqEvent>>;

    fn close(&self);

    fn is_closed(&self) -> bool;
}
