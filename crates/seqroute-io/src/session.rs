//! The one sequencer session shared by every component.

use seqroute_core::{Error, PortAddress, Result, Sequencer, SYSTEM_CLIENT};
use std::sync::Arc;

/// Owned handle to an open sequencer client.
///
/// Constructed once at startup and cloned into each component. Clone is cheap
/// (Arc internally). Closing it is the only way to stop the ingest loop.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    seq: Arc<dyn Sequencer>,
    client_id: u8,
    client_name: String,
}

impl Session {
    /// Names the client and records the id the kernel gave it.
    pub fn open(seq: Arc<dyn Sequencer>, client_name: impl Into<String>) -> Result<Self> {
        let client_name = client_name.into();
        if client_name.is_empty() {
            return Err(Error::Initialization("client name is empty".into()));
        }

        seq.set_client_name(&client_name)
            .map_err(|e| Error::Initialization(format!("set client name: {}", e)))?;
        let client_id = seq
            .client_id()
            .map_err(|e| Error::Initialization(format!("query client id: {}", e)))?;

        tracing::info!("Opened sequencer session as client {} ({})", client_id, client_name);

        Ok(Self {
            inner: Arc::new(SessionInner {
                seq,
                client_id,
                client_name,
            }),
        })
    }

    /// The kernel handle, or `NotInitialized` once the session is closed.
    pub fn sequencer(&self) -> Result<&dyn Sequencer> {
        if self.inner.seq.is_closed() {
            return Err(Error::NotInitialized);
        }
        Ok(self.inner.seq.as_ref())
    }

    pub fn client_id(&self) -> u8 {
        self.inner.client_id
    }

    pub fn client_name(&self) -> &str {
        &self.inner.client_name
    }

    /// True for addresses owned by this client.
    pub fn owns(&self, addr: PortAddress) -> bool {
        addr.device == self.inner.client_id
    }

    /// True for the system pseudo-device and this client: neither is ever
    /// part of a persisted rule.
    pub fn is_bookkeeping(&self, addr: PortAddress) -> bool {
        addr.device == SYSTEM_CLIENT || self.owns(addr)
    }

    /// Closes the session. Blocked readers fail and every later call through
    /// [`Session::sequencer`] reports `NotInitialized`.
    pub fn close(&self) {
        if !self.inner.seq.is_closed() {
            tracing::info!("Closing sequencer session {}", self.inner.client_id);
            self.inner.seq.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.seq.is_closed()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.inner.client_id)
            .field("client_name", &self.inner.client_name)
            .field("closed", &self.is_closed())
            .finish()
    }
}
