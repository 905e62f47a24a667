//! The running router: session, background tasks and consumer API.
//!
//! ## Quick Start
//!
//! ```ignore
//! use seqroute_io::{MemorySequencer, RouterSystem};
//! use std::sync::Arc;
//!
//! let router = RouterSystem::builder()
//!     .client_name("seqroute")
//!     .build(Arc::new(MemorySequencer::new(128)))?;
//!
//! let snap = router.snapshot()?;
//! for (from, to) in snap.edges() {
//!     println!("{} -> {}", from, to);
//! }
//!
//! router.shutdown();
//! ```

mod builder;

pub use builder::RouterSystemBuilder;

use crate::monitor::PortMonitor;
use crate::port::{PortRegistry, RegisteredPortInfo};
use crate::reconcile::ReconcileReport;
use crate::session::Session;
use crate::subscription::SubscriptionController;
use crate::topology;
use parking_lot::Mutex;
use seqroute_core::{ConnectionRule, PortAddress, Result, RuleStore, TopologySnapshot};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Handle to a running router.
///
/// Owns the session and the three background threads. Clone is cheap (Arc
/// internally); the last clone to drop shuts everything down.
#[derive(Clone)]
pub struct RouterSystem {
    inner: Arc<RouterSystemInner>,
}

pub(crate) struct RouterSystemInner {
    pub(crate) session: Session,
    pub(crate) registry: Arc<PortRegistry>,
    pub(crate) subscriptions: SubscriptionController,
    pub(crate) rules: Arc<dyn RuleStore>,
    pub(crate) announce_port: PortAddress,
    pub(crate) startup_report: Option<ReconcileReport>,
    pub(crate) threads: Mutex<Vec<JoinHandle<()>>>,
}

impl RouterSystem {
    pub fn builder() -> RouterSystemBuilder {
        RouterSystemBuilder::default()
    }

    // ==================== Status ====================

    /// A fresh view of the graph; stale as soon as it is returned.
    pub fn snapshot(&self) -> Result<TopologySnapshot> {
        topology::snapshot(&self.inner.session)
    }

    pub fn rules(&self) -> Result<Vec<ConnectionRule>> {
        self.inner.rules.list()
    }

    pub fn rule_store(&self) -> &Arc<dyn RuleStore> {
        &self.inner.rules
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn client_id(&self) -> u8 {
        self.inner.session.client_id()
    }

    pub fn client_name(&self) -> &str {
        self.inner.session.client_name()
    }

    /// Where announcements from `0:1` arrive.
    pub fn announce_port(&self) -> PortAddress {
        self.inner.announce_port
    }

    /// Ports this client currently has open.
    pub fn ports(&self) -> Vec<RegisteredPortInfo> {
        self.inner.registry.list()
    }

    /// Outcome of the reconciliation run during `build`, if it ran.
    pub fn startup_report(&self) -> Option<&ReconcileReport> {
        self.inner.startup_report.as_ref()
    }

    pub fn is_running(&self) -> bool {
        !self.inner.session.is_closed()
    }

    // ==================== Routing ====================

    /// Connects two live ports. The engine sees the resulting announcement
    /// and persists the rule.
    pub fn connect(&self, from: PortAddress, to: PortAddress) -> Result<()> {
        self.inner.subscriptions.connect(from, to)
    }

    /// Disconnects two live ports; the matching rule is deleted by the engine.
    pub fn disconnect(&self, from: PortAddress, to: PortAddress) -> Result<()> {
        self.inner.subscriptions.disconnect(from, to)
    }

    /// Streams decoded MIDI from `target` until the monitor is dropped.
    pub fn monitor(&self, target: PortAddress) -> Result<PortMonitor> {
        PortMonitor::open(&self.inner.session, &self.inner.registry, target)
    }

    // ==================== Lifecycle ====================

    /// Closes the session and waits for the background threads to finish.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl RouterSystemInner {
    pub(crate) fn shutdown(&self) {
        self.session.close();

        let threads: Vec<_> = self.threads.lock().drain(..).collect();
        for handle in threads {
            let name = handle.thread().name().unwrap_or("unnamed").to_string();
            if handle.join().is_err() {
                tracing::warn!("{} thread panicked", name);
            }
        }
    }
}

impl Drop for RouterSystemInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for RouterSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterSystem")
            .field("session", &self.inner.session)
            .field("announce_port", &self.inner.announce_port)
            .field("ports", &self.inner.registry.len())
            .finish()
    }
}
