//! Rule resolution and reconciliation.
//!
//! Announcements carry addresses; rules carry names. Every pass resolves the
//! addresses against a fresh snapshot, looks rules up from both sides and
//! drives the subscription controller. Passes run one at a time in queue
//! order on a single thread.

use crate::session::Session;
use crate::subscription::SubscriptionController;
use crate::topology;
use crossbeam_channel::Receiver;
use seqroute_core::{
    AnnouncementEvent, AnnouncementKind, ConnectionRule, Error, PortAddress, Result, RuleStore,
    TopologySnapshot,
};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub const THREAD_NAME: &str = "seqroute-reconcile";

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Every connect attempted, in order.
    pub attempted: Vec<(PortAddress, PortAddress)>,
    pub connected: usize,
    pub already_connected: usize,
    pub failed: usize,
    pub rules_created: usize,
    pub rules_deleted: usize,
    /// Announcements or ports ignored: bookkeeping endpoints or addresses
    /// that no longer resolve.
    pub skipped: usize,
}

impl ReconcileReport {
    /// True when the pass changed neither edges nor rules.
    pub fn is_noop(&self) -> bool {
        self.connected == 0 && self.rules_created == 0 && self.rules_deleted == 0
    }
}

pub struct Reconciler {
    session: Session,
    subscriptions: SubscriptionController,
    rules: Arc<dyn RuleStore>,
}

impl Reconciler {
    pub fn new(session: Session, rules: Arc<dyn RuleStore>) -> Self {
        Self {
            subscriptions: SubscriptionController::new(session.clone()),
            session,
            rules,
        }
    }

    pub fn handle(&self, event: &AnnouncementEvent) -> ReconcileReport {
        match (event.kind, event.dest()) {
            (AnnouncementKind::PortCreated, _) => self.port_created(event.source()),
            (AnnouncementKind::Connected, Some(to)) => self.connected(event.source(), to),
            (AnnouncementKind::Disconnected, Some(to)) => self.disconnected(event.source(), to),
            _ => ReconcileReport::default(),
        }
    }

    /// Realizes every rule that names the new port on either side.
    pub fn port_created(&self, addr: PortAddress) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if self.session.is_bookkeeping(addr) {
            report.skipped += 1;
            return report;
        }

        let snap = match self.fresh_snapshot() {
            Some(snap) => snap,
            None => return report,
        };
        if let Err(e) = self.realize(&snap, addr, &mut report) {
            tracing::warn!("Reconciling new port {} stopped: {}", addr, e);
        }
        self.log_report("port created", &report);
        report
    }

    /// Persists an edge made outside the router as a rule.
    pub fn connected(&self, from: PortAddress, to: PortAddress) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let Some(rule) = self.resolve_rule(from, to, &mut report) else {
            return report;
        };

        match self.rules.create(rule.clone()) {
            Ok(()) => {
                report.rules_created += 1;
                tracing::info!("Saved rule {}", rule);
            }
            Err(e) => tracing::warn!("Saving rule {} failed: {}", rule, e),
        }
        report
    }

    /// Deletes the rule for exactly this direction.
    pub fn disconnected(&self, from: PortAddress, to: PortAddress) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let Some(rule) = self.resolve_rule(from, to, &mut report) else {
            return report;
        };

        match self.rules.delete(&rule) {
            Ok(n) => {
                report.rules_deleted += n;
                if n > 0 {
                    tracing::info!("Deleted rule {}", rule);
                }
            }
            Err(e) => tracing::warn!("Deleting rule {} failed: {}", rule, e),
        }
        report
    }

    /// Runs the port-created logic for every live port against one snapshot.
    pub fn reconcile_all(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let snap = match self.fresh_snapshot() {
            Some(snap) => snap,
            None => return report,
        };

        let ports: Vec<PortAddress> = snap.ports().collect();
        for addr in ports {
            if self.session.is_bookkeeping(addr) {
                continue;
            }
            if let Err(e) = self.realize(&snap, addr, &mut report) {
                tracing::warn!("Startup reconciliation stopped at {}: {}", addr, e);
                break;
            }
        }

        tracing::info!(
            "Startup reconciliation: {} attempted, {} connected, {} already connected, {} failed",
            report.attempted.len(),
            report.connected,
            report.already_connected,
            report.failed
        );
        report
    }

    /// Drains `queue` until its sender is gone.
    pub fn run(&self, queue: Receiver<AnnouncementEvent>) {
        for event in queue.iter() {
            self.handle(&event);
        }
        tracing::info!("Reconciliation engine stopped");
    }

    pub fn spawn(self, queue: Receiver<AnnouncementEvent>) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || self.run(queue))
            .map_err(|e| Error::Initialization(format!("spawn {}: {}", THREAD_NAME, e)))
    }

    // ==================== Internals ====================

    fn fresh_snapshot(&self) -> Option<TopologySnapshot> {
        match topology::snapshot(&self.session) {
            Ok(snap) => Some(snap),
            Err(e) => {
                tracing::warn!("Topology scan failed: {}", e);
                None
            }
        }
    }

    fn realize(
        &self,
        snap: &TopologySnapshot,
        addr: PortAddress,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let Some((device, port)) = snap.names_of(addr) else {
            // Gone again before we got to it
            tracing::debug!("Port {} no longer resolves", addr);
            report.skipped += 1;
            return Ok(());
        };

        for rule in self.rules.find_from(device, port)? {
            if let Some(to) = snap.find_port(&rule.to_device, &rule.to_port) {
                self.attempt(addr, to, report);
            }
        }

        for rule in self.rules.find_to(device, port)? {
            if let Some(from) = snap.find_port(&rule.from_device, &rule.from_port) {
                self.attempt(from, addr, report);
            }
        }

        Ok(())
    }

    fn attempt(&self, from: PortAddress, to: PortAddress, report: &mut ReconcileReport) {
        if report.attempted.contains(&(from, to)) {
            return;
        }
        report.attempted.push((from, to));

        match self.subscriptions.connect(from, to) {
            Ok(()) => report.connected += 1,
            Err(e) if e.is_benign() => report.already_connected += 1,
            Err(e) => {
                tracing::warn!("Could not realize {} -> {}: {}", from, to, e);
                report.failed += 1;
            }
        }
    }

    /// Names of an announced edge, or `None` when it involves the system
    /// client, this client, or an address that no longer resolves.
    fn resolve_rule(
        &self,
        from: PortAddress,
        to: PortAddress,
        report: &mut ReconcileReport,
    ) -> Option<ConnectionRule> {
        if self.session.is_bookkeeping(from) || self.session.is_bookkeeping(to) {
            tracing::debug!("Ignoring bookkeeping edge {} -> {}", from, to);
            report.skipped += 1;
            return None;
        }

        let snap = self.fresh_snapshot()?;
        let (Some((from_dev, from_port)), Some((to_dev, to_port))) =
            (snap.names_of(from), snap.names_of(to))
        else {
            tracing::debug!("Edge {} -> {} does not resolve", from, to);
            report.skipped += 1;
            return None;
        };

        let own = self.session.client_name();
        if from_dev == own || to_dev == own {
            report.skipped += 1;
            return None;
        }

        Some(ConnectionRule::new(from_dev, from_port, to_dev, to_port))
    }

    fn log_report(&self, what: &str, report: &ReconcileReport) {
        if report.is_noop() {
            tracing::debug!("Reconcile ({}): nothing to do", what);
        } else {
            tracing::info!(
                "Reconcile ({}): {} connected, {} already connected, {} failed",
                what,
                report.connected,
                report.already_connected,
                report.failed
            );
        }
    }
}
