//! RouterSystem builder.

use std::sync::Arc;

use parking_lot::Mutex;
use seqroute_core::{Error, MemoryRuleStore, Result, RuleStore, Sequencer};

use super::{RouterSystem, RouterSystemInner};
use crate::announce::{AnnouncementInterpreter, DEFAULT_QUEUE_CAPACITY};
use crate::ingest::EventIngest;
use crate::port::PortRegistry;
use crate::reconcile::Reconciler;
use crate::session::Session;
use crate::subscription::SubscriptionController;

pub const DEFAULT_CLIENT_NAME: &str = "seqroute";

pub struct RouterSystemBuilder {
    pub(super) client_name: String,
    pub(super) queue_capacity: usize,
    pub(super) startup_reconcile: bool,
    pub(super) rules: Option<Arc<dyn RuleStore>>,
}

impl Default for RouterSystemBuilder {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            startup_reconcile: true,
            rules: None,
        }
    }
}

impl RouterSystemBuilder {
    /// Name shown to other sequencer clients.
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Realize stored rules against the current topology before starting.
    pub fn startup_reconcile(mut self, enabled: bool) -> Self {
        self.startup_reconcile = enabled;
        self
    }

    /// Defaults to an in-memory store.
    pub fn rule_store(mut self, rules: Arc<dyn RuleStore>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn build(self, seq: Arc<dyn Sequencer>) -> Result<RouterSystem> {
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "announcement queue capacity must be > 0".into(),
            ));
        }

        let session = Session::open(seq, self.client_name.as_str())?;
        let rules = self
            .rules
            .unwrap_or_else(|| Arc::new(MemoryRuleStore::new()));

        // Anything started so far is torn down by closing the session
        start(session.clone(), rules, self.queue_capacity, self.startup_reconcile).map_err(|e| {
            tracing::error!("Router startup failed: {}", e);
            session.close();
            e
        })
    }
}

fn start(
    session: Session,
    rules: Arc<dyn RuleStore>,
    queue_capacity: usize,
    startup_reconcile: bool,
) -> Result<RouterSystem> {
    let registry = Arc::new(PortRegistry::new());
    let mut threads = Vec::with_capacity(3);

    // Register the listener and subscribe before draining starts, so the
    // first announcements are not dropped as unroutable
    let (interpreter, queue) =
        AnnouncementInterpreter::start(&session, &registry, queue_capacity)?;
    let announce_port = interpreter.port();
    threads.push(interpreter.into_handle());

    let ingest = EventIngest::spawn(session.clone(), registry.clone()).map_err(|e| {
        // Without an ingest loop nobody clears the listeners on close
        registry.clear();
        e
    })?;
    threads.push(ingest);

    let engine = Reconciler::new(session.clone(), rules.clone());
    let startup_report = if startup_reconcile {
        Some(engine.reconcile_all())
    } else {
        None
    };
    threads.push(engine.spawn(queue)?);

    tracing::info!(
        "Router running as client {} ({})",
        session.client_id(),
        session.client_name()
    );

    Ok(RouterSystem {
        inner: Arc::new(RouterSystemInner {
            subscriptions: SubscriptionController::new(session.clone()),
            session,
            registry,
            rules,
            announce_port,
            startup_report,
            threads: Mutex::new(threads),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySequencer;
    use seqroute_core::{ConnectionRule, PortAddress, PortCaps};

    #[test]
    fn test_default_build() {
        let seq = Arc::new(MemorySequencer::new(128));
        let router = RouterSystem::builder().build(seq.clone()).unwrap();

        assert_eq!(router.client_id(), 128);
        assert_eq!(router.client_name(), DEFAULT_CLIENT_NAME);
        assert!(router.rules().unwrap().is_empty());
        assert!(router.startup_report().is_some());

        // Only the announcement listener is open
        let ports = router.ports();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].name, "announcements");
        assert!(seq.has_edge(PortAddress::announce(), router.announce_port()));

        router.shutdown();
        assert!(!router.is_running());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let seq = Arc::new(MemorySequencer::new(128));
        let result = RouterSystem::builder().queue_capacity(0).build(seq);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_failed_start_closes_session() {
        let seq = Arc::new(MemorySequencer::new(128));
        seq.fail_next_subscribe("Operation not permitted");

        let result = RouterSystem::builder().build(seq.clone());
        assert!(matches!(result, Err(Error::Initialization(_))));
        assert!(seq.is_closed());
    }

    #[test]
    fn test_startup_reconcile_can_be_disabled() {
        let seq = Arc::new(MemorySequencer::new(128));
        let x = seq.add_client_port(20, "X", "Out", PortCaps::DUPLEX_SUBS);
        let y = seq.add_client_port(21, "Y", "In", PortCaps::DUPLEX_SUBS);
        let rules = Arc::new(MemoryRuleStore::with_rules([ConnectionRule::new(
            "X", "Out", "Y", "In",
        )]));

        let router = RouterSystem::builder()
            .startup_reconcile(false)
            .rule_store(rules)
            .build(seq.clone())
            .unwrap();

        assert!(router.startup_report().is_none());
        assert!(!seq.has_edge(x, y));
    }
}
