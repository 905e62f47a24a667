//! Connect/disconnect of two port addresses.

use crate::session::Session;
use seqroute_core::{Error, PortAddress, Result};

/// Idempotent edge mutation.
///
/// Existing state is checked before mutating, so repeating a request yields
/// `AlreadyConnected` / `NotConnected` instead of touching the kernel twice.
/// Those two outcomes are expected under races with the operator or with
/// hardware removal and are never retried.
#[derive(Clone, Debug)]
pub struct SubscriptionController {
    session: Session,
}

impl SubscriptionController {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn connect(&self, from: PortAddress, to: PortAddress) -> Result<()> {
        let seq = self.session.sequencer()?;

        let exists = seq.is_subscribed(from, to).map_err(|e| Error::ConnectFailed {
            from,
            to,
            reason: e.to_string(),
        })?;
        if exists {
            tracing::debug!("Already subscribed: {} -> {}", from, to);
            return Err(Error::AlreadyConnected { from, to });
        }

        seq.subscribe(from, to).map_err(|e| {
            tracing::warn!("Connect failed {} -> {}: {}", from, to, e);
            Error::ConnectFailed {
                from,
                to,
                reason: e.to_string(),
            }
        })?;

        tracing::info!("Connected {} -> {}", from, to);
        Ok(())
    }

    pub fn disconnect(&self, from: PortAddress, to: PortAddress) -> Result<()> {
        let seq = self.session.sequencer()?;

        let exists = seq
            .is_subscribed(from, to)
            .map_err(|e| Error::UnsubscribeFailed {
                from,
                to,
                reason: e.to_string(),
            })?;
        if !exists {
            tracing::debug!("Not subscribed: {} -> {}", from, to);
            return Err(Error::NotConnected { from, to });
        }

        seq.unsubscribe(from, to).map_err(|e| {
            tracing::warn!("Disconnect failed {} -> {}: {}", from, to, e);
            Error::UnsubscribeFailed {
                from,
                to,
                reason: e.to_string(),
            }
        })?;

        tracing::info!("Disconnected {} -> {}", from, to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{topology, MemorySequencer, SeqOp};
    use seqroute_core::PortCaps;
    use std::sync::Arc;

    fn setup() -> (Arc<MemorySequencer>, SubscriptionController, PortAddress, PortAddress) {
        let seq = Arc::new(MemorySequencer::new(129));
        let session = Session::open(seq.clone(), "seqroute").unwrap();
        let a = seq.add_client_port(20, "A", "Out", PortCaps::DUPLEX_SUBS);
        let b = seq.add_client_port(21, "B", "In", PortCaps::DUPLEX_SUBS);
        (seq, SubscriptionController::new(session), a, b)
    }

    #[test]
    fn test_connect_then_already_connected() {
        let (seq, subs, a, b) = setup();

        subs.connect(a, b).unwrap();
        let before = seq.edges();

        for _ in 0..3 {
            let err = subs.connect(a, b).unwrap_err();
            assert!(matches!(err, Error::AlreadyConnected { .. }));
            assert!(err.is_benign());
        }

        assert_eq!(seq.edges(), before, "Edge set must not change");
        assert_eq!(seq.ops(), vec![SeqOp::Subscribe(a, b)]);
    }

    #[test]
    fn test_disconnect_then_not_connected() {
        let (seq, subs, a, b) = setup();

        assert!(matches!(
            subs.disconnect(a, b),
            Err(Error::NotConnected { .. })
        ));

        subs.connect(a, b).unwrap();
        subs.disconnect(a, b).unwrap();
        assert!(seq.edges().is_empty());

        assert!(matches!(
            subs.disconnect(a, b),
            Err(Error::NotConnected { .. })
        ));
    }

    #[test]
    fn test_connect_failure_carries_reason() {
        let (seq, subs, a, b) = setup();
        seq.fail_next_subscribe("Operation not permitted");

        match subs.connect(a, b) {
            Err(Error::ConnectFailed { from, to, reason }) => {
                assert_eq!((from, to), (a, b));
                assert!(reason.contains("Operation not permitted"));
            }
            other => panic!("expected ConnectFailed, got {:?}", other),
        }

        // Failures are not retried; the next request simply works
        subs.connect(a, b).unwrap();
    }

    #[test]
    fn test_connect_to_missing_port_fails() {
        let (_seq, subs, a, _b) = setup();
        let gone = PortAddress::new(77, 0);
        assert!(matches!(
            subs.connect(a, gone),
            Err(Error::ConnectFailed { .. })
        ));
    }

    #[test]
    fn test_edges_visible_in_snapshot() {
        let (seq, subs, a, b) = setup();
        subs.connect(a, b).unwrap();

        let session = Session::open(seq, "other").unwrap();
        let snap = topology::snapshot(&session).unwrap();
        assert!(snap.is_connected(a, b));
    }
}
