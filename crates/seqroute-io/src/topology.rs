//! Topology snapshot builder.
//!
//! Walks clients, then ports per client, then read subscriptions per port.
//! A client only becomes a device once it shows at least one port.

use crate::session::Session;
use seqroute_core::{DevicePort, PortAddress, Result, TopologySnapshot};

/// Builds a fresh snapshot of the whole graph.
///
/// Fails with `NotInitialized` when the session is closed. A client whose
/// port listing fails is skipped and the snapshot is marked partial; a port
/// whose subscriber query fails keeps the port but loses its edges, also
/// marking the snapshot partial.
pub fn snapshot(session: &Session) -> Result<TopologySnapshot> {
    let seq = session.sequencer()?;
    let mut builder = TopologySnapshot::builder();

    for client in seq.clients()? {
        let ports = match seq.ports(client.client) {
            Ok(ports) => ports,
            Err(e) => {
                tracing::warn!(
                    "Skipping client {} ({}) in topology scan: {}",
                    client.client,
                    client.name,
                    e
                );
                builder.mark_partial();
                continue;
            }
        };

        if ports.is_empty() {
            continue;
        }

        builder.add_device(client.client, client.name.as_str());

        for port in ports {
            let addr = PortAddress::new(client.client, port.port);
            builder.add_port(addr, DevicePort::from_caps(port.name, port.caps));

            match seq.subscribers(addr) {
                Ok(dests) => {
                    for dest in dests {
                        builder.add_edge(addr, dest);
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping subscriptions of {}: {}", addr, e);
                    builder.mark_partial();
                }
            }
        }
    }

    Ok(builder.build())
}

/// `(device name, port name)` of a live address, from a fresh snapshot.
pub fn resolve_names(session: &Session, addr: PortAddress) -> Result<Option<(String, String)>> {
    let snap = snapshot(session)?;
    Ok(snap
        .names_of(addr)
        .map(|(device, port)| (device.to_string(), port.to_string())))
}

/// Current address of a named port, from a fresh snapshot.
pub fn find_port(session: &Session, device: &str, port: &str) -> Result<Option<PortAddress>> {
    Ok(snapshot(session)?.find_port(device, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySequencer;
    use seqroute_core::{Error, PortCaps, Sequencer};
    use std::sync::Arc;

    fn setup() -> (Arc<MemorySequencer>, Session) {
        let seq = Arc::new(MemorySequencer::new(129));
        let session = Session::open(seq.clone(), "seqroute").unwrap();
        (seq, session)
    }

    #[test]
    fn test_classifies_ports() {
        let (seq, session) = setup();
        seq.add_client(20, "Keystation");
        seq.add_port(20, 0, "Keystation MIDI 1", PortCaps::DUPLEX_SUBS);
        seq.add_client(128, "FluidSynth");
        seq.add_port(128, 0, "Synth input port", PortCaps::WRITE | PortCaps::SUBS_WRITE);

        let snap = snapshot(&session).unwrap();

        let keys = snap.port(PortAddress::new(20, 0)).unwrap();
        assert!(keys.is_input && keys.is_output);

        let synth = snap.port(PortAddress::new(128, 0)).unwrap();
        assert!(!synth.is_input);
        assert!(synth.is_output);
        assert!(!snap.is_partial());
    }

    #[test]
    fn test_client_without_ports_is_not_a_device() {
        let (seq, session) = setup();
        seq.add_client(20, "Empty");

        let snap = snapshot(&session).unwrap();
        assert!(snap.device(20).is_none());
        // Our own client has no ports yet either
        assert!(snap.device(129).is_none());
        // The system client always has its timer and announce ports
        assert_eq!(snap.device(0).unwrap().ports.len(), 2);
    }

    #[test]
    fn test_edges_follow_subscriptions() {
        let (seq, session) = setup();
        let a = seq.add_client_port(20, "A", "Out", PortCaps::DUPLEX_SUBS);
        let b = seq.add_client_port(21, "B", "In", PortCaps::DUPLEX_SUBS);
        let c = seq.add_client_port(22, "C", "In", PortCaps::DUPLEX_SUBS);
        seq.subscribe(a, b).unwrap();
        seq.subscribe(a, c).unwrap();

        let snap = snapshot(&session).unwrap();
        assert_eq!(snap.destinations(a), &[b, c]);
        assert_eq!(snap.edge_count(), 2);
    }

    #[test]
    fn test_failed_client_marks_partial() {
        let (seq, session) = setup();
        seq.add_client_port(20, "A", "Out", PortCaps::DUPLEX_SUBS);
        seq.add_client_port(21, "B", "In", PortCaps::DUPLEX_SUBS);
        seq.fail_enumeration(20);

        let snap = snapshot(&session).unwrap();
        assert!(snap.is_partial());
        assert!(snap.device(20).is_none());
        assert!(snap.device(21).is_some());
    }

    #[test]
    fn test_failed_subscriber_query_keeps_port() {
        let (seq, session) = setup();
        let a = seq.add_client_port(20, "A", "Out", PortCaps::DUPLEX_SUBS);
        let b = seq.add_client_port(21, "B", "In", PortCaps::DUPLEX_SUBS);
        let c = seq.add_client_port(22, "C", "In", PortCaps::DUPLEX_SUBS);
        seq.subscribe(a, b).unwrap();
        seq.subscribe(b, c).unwrap();
        seq.fail_subscribers(a);

        let snap = snapshot(&session).unwrap();
        assert!(snap.is_partial());
        assert_eq!(snap.port(a).unwrap().name, "Out");
        assert!(snap.destinations(a).is_empty());
        assert!(snap.is_connected(b, c));
    }

    #[test]
    fn test_closed_session() {
        let (_seq, session) = setup();
        session.close();
        assert!(matches!(snapshot(&session), Err(Error::NotInitialized)));
    }

    #[test]
    fn test_resolution_helpers() {
        let (seq, session) = setup();
        let a = seq.add_client_port(20, "A", "Out", PortCaps::DUPLEX_SUBS);

        assert_eq!(
            resolve_names(&session, a).unwrap(),
            Some(("A".to_string(), "Out".to_string()))
        );
        assert_eq!(resolve_names(&session, PortAddress::new(99, 0)).unwrap(), None);
        assert_eq!(find_port(&session, "A", "Out").unwrap(), Some(a));
        assert_eq!(find_port(&session, "A", "In").unwrap(), None);
    }
}
