//! Event ingest loop: drains the sequencer and fans events out by
//! destination port.

use crate::codec;
use crate::port::PortRegistry;
use crate::session::Session;
use crossbeam_channel::TrySendError;
use seqroute_core::{Error, Result, SeqEvent};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const THREAD_NAME: &str = "seqroute-ingest";

/// Pause before waiting again after a failed wait.
pub const RETRY_DELAY: Duration = Duration::from_millis(50);

pub struct EventIngest;

impl EventIngest {
    /// Starts the loop on its own thread. It runs until the session closes,
    /// then clears `registry` so every listener sees a disconnected channel.
    pub fn spawn(session: Session, registry: Arc<PortRegistry>) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                Self::run(&session, &registry);
                registry.clear();
                tracing::info!("Event ingest stopped");
            })
            .map_err(|e| Error::Initialization(format!("spawn {}: {}", THREAD_NAME, e)))
    }

    fn run(session: &Session, registry: &PortRegistry) {
        tracing::debug!("Event ingest started");
        let mut failing = false;

        loop {
            let seq = match session.sequencer() {
                Ok(seq) => seq,
                Err(_) => return,
            };

            match seq.wait_ready() {
                Ok(()) => {
                    if failing {
                        tracing::info!("Sequencer events readable again");
                        failing = false;
                    }
                }
                Err(Error::SessionClosed) | Err(Error::NotInitialized) => return,
                Err(e) => {
                    if session.is_closed() {
                        return;
                    }
                    if !failing {
                        tracing::warn!("Waiting for sequencer events failed: {}", e);
                        failing = true;
                    } else {
                        tracing::trace!("Still failing: {}", e);
                    }
                    thread::sleep(RETRY_DELAY);
                    continue;
                }
            }

            loop {
                match seq.next_pending() {
                    Ok(Some(event)) => dispatch(registry, &event),
                    Ok(None) => break,
                    Err(Error::SessionClosed) | Err(Error::NotInitialized) => return,
                    Err(e) => {
                        tracing::warn!("Reading sequencer event failed: {}", e);
                        break;
                    }
                }
            }
        }
    }
}

/// Delivers one event to the listener registered for its destination port.
///
/// Decoded bytes go out with `try_send`; the envelope goes out with a blocking
/// send and is forwarded even when decoding failed.
pub fn dispatch(registry: &PortRegistry, event: &SeqEvent) {
    let Some(listener) = registry.listener(event.dest.port) else {
        tracing::debug!(
            "No listener for {} (type {} from {}), dropping",
            event.dest,
            event.event_type,
            event.source
        );
        return;
    };

    if let Some(ref midi) = listener.midi {
        match codec::decode(event) {
            Ok(Some(bytes)) => match midi.try_send(bytes) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!("MIDI listener on {} is full, dropping", event.dest);
                }
                Err(TrySendError::Disconnected(_)) => {
                    tracing::debug!("MIDI listener on {} is gone", event.dest);
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Skipping malformed frame from {}: {}", event.source, e);
            }
        }
    }

    if let Some(ref events) = listener.events {
        if events.send(*event).is_err() {
            tracing::debug!("Event listener on {} is gone", event.dest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tags;
    use crate::port::PortListener;
    use crate::MemorySequencer;
    use crossbeam_channel::bounded;
    use seqroute_core::{PortAddress, PortCaps};
    use std::time::Duration;

    fn note_on(dest: PortAddress, ch: u8) -> SeqEvent {
        SeqEvent::new(tags::NOTEON, PortAddress::new(20, 0), dest).with_data(&[ch, 60, 100, 0])
    }

    #[test]
    fn test_dispatch_by_destination() {
        let registry = PortRegistry::new();
        let (midi_tx, midi_rx) = bounded(4);
        let (ev_tx, ev_rx) = bounded(4);
        registry.register(2, "a", PortListener::new().midi(midi_tx).events(ev_tx));

        let ev = note_on(PortAddress::new(129, 2), 0);
        dispatch(&registry, &ev);

        assert_eq!(midi_rx.try_recv().unwrap().as_slice(), &[0x90, 60, 100]);
        assert_eq!(ev_rx.try_recv().unwrap(), ev);

        // Unregistered destination is dropped
        dispatch(&registry, &note_on(PortAddress::new(129, 7), 0));
        assert!(ev_rx.try_recv().is_err());
    }

    #[test]
    fn test_malformed_still_forwards_envelope() {
        let registry = PortRegistry::new();
        let (midi_tx, midi_rx) = bounded(4);
        let (ev_tx, ev_rx) = bounded(4);
        registry.register(0, "a", PortListener::new().midi(midi_tx).events(ev_tx));

        dispatch(&registry, &note_on(PortAddress::new(129, 0), 42));

        assert!(midi_rx.try_recv().is_err());
        assert!(ev_rx.try_recv().is_ok());
    }

    #[test]
    fn test_full_midi_listener_does_not_block() {
        let registry = PortRegistry::new();
        let (midi_tx, midi_rx) = bounded(1);
        registry.register(0, "a", PortListener::new().midi(midi_tx));

        let dest = PortAddress::new(129, 0);
        for _ in 0..5 {
            dispatch(&registry, &note_on(dest, 0));
        }
        assert_eq!(midi_rx.len(), 1);
    }

    #[test]
    fn test_loop_survives_bad_frame_and_stops_on_close() {
        let seq = Arc::new(MemorySequencer::new(129));
        let session = Session::open(seq.clone(), "seqroute").unwrap();
        let registry = Arc::new(PortRegistry::new());

        let (midi_tx, midi_rx) = bounded(8);
        let (ev_tx, ev_rx) = bounded(8);
        let port = registry
            .open_port(
                &session,
                "in",
                PortCaps::WRITE | PortCaps::SUBS_WRITE,
                PortListener::new().midi(midi_tx).events(ev_tx),
            )
            .unwrap();

        let handle = EventIngest::spawn(session.clone(), registry.clone()).unwrap();

        seq.push_event(note_on(port.addr(), 99));
        seq.push_event(note_on(port.addr(), 1));

        let timeout = Duration::from_secs(2);
        assert!(ev_rx.recv_timeout(timeout).is_ok());
        assert!(ev_rx.recv_timeout(timeout).is_ok());
        let bytes = midi_rx.recv_timeout(timeout).unwrap();
        assert_eq!(bytes.as_slice(), &[0x91, 60, 100]);

        session.close();
        handle.join().unwrap();

        assert!(registry.is_empty());
        assert!(ev_rx.recv_timeout(timeout).is_err());
        drop(port);
    }

    #[test]
    fn test_failing_wait_backs_off_and_recovers() {
        let seq = Arc::new(MemorySequencer::new(129));
        let session = Session::open(seq.clone(), "seqroute").unwrap();
        let registry = Arc::new(PortRegistry::new());

        let (ev_tx, ev_rx) = bounded(8);
        let port = registry
            .open_port(
                &session,
                "in",
                PortCaps::WRITE | PortCaps::SUBS_WRITE,
                PortListener::new().events(ev_tx),
            )
            .unwrap();

        seq.fail_wait("Input/output error");
        let handle = EventIngest::spawn(session.clone(), registry.clone()).unwrap();

        let window = RETRY_DELAY * 6;
        thread::sleep(window);
        let calls = seq.wait_calls();
        assert!(calls >= 1);
        assert!(calls <= 8, "wait retried {} times in {:?}", calls, window);

        seq.restore_wait();
        seq.push_event(note_on(port.addr(), 0));
        assert!(ev_rx.recv_timeout(Duration::from_secs(2)).is_ok());

        session.close();
        handle.join().unwrap();
        drop(port);
    }
}
