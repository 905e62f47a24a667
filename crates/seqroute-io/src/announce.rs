//! Announcement interpreter.
//!
//! Listens on the system announce port and turns the three relevant
//! notices into [`AnnouncementEvent`]s on a bounded queue.

use crate::port::{PortListener, PortRegistry, RegisteredPort};
use crate::session::Session;
use crate::subscription::SubscriptionController;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use seqroute_core::announce::tags;
use seqroute_core::{AnnouncementEvent, Error, PortAddress, PortCaps, Result, SeqEvent};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub const THREAD_NAME: &str = "seqroute-announce";

pub const PORT_NAME: &str = "announcements";

/// Default depth of the announcement queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Envelopes buffered between the ingest loop and the interpreter thread.
const ENVELOPE_CAPACITY: usize = 64;

pub struct AnnouncementInterpreter {
    port: PortAddress,
    handle: JoinHandle<()>,
}

impl AnnouncementInterpreter {
    /// Opens the listener port, subscribes it to `0:1` and starts the
    /// interpreter thread. The returned queue is the engine's only input.
    pub fn start(
        session: &Session,
        registry: &Arc<PortRegistry>,
        queue_capacity: usize,
    ) -> Result<(Self, Receiver<AnnouncementEvent>)> {
        if queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "announcement queue capacity must be > 0".into(),
            ));
        }

        let (envelope_tx, envelope_rx) = bounded(ENVELOPE_CAPACITY);
        let port = registry.open_port(
            session,
            PORT_NAME,
            PortCaps::WRITE | PortCaps::SUBS_WRITE,
            PortListener::new().events(envelope_tx),
        )?;
        let addr = port.addr();

        let subscriptions = SubscriptionController::new(session.clone());
        subscriptions
            .connect(PortAddress::announce(), addr)
            .map_err(|e| Error::Initialization(format!("subscribe to announcements: {}", e)))?;

        let (queue_tx, queue_rx) = bounded(queue_capacity);

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                Self::run(envelope_rx, queue_tx);
                Self::stop(&subscriptions, port);
            })
            .map_err(|e| Error::Initialization(format!("spawn {}: {}", THREAD_NAME, e)))?;

        tracing::info!("Listening for announcements on {}", addr);
        Ok((Self { port: addr, handle }, queue_rx))
    }

    pub fn port(&self) -> PortAddress {
        self.port
    }

    pub fn join(self) {
        if self.handle.join().is_err() {
            tracing::warn!("{} thread panicked", THREAD_NAME);
        }
    }

    pub(crate) fn into_handle(self) -> JoinHandle<()> {
        self.handle
    }

    fn run(envelopes: Receiver<SeqEvent>, queue: Sender<AnnouncementEvent>) {
        for envelope in envelopes.iter() {
            let Some(event) = classify(&envelope) else {
                continue;
            };

            match queue.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    tracing::debug!("Announcement queue full, waiting");
                    if queue.send(event).is_err() {
                        return;
                    }
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    fn stop(subscriptions: &SubscriptionController, port: RegisteredPort) {
        match subscriptions.disconnect(PortAddress::announce(), port.addr()) {
            Ok(()) => {}
            Err(Error::NotInitialized) => {}
            Err(e) => tracing::debug!("Announcement unsubscribe on exit: {}", e),
        }
        drop(port);
        tracing::info!("Announcement interpreter stopped");
    }
}

/// Classifies one envelope received on the announcement port.
///
/// Only port creation, subscription and unsubscription are relevant; every
/// other tag is ignored.
pub fn classify(envelope: &SeqEvent) -> Option<AnnouncementEvent> {
    let event = AnnouncementEvent::from_envelope(envelope);
    match event {
        Some(ref ev) => tracing::debug!(
            "Announcement {:?} {}{}",
            ev.kind,
            ev.source(),
            ev.dest().map(|d| format!(" -> {}", d)).unwrap_or_default()
        ),
        None => tracing::debug!(
            "Ignoring announcement {} ({})",
            envelope.event_type,
            tags::name(envelope.event_type).unwrap_or("unknown")
        ),
    }
    event
}
