//! In-process sequencer simulation.
//!
//! Behaves like the kernel as far as the router can observe: the system
//! client owns a timer and an announce port, every topology change is
//! broadcast from `0:1` to whoever subscribed to it, and duplicate or missing
//! edges fail the way the kernel fails them.

use parking_lot::{Condvar, Mutex};
use seqroute_core::announce::tags;
use seqroute_core::{
    ClientInfo, Error, PortAddress, PortCaps, PortInfo, Result, SeqEvent, Sequencer,
    ANNOUNCE_PORT, SYSTEM_CLIENT,
};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

/// A mutation issued through the [`Sequencer`] trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqOp {
    Subscribe(PortAddress, PortAddress),
    Unsubscribe(PortAddress, PortAddress),
}

struct SimClient {
    name: String,
    ports: BTreeMap<u8, PortInfo>,
}

struct State {
    clients: BTreeMap<u8, SimClient>,
    edges: Vec<(PortAddress, PortAddress)>,
    pending: VecDeque<SeqEvent>,
    failing: HashSet<u8>,
    failing_subscribers: HashSet<PortAddress>,
    fail_subscribe: Option<String>,
    fail_wait: Option<String>,
    wait_calls: usize,
    ops: Vec<SeqOp>,
}

pub struct MemorySequencer {
    client_id: u8,
    state: Mutex<State>,
    ready: Condvar,
    closed: AtomicBool,
}

impl MemorySequencer {
    pub fn new(client_id: u8) -> Self {
        let mut clients = BTreeMap::new();

        let mut system = SimClient {
            name: "System".to_string(),
            ports: BTreeMap::new(),
        };
        system.ports.insert(
            0,
            PortInfo {
                port: 0,
                name: "Timer".to_string(),
                caps: PortCaps::DUPLEX_SUBS,
            },
        );
        system.ports.insert(
            ANNOUNCE_PORT,
            PortInfo {
                port: ANNOUNCE_PORT,
                name: "Announce".to_string(),
                caps: PortCaps::READ | PortCaps::SUBS_READ,
            },
        );
        clients.insert(SYSTEM_CLIENT, system);

        clients.insert(
            client_id,
            SimClient {
                name: format!("Client-{}", client_id),
                ports: BTreeMap::new(),
            },
        );

        Self {
            client_id,
            state: Mutex::new(State {
                clients,
                edges: Vec::new(),
                pending: VecDeque::new(),
                failing: HashSet::new(),
                failing_subscribers: HashSet::new(),
                fail_subscribe: None,
                fail_wait: None,
                wait_calls: 0,
                ops: Vec::new(),
            }),
            ready: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    // ==================== Simulated hardware ====================

    /// Attaches a client (or renames an existing one).
    pub fn add_client(&self, client: u8, name: impl Into<String>) {
        let name = name.into();
        let mut state = self.state.lock();
        match state.clients.get_mut(&client) {
            Some(existing) => existing.name = name,
            None => {
                state.clients.insert(
                    client,
                    SimClient {
                        name,
                        ports: BTreeMap::new(),
                    },
                );
                self.announce(&mut state, tags::CLIENT_START, &[client, 0]);
            }
        }
    }

    /// Adds a port to an attached client, creating the client if needed.
    pub fn add_port(
        &self,
        client: u8,
        port: u8,
        name: impl Into<String>,
        caps: PortCaps,
    ) -> PortAddress {
        let name = name.into();
        let mut state = self.state.lock();
        if !state.clients.contains_key(&client) {
            state.clients.insert(
                client,
                SimClient {
                    name: format!("Client-{}", client),
                    ports: BTreeMap::new(),
                },
            );
            self.announce(&mut state, tags::CLIENT_START, &[client, 0]);
        }
        if let Some(c) = state.clients.get_mut(&client) {
            c.ports.insert(port, PortInfo { port, name, caps });
        }
        self.announce(&mut state, tags::PORT_START, &[client, port]);
        PortAddress::new(client, port)
    }

    /// Plugs in a one-port device: client `client` named `device`, port 0.
    pub fn add_client_port(
        &self,
        client: u8,
        device: impl Into<String>,
        port_name: impl Into<String>,
        caps: PortCaps,
    ) -> PortAddress {
        self.add_client(client, device);
        self.add_port(client, 0, port_name, caps)
    }

    /// Unplugs a client: its edges go first, then its ports, then the client.
    pub fn remove_client(&self, client: u8) {
        let mut state = self.state.lock();
        let ports: Vec<u8> = match state.clients.get(&client) {
            Some(c) => c.ports.keys().copied().collect(),
            None => return,
        };
        for port in ports {
            self.remove_port_locked(&mut state, PortAddress::new(client, port));
        }
        state.clients.remove(&client);
        self.announce(&mut state, tags::CLIENT_EXIT, &[client, 0]);
    }

    /// Makes `ports(client)` fail until cleared with [`Self::restore_enumeration`].
    pub fn fail_enumeration(&self, client: u8) {
        self.state.lock().failing.insert(client);
    }

    pub fn restore_enumeration(&self, client: u8) {
        self.state.lock().failing.remove(&client);
    }

    /// Makes `subscribers(addr)` fail for good.
    pub fn fail_subscribers(&self, addr: PortAddress) {
        self.state.lock().failing_subscribers.insert(addr);
    }

    /// The next `subscribe` call fails with `reason`.
    pub fn fail_next_subscribe(&self, reason: impl Into<String>) {
        self.state.lock().fail_subscribe = Some(reason.into());
    }

    /// Makes every `wait_ready` fail with `reason` until [`Self::restore_wait`].
    pub fn fail_wait(&self, reason: impl Into<String>) {
        self.state.lock().fail_wait = Some(reason.into());
        self.ready.notify_all();
    }

    pub fn restore_wait(&self) {
        self.state.lock().fail_wait = None;
    }

    /// An operator connecting two ports behind the router's back.
    pub fn connect_external(&self, from: PortAddress, to: PortAddress) -> Result<()> {
        let mut state = self.state.lock();
        self.add_edge_locked(&mut state, from, to)
    }

    /// An operator disconnecting two ports behind the router's back.
    pub fn disconnect_external(&self, from: PortAddress, to: PortAddress) -> Result<()> {
        let mut state = self.state.lock();
        self.remove_edge_locked(&mut state, from, to)
    }

    /// Queues a raw event for this client.
    pub fn push_event(&self, event: SeqEvent) {
        let mut state = self.state.lock();
        state.pending.push_back(event);
        self.ready.notify_all();
    }

    /// Emits `event` from `source` to each of its subscribers owned by this
    /// client; returns how many copies were queued.
    pub fn send_from(&self, source: PortAddress, event: SeqEvent) -> usize {
        let mut state = self.state.lock();
        let dests: Vec<PortAddress> = state
            .edges
            .iter()
            .filter(|(from, to)| *from == source && to.device == self.client_id)
            .map(|(_, to)| *to)
            .collect();
        for dest in &dests {
            let mut ev = event;
            ev.source = source;
            ev.dest = *dest;
            state.pending.push_back(ev);
        }
        if !dests.is_empty() {
            self.ready.notify_all();
        }
        dests.len()
    }

    // ==================== Inspection ====================

    pub fn client_name(&self, client: u8) -> Option<String> {
        self.state.lock().clients.get(&client).map(|c| c.name.clone())
    }

    /// Every edge, in creation order.
    pub fn edges(&self) -> Vec<(PortAddress, PortAddress)> {
        self.state.lock().edges.clone()
    }

    pub fn has_edge(&self, from: PortAddress, to: PortAddress) -> bool {
        self.state.lock().edges.contains(&(from, to))
    }

    /// Mutations issued through the trait so far.
    pub fn ops(&self) -> Vec<SeqOp> {
        self.state.lock().ops.clone()
    }

    pub fn take_ops(&self) -> Vec<SeqOp> {
        std::mem::take(&mut self.state.lock().ops)
    }

    /// How many times `wait_ready` has been entered.
    pub fn wait_calls(&self) -> usize {
        self.state.lock().wait_calls
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    // ==================== Internals ====================

    fn announce(&self, state: &mut State, tag: u8, payload: &[u8]) {
        let source = PortAddress::announce();
        let mut queued = false;
        for (from, to) in &state.edges {
            if *from == source && to.device == self.client_id {
                state
                    .pending
                    .push_back(SeqEvent::new(tag, source, *to).with_data(payload));
                queued = true;
            }
        }
        if queued {
            self.ready.notify_all();
        }
    }

    fn port_exists(state: &State, addr: PortAddress) -> bool {
        state
            .clients
            .get(&addr.device)
            .map(|c| c.ports.contains_key(&addr.port))
            .unwrap_or(false)
    }

    fn add_edge_locked(&self, state: &mut State, from: PortAddress, to: PortAddress) -> Result<()> {
        if !Self::port_exists(state, from) || !Self::port_exists(state, to) {
            return Err(Error::Sequencer("No such file or directory".into()));
        }
        if state.edges.contains(&(from, to)) {
            return Err(Error::Sequencer("Device or resource busy".into()));
        }
        state.edges.push((from, to));
        self.announce(
            state,
            tags::PORT_SUBSCRIBED,
            &[from.device, from.port, to.device, to.port],
        );
        Ok(())
    }

    fn remove_edge_locked(
        &self,
        state: &mut State,
        from: PortAddress,
        to: PortAddress,
    ) -> Result<()> {
        let Some(pos) = state.edges.iter().position(|e| *e == (from, to)) else {
            return Err(Error::Sequencer("No such file or directory".into()));
        };
        // The unsubscribe notice still reaches a subscriber of 0:1 whose own
        // edge is the one being removed.
        self.announce(
            state,
            tags::PORT_UNSUBSCRIBED,
            &[from.device, from.port, to.device, to.port],
        );
        state.edges.remove(pos);
        Ok(())
    }

    fn remove_port_locked(&self, state: &mut State, addr: PortAddress) {
        let attached: Vec<(PortAddress, PortAddress)> = state
            .edges
            .iter()
            .filter(|(from, to)| *from == addr || *to == addr)
            .copied()
            .collect();
        for (from, to) in attached {
            let _ = self.remove_edge_locked(state, from, to);
        }
        if let Some(c) = state.clients.get_mut(&addr.device) {
            c.ports.remove(&addr.port);
        }
        self.announce(state, tags::PORT_EXIT, &[addr.device, addr.port]);
    }
}

impl Sequencer for MemorySequencer {
    fn client_id(&self) -> Result<u8> {
        Ok(self.client_id)
    }

    fn set_client_name(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(c) = state.clients.get_mut(&self.client_id) {
            c.name = name.to_string();
        }
        Ok(())
    }

    fn create_port(&self, name: &str, caps: PortCaps) -> Result<u8> {
        let mut state = self.state.lock();
        let own = state
            .clients
            .get_mut(&self.client_id)
            .ok_or(Error::NotInitialized)?;
        let port = (0..=u8::MAX)
            .find(|p| !own.ports.contains_key(p))
            .ok_or_else(|| Error::Sequencer("Cannot allocate memory".into()))?;
        own.ports.insert(
            port,
            PortInfo {
                port,
                name: name.to_string(),
                caps,
            },
        );
        self.announce(&mut state, tags::PORT_START, &[self.client_id, port]);
        Ok(port)
    }

    fn delete_port(&self, port: u8) -> Result<()> {
        let mut state = self.state.lock();
        let addr = PortAddress::new(self.client_id, port);
        if !Self::port_exists(&state, addr) {
            return Err(Error::Sequencer("No such file or directory".into()));
        }
        self.remove_port_locked(&mut state, addr);
        Ok(())
    }

    fn clients(&self) -> Result<Vec<ClientInfo>> {
        let state = self.state.lock();
        Ok(state
            .clients
            .iter()
            .map(|(id, c)| ClientInfo {
                client: *id,
                name: c.name.clone(),
            })
            .collect())
    }

    fn ports(&self, client: u8) -> Result<Vec<PortInfo>> {
        let state = self.state.lock();
        if state.failing.contains(&client) {
            return Err(Error::Sequencer(format!(
                "port query for client {} failed",
                client
            )));
        }
        let c = state
            .clients
            .get(&client)
            .ok_or_else(|| Error::Sequencer("No such file or directory".into()))?;
        Ok(c.ports.values().cloned().collect())
    }

    fn subscribers(&self, addr: PortAddress) -> Result<Vec<PortAddress>> {
        let state = self.state.lock();
        if state.failing_subscribers.contains(&addr) {
            return Err(Error::Sequencer("Input/output error".into()));
        }
        Ok(state
            .edges
            .iter()
            .filter(|(from, _)| *from == addr)
            .map(|(_, to)| *to)
            .collect())
    }

    fn is_subscribed(&self, from: PortAddress, to: PortAddress) -> Result<bool> {
        Ok(self.state.lock().edges.contains(&(from, to)))
    }

    fn subscribe(&self, from: PortAddress, to: PortAddress) -> Result<()> {
        let mut state = self.state.lock();
        state.ops.push(SeqOp::Subscribe(from, to));
        if let Some(reason) = state.fail_subscribe.take() {
            return Err(Error::Sequencer(reason));
        }
        self.add_edge_locked(&mut state, from, to)
    }

    fn unsubscribe(&self, from: PortAddress, to: PortAddress) -> Result<()> {
        let mut state = self.state.lock();
        state.ops.push(SeqOp::Unsubscribe(from, to));
        self.remove_edge_locked(&mut state, from, to)
    }

    fn wait_ready(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.wait_calls += 1;
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::SessionClosed);
            }
            if let Some(reason) = &state.fail_wait {
                return Err(Error::Sequencer(reason.clone()));
            }
            if !state.pending.is_empty() {
                return Ok(());
            }
            self.ready.wait(&mut state);
        }
    }

    fn next_pending(&self) -> Result<Option<SeqEvent>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::SessionClosed);
        }
        Ok(self.state.lock().pending.pop_front())
    }

    fn close(&self) {
        let _state = self.state.lock();
        self.closed.store(true, Ordering::Release);
        self.ready.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for MemorySequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemorySequencer")
            .field("client_id", &self.client_id)
            .field("clients", &state.clients.len())
            .field("edges", &state.edges.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn listener(seq: &MemorySequencer) -> PortAddress {
        let port = seq
            .create_port("listen", PortCaps::WRITE | PortCaps::SUBS_WRITE)
            .unwrap();
        let addr = PortAddress::new(129, port);
        seq.subscribe(PortAddress::announce(), addr).unwrap();
        // Drop the notice about our own subscription
        while seq.next_pending().unwrap().is_some() {}
        addr
    }

    #[test]
    fn test_system_client_layout() {
        let seq = MemorySequencer::new(129);
        let ports = seq.ports(SYSTEM_CLIENT).unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[1].name, "Announce");
        assert!(ports[1].caps.is_input());
    }

    #[test]
    fn test_duplicate_and_missing_edges_fail() {
        let seq = MemorySequencer::new(129);
        let a = seq.add_client_port(20, "A", "Out", PortCaps::DUPLEX_SUBS);
        let b = seq.add_client_port(21, "B", "In", PortCaps::DUPLEX_SUBS);

        seq.subscribe(a, b).unwrap();
        assert!(seq.subscribe(a, b).is_err());
        seq.unsubscribe(a, b).unwrap();
        assert!(seq.unsubscribe(a, b).is_err());
        assert!(seq.subscribe(a, PortAddress::new(99, 0)).is_err());
    }

    #[test]
    fn test_announces_to_subscribers_only() {
        let seq = MemorySequencer::new(129);
        seq.add_client_port(20, "A", "Out", PortCaps::DUPLEX_SUBS);
        assert_eq!(seq.pending_len(), 0, "Nobody listens to 0:1 yet");

        let me = listener(&seq);
        let b = seq.add_client_port(21, "B", "In", PortCaps::DUPLEX_SUBS);

        let start = seq.next_pending().unwrap().unwrap();
        assert_eq!(start.event_type, tags::CLIENT_START);
        let port = seq.next_pending().unwrap().unwrap();
        assert_eq!(port.event_type, tags::PORT_START);
        assert_eq!(port.source, PortAddress::announce());
        assert_eq!(port.dest, me);
        assert_eq!(&port.data[..2], &[b.device, b.port]);
    }

    #[test]
    fn test_unplug_announces_unsubscribe_before_exit() {
        let seq = MemorySequencer::new(129);
        let a = seq.add_client_port(20, "A", "Out", PortCaps::DUPLEX_SUBS);
        let b = seq.add_client_port(21, "B", "In", PortCaps::DUPLEX_SUBS);
        seq.connect_external(a, b).unwrap();
        listener(&seq);

        seq.remove_client(20);
        let kinds: Vec<u8> = std::iter::from_fn(|| seq.next_pending().unwrap())
            .map(|ev| ev.event_type)
            .collect();
        assert_eq!(
            kinds,
            vec![tags::PORT_UNSUBSCRIBED, tags::PORT_EXIT, tags::CLIENT_EXIT]
        );
        assert!(seq.edges().is_empty());
        assert!(seq.ops().iter().all(|op| !matches!(op, SeqOp::Unsubscribe(..))));
    }

    #[test]
    fn test_close_wakes_blocked_reader() {
        let seq = Arc::new(MemorySequencer::new(129));
        let reader = {
            let seq = seq.clone();
            thread::spawn(move || seq.wait_ready())
        };

        thread::sleep(Duration::from_millis(20));
        seq.close();

        let result = reader.join().unwrap();
        assert!(matches!(result, Err(Error::SessionClosed)));
        assert!(matches!(seq.next_pending(), Err(Error::SessionClosed)));
    }
}
