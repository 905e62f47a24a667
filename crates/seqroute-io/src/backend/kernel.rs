//! ALSA sequencer backend.

use alsa::poll::pollfd;
use alsa::seq::{
    Addr, ClientIter, Connect, EvCtrl, EvNote, Event, PortCap, PortIter, PortSubscribe,
    PortSubscribeIter, PortType, QuerySubsType, Seq,
};
use alsa::{Direction, PollDescriptors};
use parking_lot::Mutex;
use seqroute_core::{
    ClientInfo, Error, PortAddress, PortCaps, PortInfo, Result, SeqEvent, Sequencer,
    EVENT_DATA_LEN,
};
use std::ffi::CString;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};

/// Poll tick; bounds how long a blocked reader takes to notice `close`.
const POLL_TICK_MS: i32 = 100;

/// The kernel sequencer, opened non-blocking for duplex use.
///
/// `alsa::Seq` is `Send` but not `Sync`, so the handle sits behind a mutex.
/// [`Sequencer::wait_ready`] polls the descriptors without holding it.
pub struct AlsaSequencer {
    seq: Mutex<Option<Seq>>,
    closed: AtomicBool,
}

impl AlsaSequencer {
    pub fn open() -> Result<Self> {
        let seq = Seq::open(None, None, true)
            .map_err(|e| Error::Initialization(format!("open sequencer: {}", e)))?;
        tracing::debug!("Opened ALSA sequencer");
        Ok(Self {
            seq: Mutex::new(Some(seq)),
            closed: AtomicBool::new(false),
        })
    }

    fn with_seq<T>(&self, f: impl FnOnce(&Seq) -> Result<T>) -> Result<T> {
        let guard = self.seq.lock();
        let seq = guard.as_ref().ok_or(Error::NotInitialized)?;
        f(seq)
    }

    fn descriptors(&self) -> Result<Vec<pollfd>> {
        self.with_seq(|seq| (seq, Some(Direction::Capture)).get().map_err(seq_err))
    }
}

fn seq_err(e: alsa::Error) -> Error {
    Error::Sequencer(e.to_string())
}

fn error_kind(e: &alsa::Error) -> ErrorKind {
    std::io::Error::from_raw_os_error(e.errno()).kind()
}

fn cstring(s: &str) -> Result<CString> {
    CString::new(s).map_err(|e| Error::Sequencer(format!("invalid name {:?}: {}", s, e)))
}

fn to_addr(addr: PortAddress) -> Addr {
    Addr {
        client: addr.device as i32,
        port: addr.port as i32,
    }
}

fn from_addr(addr: Addr) -> PortAddress {
    PortAddress::new(addr.client as u8, addr.port as u8)
}

/// Copies the payload the router cares about into the fixed envelope.
fn envelope(ev: &Event) -> SeqEvent {
    let mut data = [0u8; EVENT_DATA_LEN];

    if let Some(note) = ev.get_data::<EvNote>() {
        data[0] = note.channel;
        data[1] = note.note;
        data[2] = note.velocity;
        data[3] = note.off_velocity;
        data[4..8].copy_from_slice(&note.duration.to_le_bytes());
    } else if let Some(ctrl) = ev.get_data::<EvCtrl>() {
        data[0] = ctrl.channel;
        data[4..8].copy_from_slice(&ctrl.param.to_le_bytes());
        data[8..12].copy_from_slice(&ctrl.value.to_le_bytes());
    } else if let Some(conn) = ev.get_data::<Connect>() {
        data[0] = conn.sender.client as u8;
        data[1] = conn.sender.port as u8;
        data[2] = conn.dest.client as u8;
        data[3] = conn.dest.port as u8;
    } else if let Some(addr) = ev.get_data::<Addr>() {
        data[0] = addr.client as u8;
        data[1] = addr.port as u8;
    }

    SeqEvent {
        event_type: ev.get_type() as u8,
        source: from_addr(ev.get_source()),
        dest: from_addr(ev.get_dest()),
        data,
    }
}

impl Sequencer for AlsaSequencer {
    fn client_id(&self) -> Result<u8> {
        self.with_seq(|seq| seq.client_id().map(|id| id as u8).map_err(seq_err))
    }

    fn set_client_name(&self, name: &str) -> Result<()> {
        let name = cstring(name)?;
        self.with_seq(|seq| seq.set_client_name(&name).map_err(seq_err))
    }

    fn create_port(&self, name: &str, caps: PortCaps) -> Result<u8> {
        let name = cstring(name)?;
        self.with_seq(|seq| {
            seq.create_simple_port(
                &name,
                PortCap::from_bits_truncate(caps.bits()),
                PortType::MIDI_GENERIC | PortType::APPLICATION,
            )
            .map(|port| port as u8)
            .map_err(seq_err)
        })
    }

    fn delete_port(&self, port: u8) -> Result<()> {
        self.with_seq(|seq| seq.delete_port(port as i32).map_err(seq_err))
    }

    fn clients(&self) -> Result<Vec<ClientInfo>> {
        self.with_seq(|seq| {
            Ok(ClientIter::new(seq)
                .map(|info| ClientInfo {
                    client: info.get_client() as u8,
                    name: info.get_name().unwrap_or_default().to_string(),
                })
                .collect())
        })
    }

    fn ports(&self, client: u8) -> Result<Vec<PortInfo>> {
        self.with_seq(|seq| {
            Ok(PortIter::new(seq, client as i32)
                .map(|info| PortInfo {
                    port: info.get_port() as u8,
                    name: info.get_name().unwrap_or_default().to_string(),
                    caps: PortCaps::from_bits(info.get_capability().bits()),
                })
                .collect())
        })
    }

    fn subscribers(&self, addr: PortAddress) -> Result<Vec<PortAddress>> {
        self.with_seq(|seq| {
            Ok(
                PortSubscribeIter::new(seq, to_addr(addr), QuerySubsType::READ)
                    .map(|sub| from_addr(sub.get_dest()))
                    .collect(),
            )
        })
    }

    fn is_subscribed(&self, from: PortAddress, to: PortAddress) -> Result<bool> {
        Ok(self.subscribers(from)?.contains(&to))
    }

    fn subscribe(&self, from: PortAddress, to: PortAddress) -> Result<()> {
        self.with_seq(|seq| {
            let sub = PortSubscribe::empty().map_err(seq_err)?;
            sub.set_sender(to_addr(from));
            sub.set_dest(to_addr(to));
            seq.subscribe_port(&sub).map_err(seq_err)
        })
    }

    fn unsubscribe(&self, from: PortAddress, to: PortAddress) -> Result<()> {
        self.with_seq(|seq| {
            seq.unsubscribe_port(to_addr(from), to_addr(to))
                .map_err(seq_err)
        })
    }

    fn wait_ready(&self) -> Result<()> {
        loop {
            if self.is_closed() {
                return Err(Error::SessionClosed);
            }

            let pending = self.with_seq(|seq| {
                seq.input().event_input_pending(true).map_err(seq_err)
            });
            match pending {
                Ok(n) if n > 0 => return Ok(()),
                Ok(_) => {}
                Err(Error::NotInitialized) => return Err(Error::SessionClosed),
                Err(e) => return Err(e),
            }

            let mut fds = match self.descriptors() {
                Ok(fds) => fds,
                Err(Error::NotInitialized) => return Err(Error::SessionClosed),
                Err(e) => return Err(e),
            };
            match alsa::poll::poll(&mut fds, POLL_TICK_MS) {
                Ok(0) => {}
                Ok(_) => return Ok(()),
                Err(e) if error_kind(&e) == ErrorKind::Interrupted => {}
                Err(e) => return Err(seq_err(e)),
            }
        }
    }

    fn next_pending(&self) -> Result<Option<SeqEvent>> {
        let guard = self.seq.lock();
        let seq = guard.as_ref().ok_or(Error::SessionClosed)?;
        let mut input = seq.input();

        loop {
            match input.event_input() {
                Ok(ev) => return Ok(Some(envelope(&ev))),
                Err(e) => match error_kind(&e) {
                    ErrorKind::WouldBlock => return Ok(None),
                    ErrorKind::Interrupted => continue,
                    _ => return Err(seq_err(e)),
                },
            }
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            // Dropping the handle closes the client and all its ports
            self.seq.lock().take();
            tracing::debug!("Closed ALSA sequencer");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
