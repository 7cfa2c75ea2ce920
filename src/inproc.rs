//! In-process bus transport.
//!
//! Endpoints live in a registry scoped to the transport instance; cloning
//! the transport shares the registry, so every participant of one benchmark
//! run must open its socket from clones of the same [`InprocTransport`].
//! Addresses are arbitrary strings, by convention `inproc://name`.
//!
//! Delivery is best effort, like any bus: a peer that has closed its socket
//! silently stops receiving, and messages still queued at close are
//! dropped.

use std::{
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use crossbeam::channel::{unbounded, Receiver, Sender};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::{
    transport::{BusSocket, Transport},
    utils::ExponentialBackoff,
};

// Dialing retries while the peer has not started listening yet; the grace
// periods between listen and dial are heuristic, not a barrier. Roughly
// 400 ms of patience in total.
const DIAL_INITIAL_WAIT: Duration = Duration::from_millis(1);
const DIAL_MAX_WAIT: Duration = Duration::from_millis(50);
const DIAL_ATTEMPTS: usize = 12;

type Inbox = Sender<Vec<u8>>;
type PeerList = Arc<Mutex<Vec<Inbox>>>;

struct Endpoint {
    inbox: Inbox,
    peers: PeerList,
}

/// An in-process bus transport instance.
#[derive(Clone, Default)]
pub struct InprocTransport {
    endpoints: Arc<DashMap<String, Endpoint>>,
}

impl InprocTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for InprocTransport {
    type Socket = InprocSocket;

    fn open(&self) -> io::Result<Self::Socket> {
        let (inbox, messages) = unbounded();
        Ok(InprocSocket {
            endpoints: self.endpoints.clone(),
            inbox,
            messages,
            peers: PeerList::default(),
            bound: None,
        })
    }
}

/// One participant's socket on an in-process bus.
pub struct InprocSocket {
    endpoints: Arc<DashMap<String, Endpoint>>,
    inbox: Inbox,
    messages: Receiver<Vec<u8>>,
    peers: PeerList,
    bound: Option<String>,
}

impl BusSocket for InprocSocket {
    fn listen(&mut self, addr: &str) -> io::Result<()> {
        match self.endpoints.entry(addr.to_string()) {
            Entry::Occupied(_) => Err(io::ErrorKind::AddrInUse.into()),
            Entry::Vacant(entry) => {
                entry.insert(Endpoint {
                    inbox: self.inbox.clone(),
                    peers: self.peers.clone(),
                });
                self.bound = Some(addr.to_string());
                Ok(())
            }
        }
    }

    fn dial(&mut self, addr: &str) -> io::Result<()> {
        for deadline in
            ExponentialBackoff::new(DIAL_INITIAL_WAIT, DIAL_MAX_WAIT).take(DIAL_ATTEMPTS)
        {
            if let Some(endpoint) = self.endpoints.get(addr) {
                // Links are bidirectional: the listener learns about us and
                // we learn about the listener.
                endpoint.peers.lock().unwrap().push(self.inbox.clone());
                self.peers.lock().unwrap().push(endpoint.inbox.clone());
                return Ok(());
            }
            if let Some(wait) = deadline.checked_duration_since(std::time::Instant::now()) {
                std::thread::sleep(wait);
            }
        }
        tracing::debug!(addr, "no endpoint appeared within the dial backoff");
        Err(io::ErrorKind::ConnectionRefused.into())
    }

    fn send(&mut self, message: &[u8]) -> io::Result<()> {
        // Peers that have closed their socket are pruned; the message is
        // simply lost on that link.
        self.peers
            .lock()
            .unwrap()
            .retain(|peer| peer.send(message.to_vec()).is_ok());
        Ok(())
    }

    fn recv(&mut self) -> io::Result<Vec<u8>> {
        // The socket holds its own inbox sender, so this blocks until a
        // peer delivers something; it cannot observe a disconnect of every
        // producer.
        self.messages
            .recv()
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }
}

impl Drop for InprocSocket {
    fn drop(&mut self) {
        if let Some(addr) = self.bound.take() {
            self.endpoints.remove(&addr);
        }
    }
}
